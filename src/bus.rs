//! Bus transport and register access.
//!
//! A register transaction opens the bus, talks to the sensor and closes it again. Between the
//! address write and the data the sensor needs a short settle time; both waits are async so
//! other tasks keep running while the bus is held.
use core::time::Duration;

use embedded_hal::i2c::I2c;
use tracing::debug;

use crate::error::Error;
use crate::registers::Register;

/// Wait after a register write, matching the sensor's internal update cycle.
pub const WRITE_SETTLE: Duration = Duration::from_millis(50);

/// Wait between sending the register address and reading the data back.
pub const READ_SETTLE: Duration = Duration::from_millis(20);

/// The primitive bus operations the driver is built on.
///
/// Every transaction is `open`, one or two of `write` and `read`, then `close`. Transports that
/// keep the bus open all the time can leave `open` and `close` empty; every
/// `embedded_hal::i2c::I2c` implementation is such a transport.
pub trait Transport {
    type Error: embedded_hal::i2c::Error;

    fn open(&mut self, bus_number: u8) -> Result<(), Self::Error>;
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error>;
    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error>;
    fn close(&mut self) -> Result<(), Self::Error>;
}

impl<I: I2c> Transport for I {
    type Error = I::Error;

    fn open(&mut self, _bus_number: u8) -> Result<(), Self::Error> {
        Ok(())
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        I2c::write(self, address, bytes)
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        I2c::read(self, address, buffer)
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Register level access to one sensor through a `Transport`.
///
/// This is not synchronized by itself; the driver keeps it behind its transaction lock.
pub struct RegisterBus<T> {
    transport: T,
    bus_number: u8,
    address: u8,
}

impl<T: Transport> RegisterBus<T> {
    pub fn new(transport: T, bus_number: u8, address: u8) -> Self {
        RegisterBus {
            transport,
            bus_number,
            address,
        }
    }

    /// Write `value` to `register` and wait for the sensor to take it over.
    pub async fn write_register(&mut self, register: Register, value: u8) -> Result<(), Error> {
        self.transport.open(self.bus_number).map_err(Error::bus)?;
        let result = self.write_and_settle(&[register as u8, value]).await;
        self.finish(result)
    }

    /// Burst read `buffer.len()` bytes starting at `register`.
    pub async fn read_register(&mut self, register: Register, buffer: &mut [u8]) -> Result<(), Error> {
        self.transport.open(self.bus_number).map_err(Error::bus)?;
        let result = self.read_after_settle(register, buffer).await;
        self.finish(result)
    }

    /// Read a single register.
    pub async fn read_byte(&mut self, register: Register) -> Result<u8, Error> {
        let mut buffer = [0u8; 1];
        self.read_register(register, &mut buffer).await?;
        Ok(buffer[0])
    }

    async fn write_and_settle(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.transport.write(self.address, bytes).map_err(Error::bus)?;
        tokio::time::sleep(WRITE_SETTLE).await;
        Ok(())
    }

    async fn read_after_settle(&mut self, register: Register, buffer: &mut [u8]) -> Result<(), Error> {
        self.transport
            .write(self.address, &[register as u8])
            .map_err(Error::bus)?;
        tokio::time::sleep(READ_SETTLE).await;
        self.transport.read(self.address, buffer).map_err(Error::bus)
    }

    /// Close the bus. A failed transaction keeps its own error even if closing fails too.
    fn finish(&mut self, result: Result<(), Error>) -> Result<(), Error> {
        let closed = self.transport.close().map_err(Error::bus);
        if let (Err(err), Err(close_err)) = (&result, &closed) {
            debug!(%err, %close_err, "closing the bus after a failed transaction failed too");
        }
        result.and(closed)
    }

    /// Destroys this register bus and hands back the transport.
    pub fn destroy(self) -> T {
        self.transport
    }
}

#[cfg(feature = "linux")]
pub use self::linux::{LinuxTransport, LinuxTransportError};

#[cfg(feature = "linux")]
mod linux {
    use embedded_hal::i2c::{ErrorKind, I2c};
    use linux_embedded_hal::i2cdev::linux::LinuxI2CError;
    use linux_embedded_hal::{I2CError, I2cdev};

    use super::Transport;

    /// Opens `/dev/i2c-<bus>` for every transaction and closes it afterwards.
    #[derive(Default)]
    pub struct LinuxTransport {
        device: Option<I2cdev>,
    }

    impl LinuxTransport {
        pub fn new() -> Self {
            LinuxTransport { device: None }
        }

        fn device(&mut self) -> Result<&mut I2cdev, LinuxTransportError> {
            self.device.as_mut().ok_or(LinuxTransportError::NotOpen)
        }
    }

    #[derive(Debug, thiserror::Error)]
    pub enum LinuxTransportError {
        #[error("could not open /dev/i2c-{bus}: {cause:?}")]
        Open { bus: u8, cause: LinuxI2CError },
        #[error("bus used before it was opened")]
        NotOpen,
        #[error("i2c transfer failed: {0:?}")]
        Transfer(I2CError),
    }

    impl embedded_hal::i2c::Error for LinuxTransportError {
        fn kind(&self) -> ErrorKind {
            match self {
                LinuxTransportError::Transfer(err) => embedded_hal::i2c::Error::kind(err),
                _ => ErrorKind::Other,
            }
        }
    }

    impl Transport for LinuxTransport {
        type Error = LinuxTransportError;

        fn open(&mut self, bus_number: u8) -> Result<(), Self::Error> {
            let device = I2cdev::new(format!("/dev/i2c-{bus_number}"))
                .map_err(|cause| LinuxTransportError::Open { bus: bus_number, cause })?;
            self.device = Some(device);
            Ok(())
        }

        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
            I2c::write(self.device()?, address, bytes).map_err(LinuxTransportError::Transfer)
        }

        fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
            I2c::read(self.device()?, address, buffer).map_err(LinuxTransportError::Transfer)
        }

        fn close(&mut self) -> Result<(), Self::Error> {
            // Dropping the device closes the file descriptor.
            self.device = None;
            Ok(())
        }
    }
}
