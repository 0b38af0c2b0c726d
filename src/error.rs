use embedded_hal::i2c::ErrorKind;

/// Driver errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The transport failed to open, write, read or close the bus.
    #[error("bus transaction failed: {0:?}")]
    Bus(ErrorKind),
    /// Something answered on the address, but it is not a BME280.
    #[error("unexpected chip id {found:#04x}, expected {expected:#04x}", expected = crate::registers::CHIP_ID)]
    Identity { found: u8 },
    /// The data registers still hold their reset values: no conversion has finished since power
    /// on. Poll again later.
    #[error("no measurement has completed yet")]
    DataNotReady,
    /// The driver is initializing or recovering from a fault.
    #[error("sensor is not ready")]
    NotReady,
}

impl Error {
    /// Map any embedded-hal I2C error onto `Error::Bus`.
    pub(crate) fn bus<E: embedded_hal::i2c::Error>(err: E) -> Self {
        Error::Bus(err.kind())
    }
}
