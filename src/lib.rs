//! BME280 driver.
//!
//! Example:
//!
//! ```
//! # use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};
//! # use bme280_bus::{Bme280, Config, Oversampling};
//! # let expectations = vec![
//! #     // chip id
//! #     Transaction::write(0x76, vec![0xD0]),
//! #     Transaction::read(0x76, vec![0x60]),
//! #     // ctrl_hum, then ctrl_meas
//! #     Transaction::write(0x76, vec![0xF2, 0b0000_0100]),
//! #     Transaction::write(0x76, vec![0xF4, 0b1001_0011]),
//! #     // calibration blocks
//! #     Transaction::write(0x76, vec![0x88]),
//! #     Transaction::read(0x76, vec![
//! #         0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, 0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, 0x27,
//! #         0x0B, 0x8C, 0x00, 0xF9, 0xFF, 0x8C, 0x3C, 0xF8, 0xC6, 0x70, 0x17, 0x00, 0x4B,
//! #     ]),
//! #     Transaction::write(0x76, vec![0xE1]),
//! #     Transaction::read(0x76, vec![0x6A, 0x01, 0x00, 0x13, 0x2C, 0x03, 0x1E]),
//! #     // one measurement burst
//! #     Transaction::write(0x76, vec![0xF7]),
//! #     Transaction::read(0x76, vec![0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30]),
//! # ];
//! # let mut mock_i2c = I2cMock::new(&expectations);
//! # let runtime = tokio::runtime::Builder::new_current_thread()
//! #     .enable_time()
//! #     .start_paused(true)
//! #     .build()
//! #     .unwrap();
//! # runtime.block_on(async {
//! let config = Config::new(Oversampling::X8, Oversampling::X8, Oversampling::X8);
//! let bme280 = Bme280::new(mock_i2c.clone(), config);
//! bme280.initialize().await.unwrap();
//! let reading = bme280.read_all_measurements().await.unwrap();
//!
//! println!("temperature (bme280): {:.2}C", reading.temperature_c);
//! println!("pressure (bme280): {:.2}hPa", reading.pressure_hpa.unwrap());
//! println!("humidity (bme280): {:.2}%", reading.humidity_percent);
//! # });
//! # mock_i2c.done();
//! ```
//!
//! [BME280 Datasheet](https://www.bosch-sensortec.com/media/boschsensortec/downloads/datasheets/bst-bme280-ds002.pdf)
//!
//! The driver is a cheap handle that can be cloned into as many tasks as you like. Only one
//! register transaction is ever on the bus; callers queue for it in the order they arrive.
//!
//! Below is how the sensor gets brought up, and how the driver recovers when the sensor drops
//! off the bus. Recovery runs as a background tokio task. The caller whose read failed gets
//! the bus error straight away, and every read is refused with `Error::NotReady` until
//! recovery succeeds.
//!
//! ```text
//!           Bme280::new (no I/O)
//!                  │
//!                  ▼
//!              initialize()  ◄──────────────────────┐
//!                  │                                │
//!                  ▼                                │
//!       Register::ChipId (0xD0) == 0x60 ── No ──┐   │
//!                  │                            │   │
//!                  ▼                            │   │
//!       Register::CtrlHum (0xF2)  ── fail ──────┤   │
//!                  │                            │   │
//!                  ▼                            │   │
//!       Register::CtrlMeas (0xF4) ── fail ──────┤   │
//!                  │                            │   │
//!                  ▼                            ▼   │
//!       Read calibration 0x88, 0xE1 ─ fail ─► Faulted, wait 2 s
//!                  │                                ▲
//!                  ▼                                │
//!       Wait one measurement time                   │
//!                  │                                │
//!                  ▼                                │
//!                Ready ──► read fails ──► Faulted ──┘
//!                  │                    (no wait before
//!                  ▼                     the first retry)
//!      Read 8 bytes at Register::Data (0xF7)
//!                  │
//!                  ▼
//!       Calc Temperature, Pressure and Humidity
//! ```
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod bus;
pub mod calibration;
pub mod compensation;
pub mod config;
pub mod error;
pub mod registers;

pub use bus::{RegisterBus, Transport};
#[cfg(feature = "linux")]
pub use bus::{LinuxTransport, LinuxTransportError};
pub use calibration::CalibrationSet;
pub use compensation::{RawSample, SensorReading};
pub use config::{Config, ControlConfig, Oversampling};
pub use error::Error;
pub use registers::{Address, Register, SensorStatus};

use registers::{CALIBRATION_HIGH_LEN, CALIBRATION_LOW_LEN, CHIP_ID, DATA_LEN, RESET_COMMAND};

/// Where the driver is in its bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Constructed, `initialize` not called yet. Also the state right after a reset.
    Uninitialized,
    /// A bring-up attempt is running.
    Initializing,
    /// Calibration is loaded and the sensor is sampling.
    Ready,
    /// The last bring-up or transaction failed. A recovery task is retrying in the background.
    Faulted,
}

/// What the sensor can measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    Temperature,
    Humidity,
    Pressure,
}

struct Status {
    state: DriverState,
    calibration: Option<CalibrationSet>,
}

struct Shared<T> {
    /// The transaction lock. tokio's mutex hands the lock out in request order.
    bus: Mutex<RegisterBus<T>>,
    status: StdMutex<Status>,
    /// The last recovery task. Only touched together with `recovering`.
    recovery: StdMutex<Option<JoinHandle<()>>>,
    /// True from spawning a recovery task until it has brought the sensor up.
    recovering: watch::Sender<bool>,
    control: ControlConfig,
    retry_backoff: Duration,
}

/// A BME280 sensor behind the transport `T`.
///
/// Cloning gives another handle to the same sensor.
pub struct Bme280<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Bme280<T> {
    fn clone(&self) -> Self {
        Bme280 {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Bme280<T>
where
    T: Transport + Send + 'static,
{
    /// Create the driver. This does not touch the bus; call `initialize` next.
    pub fn new(transport: T, config: Config) -> Self {
        let bus = RegisterBus::new(transport, config.bus_number, config.address.as_u8());
        Bme280 {
            shared: Arc::new(Shared {
                bus: Mutex::new(bus),
                status: StdMutex::new(Status {
                    state: DriverState::Uninitialized,
                    calibration: None,
                }),
                recovery: StdMutex::new(None),
                recovering: watch::Sender::new(false),
                control: config.control(),
                retry_backoff: config.retry_backoff,
            }),
        }
    }

    pub fn state(&self) -> DriverState {
        self.status().state
    }

    /// The trimming parameters, once the sensor has been brought up.
    pub fn calibration(&self) -> Option<CalibrationSet> {
        self.status().calibration
    }

    pub fn control(&self) -> ControlConfig {
        self.shared.control
    }

    pub fn supported_measurements(&self) -> [Measurement; 3] {
        [
            Measurement::Temperature,
            Measurement::Humidity,
            Measurement::Pressure,
        ]
    }

    /// Bring the sensor up.
    ///
    /// Returns the outcome of this first attempt. If it failed, a background task keeps
    /// retrying every `Config::retry_backoff` until the sensor comes up; use
    /// `wait_for_recovery` to wait for it.
    ///
    /// On success this returns one measurement cycle after the sensor was configured, so the
    /// data registers already hold a sample.
    pub async fn initialize(&self) -> Result<(), Error> {
        let result = self.try_initialize().await;
        if let Err(err) = &result {
            warn!(%err, "can't initialize sensor, trying again in {:?}", self.shared.retry_backoff);
            self.spawn_recovery(true);
        }
        result
    }

    /// One bring-up attempt without any retry.
    ///
    /// The whole sequence runs under the transaction lock, so queued reads only continue once
    /// the sensor is configured.
    pub async fn try_initialize(&self) -> Result<(), Error> {
        self.set_state(DriverState::Initializing);
        match self.bring_up().await {
            Ok(calibration) => {
                self.set_ready(calibration);
                info!("sensor ready");
                Ok(())
            }
            Err(err) => {
                self.set_state(DriverState::Faulted);
                Err(err)
            }
        }
    }

    /// Wait until the background recovery task, if any, has brought the sensor back.
    ///
    /// Dropping the returned future does not affect the recovery task.
    pub async fn wait_for_recovery(&self) {
        let mut recovering = self.shared.recovering.subscribe();
        if recovering.wait_for(|running| !running).await.is_err() {
            debug!("driver dropped while waiting for recovery");
        }
    }

    /// Read and compensate all three channels.
    ///
    /// Fails with `Error::DataNotReady` while the data registers still hold their reset values.
    pub async fn read_all_measurements(&self) -> Result<SensorReading, Error> {
        let mut data = [0u8; DATA_LEN];
        self.read_register(Register::Data, &mut data).await?;
        let calibration = self.calibration().ok_or(Error::NotReady)?;
        RawSample::from_bytes(data).compensate(&calibration)
    }

    /// Temperature in °C.
    pub async fn read_temperature(&self) -> Result<f64, Error> {
        Ok(self.read_all_measurements().await?.temperature_c)
    }

    /// Pressure in hPa. `None` if the calibration makes the pressure formula undefined.
    pub async fn read_pressure(&self) -> Result<Option<f64>, Error> {
        Ok(self.read_all_measurements().await?.pressure_hpa)
    }

    /// Relative humidity in %.
    pub async fn read_humidity(&self) -> Result<f64, Error> {
        Ok(self.read_all_measurements().await?.humidity_percent)
    }

    pub async fn read_chip_id(&self) -> Result<u8, Error> {
        self.read_byte(Register::ChipId).await
    }

    pub async fn read_status(&self) -> Result<SensorStatus, Error> {
        Ok(SensorStatus::new(self.read_byte(Register::Status).await?))
    }

    /// The raw ctrl_meas register.
    pub async fn read_control(&self) -> Result<u8, Error> {
        self.read_byte(Register::CtrlMeas).await
    }

    /// The raw config register.
    pub async fn read_config(&self) -> Result<u8, Error> {
        self.read_byte(Register::Config).await
    }

    /// Soft reset the sensor and bring it up again.
    ///
    /// The reset puts every control register back to its default, so this runs the whole
    /// initialization afterwards and returns its result, like `initialize`.
    pub async fn reset(&self) -> Result<(), Error> {
        let written = {
            let mut bus = self.shared.bus.lock().await;
            self.set_state(DriverState::Uninitialized);
            bus.write_register(Register::Reset, RESET_COMMAND).await
        };
        if let Err(err) = written {
            self.fault(&err);
            return Err(err);
        }

        info!("sensor reset, initializing again");
        self.initialize().await
    }

    async fn bring_up(&self) -> Result<CalibrationSet, Error> {
        let control = self.shared.control;
        let mut bus = self.shared.bus.lock().await;

        let chip_id = bus.read_byte(Register::ChipId).await?;
        if chip_id != CHIP_ID {
            return Err(Error::Identity { found: chip_id });
        }

        // ctrl_hum is only latched by the ctrl_meas write that follows it.
        bus.write_register(Register::CtrlHum, control.ctrl_hum())
            .await?;
        bus.write_register(Register::CtrlMeas, control.ctrl_meas())
            .await?;

        let mut low = [0u8; CALIBRATION_LOW_LEN];
        bus.read_register(Register::CalibrationLow, &mut low).await?;
        let mut high = [0u8; CALIBRATION_HIGH_LEN];
        bus.read_register(Register::CalibrationHigh, &mut high)
            .await?;
        drop(bus);

        // Let the first conversion in normal mode finish so the data registers are filled.
        tokio::time::sleep(control.measurement_time()).await;

        Ok(CalibrationSet::from_registers(&low, &high))
    }

    async fn read_byte(&self, register: Register) -> Result<u8, Error> {
        let mut buffer = [0u8; 1];
        self.read_register(register, &mut buffer).await?;
        Ok(buffer[0])
    }

    /// A user transaction: refused unless ready, and a failure starts recovery.
    async fn read_register(&self, register: Register, buffer: &mut [u8]) -> Result<(), Error> {
        if self.state() != DriverState::Ready {
            return Err(Error::NotReady);
        }

        let result = self
            .shared
            .bus
            .lock()
            .await
            .read_register(register, buffer)
            .await;
        if let Err(err) = &result {
            self.fault(err);
        }
        result
    }

    /// Flip to `Faulted` and start recovering in the background.
    ///
    /// A bring-up that is already running keeps `Initializing`; its own outcome decides the
    /// next state.
    fn fault(&self, err: &Error) {
        {
            let mut status = self.status();
            if status.state != DriverState::Initializing {
                status.state = DriverState::Faulted;
            }
        }
        warn!(%err, "sensor transaction failed, initializing again");
        self.spawn_recovery(false);
    }

    /// Start the recovery task unless one is already running.
    fn spawn_recovery(&self, wait_first: bool) {
        let mut recovery = self.recovery();
        if *self.shared.recovering.borrow() {
            debug!("recovery already running");
            return;
        }
        self.shared.recovering.send_replace(true);
        *recovery = Some(tokio::spawn(self.clone().recover(wait_first)));
    }

    async fn recover(self, wait_first: bool) {
        let backoff = self.shared.retry_backoff;
        if wait_first {
            tokio::time::sleep(backoff).await;
        }

        let mut attempt: u32 = 1;
        loop {
            match self.try_initialize().await {
                Ok(()) if self.finish_recovery() => return,
                // Faulted again before the task could finish. Go straight on.
                Ok(()) => debug!("sensor faulted right after recovering"),
                Err(err) => {
                    warn!(%err, attempt, "can't initialize sensor, trying again in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                }
            }
            attempt = attempt.saturating_add(1);
        }
    }

    /// Clear the running flag if the sensor is still up. A fault racing with this either
    /// sees the flag cleared and spawns a new task, or keeps the current one going.
    fn finish_recovery(&self) -> bool {
        let _recovery = self.recovery();
        if self.state() != DriverState::Ready {
            return false;
        }
        self.shared.recovering.send_replace(false);
        true
    }

    fn recovery(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.shared
            .recovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: DriverState) {
        self.status().state = state;
    }

    fn set_ready(&self, calibration: CalibrationSet) {
        let mut status = self.status();
        status.calibration = Some(calibration);
        status.state = DriverState::Ready;
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.shared
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
