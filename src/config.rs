//! Driver configuration and the control register values derived from it.
use core::time::Duration;

use crate::registers::Address;

/// Normal mode, ctrl_meas bits 1..0. The sensor cycles between measurement and standby by
/// itself and the data registers always hold the latest result.
const MODE_NORMAL: u8 = 0b11;

/// Oversampling of one measurement channel. Table 20, 23 and 24 of the datasheet share the
/// same encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Oversampling {
    /// The channel is not measured and reads back as 0x80000 (0x8000 for humidity).
    Skipped = 0b000,
    X1 = 0b001,
    X2 = 0b010,
    X4 = 0b011,
    #[default]
    X8 = 0b100,
    X16 = 0b101,
}

impl Oversampling {
    /// The register encoding.
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Number of samples averaged, 0 when skipped.
    pub fn factor(self) -> u8 {
        match self {
            Oversampling::Skipped => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
            Oversampling::X16 => 16,
        }
    }
}

/// Control register values, derived once from the three oversampling settings.
///
/// The power mode is always normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlConfig {
    ctrl_meas: u8,
    ctrl_hum: u8,
    measurement_time_ms: f32,
}

impl ControlConfig {
    pub fn new(pressure: Oversampling, temperature: Oversampling, humidity: Oversampling) -> Self {
        let ctrl_meas = (temperature.bits() << 5) | (pressure.bits() << 2) | MODE_NORMAL;
        let ctrl_hum = humidity.bits();

        // Appendix B, "Measurement time": maximum, not typical.
        let mut measurement_time_ms = 1.25 + 2.3 * f32::from(temperature.factor());
        if pressure != Oversampling::Skipped {
            measurement_time_ms += 2.3 * f32::from(pressure.factor()) + 0.575;
        }
        if humidity != Oversampling::Skipped {
            measurement_time_ms += 2.3 * f32::from(humidity.factor()) + 0.575;
        }

        ControlConfig {
            ctrl_meas,
            ctrl_hum,
            measurement_time_ms,
        }
    }

    /// Value for `Register::CtrlMeas`: osrs_t[7:5], osrs_p[4:2], mode[1:0].
    pub fn ctrl_meas(&self) -> u8 {
        self.ctrl_meas
    }

    /// Value for `Register::CtrlHum`: osrs_h[2:0].
    pub fn ctrl_hum(&self) -> u8 {
        self.ctrl_hum
    }

    /// Maximum time one measurement cycle takes, in milliseconds.
    pub fn measurement_time_ms(&self) -> f32 {
        self.measurement_time_ms
    }

    pub fn measurement_time(&self) -> Duration {
        Duration::from_secs_f32(self.measurement_time_ms / 1000.0)
    }
}

/// Everything the driver needs to know before it touches the bus.
///
/// The defaults match a BME280 breakout on the first bus of a Raspberry Pi: bus 1, address
/// 0x76, x8 oversampling on all channels and a two second retry backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    pub bus_number: u8,
    pub address: Address,
    pub pressure: Oversampling,
    pub temperature: Oversampling,
    pub humidity: Oversampling,
    /// Pause between two failed initialization attempts.
    pub retry_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bus_number: 1,
            address: Address::Primary,
            pressure: Oversampling::X8,
            temperature: Oversampling::X8,
            humidity: Oversampling::X8,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

impl Config {
    /// Default configuration with the given pressure, temperature and humidity oversampling.
    pub fn new(pressure: Oversampling, temperature: Oversampling, humidity: Oversampling) -> Self {
        Config {
            pressure,
            temperature,
            humidity,
            ..Config::default()
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    pub fn with_bus_number(mut self, bus_number: u8) -> Self {
        self.bus_number = bus_number;
        self
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn control(&self) -> ControlConfig {
        ControlConfig::new(self.pressure, self.temperature, self.humidity)
    }
}
