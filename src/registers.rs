//! BME280 register map.
//!
//! Addresses come from the datasheet, section 5.3 "Memory map", table 18. All
//! section references in this crate are to revision 1.6 of the BME280 datasheet.

/// Value of the chip id register on a BME280. A BMP280 reports 0x58 here and is rejected.
pub const CHIP_ID: u8 = 0x60;

/// Writing this to `Register::Reset` performs a power-on style soft reset.
pub const RESET_COMMAND: u8 = 0xB6;

/// Length of the first calibration block at `Register::CalibrationLow`.
pub const CALIBRATION_LOW_LEN: usize = 26;

/// Length of the second calibration block at `Register::CalibrationHigh`.
pub const CALIBRATION_HIGH_LEN: usize = 7;

/// Length of the pressure, temperature and humidity burst at `Register::Data`.
pub const DATA_LEN: usize = 8;

/// Registers the driver reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// 0x88..=0xA1, temperature and pressure trimming plus dig_H1.
    CalibrationLow = 0x88,
    ChipId = 0xD0,
    Reset = 0xE0,
    /// 0xE1..=0xE7, the rest of the humidity trimming.
    CalibrationHigh = 0xE1,
    /// Humidity oversampling. Only latched by the next write to `CtrlMeas`.
    CtrlHum = 0xF2,
    Status = 0xF3,
    /// Temperature and pressure oversampling plus the power mode.
    CtrlMeas = 0xF4,
    /// Standby time and IIR filter. The driver leaves this at its reset value.
    Config = 0xF5,
    /// 0xF7..=0xFE, press_msb through hum_lsb.
    Data = 0xF7,
}

/// I2C address of the sensor, selected by the SDO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Address {
    /// SDO tied to GND, 0x76.
    #[default]
    Primary,
    /// SDO tied to VDDIO, 0x77.
    Secondary,
}

impl Address {
    pub fn as_u8(self) -> u8 {
        match self {
            Address::Primary => 0x76,
            Address::Secondary => 0x77,
        }
    }
}

/// Status bits, datasheet section 5.4.4.
pub enum Status {
    Measuring = 0b0000_1000, // Set while a conversion is running.
    ImUpdate = 0b0000_0001,  // Set while NVM data is copied to the image registers.
}

/// SensorStatus is the content of the status register.
///
/// Returned by `Bme280::read_status`. In normal mode the sensor flips the measuring bit on and
/// off by itself; the driver never has to wait on it because it reads the shadowed data
/// registers, but it is useful for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorStatus(pub u8);

impl SensorStatus {
    pub fn new(status: u8) -> Self {
        SensorStatus(status)
    }

    /// A conversion is running right now.
    pub fn is_measuring(self) -> bool {
        (self.0 & Status::Measuring as u8) != 0
    }

    /// The calibration data is being copied out of NVM, right after power on or reset.
    pub fn is_updating(self) -> bool {
        (self.0 & Status::ImUpdate as u8) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::{Address, SensorStatus};

    #[test]
    fn sensorstatus_is_measuring() {
        // Bit 3, 0x08.
        let status = SensorStatus::new(0b0000_1000);
        assert!(status.is_measuring());
        assert!(!status.is_updating());
    }

    #[test]
    fn sensorstatus_is_updating() {
        let status = SensorStatus::new(0b0000_0001);
        assert!(status.is_updating());
        assert!(!status.is_measuring());
    }

    #[test]
    fn sensorstatus_idle() {
        // Bits other than 3 and 0 are reserved and must not be read as either flag.
        let status = SensorStatus::new(0b1111_0110);
        assert!(!status.is_measuring());
        assert!(!status.is_updating());
    }

    #[test]
    fn addresses() {
        assert_eq!(Address::Primary.as_u8(), 0x76);
        assert_eq!(Address::Secondary.as_u8(), 0x77);
        assert_eq!(Address::default(), Address::Primary);
    }
}
