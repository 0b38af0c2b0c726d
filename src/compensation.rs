//! Turning raw ADC values into physical units.
//!
//! The formulas are the ones from the datasheet, section 4.2.3 and appendix 8.1: the 32-bit
//! integer version for temperature and the double precision version for pressure and humidity.
//! Shift amounts, divisors and the order of operations are kept exactly as printed so the
//! results agree with Bosch's reference code.
use crate::calibration::CalibrationSet;
use crate::error::Error;
use crate::registers::DATA_LEN;

/// Raw pressure reported before the first conversion has finished.
const SENTINEL_PRESSURE: u32 = 0x80000;

/// One burst of the three ADC values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    /// 20 bits.
    pub pressure: u32,
    /// 20 bits.
    pub temperature: u32,
    /// 16 bits.
    pub humidity: u16,
}

impl RawSample {
    /// Split the 8 bytes read from 0xF7.
    ///
    /// Pressure and temperature are msb, lsb and xlsb, where only the top four bits of xlsb
    /// belong to the value. Humidity is a plain big-endian 16-bit word.
    pub fn from_bytes(data: [u8; DATA_LEN]) -> Self {
        let twenty_bits =
            |b: &[u8]| (u32::from(b[0]) << 12) | (u32::from(b[1]) << 4) | (u32::from(b[2]) >> 4);

        RawSample {
            pressure: twenty_bits(&data[0..3]),
            temperature: twenty_bits(&data[3..6]),
            humidity: u16::from_be_bytes([data[6], data[7]]),
        }
    }

    /// True for the register contents of a sensor that has not converted anything yet.
    pub fn is_sentinel(&self) -> bool {
        self.pressure == SENTINEL_PRESSURE && self.temperature == 0 && self.humidity == 0
    }

    /// Compensate this sample. Fails with `Error::DataNotReady` on the sentinel values.
    pub fn compensate(&self, calibration: &CalibrationSet) -> Result<SensorReading, Error> {
        if self.is_sentinel() {
            return Err(Error::DataNotReady);
        }

        let t_fine = fine_temperature(self.temperature, calibration);

        Ok(SensorReading {
            temperature_c: temperature_celsius(t_fine),
            pressure_hpa: pressure_pascal(self.pressure, t_fine, calibration).map(|pa| pa / 100.0),
            humidity_percent: humidity_percent(self.humidity, t_fine, calibration),
        })
    }
}

/// SensorReading is a single compensated reading from the BME280.
///
/// This is returned from `Bme280::read_all_measurements`. You get:
/// * temperature in degrees Celsius
/// * pressure in hPa
/// * humidity in % Relative Humidity
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorReading {
    pub temperature_c: f64,
    /// `None` when dig_P1 makes the pressure formula divide by zero.
    pub pressure_hpa: Option<f64>,
    /// Always within 0 to 100.
    pub humidity_percent: f64,
}

impl SensorReading {
    /// Pressure in millimetres of mercury.
    pub fn pressure_mmhg(&self) -> Option<f64> {
        self.pressure_hpa.map(|hpa| hpa * 100.0 * 0.0075)
    }
}

/// t_fine, the intermediate shared by all three formulas.
///
/// The arithmetic is done in i64. For any 20-bit input the reference's i32 version cannot
/// overflow in practice, and this gives the same value while staying defined for garbage.
pub fn fine_temperature(adc_t: u32, calibration: &CalibrationSet) -> i32 {
    let adc_t = i64::from(adc_t);
    let t1 = i64::from(calibration.t1);
    let t2 = i64::from(calibration.t2);
    let t3 = i64::from(calibration.t3);

    let var1 = (((adc_t >> 3) - (t1 << 1)) * t2) >> 11;
    let var2 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * t3) >> 14;

    (var1 + var2) as i32
}

/// Temperature in °C with a resolution of 0.01.
pub fn temperature_celsius(t_fine: i32) -> f64 {
    let centi_celsius = (i64::from(t_fine) * 5 + 128) >> 8;
    centi_celsius as f64 / 100.0
}

/// Pressure in Pa, or `None` when var1 is zero.
pub fn pressure_pascal(adc_p: u32, t_fine: i32, calibration: &CalibrationSet) -> Option<f64> {
    let p1 = f64::from(calibration.p1);
    let p2 = f64::from(calibration.p2);
    let p3 = f64::from(calibration.p3);
    let p4 = f64::from(calibration.p4);
    let p5 = f64::from(calibration.p5);
    let p6 = f64::from(calibration.p6);
    let p7 = f64::from(calibration.p7);
    let p8 = f64::from(calibration.p8);
    let p9 = f64::from(calibration.p9);

    let mut var1 = f64::from(t_fine) / 2.0 - 64000.0;
    let mut var2 = var1 * var1 * p6 / 32768.0;
    var2 += var1 * p5 * 2.0;
    var2 = var2 / 4.0 + p4 * 65536.0;
    var1 = (p3 * var1 * var1 / 524288.0 + p2 * var1) / 524288.0;
    var1 = (1.0 + var1 / 32768.0) * p1;
    if var1 == 0.0 {
        return None;
    }

    let mut p = 1048576.0 - f64::from(adc_p);
    p = ((p - var2 / 4096.0) * 6250.0) / var1;
    var1 = p9 * p * p / 2147483648.0;
    var2 = p * p8 / 32768.0;

    Some(p + (var1 + var2 + p7) / 16.0)
}

/// Relative humidity in %, clamped to 0..=100.
pub fn humidity_percent(adc_h: u16, t_fine: i32, calibration: &CalibrationSet) -> f64 {
    let h1 = f64::from(calibration.h1);
    let h2 = f64::from(calibration.h2);
    let h3 = f64::from(calibration.h3);
    let h4 = f64::from(calibration.h4);
    let h5 = f64::from(calibration.h5);
    let h6 = f64::from(calibration.h6);

    let mut h = f64::from(t_fine) - 76800.0;
    h = (f64::from(adc_h) - (h4 * 64.0 + h5 / 16384.0 * h))
        * (h2 / 65536.0 * (1.0 + h6 / 67108864.0 * h * (1.0 + h3 / 67108864.0 * h)));
    h *= 1.0 - h1 * h / 524288.0;

    h.clamp(0.0, 100.0)
}
