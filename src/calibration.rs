//! Factory trimming parameters.
//!
//! Every BME280 carries its own compensation constants in NVM. They are copied to two register
//! blocks at power on and the driver reads them once per successful initialization. The layout
//! is in the datasheet, section 4.2.2, table 16.
use crate::registers::{CALIBRATION_HIGH_LEN, CALIBRATION_LOW_LEN};

/// The trimming parameters of one sensor, dig_T1 through dig_H6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSet {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl CalibrationSet {
    /// Decode the two calibration blocks.
    ///
    /// `low` is the 26 bytes starting at 0x88, `high` the 7 bytes starting at 0xE1.
    pub fn from_registers(
        low: &[u8; CALIBRATION_LOW_LEN],
        high: &[u8; CALIBRATION_HIGH_LEN],
    ) -> Self {
        let u16_at = |offset: usize| u16::from_le_bytes([low[offset], low[offset + 1]]);
        let i16_at = |offset: usize| i16::from_le_bytes([low[offset], low[offset + 1]]);

        // 0xE4 holds dig_H4[3:0] in its low nibble and dig_H5[3:0] in its high nibble. The
        // neighbouring bytes carry the signed upper eight bits of each value.
        let shared = high[4];
        let h4 = (i16::from(high[3] as i8) << 4) | i16::from(shared & 0x0F);
        let h5 = (i16::from(high[5] as i8) << 4) | i16::from(shared >> 4);

        CalibrationSet {
            t1: u16_at(0),
            t2: i16_at(2),
            t3: i16_at(4),
            p1: u16_at(6),
            p2: i16_at(8),
            p3: i16_at(10),
            p4: i16_at(12),
            p5: i16_at(14),
            p6: i16_at(16),
            p7: i16_at(18),
            p8: i16_at(20),
            p9: i16_at(22),
            // low[24] is 0xA0, which is not used.
            h1: low[25],
            h2: i16::from_le_bytes([high[0], high[1]]),
            h3: high[2],
            h4,
            h5,
            h6: high[6] as i8,
        }
    }
}
