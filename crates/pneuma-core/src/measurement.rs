//! Heart-rate notification payload decoding.
//!
//! The transport layer delivers each notification as raw bytes in the
//! standard heart-rate measurement layout: a flags byte, an 8- or 16-bit
//! heart-rate field, an optional energy-expended field, then zero or more
//! little-endian u16 RR fields in 1/1024-second ticks.

use thiserror::Error;

/// Flags bit 0: heart-rate field is u16 instead of u8.
const FLAG_HR_16BIT: u8 = 0x01;
/// Flags bit 3: a u16 energy-expended field precedes the RR fields.
const FLAG_ENERGY_EXPENDED: u8 = 0x08;
/// Flags bit 4: one or more RR fields are present.
const FLAG_RR_PRESENT: u8 = 0x10;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MeasurementError {
    #[error("payload too short: {len} bytes")]
    Truncated { len: usize },
}

/// One decoded heart-rate notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartRateMeasurement {
    pub hr_bpm: u16,
    /// Raw RR fields in 1/1024-second ticks, in arrival order.
    pub rr_ticks: Vec<u16>,
}

impl HeartRateMeasurement {
    /// Decode a notification payload.
    ///
    /// A payload shorter than its declared header is an error; the caller
    /// drops the notification and the loop continues with stale HRV. A
    /// trailing odd byte after the last complete RR field is ignored.
    pub fn parse(data: &[u8]) -> Result<Self, MeasurementError> {
        let truncated = || MeasurementError::Truncated { len: data.len() };

        let flags = *data.first().ok_or_else(truncated)?;

        let (hr_bpm, mut offset) = if flags & FLAG_HR_16BIT != 0 {
            if data.len() < 3 {
                return Err(truncated());
            }
            (u16::from_le_bytes([data[1], data[2]]), 3)
        } else {
            if data.len() < 2 {
                return Err(truncated());
            }
            (data[1] as u16, 2)
        };

        // Skip energy expended so RR offsets stay correct.
        if flags & FLAG_ENERGY_EXPENDED != 0 {
            if data.len() < offset + 2 {
                return Err(truncated());
            }
            offset += 2;
        }

        let mut rr_ticks = Vec::new();
        if flags & FLAG_RR_PRESENT != 0 {
            while offset + 1 < data.len() {
                rr_ticks.push(u16::from_le_bytes([data[offset], data[offset + 1]]));
                offset += 2;
            }
        }

        Ok(Self { hr_bpm, rr_ticks })
    }
}

/// Convert a raw RR field (1/1024-second ticks) to milliseconds.
#[inline]
pub fn rr_ticks_to_ms(raw_ticks: u16) -> f32 {
    raw_ticks as f32 / 1024.0 * 1000.0
}
