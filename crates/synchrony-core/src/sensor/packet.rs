//! Notification framing
//!
//! ## Frame Format
//!
//! `[u8 data type][u16_le package index][payload]`
//!
//! Channel payloads are sample-major big-endian offset-binary readings.
//! Impedance payloads are `n` f32_le impedance values followed by `n` f32_le
//! saturation values.

use super::profile::{ConversionProfile, DataType};
use super::DecodeError;

/// Header length preceding every payload
pub const HEADER_LEN: usize = 3;

/// A framed notification split into its parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification<'a> {
    /// Raw type byte; see [`DataType::from_u8`]
    pub type_byte: u8,
    pub package_index: u16,
    pub payload: &'a [u8],
}

impl Notification<'_> {
    /// Data type, if the type byte is one this crate decodes
    pub fn data_type(&self) -> Option<DataType> {
        DataType::from_u8(self.type_byte)
    }
}

/// Split a notification into header fields and payload
pub fn parse_notification(bytes: &[u8]) -> Result<Notification<'_>, DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::TruncatedFrame { len: bytes.len() });
    }
    Ok(Notification {
        type_byte: bytes[0],
        package_index: u16::from_le_bytes([bytes[1], bytes[2]]),
        payload: &bytes[HEADER_LEN..],
    })
}

/// Build a framed notification
pub fn encode_notification(data_type: DataType, package_index: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(data_type.as_u8());
    frame.extend_from_slice(&package_index.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Encode signed readings into a channel payload for `profile`
///
/// Readings outside the profile's resolution are clamped.
pub fn encode_readings(profile: &ConversionProfile, readings: &[i32]) -> Vec<u8> {
    let width = profile.bytes_per_reading();
    let offset = 1i64 << (profile.resolution_bits - 1);
    let max = (offset << 1) - 1;

    let mut payload = Vec::with_capacity(readings.len() * width);
    for &raw in readings {
        let unsigned = (raw as i64 + offset).clamp(0, max) as u64;
        let bytes = unsigned.to_be_bytes();
        payload.extend_from_slice(&bytes[8 - width..]);
    }
    payload
}

/// Encode an impedance payload
pub fn encode_impedance(impedance: &[f32], saturation: &[f32]) -> Vec<u8> {
    impedance
        .iter()
        .chain(saturation)
        .flat_map(|v| v.to_le_bytes())
        .collect()
}
