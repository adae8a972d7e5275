//! Stream conversion parameters and raw reading decoding
//!
//! A [`ConversionProfile`] is reported by the device when a data stream is
//! configured. It fixes how many channels and samples one notification
//! carries, how wide each reading is, and the scale factor that maps a raw
//! reading to a physical unit (microvolts for EEG/ECG).

use super::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Data type discriminant carried in the first byte of every notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// Accelerometer
    Acc,
    /// Gyroscope
    Gyro,
    /// Electroencephalography
    Eeg,
    /// Electrocardiography
    Ecg,
    /// Electrode impedance and saturation
    Impedance,
}

impl DataType {
    /// Channel streams, in the order flushes report them
    pub const CHANNEL_STREAMS: [DataType; 4] =
        [DataType::Eeg, DataType::Ecg, DataType::Acc, DataType::Gyro];

    /// Parse the notification type byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(DataType::Acc),
            0x02 => Some(DataType::Gyro),
            0x10 => Some(DataType::Eeg),
            0x11 => Some(DataType::Ecg),
            0x12 => Some(DataType::Impedance),
            _ => None,
        }
    }

    /// Notification type byte for this stream
    pub fn as_u8(self) -> u8 {
        match self {
            DataType::Acc => 0x01,
            DataType::Gyro => 0x02,
            DataType::Eeg => 0x10,
            DataType::Ecg => 0x11,
            DataType::Impedance => 0x12,
        }
    }

    /// Whether this stream is decoded into per-channel samples
    pub fn is_channel_stream(self) -> bool {
        !matches!(self, DataType::Impedance)
    }

    /// Parse a case-insensitive stream name ("eeg", "ECG", ...)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ACC" => Some(DataType::Acc),
            "GYRO" => Some(DataType::Gyro),
            "EEG" => Some(DataType::Eeg),
            "ECG" => Some(DataType::Ecg),
            "IMPEDANCE" => Some(DataType::Impedance),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Acc => "ACC",
            DataType::Gyro => "GYRO",
            DataType::Eeg => "EEG",
            DataType::Ecg => "ECG",
            DataType::Impedance => "IMPEDANCE",
        };
        f.write_str(name)
    }
}

/// Parameters describing how to interpret one channel stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionProfile {
    /// Readings per second per channel
    pub sample_rate: u32,
    /// Bitset of active physical channels
    pub channel_mask: u64,
    /// Samples per channel carried in one notification package
    pub package_sample_count: u32,
    /// Bit width of each raw reading (8, 16, 24 or 32)
    pub resolution_bits: u32,
    /// Scale factor from raw reading to physical unit
    pub k: f64,
}

impl ConversionProfile {
    /// Create a validated profile
    ///
    /// # Example
    /// ```
    /// use synchrony_core::ConversionProfile;
    ///
    /// let profile = ConversionProfile::new(250, 0xFF, 10, 24, 0.02235).unwrap();
    /// assert_eq!(profile.channel_count(), 8);
    /// ```
    pub fn new(
        sample_rate: u32,
        channel_mask: u64,
        package_sample_count: u32,
        resolution_bits: u32,
        k: f64,
    ) -> Result<Self, DecodeError> {
        let profile = Self {
            sample_rate,
            channel_mask,
            package_sample_count,
            resolution_bits,
            k,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Check the invariants a buffer relies on
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.sample_rate == 0 {
            return Err(DecodeError::InvalidProfile("sample rate must be > 0".into()));
        }
        if self.channel_mask == 0 {
            return Err(DecodeError::InvalidProfile("channel mask selects no channels".into()));
        }
        if self.package_sample_count == 0 {
            return Err(DecodeError::InvalidProfile(
                "package sample count must be > 0".into(),
            ));
        }
        if !matches!(self.resolution_bits, 8 | 16 | 24 | 32) {
            return Err(DecodeError::InvalidProfile(format!(
                "unsupported resolution {} bits",
                self.resolution_bits
            )));
        }
        if !self.k.is_finite() {
            return Err(DecodeError::InvalidProfile("scale factor must be finite".into()));
        }
        Ok(())
    }

    /// Number of active channels (popcount of the mask)
    pub fn channel_count(&self) -> usize {
        self.channel_mask.count_ones() as usize
    }

    /// Physical channel number for each buffer slot, in mask bit order
    pub fn physical_channels(&self) -> Vec<u32> {
        (0..u64::BITS)
            .filter(|bit| self.channel_mask & (1u64 << bit) != 0)
            .collect()
    }

    /// Raw readings carried by one package
    pub fn readings_per_package(&self) -> usize {
        self.channel_count() * self.package_sample_count as usize
    }

    /// Bytes per raw reading on the wire
    pub fn bytes_per_reading(&self) -> usize {
        (self.resolution_bits / 8) as usize
    }

    /// Expected payload length of one package, excluding the frame header
    pub fn payload_len(&self) -> usize {
        self.readings_per_package() * self.bytes_per_reading()
    }

    /// Capture-time offset of a sample relative to the first sample after a clear
    pub fn sample_offset_ms(&self, sample_index: u64) -> u64 {
        sample_index * 1000 / self.sample_rate as u64
    }

    /// Convert a raw reading into physical units
    pub fn convert(&self, raw: i32) -> f64 {
        raw as f64 * self.k
    }

    /// Decode a package payload into signed raw readings
    ///
    /// Readings are big-endian offset-binary values; the result is in wire
    /// order (all channels of sample 0, then sample 1, ...).
    pub fn decode_readings(
        &self,
        data_type: DataType,
        payload: &[u8],
    ) -> Result<Vec<i32>, DecodeError> {
        let expected = self.payload_len();
        if payload.len() != expected {
            return Err(DecodeError::PayloadLength {
                data_type,
                expected,
                actual: payload.len(),
            });
        }

        let width = self.bytes_per_reading();
        let offset = 1i64 << (self.resolution_bits - 1);
        let readings = payload
            .chunks_exact(width)
            .map(|chunk| {
                let unsigned = chunk
                    .iter()
                    .fold(0i64, |acc, &byte| (acc << 8) | byte as i64);
                (unsigned - offset) as i32
            })
            .collect();

        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eeg_profile() -> ConversionProfile {
        ConversionProfile::new(500, 0b1011, 2, 24, 0.5).unwrap()
    }

    #[test]
    fn test_data_type_round_trip() {
        for byte in [0x01u8, 0x02, 0x10, 0x11, 0x12] {
            let data_type = DataType::from_u8(byte).unwrap();
            assert_eq!(data_type.as_u8(), byte);
        }
        assert!(DataType::from_u8(0x42).is_none());
    }

    #[test]
    fn test_data_type_names() {
        assert_eq!(DataType::from_name("eeg"), Some(DataType::Eeg));
        assert_eq!(DataType::from_name("Gyro"), Some(DataType::Gyro));
        assert_eq!(DataType::from_name("emg"), None);
        assert_eq!(DataType::Ecg.to_string(), "ECG");
    }

    #[test]
    fn test_channel_mapping() {
        let profile = eeg_profile();
        assert_eq!(profile.channel_count(), 3);
        assert_eq!(profile.physical_channels(), vec![0, 1, 3]);
        assert_eq!(profile.readings_per_package(), 6);
        assert_eq!(profile.payload_len(), 18);
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        assert!(ConversionProfile::new(0, 1, 1, 16, 1.0).is_err());
        assert!(ConversionProfile::new(250, 0, 1, 16, 1.0).is_err());
        assert!(ConversionProfile::new(250, 1, 0, 16, 1.0).is_err());
        assert!(ConversionProfile::new(250, 1, 1, 12, 1.0).is_err());
        assert!(ConversionProfile::new(250, 1, 1, 16, f64::NAN).is_err());
    }

    #[test]
    fn test_decode_offset_binary() {
        let profile = ConversionProfile::new(250, 0b1, 3, 8, 1.0).unwrap();
        let readings = profile
            .decode_readings(DataType::Acc, &[0x00, 0x80, 0xFF])
            .unwrap();
        assert_eq!(readings, vec![-128, 0, 127]);

        let profile = ConversionProfile::new(250, 0b1, 2, 16, 1.0).unwrap();
        let readings = profile
            .decode_readings(DataType::Acc, &[0x80, 0x01, 0x7F, 0xFF])
            .unwrap();
        assert_eq!(readings, vec![1, -1]);

        let profile = ConversionProfile::new(250, 0b1, 1, 24, 1.0).unwrap();
        let readings = profile
            .decode_readings(DataType::Eeg, &[0x00, 0x00, 0x00])
            .unwrap();
        assert_eq!(readings, vec![-8_388_608]);

        let profile = ConversionProfile::new(250, 0b1, 2, 32, 1.0).unwrap();
        let readings = profile
            .decode_readings(DataType::Eeg, &[0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00])
            .unwrap();
        assert_eq!(readings, vec![i32::MAX, i32::MIN]);
    }

    #[test]
    fn test_decode_wrong_length() {
        let profile = eeg_profile();
        let err = profile
            .decode_readings(DataType::Eeg, &[0u8; 17])
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::PayloadLength {
                data_type: DataType::Eeg,
                expected: 18,
                actual: 17
            }
        );
    }

    #[test]
    fn test_sample_offsets_follow_sample_rate() {
        let profile = ConversionProfile::new(250, 1, 10, 24, 1.0).unwrap();
        assert_eq!(profile.sample_offset_ms(0), 0);
        assert_eq!(profile.sample_offset_ms(1), 4);
        assert_eq!(profile.sample_offset_ms(250), 1000);
    }

    #[test]
    fn test_convert_fractional_k() {
        let profile = ConversionProfile::new(250, 1, 1, 24, 0.02235).unwrap();
        assert_relative_eq!(profile.convert(1000), 22.35, epsilon = 1e-9);
        assert_relative_eq!(profile.convert(-3), -0.06705, epsilon = 1e-12);
    }
}
