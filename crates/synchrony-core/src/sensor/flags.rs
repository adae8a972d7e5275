//! Stream enable bitmask

use super::profile::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Set of streams currently accepting data
///
/// # Example
/// ```
/// use synchrony_core::NotifyFlags;
///
/// let flags = NotifyFlags::EEG | NotifyFlags::IMPEDANCE;
/// assert!(flags.contains(NotifyFlags::EEG));
/// assert!(!flags.contains(NotifyFlags::ECG));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct NotifyFlags(u32);

impl NotifyFlags {
    pub const EEG: Self = Self(1 << 0);
    pub const ECG: Self = Self(1 << 1);
    pub const ACC: Self = Self(1 << 2);
    pub const GYRO: Self = Self(1 << 3);
    pub const IMPEDANCE: Self = Self(1 << 4);
    pub const SATURATION: Self = Self(1 << 5);

    const NAMED: [(Self, &'static str); 6] = [
        (Self::EEG, "EEG"),
        (Self::ECG, "ECG"),
        (Self::ACC, "ACC"),
        (Self::GYRO, "GYRO"),
        (Self::IMPEDANCE, "IMPEDANCE"),
        (Self::SATURATION, "SATURATION"),
    ];

    /// No stream enabled
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every stream enabled
    pub const fn all() -> Self {
        Self(0b11_1111)
    }

    /// Build from raw bits, ignoring unknown bits
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::all().0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every flag in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any flag in `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Flag gating a data type; impedance packages are accepted while
    /// either the impedance or the saturation flag is set
    pub fn for_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Eeg => Self::EEG,
            DataType::Ecg => Self::ECG,
            DataType::Acc => Self::ACC,
            DataType::Gyro => Self::GYRO,
            DataType::Impedance => Self::IMPEDANCE | Self::SATURATION,
        }
    }

    /// Whether a data type is enabled by this set
    pub fn accepts(self, data_type: DataType) -> bool {
        self.intersects(Self::for_data_type(data_type))
    }

    /// Parse a single flag name such as "eeg" or "SATURATION"
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        Self::NAMED
            .iter()
            .find(|(_, n)| *n == upper)
            .map(|(flag, _)| *flag)
    }

    /// Names of the set flags
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for NotifyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for NotifyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for NotifyFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for NotifyFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::all().0)
    }
}

impl From<u32> for NotifyFlags {
    fn from(bits: u32) -> Self {
        Self::from_bits_truncate(bits)
    }
}

impl From<NotifyFlags> for u32 {
    fn from(flags: NotifyFlags) -> Self {
        flags.0
    }
}

impl fmt::Debug for NotifyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotifyFlags({})", self.names().join(" | "))
    }
}
