//! Version types for dump format compatibility.

use serde::{Deserialize, Serialize};

/// Dump format version. Stored as a single `u16` in the WFCX header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormatVersion(pub u16);

impl FormatVersion {
    /// Current dump format version.
    pub const CURRENT: Self = Self(1);

    /// Checks if this reader can read data written at `data_version`.
    #[must_use]
    pub const fn can_read(self, data_version: Self) -> bool {
        data_version.0 <= self.0
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Magic bytes for file format identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicBytes(pub [u8; 4]);

impl MagicBytes {
    /// Strata world dump magic bytes.
    pub const DUMP: Self = Self(*b"WFCX");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_gate() {
        assert!(FormatVersion::CURRENT.can_read(FormatVersion(1)));
        assert!(!FormatVersion(1).can_read(FormatVersion(2)));
    }
}
