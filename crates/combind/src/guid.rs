//! 128-bit interface identifiers
//!
//! [`Guid`] keeps the native `{data1, data2, data3, data4}` layout so it can be
//! passed by pointer across the call boundary (`REFIID`), and parses/prints the
//! registry form `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.

use std::fmt;
use std::str::FromStr;

/// 128-bit globally unique identifier (GUID/UUID/IID).
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    /// Create a new GUID from components
    #[must_use]
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Build a GUID from its big-endian 128-bit value, i.e. the digits of the
    /// registry form read left to right.
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self {
            data1: (value >> 96) as u32,
            data2: (value >> 80) as u16,
            data3: (value >> 64) as u16,
            data4: (value as u64).to_be_bytes(),
        }
    }

    /// The inverse of [`Guid::from_u128`].
    #[must_use]
    pub const fn to_u128(&self) -> u128 {
        ((self.data1 as u128) << 96)
            | ((self.data2 as u128) << 80)
            | ((self.data3 as u128) << 64)
            | (u64::from_be_bytes(self.data4) as u128)
    }

    /// The nil/zero GUID
    pub const ZERO: Guid = Guid::new(0, 0, 0, [0; 8]);

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.to_u128() == 0
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

/// Error returned when a string is not a valid GUID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid GUID '{input}': {reason}")]
pub struct ParseGuidError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for Guid {
    type Err = ParseGuidError;

    /// Accepts `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, optionally wrapped in braces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason| ParseGuidError {
            input: s.to_string(),
            reason,
        };
        let trimmed = s.trim();
        let body = match (trimmed.strip_prefix('{'), trimmed.strip_suffix('}')) {
            (Some(_), Some(_)) => &trimmed[1..trimmed.len() - 1],
            (None, None) => trimmed,
            _ => return Err(fail("unbalanced braces")),
        };

        let parts: Vec<&str> = body.split('-').collect();
        let expected = [8, 4, 4, 4, 12];
        if parts.len() != expected.len() {
            return Err(fail("expected five dash-separated groups"));
        }
        if parts.iter().zip(expected).any(|(p, n)| p.len() != n) {
            return Err(fail("group has the wrong number of digits"));
        }

        let mut value: u128 = 0;
        for c in body.chars().filter(|c| *c != '-') {
            let digit = c.to_digit(16).ok_or_else(|| fail("non-hex digit"))?;
            value = (value << 4) | digit as u128;
        }
        Ok(Guid::from_u128(value))
    }
}

#[cfg(feature = "windows-compat")]
impl From<windows_core::GUID> for Guid {
    fn from(g: windows_core::GUID) -> Self {
        Guid::new(g.data1, g.data2, g.data3, g.data4)
    }
}

#[cfg(feature = "windows-compat")]
impl From<Guid> for windows_core::GUID {
    fn from(g: Guid) -> Self {
        windows_core::GUID::from_values(g.data1, g.data2, g.data3, g.data4)
    }
}
