use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// OCFL version number.
///
/// Versions are labelled `v1`, `v2`, ... or, for zero-padded objects,
/// `v001`, `v002`, ... where the padding is the total number of digits.
/// Ordering and equality consider the number first; two labels for the same
/// number with different padding are distinct values but sort adjacently.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VNum {
    num: u32,
    padding: u8,
}

impl VNum {
    /// Create a version number, checking that `num` fits the padding width.
    pub fn new(num: u32, padding: u8) -> Result<Self, TypeError> {
        if num == 0 {
            return Err(TypeError::InvalidVersion("version numbers start at 1".into()));
        }
        if padding > 0 {
            let max = 10u64.saturating_pow(u32::from(padding) - 1).saturating_sub(1);
            if padding == 1 || u64::from(num) > max {
                return Err(TypeError::InvalidVersion(format!(
                    "{num} does not fit padding {padding}"
                )));
            }
        }
        Ok(Self { num, padding })
    }

    /// The first version, unpadded.
    pub const fn v1() -> Self {
        Self { num: 1, padding: 0 }
    }

    /// Numeric part of the label.
    pub fn num(&self) -> u32 {
        self.num
    }

    /// Total digit width for padded labels, `0` when unpadded.
    pub fn padding(&self) -> u8 {
        self.padding
    }

    /// The version that follows this one, keeping the padding.
    pub fn next(&self) -> Result<Self, TypeError> {
        Self::new(self.num + 1, self.padding)
    }

    /// Returns `true` if `other` has the same number regardless of padding.
    pub fn same_num(&self, other: &Self) -> bool {
        self.num == other.num
    }
}

impl FromStr for VNum {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix('v')
            .ok_or_else(|| TypeError::InvalidVersion(s.to_string()))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidVersion(s.to_string()));
        }
        let num: u32 = digits
            .parse()
            .map_err(|_| TypeError::InvalidVersion(s.to_string()))?;
        let padding = if digits.starts_with('0') {
            u8::try_from(digits.len()).map_err(|_| TypeError::InvalidVersion(s.to_string()))?
        } else {
            0
        };
        Self::new(num, padding).map_err(|_| TypeError::InvalidVersion(s.to_string()))
    }
}

impl TryFrom<String> for VNum {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<VNum> for String {
    fn from(v: VNum) -> Self {
        v.to_string()
    }
}

impl PartialOrd for VNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.num
            .cmp(&other.num)
            .then(self.padding.cmp(&other.padding))
    }
}

impl fmt::Debug for VNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VNum({self})")
    }
}

impl fmt::Display for VNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.padding == 0 {
            write!(f, "v{}", self.num)
        } else {
            write!(f, "v{:0width$}", self.num, width = usize::from(self.padding))
        }
    }
}
