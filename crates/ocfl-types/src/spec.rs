use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// OCFL specification version, e.g. `1.1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Spec {
    major: u8,
    minor: u8,
}

impl Spec {
    pub const V1_0: Spec = Spec { major: 1, minor: 0 };
    pub const V1_1: Spec = Spec { major: 1, minor: 1 };

    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub fn major(&self) -> u8 {
        self.major
    }

    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Parse the spec from a namaste declaration name such as
    /// `0=ocfl_object_1.1` (with `prefix = "ocfl_object_"`) or `0=ocfl_1.0`.
    pub fn from_declaration(file_name: &str, prefix: &str) -> Option<Self> {
        file_name
            .strip_prefix("0=")?
            .strip_prefix(prefix)?
            .parse()
            .ok()
    }

    /// The inventory `type` URI for this spec version.
    pub fn inventory_type(&self) -> String {
        format!("https://ocfl.io/{self}/spec/#inventory")
    }
}

impl FromStr for Spec {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| TypeError::InvalidSpec(s.to_string()))?;
        let major = major
            .parse()
            .map_err(|_| TypeError::InvalidSpec(s.to_string()))?;
        let minor = minor
            .parse()
            .map_err(|_| TypeError::InvalidSpec(s.to_string()))?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for Spec {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Spec> for String {
    fn from(s: Spec) -> Self {
        s.to_string()
    }
}

impl fmt::Debug for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spec({self})")
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let s: Spec = "1.1".parse().unwrap();
        assert_eq!(s, Spec::V1_1);
        assert_eq!(s.to_string(), "1.1");
        assert!("1".parse::<Spec>().is_err());
        assert!("one.two".parse::<Spec>().is_err());
    }

    #[test]
    fn declarations() {
        assert_eq!(
            Spec::from_declaration("0=ocfl_object_1.0", "ocfl_object_"),
            Some(Spec::V1_0)
        );
        assert_eq!(Spec::from_declaration("0=ocfl_1.1", "ocfl_"), Some(Spec::V1_1));
        assert_eq!(Spec::from_declaration("inventory.json", "ocfl_object_"), None);
        assert_eq!(Spec::from_declaration("0=ocfl_1.1", "ocfl_object_"), None);
    }

    #[test]
    fn inventory_type_uri() {
        assert_eq!(
            Spec::V1_0.inventory_type(),
            "https://ocfl.io/1.0/spec/#inventory"
        );
    }
}
