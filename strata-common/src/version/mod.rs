// strata-common/src/version/mod.rs
// Declares the version number and version range modules.

pub mod range;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, StrataError};

/// A bundle version number: one or more dot-separated non-negative
/// integer components.
///
/// Ordering is component-wise numeric, with shorter prefixes ordering
/// first: `1` < `1.0` < `1.1` < `2`. This is not semver; version
/// numbers may have any number of components and `1.0` is distinct
/// from (and greater than) `1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    components: Vec<u64>,
}

impl Version {
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(StrataError::VersionError("empty version number".into()));
        }
        let mut components = Vec::new();
        for part in s.split('.') {
            if part.is_empty() || (part.len() > 1 && part.starts_with('0')) {
                return Err(StrataError::VersionError(format!(
                    "invalid version number: {s}"
                )));
            }
            let num: u64 = part
                .parse()
                .map_err(|_| StrataError::VersionError(format!("invalid version number: {s}")))?;
            components.push(num);
        }
        Ok(Version { components })
    }

    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// True if `other` equals this version or extends it with further
    /// components: `1.0` is a base of `1.0`, `1.0.0` and `1.0.10.1`,
    /// but not of `1` or `1.1`.
    pub fn is_base_of(&self, other: &Version) -> bool {
        other.components.starts_with(&self.components)
    }

    /// The strictly next version number in order, produced by
    /// appending a `0` component. There is no version greater than
    /// `self` and smaller than the result.
    pub fn next_in_order(&self) -> Version {
        let mut components = self.components.clone();
        components.push(0);
        Version { components }
    }
}

impl FromStr for Version {
    type Err = StrataError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.components {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{c}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Checks whether the argument has a valid version number format.
pub fn is_valid_version_number(version: &str) -> bool {
    Version::parse(version).is_ok()
}

/// Compares two version number strings in ascending order.
pub fn compare_version_numbers(l: &str, r: &str) -> Result<Ordering> {
    let l = Version::parse(l)?;
    let r = Version::parse(r)?;
    Ok(l.cmp(&r))
}
