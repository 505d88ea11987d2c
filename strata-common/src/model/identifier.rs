// strata-common/src/model/identifier.rs

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::{Result, StrataError};
use crate::version::{is_valid_version_number, Version};

/// Canonical bundle identifier: a name plus optional qualifiers.
///
/// The string form is dash separated, `some.bundle.name-q1-q2-v1.0`.
/// The name is one or more dot separated alphanumeric (plus `_`)
/// segments. The remaining parts are qualifiers; a qualifier of the
/// form `v<version number>` is a meta qualifier carrying the bundle
/// version.
///
/// Construction normalizes the identifier: everything is lowercased,
/// qualifiers are deduplicated and stored sorted, so
/// `Bundle-Q2-q1-v1.0` and `bundle-q1-q2-v1.0` are equal. At most one
/// distinct version qualifier may be present.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BundleIdentifier {
    name: String,
    qualifiers: BTreeSet<String>,
    meta_qualifiers: BTreeSet<String>,
}

impl BundleIdentifier {
    /// Parses and normalizes a bundle identifier.
    pub fn parse(input: &str) -> Result<BundleIdentifier> {
        let input = input.to_lowercase();
        let mut parts = input.split('-');
        let name = match parts.next() {
            Some(n) if is_valid_bundle_name(n) => n.to_owned(),
            _ => return Err(rejected(input.clone())),
        };
        let mut qualifiers = BTreeSet::new();
        let mut meta_qualifiers = BTreeSet::new();
        let mut version_qualifier: Option<String> = None;
        for q in parts {
            if !is_valid_qualifier(q) {
                return Err(rejected(input.clone()));
            }
            if is_meta_qualifier(q) {
                if let Some(present) = &version_qualifier {
                    if present != q {
                        return Err(rejected(format!(
                            "multiple version qualifiers in {input}"
                        )));
                    }
                } else {
                    version_qualifier = Some(q.to_owned());
                }
                meta_qualifiers.insert(q.to_owned());
            } else {
                qualifiers.insert(q.to_owned());
            }
        }
        Ok(BundleIdentifier {
            name,
            qualifiers,
            meta_qualifiers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The normal qualifiers, without meta qualifiers.
    pub fn bundle_qualifiers(&self) -> &BTreeSet<String> {
        &self.qualifiers
    }

    pub fn meta_qualifiers(&self) -> &BTreeSet<String> {
        &self.meta_qualifiers
    }

    /// The version qualifier with its leading `v`, if present.
    pub fn version_qualifier(&self) -> Option<&str> {
        self.meta_qualifiers
            .iter()
            .map(String::as_str)
            .find(|q| is_meta_qualifier(q))
    }

    /// The version number carried by the version qualifier, if any.
    pub fn version_number(&self) -> Option<&str> {
        self.version_qualifier().map(|q| &q[1..])
    }

    pub fn version(&self) -> Option<Version> {
        self.version_number().and_then(|n| Version::parse(n).ok())
    }

    pub fn has_version_qualifier(&self) -> bool {
        self.version_qualifier().is_some()
    }

    /// This identifier without its meta qualifiers. Used as the key
    /// for versionless bundle lookup.
    pub fn without_meta_qualifiers(&self) -> BundleIdentifier {
        if self.meta_qualifiers.is_empty() {
            return self.clone();
        }
        BundleIdentifier {
            name: self.name.clone(),
            qualifiers: self.qualifiers.clone(),
            meta_qualifiers: BTreeSet::new(),
        }
    }

    /// This identifier with its version qualifier replaced by the
    /// given version.
    pub fn with_version(&self, version: &Version) -> BundleIdentifier {
        let mut meta_qualifiers: BTreeSet<String> = self
            .meta_qualifiers
            .iter()
            .filter(|q| !is_meta_qualifier(q))
            .cloned()
            .collect();
        meta_qualifiers.insert(format!("v{version}"));
        BundleIdentifier {
            name: self.name.clone(),
            qualifiers: self.qualifiers.clone(),
            meta_qualifiers,
        }
    }
}

impl fmt::Display for BundleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for q in &self.qualifiers {
            write!(f, "-{q}")?;
        }
        for q in &self.meta_qualifiers {
            write!(f, "-{q}")?;
        }
        Ok(())
    }
}

impl FromStr for BundleIdentifier {
    type Err = StrataError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BundleIdentifier::parse(s)
    }
}

impl Serialize for BundleIdentifier {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BundleIdentifier {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BundleIdentifier::from_str(&s).map_err(serde::de::Error::custom)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `[a-z_0-9]+(\.[a-z_0-9]+)*` after lowercasing.
fn rejected(detail: String) -> StrataError {
    debug!("rejected bundle identifier: {detail}");
    StrataError::Format("bundle identifier", detail)
}

fn is_valid_bundle_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(is_name_char))
}

fn is_valid_qualifier(qualifier: &str) -> bool {
    !qualifier.is_empty()
        && qualifier
            .chars()
            .all(|c| is_name_char(c) || c == '.')
}

/// A meta qualifier is currently always a version qualifier,
/// `v<version number>`.
pub fn is_meta_qualifier(qualifier: &str) -> bool {
    match qualifier.strip_prefix('v') {
        Some(rest) => is_valid_version_number(rest),
        None => false,
    }
}
