// strata-common/src/model/key.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::BundleIdentifier;

/// Identifies a storage view within a configured repository.
///
/// A storage view is one configured instance of a bundle storage; the
/// same backing storage may appear under several views. The key is an
/// opaque identifier that is only meaningful within the configuration
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageViewKey(String);

impl StorageViewKey {
    pub fn new(id: impl Into<String>) -> Self {
        StorageViewKey(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StorageViewKey {
    fn from(s: &str) -> Self {
        StorageViewKey(s.to_owned())
    }
}

/// Globally identifies a bundle: which storage view it resides in and
/// its identifier there.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BundleKey {
    storage_view: StorageViewKey,
    bundle_id: BundleIdentifier,
}

impl BundleKey {
    pub fn new(storage_view: StorageViewKey, bundle_id: BundleIdentifier) -> Self {
        BundleKey {
            storage_view,
            bundle_id,
        }
    }

    pub fn storage_view(&self) -> &StorageViewKey {
        &self.storage_view
    }

    pub fn bundle_id(&self) -> &BundleIdentifier {
        &self.bundle_id
    }
}

impl fmt::Display for BundleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.bundle_id, self.storage_view)
    }
}
