// strata-common/src/model/mod.rs

pub mod identifier;
pub mod key;

pub use identifier::BundleIdentifier;
pub use key::{BundleKey, StorageViewKey};
