// strata-common/src/lib.rs

pub mod config;
pub mod dependency;
pub mod error;
pub mod model;
pub mod version;

// Re-export key types
pub use config::ConstraintConfiguration;
pub use dependency::{
    BundleDependency, BundleDependencyInformation, BundleDependencyList, DependencyKind,
};
pub use error::{Result, StrataError};
pub use model::{BundleIdentifier, BundleKey, StorageViewKey};
pub use version::{range::VersionRange, Version};
