// strata-core/src/storage.rs

use std::any::Any;
use std::collections::BTreeSet;

use strata_common::config::ConstraintConfiguration;
use strata_common::dependency::BundleDependencyInformation;
use strata_common::error::Result;
use strata_common::model::{BundleIdentifier, StorageViewKey};
use strata_common::version::range::VersionRange;

/// One configured view of a bundle storage.
///
/// How the bundles are actually stored (disk, memory, remote index) is
/// outside this crate; resolution only needs version enumeration,
/// bundle metadata, and change detection.
pub trait BundleStorageView: Send + Sync {
    fn storage_view_key(&self) -> &StorageViewKey;

    /// All present versions of the given versionless identifier, in
    /// version descending order. `None` when the name is unknown to
    /// this storage.
    fn lookup_versions(&self, ident: &BundleIdentifier) -> Option<Vec<BundleIdentifier>>;

    /// Loads the metadata of a concrete versioned bundle. Fails with
    /// `Unavailable` when the bundle cannot be loaded.
    fn bundle_info(&self, ident: &BundleIdentifier) -> Result<BundleInfo>;

    /// Polls the backing storage for changes since the last handling.
    /// The returned token is opaque to the caller and is passed back
    /// through [`BundleStorageView::handle_changes`].
    fn detect_changes(&self) -> Option<Box<dyn Any + Send>>;

    fn handle_changes(&self, changes: Box<dyn Any + Send>);
}

/// Metadata of one concrete bundle: its declared dependencies plus the
/// classpath environment it supports.
#[derive(Debug, Clone, Default)]
pub struct BundleInfo {
    bundle_id: Option<BundleIdentifier>,
    dependencies: BundleDependencyInformation,
    supported_runtime_range: Option<VersionRange>,
    supported_repository_range: Option<VersionRange>,
    supported_buildsystem_range: Option<VersionRange>,
    supported_architectures: Option<BTreeSet<String>>,
}

impl BundleInfo {
    pub fn new(bundle_id: BundleIdentifier, dependencies: BundleDependencyInformation) -> Self {
        BundleInfo {
            bundle_id: Some(bundle_id),
            dependencies,
            ..BundleInfo::default()
        }
    }

    pub fn with_runtime_range(mut self, range: VersionRange) -> Self {
        self.supported_runtime_range = Some(range);
        self
    }

    pub fn with_repository_range(mut self, range: VersionRange) -> Self {
        self.supported_repository_range = Some(range);
        self
    }

    pub fn with_buildsystem_range(mut self, range: VersionRange) -> Self {
        self.supported_buildsystem_range = Some(range);
        self
    }

    pub fn with_architectures(mut self, architectures: BTreeSet<String>) -> Self {
        self.supported_architectures = Some(architectures);
        self
    }

    pub fn bundle_id(&self) -> Option<&BundleIdentifier> {
        self.bundle_id.as_ref()
    }

    pub fn dependencies(&self) -> &BundleDependencyInformation {
        &self.dependencies
    }

    /// Whether the constraint configuration rejects this bundle for
    /// classpath use based on its declared supported environment.
    pub fn excluded_by(&self, constraints: &ConstraintConfiguration) -> bool {
        constraints.excludes_classpath(
            self.supported_runtime_range.as_ref(),
            self.supported_repository_range.as_ref(),
            self.supported_buildsystem_range.as_ref(),
            self.supported_architectures.as_ref(),
        )
    }
}
