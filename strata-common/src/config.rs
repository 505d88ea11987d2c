// strata-common/src/config.rs

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::dependency::BundleDependency;
use crate::error::{Result, StrataError};
use crate::version::range::VersionRange;
use crate::version::Version;

/// Dependency metadata name restricting the runtime major versions the
/// dependency applies to.
pub const DEPENDENCY_META_RUNTIME_VERSION: &str = "runtime-version";
/// Dependency metadata name restricting the repository versions the
/// dependency applies to.
pub const DEPENDENCY_META_REPOSITORY_VERSION: &str = "repository-version";
/// Dependency metadata name restricting the build system versions the
/// dependency applies to.
pub const DEPENDENCY_META_BUILDSYSTEM_VERSION: &str = "buildsystem-version";
/// Dependency metadata name listing the native architectures the
/// dependency applies to, comma or whitespace separated.
pub const DEPENDENCY_META_NATIVE_ARCHITECTURE: &str = "native-architecture";

/// The environment the resolution is performed for.
///
/// Dependencies and bundles declaring constraints outside these values
/// are excluded from resolution. A `None` field means that dimension is
/// unconstrained and nothing is excluded on its account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstraintConfiguration {
    runtime_major_version: Option<u32>,
    repository_version: Option<Version>,
    buildsystem_version: Option<Version>,
    native_architecture: Option<String>,
}

impl ConstraintConfiguration {
    pub fn builder() -> ConstraintConfigurationBuilder {
        ConstraintConfigurationBuilder {
            config: ConstraintConfiguration::default(),
        }
    }

    pub fn runtime_major_version(&self) -> Option<u32> {
        self.runtime_major_version
    }

    pub fn repository_version(&self) -> Option<&Version> {
        self.repository_version.as_ref()
    }

    pub fn buildsystem_version(&self) -> Option<&Version> {
        self.buildsystem_version.as_ref()
    }

    pub fn native_architecture(&self) -> Option<&str> {
        self.native_architecture.as_deref()
    }

    /// Checks if this configuration excludes the given dependency
    /// declaration based on its constraint metadata.
    ///
    /// An unparseable range in the metadata is an error rather than a
    /// silent exclusion.
    pub fn excludes_dependency(&self, dependency: &BundleDependency) -> Result<bool> {
        let runtime = self.runtime_major_version.map(|v| v.to_string());
        if range_metadata_excludes(
            dependency,
            DEPENDENCY_META_RUNTIME_VERSION,
            runtime.as_deref(),
        )? {
            return Ok(true);
        }
        if range_metadata_excludes(
            dependency,
            DEPENDENCY_META_BUILDSYSTEM_VERSION,
            self.buildsystem_version.as_ref().map(|v| v.to_string()).as_deref(),
        )? {
            return Ok(true);
        }
        if range_metadata_excludes(
            dependency,
            DEPENDENCY_META_REPOSITORY_VERSION,
            self.repository_version.as_ref().map(|v| v.to_string()).as_deref(),
        )? {
            return Ok(true);
        }
        if let (Some(arch), Some(meta)) = (
            self.native_architecture.as_deref(),
            dependency.metadata_value(DEPENDENCY_META_NATIVE_ARCHITECTURE),
        ) {
            if !split_architectures(meta).any(|a| a == arch) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Checks if this configuration excludes a bundle based on its
    /// declared supported classpath environment.
    ///
    /// A `None` supported range or architecture set means the bundle
    /// places no restriction on that dimension.
    pub fn excludes_classpath(
        &self,
        runtime_range: Option<&VersionRange>,
        repository_range: Option<&VersionRange>,
        buildsystem_range: Option<&VersionRange>,
        architectures: Option<&BTreeSet<String>>,
    ) -> bool {
        if let (Some(range), Some(v)) = (runtime_range, self.runtime_major_version) {
            if !range.includes(&v.to_string()) {
                return true;
            }
        }
        if let (Some(range), Some(v)) = (repository_range, &self.repository_version) {
            if !range.includes_version(v) {
                return true;
            }
        }
        if let (Some(range), Some(v)) = (buildsystem_range, &self.buildsystem_version) {
            if !range.includes_version(v) {
                return true;
            }
        }
        if let (Some(archs), Some(a)) = (architectures, &self.native_architecture) {
            if !archs.contains(a) {
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintConfigurationBuilder {
    config: ConstraintConfiguration,
}

impl ConstraintConfigurationBuilder {
    pub fn runtime_major_version(mut self, version: u32) -> Self {
        self.config.runtime_major_version = Some(version);
        self
    }

    pub fn repository_version(mut self, version: Version) -> Self {
        self.config.repository_version = Some(version);
        self
    }

    pub fn buildsystem_version(mut self, version: Version) -> Self {
        self.config.buildsystem_version = Some(version);
        self
    }

    pub fn native_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.config.native_architecture = Some(architecture.into());
        self
    }

    pub fn build(self) -> ConstraintConfiguration {
        self.config
    }
}

fn range_metadata_excludes(
    dependency: &BundleDependency,
    meta_name: &'static str,
    constraint: Option<&str>,
) -> Result<bool> {
    let Some(constraint) = constraint else {
        return Ok(false);
    };
    let Some(declared) = dependency.metadata_value(meta_name) else {
        return Ok(false);
    };
    let range = VersionRange::parse(declared)
        .map_err(|e| StrataError::Config(format!("failed to parse {meta_name}: {e}")))?;
    Ok(!range.includes(constraint))
}

fn split_architectures(metadata: &str) -> impl Iterator<Item = &str> {
    metadata
        .split([',', ' ', '\t'])
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::DependencyKind;

    fn dep_with(meta_name: &str, value: &str) -> BundleDependency {
        BundleDependency::builder(
            DependencyKind::CLASSPATH,
            VersionRange::parse("1.0").unwrap(),
        )
        .metadata(meta_name, value)
        .build()
    }

    #[test]
    fn unconstrained_excludes_nothing() {
        let config = ConstraintConfiguration::default();
        let dep = dep_with(DEPENDENCY_META_RUNTIME_VERSION, "[17)");
        assert!(!config.excludes_dependency(&dep).unwrap());
    }

    #[test]
    fn runtime_version_exclusion() {
        let config = ConstraintConfiguration::builder()
            .runtime_major_version(11)
            .build();
        assert!(config
            .excludes_dependency(&dep_with(DEPENDENCY_META_RUNTIME_VERSION, "[17)"))
            .unwrap());
        assert!(!config
            .excludes_dependency(&dep_with(DEPENDENCY_META_RUNTIME_VERSION, "[8)"))
            .unwrap());
    }

    #[test]
    fn architecture_exclusion() {
        let config = ConstraintConfiguration::builder()
            .native_architecture("x86_64")
            .build();
        assert!(!config
            .excludes_dependency(&dep_with(DEPENDENCY_META_NATIVE_ARCHITECTURE, "aarch64, x86_64"))
            .unwrap());
        assert!(config
            .excludes_dependency(&dep_with(DEPENDENCY_META_NATIVE_ARCHITECTURE, "aarch64"))
            .unwrap());
        // a dependency with no architecture metadata applies anywhere
        let plain = BundleDependency::builder(
            DependencyKind::CLASSPATH,
            VersionRange::parse("1.0").unwrap(),
        )
        .build();
        assert!(!config.excludes_dependency(&plain).unwrap());
    }

    #[test]
    fn malformed_metadata_range_is_error() {
        let config = ConstraintConfiguration::builder()
            .runtime_major_version(11)
            .build();
        assert!(config
            .excludes_dependency(&dep_with(DEPENDENCY_META_RUNTIME_VERSION, "(not a range"))
            .is_err());
    }

    #[test]
    fn classpath_exclusion() {
        let config = ConstraintConfiguration::builder()
            .runtime_major_version(11)
            .native_architecture("x86_64")
            .build();
        let range17 = VersionRange::parse("[17)").unwrap();
        assert!(config.excludes_classpath(Some(&range17), None, None, None));
        let range8 = VersionRange::parse("[8)").unwrap();
        assert!(!config.excludes_classpath(Some(&range8), None, None, None));
        let archs: BTreeSet<String> = ["aarch64".to_owned()].into();
        assert!(config.excludes_classpath(None, None, None, Some(&archs)));
        assert!(!config.excludes_classpath(None, None, None, None));
    }
}
