// strata-common/src/dependency/definition.rs

use std::collections::BTreeMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};
use crate::model::BundleIdentifier;
use crate::version::range::VersionRange;

bitflags! {
    /// What a dependency is declared for. A dependency entry carries at
    /// least one kind; resolution is usually filtered to `CLASSPATH`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DependencyKind: u8 {
        const CLASSPATH = 1 << 0;
        const SOURCES = 1 << 1;
        const DOCUMENTATION = 1 << 2;
    }
}

/// A single dependency declaration towards some bundle: the accepted
/// version range, the kinds it applies to, and free-form metadata.
///
/// The `optional` and `private` flags drive resolution. Optional
/// dependencies may be left unsatisfied; private dependencies are
/// resolved in their own scope and are not visible to other dependents
/// of the declaring bundle.
///
/// Environment constraint metadata (`runtime-version`,
/// `repository-version`, `buildsystem-version`, `native-architecture`)
/// is carried in the metadata map and evaluated by
/// [`ConstraintConfiguration`](crate::config::ConstraintConfiguration).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleDependency {
    kinds: DependencyKind,
    range: VersionRange,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    optional: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    private: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
}

impl BundleDependency {
    pub fn builder(kinds: DependencyKind, range: VersionRange) -> BundleDependencyBuilder {
        BundleDependencyBuilder {
            dep: BundleDependency {
                kinds,
                range,
                optional: false,
                private: false,
                metadata: BTreeMap::new(),
            },
        }
    }

    pub fn kinds(&self) -> DependencyKind {
        self.kinds
    }

    pub fn range(&self) -> &VersionRange {
        &self.range
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct BundleDependencyBuilder {
    dep: BundleDependency,
}

impl BundleDependencyBuilder {
    pub fn optional(mut self, optional: bool) -> Self {
        self.dep.optional = optional;
        self
    }

    pub fn private(mut self, private: bool) -> Self {
        self.dep.private = private;
        self
    }

    pub fn metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dep.metadata.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> BundleDependency {
        self.dep
    }
}

/// The dependency declarations a bundle makes towards one other
/// bundle, in declaration order. Never empty once constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleDependencyList {
    dependencies: Vec<BundleDependency>,
}

impl BundleDependencyList {
    pub fn new(dependencies: Vec<BundleDependency>) -> Self {
        BundleDependencyList { dependencies }
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn dependencies(&self) -> &[BundleDependency] {
        &self.dependencies
    }

    pub fn has_optional(&self) -> bool {
        self.dependencies.iter().any(BundleDependency::is_optional)
    }

    /// All declarations are private, so the edge to the dependency can
    /// stay hidden inside the declaring bundle's scope.
    pub fn is_all_private(&self) -> bool {
        !self.dependencies.is_empty()
            && self.dependencies.iter().all(BundleDependency::is_private)
    }

    pub fn without_optionals(&self) -> BundleDependencyList {
        self.filter(|d| if d.is_optional() { None } else { Some(d.clone()) })
    }

    pub fn only_optionals(&self) -> BundleDependencyList {
        self.filter(|d| if d.is_optional() { Some(d.clone()) } else { None })
    }

    /// Maps each declaration through `f`, dropping the ones mapped to
    /// `None`.
    pub fn filter(
        &self,
        mut f: impl FnMut(&BundleDependency) -> Option<BundleDependency>,
    ) -> BundleDependencyList {
        BundleDependencyList {
            dependencies: self.dependencies.iter().filter_map(|d| f(d)).collect(),
        }
    }
}

/// All dependency declarations of one bundle, keyed by the versionless
/// identifier of the target bundle, in declaration order.
///
/// Keys must not carry a version qualifier (the accepted versions come
/// from the ranges), and a bundle must not depend on itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleDependencyInformation {
    entries: Vec<(BundleIdentifier, BundleDependencyList)>,
}

impl BundleDependencyInformation {
    pub fn empty() -> Self {
        BundleDependencyInformation::default()
    }

    /// Creates the dependency information, validating the keys against
    /// the declaring bundle. Empty lists are dropped.
    pub fn create(
        declaring: Option<&BundleIdentifier>,
        entries: Vec<(BundleIdentifier, BundleDependencyList)>,
    ) -> Result<Self> {
        let declaring_versionless = declaring.map(BundleIdentifier::without_meta_qualifiers);
        let mut result = Vec::with_capacity(entries.len());
        for (ident, list) in entries {
            if ident.has_version_qualifier() {
                return Err(StrataError::Config(format!(
                    "dependency bundle identifier cannot have version qualifier: {ident}"
                )));
            }
            if declaring_versionless.as_ref() == Some(&ident) {
                return Err(StrataError::Config(format!(
                    "bundle cannot depend on itself: {ident}"
                )));
            }
            if result.iter().any(|(present, _)| present == &ident) {
                return Err(StrataError::Config(format!(
                    "duplicate dependency entry: {ident}"
                )));
            }
            if !list.is_empty() {
                result.push((ident, list));
            }
        }
        Ok(BundleDependencyInformation { entries: result })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&BundleIdentifier, &BundleDependencyList)> {
        self.entries.iter().map(|(i, l)| (i, l))
    }

    pub fn dependency_list(&self, ident: &BundleIdentifier) -> Option<&BundleDependencyList> {
        self.entries
            .iter()
            .find(|(i, _)| i == ident)
            .map(|(_, l)| l)
    }

    pub fn has_optional(&self) -> bool {
        self.entries.iter().any(|(_, l)| l.has_optional())
    }

    pub fn without_optionals(&self) -> BundleDependencyInformation {
        self.filter(|_, d| {
            if d.is_optional() {
                None
            } else {
                Some(d.clone())
            }
        })
    }

    /// Keeps only the declarations that carry the given kind.
    pub fn filter_for_kind(&self, kind: DependencyKind) -> BundleDependencyInformation {
        self.filter(|_, d| {
            if d.kinds().contains(kind) {
                Some(d.clone())
            } else {
                None
            }
        })
    }

    /// Maps every declaration through `f`, dropping `None` results and
    /// entries that become empty.
    pub fn filter(
        &self,
        mut f: impl FnMut(&BundleIdentifier, &BundleDependency) -> Option<BundleDependency>,
    ) -> BundleDependencyInformation {
        let entries = self
            .entries
            .iter()
            .filter_map(|(ident, list)| {
                let filtered = list.filter(|d| f(ident, d));
                if filtered.is_empty() {
                    None
                } else {
                    Some((ident.clone(), filtered))
                }
            })
            .collect();
        BundleDependencyInformation { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(s: &str) -> BundleIdentifier {
        BundleIdentifier::parse(s).unwrap()
    }

    fn dep(range: &str) -> BundleDependency {
        BundleDependency::builder(
            DependencyKind::CLASSPATH,
            VersionRange::parse(range).unwrap(),
        )
        .build()
    }

    fn optional_dep(range: &str) -> BundleDependency {
        BundleDependency::builder(
            DependencyKind::CLASSPATH,
            VersionRange::parse(range).unwrap(),
        )
        .optional(true)
        .build()
    }

    #[test]
    fn list_optionals() {
        let list = BundleDependencyList::new(vec![dep("1.0"), optional_dep("2.0")]);
        assert!(list.has_optional());
        assert_eq!(list.without_optionals().dependencies().len(), 1);
        assert_eq!(list.only_optionals().dependencies().len(), 1);
        assert!(!list.is_all_private());
    }

    #[test]
    fn all_private() {
        let p = BundleDependency::builder(
            DependencyKind::CLASSPATH,
            VersionRange::parse("1.0").unwrap(),
        )
        .private(true)
        .build();
        assert!(BundleDependencyList::new(vec![p.clone()]).is_all_private());
        assert!(!BundleDependencyList::new(vec![p, dep("1.0")]).is_all_private());
        assert!(!BundleDependencyList::new(vec![]).is_all_private());
    }

    #[test]
    fn versioned_key_rejected() {
        let err = BundleDependencyInformation::create(
            None,
            vec![(bid("other-v1.0"), BundleDependencyList::new(vec![dep("1.0")]))],
        );
        assert!(err.is_err());
    }

    #[test]
    fn self_dependency_rejected() {
        let declaring = bid("me-v1.0");
        let err = BundleDependencyInformation::create(
            Some(&declaring),
            vec![(bid("me"), BundleDependencyList::new(vec![dep("1.0")]))],
        );
        assert!(err.is_err());
    }

    #[test]
    fn empty_lists_dropped() {
        let info = BundleDependencyInformation::create(
            None,
            vec![
                (bid("a"), BundleDependencyList::new(vec![dep("1.0")])),
                (bid("b"), BundleDependencyList::new(vec![])),
            ],
        )
        .unwrap();
        assert_eq!(info.entries().count(), 1);
        assert!(info.dependency_list(&bid("a")).is_some());
        assert!(info.dependency_list(&bid("b")).is_none());
    }

    #[test]
    fn without_optionals_drops_emptied_entries() {
        let info = BundleDependencyInformation::create(
            None,
            vec![
                (bid("a"), BundleDependencyList::new(vec![optional_dep("1.0")])),
                (
                    bid("b"),
                    BundleDependencyList::new(vec![dep("1.0"), optional_dep("2.0")]),
                ),
            ],
        )
        .unwrap();
        let without = info.without_optionals();
        assert!(without.dependency_list(&bid("a")).is_none());
        assert_eq!(
            without
                .dependency_list(&bid("b"))
                .unwrap()
                .dependencies()
                .len(),
            1
        );
    }

    #[test]
    fn filter_for_kind_keeps_matching_declarations() {
        let sources = BundleDependency::builder(
            DependencyKind::SOURCES,
            VersionRange::parse("1.0").unwrap(),
        )
        .build();
        let info = BundleDependencyInformation::create(
            None,
            vec![
                (bid("a"), BundleDependencyList::new(vec![dep("1.0")])),
                (bid("b"), BundleDependencyList::new(vec![sources])),
            ],
        )
        .unwrap();
        let classpath = info.filter_for_kind(DependencyKind::CLASSPATH);
        assert!(classpath.dependency_list(&bid("a")).is_some());
        assert!(classpath.dependency_list(&bid("b")).is_none());
    }
}
