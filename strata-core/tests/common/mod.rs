// strata-core/tests/common/mod.rs
#![allow(dead_code)]

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use strata_common::config::ConstraintConfiguration;
use strata_common::dependency::{
    BundleDependency, BundleDependencyInformation, BundleDependencyList, DependencyKind,
};
use strata_common::error::{Result, StrataError};
use strata_common::model::{BundleIdentifier, BundleKey, StorageViewKey};
use strata_common::version::range::VersionRange;
use strata_common::version::Version;
use strata_core::context::{DomainHost, ResolutionContext};
use strata_core::domain::Domain;
use strata_core::lookup::{LookupChain, StorageLayout};
use strata_core::storage::{BundleInfo, BundleStorageView};

/// In-memory bundle storage for resolution tests.
pub struct MemoryStorage {
    key: StorageViewKey,
    bundles: RwLock<HashMap<BundleIdentifier, BundleInfo>>,
    pending_change: Mutex<Option<String>>,
    handled: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub fn new(view: &str) -> Arc<MemoryStorage> {
        Arc::new(MemoryStorage {
            key: StorageViewKey::new(view),
            bundles: RwLock::new(HashMap::new()),
            pending_change: Mutex::new(None),
            handled: Mutex::new(Vec::new()),
        })
    }

    pub fn view_key(&self) -> &StorageViewKey {
        &self.key
    }

    /// Adds a versioned bundle with shared required classpath
    /// dependencies, one `(name, range)` pair per logical dependency.
    pub fn put(&self, id: &str, deps: &[(&str, &str)]) {
        let entries = deps
            .iter()
            .map(|(name, range)| entry(name, vec![dep(range)]))
            .collect();
        self.put_bundle(id, entries);
    }

    pub fn put_bundle(&self, id: &str, entries: Vec<(BundleIdentifier, BundleDependencyList)>) {
        let ident = bid(id);
        let info = BundleDependencyInformation::create(Some(&ident), entries).unwrap();
        self.put_info(BundleInfo::new(ident, info));
    }

    pub fn put_info(&self, info: BundleInfo) {
        let ident = info.bundle_id().unwrap().clone();
        self.bundles.write().unwrap().insert(ident, info);
    }

    pub fn mark_changed(&self, tag: &str) {
        *self.pending_change.lock().unwrap() = Some(tag.to_string());
    }

    pub fn handled(&self) -> Vec<String> {
        self.handled.lock().unwrap().clone()
    }
}

impl BundleStorageView for MemoryStorage {
    fn storage_view_key(&self) -> &StorageViewKey {
        &self.key
    }

    fn lookup_versions(&self, ident: &BundleIdentifier) -> Option<Vec<BundleIdentifier>> {
        let bundles = self.bundles.read().unwrap();
        let mut versions: Vec<BundleIdentifier> = bundles
            .keys()
            .filter(|b| &b.without_meta_qualifiers() == ident)
            .cloned()
            .collect();
        if versions.is_empty() {
            return None;
        }
        versions.sort_by(|a, b| {
            let av = Version::parse(a.version_number().unwrap()).unwrap();
            let bv = Version::parse(b.version_number().unwrap()).unwrap();
            bv.cmp(&av)
        });
        Some(versions)
    }

    fn bundle_info(&self, ident: &BundleIdentifier) -> Result<BundleInfo> {
        self.bundles
            .read()
            .unwrap()
            .get(ident)
            .cloned()
            .ok_or_else(|| StrataError::Unavailable(format!("bundle not found: {ident}")))
    }

    fn detect_changes(&self) -> Option<Box<dyn Any + Send>> {
        self.pending_change
            .lock()
            .unwrap()
            .take()
            .map(|tag| Box::new(tag) as Box<dyn Any + Send>)
    }

    fn handle_changes(&self, changes: Box<dyn Any + Send>) {
        if let Ok(tag) = changes.downcast::<String>() {
            self.handled.lock().unwrap().push(*tag);
        }
    }
}

pub fn resolved_contains(domain: &Domain, id: &str) -> bool {
    domain
        .all_domains()
        .iter()
        .any(|d| d.bundle_key().bundle_id() == &bid(id))
}

pub fn bid(id: &str) -> BundleIdentifier {
    BundleIdentifier::parse(id).unwrap()
}

pub fn bk(view: &str, id: &str) -> BundleKey {
    BundleKey::new(StorageViewKey::new(view), bid(id))
}

pub fn dep(range: &str) -> BundleDependency {
    BundleDependency::builder(DependencyKind::CLASSPATH, VersionRange::parse(range).unwrap())
        .build()
}

pub fn private_dep(range: &str) -> BundleDependency {
    BundleDependency::builder(DependencyKind::CLASSPATH, VersionRange::parse(range).unwrap())
        .private(true)
        .build()
}

pub fn optional_dep(range: &str) -> BundleDependency {
    BundleDependency::builder(DependencyKind::CLASSPATH, VersionRange::parse(range).unwrap())
        .optional(true)
        .build()
}

pub fn entry(name: &str, deps: Vec<BundleDependency>) -> (BundleIdentifier, BundleDependencyList) {
    (bid(name), BundleDependencyList::new(deps))
}

pub fn single_chain(storage: Arc<MemoryStorage>) -> LookupChain {
    LookupChain::new(vec![StorageLayout::storage(
        "main",
        storage as Arc<dyn BundleStorageView>,
    )])
    .unwrap()
}

/// The handle type realized domains materialize into during tests.
pub struct Realized {
    pub key: BundleKey,
    pub deps: Mutex<Vec<(BundleKey, Arc<Realized>, bool)>>,
}

/// Host that counts instantiations and wires dependency handles.
pub struct RecordingHost {
    pub instantiated: Mutex<usize>,
}

impl RecordingHost {
    pub fn new() -> RecordingHost {
        RecordingHost {
            instantiated: Mutex::new(0),
        }
    }

    pub fn count(&self) -> usize {
        *self.instantiated.lock().unwrap()
    }
}

impl DomainHost<Arc<Realized>> for RecordingHost {
    fn instantiate(&self, domain: &Domain) -> Result<Arc<Realized>> {
        *self.instantiated.lock().unwrap() += 1;
        Ok(Arc::new(Realized {
            key: domain.bundle_key().clone(),
            deps: Mutex::new(Vec::new()),
        }))
    }

    fn link(
        &self,
        _domain: &Domain,
        handle: &Arc<Realized>,
        dependencies: &[(BundleKey, Arc<Realized>, bool)],
    ) -> Result<()> {
        *handle.deps.lock().unwrap() = dependencies.to_vec();
        Ok(())
    }
}

pub fn context(chain: LookupChain) -> ResolutionContext<Arc<Realized>> {
    ResolutionContext::new(chain, ConstraintConfiguration::default())
}

pub fn constrained_context(
    chain: LookupChain,
    constraints: ConstraintConfiguration,
) -> ResolutionContext<Arc<Realized>> {
    ResolutionContext::new(chain, constraints)
}
