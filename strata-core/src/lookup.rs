// strata-core/src/lookup.rs

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use strata_common::error::{Result, StrataError};
use strata_common::model::{BundleIdentifier, StorageViewKey};

use crate::storage::{BundleInfo, BundleStorageView};

/// Identifies a lookup node within its [`LookupChain`].
pub type LookupId = usize;

/// Declarative description of the configured storage order. Entries
/// are tried first to last; a group scopes its members so that
/// resolutions anchored inside it only see the group's own tail.
pub enum StorageLayout {
    Storage {
        name: String,
        storage: Arc<dyn BundleStorageView>,
    },
    Group(Vec<StorageLayout>),
}

impl StorageLayout {
    pub fn storage(name: impl Into<String>, storage: Arc<dyn BundleStorageView>) -> Self {
        StorageLayout::Storage {
            name: name.into(),
            storage,
        }
    }
}

enum LookupNode {
    Multi {
        members: Vec<LookupId>,
    },
    Single {
        name: String,
        storage: Arc<dyn BundleStorageView>,
        /// The relative lookup of this storage: the tail of the
        /// enclosing group starting at this node.
        enclosing: LookupId,
    },
}

/// Successful version enumeration, carrying the lookup that any
/// follow-up resolution anchored at the result must use.
pub struct VersionLookupResult {
    pub versions: Vec<BundleIdentifier>,
    pub storage_view: Arc<dyn BundleStorageView>,
    pub relative: LookupId,
}

/// Successful bundle metadata lookup.
pub struct InfoLookupResult {
    pub info: BundleInfo,
    pub storage_view: Arc<dyn BundleStorageView>,
    pub relative: LookupId,
}

impl std::fmt::Debug for InfoLookupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfoLookupResult")
            .field("info", &self.info)
            .field("storage_view", &self.storage_view.storage_view_key())
            .field("relative", &self.relative)
            .finish()
    }
}

/// The scoped lookup chain of a configured repository.
///
/// An ordered, possibly nested arrangement of named storages. A query
/// walks the members in order and the first success wins; the result
/// carries a *relative* lookup covering only the producing storage and
/// what follows it in its group, so dependency resolution can never
/// reach back to an earlier, unrelated storage.
///
/// The chain also owns the storage-view string identifiers used by the
/// reconstruction codec.
pub struct LookupChain {
    nodes: Vec<LookupNode>,
    root: LookupId,
    storage_id_lookups: HashMap<String, LookupId>,
    view_key_ids: HashMap<StorageViewKey, String>,
    id_views: HashMap<String, Arc<dyn BundleStorageView>>,
}

impl LookupChain {
    /// Builds the chain from the configured layout.
    ///
    /// The same storage name may recur, but only with an identical
    /// tail; differing tails would make the relative lookup of that
    /// storage ambiguous and are a configuration error.
    pub fn new(layout: Vec<StorageLayout>) -> Result<LookupChain> {
        let mut chain = LookupChain {
            nodes: Vec::new(),
            root: 0,
            storage_id_lookups: HashMap::new(),
            view_key_ids: HashMap::new(),
            id_views: HashMap::new(),
        };
        let mut tails_by_name: HashMap<String, Vec<LookupId>> = HashMap::new();
        let root = chain.alloc();
        chain.build_group(root, &layout, &mut tails_by_name)?;
        chain.root = root;
        for (name, tails) in &tails_by_name {
            let first = tails[0];
            for &other in &tails[1..] {
                if !chain.lookup_eq(first, other) {
                    return Err(StrataError::Config(format!(
                        "different tail resolution configuration for recurring storage: {name}"
                    )));
                }
            }
        }
        Ok(chain)
    }

    fn alloc(&mut self) -> LookupId {
        self.nodes.push(LookupNode::Multi {
            members: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn build_group(
        &mut self,
        id: LookupId,
        entries: &[StorageLayout],
        tails_by_name: &mut HashMap<String, Vec<LookupId>>,
    ) -> Result<()> {
        let member_ids: Vec<LookupId> = entries.iter().map(|_| self.alloc()).collect();
        for (i, entry) in entries.iter().enumerate() {
            match entry {
                StorageLayout::Group(sub) => {
                    self.build_group(member_ids[i], sub, tails_by_name)?;
                }
                StorageLayout::Storage { name, storage } => {
                    let enclosing = self.alloc();
                    self.nodes[enclosing] = LookupNode::Multi {
                        members: member_ids[i..].to_vec(),
                    };
                    let key = storage.storage_view_key().clone();
                    self.nodes[member_ids[i]] = LookupNode::Single {
                        name: name.clone(),
                        storage: Arc::clone(storage),
                        enclosing,
                    };
                    tails_by_name.entry(name.clone()).or_default().push(enclosing);
                    self.storage_id_lookups.insert(name.clone(), enclosing);
                    self.view_key_ids.insert(key.clone(), name.clone());
                    self.id_views.insert(name.clone(), Arc::clone(storage));
                }
            }
        }
        self.nodes[id] = LookupNode::Multi {
            members: member_ids,
        };
        Ok(())
    }

    /// Structural equality of two lookup nodes. Single lookups compare
    /// by name and storage view, without recursing into their own
    /// relative lookups.
    fn lookup_eq(&self, a: LookupId, b: LookupId) -> bool {
        match (&self.nodes[a], &self.nodes[b]) {
            (LookupNode::Multi { members: ma }, LookupNode::Multi { members: mb }) => {
                ma.len() == mb.len()
                    && ma
                        .iter()
                        .zip(mb.iter())
                        .all(|(&x, &y)| self.lookup_eq(x, y))
            }
            (
                LookupNode::Single {
                    name: na,
                    storage: sa,
                    ..
                },
                LookupNode::Single {
                    name: nb,
                    storage: sb,
                    ..
                },
            ) => na == nb && sa.storage_view_key() == sb.storage_view_key(),
            _ => false,
        }
    }

    /// The whole configured chain.
    pub fn root(&self) -> LookupId {
        self.root
    }

    /// Enumerates the versions of a versionless identifier, first
    /// member with any result wins.
    pub fn lookup_versions(
        &self,
        lookup: LookupId,
        ident: &BundleIdentifier,
    ) -> Option<VersionLookupResult> {
        match &self.nodes[lookup] {
            LookupNode::Multi { members } => members
                .iter()
                .find_map(|&m| self.lookup_versions(m, ident)),
            LookupNode::Single {
                storage, enclosing, ..
            } => {
                let versions = storage.lookup_versions(ident).filter(|v| !v.is_empty())?;
                Some(VersionLookupResult {
                    versions,
                    storage_view: Arc::clone(storage),
                    relative: *enclosing,
                })
            }
        }
    }

    /// Loads the metadata of a concrete bundle. When every member
    /// fails, the failures are merged into one error with the
    /// individual causes attached.
    pub fn lookup_info(&self, lookup: LookupId, ident: &BundleIdentifier) -> Result<InfoLookupResult> {
        match &self.nodes[lookup] {
            LookupNode::Multi { members } => {
                let mut causes = Vec::new();
                for &m in members {
                    match self.lookup_info(m, ident) {
                        Ok(found) => return Ok(found),
                        Err(e) => causes.push(e),
                    }
                }
                debug!(bundle = %ident, failures = causes.len(), "bundle not found in lookup chain");
                match causes.len() {
                    0 => Err(StrataError::Unavailable(format!("bundle not found: {ident}"))),
                    1 => Err(causes.remove(0)),
                    _ => Err(StrataError::unsatisfied(format!("bundle not found: {ident}"))
                        .with_suppressed(causes)),
                }
            }
            LookupNode::Single {
                storage, enclosing, ..
            } => {
                let info = storage.bundle_info(ident)?;
                Ok(InfoLookupResult {
                    info,
                    storage_view: Arc::clone(storage),
                    relative: *enclosing,
                })
            }
        }
    }

    /// The relative lookup anchored at the storage view behind `key`,
    /// searched across the whole chain.
    pub fn find_storage_view(&self, key: &StorageViewKey) -> Option<LookupId> {
        self.view_key_ids
            .get(key)
            .and_then(|id| self.storage_id_lookups.get(id).copied())
    }

    /// The stable string identifier of a storage view, as embedded in
    /// encoded domains.
    pub fn storage_id_for(&self, key: &StorageViewKey) -> Option<&str> {
        self.view_key_ids.get(key).map(String::as_str)
    }

    /// Resolves a string identifier from an encoded domain back to the
    /// storage view it named, if that view is still configured.
    pub fn storage_view_for_id(&self, id: &str) -> Option<&Arc<dyn BundleStorageView>> {
        self.id_views.get(id)
    }

    /// Every distinct configured storage view.
    pub fn storage_views(&self) -> impl Iterator<Item = &Arc<dyn BundleStorageView>> {
        self.id_views.values()
    }
}
