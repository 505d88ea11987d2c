// strata-core/src/resolve/mod.rs

mod resolver;

pub use resolver::satisfy_dependency_domain;

use strata_common::model::{BundleIdentifier, BundleKey};

/// Anything that carries a bundle identifier. The resolver is generic
/// over the bundle key type; resolution only ever needs the
/// identifier out of it.
pub trait BundleIdentifierHolder {
    fn bundle_id(&self) -> &BundleIdentifier;
}

impl BundleIdentifierHolder for BundleIdentifier {
    fn bundle_id(&self) -> &BundleIdentifier {
        self
    }
}

impl BundleIdentifierHolder for BundleKey {
    fn bundle_id(&self) -> &BundleIdentifier {
        BundleKey::bundle_id(self)
    }
}

/// The outcome of a dependency domain resolution: an immutable DAG of
/// concrete bundle selections.
///
/// Nodes are arena indices; index 0 is the root. Each node records the
/// selected bundle entry (key plus resolution context) and its direct
/// dependency nodes in declaration order. Diamond-shaped sharing in
/// the resolution appears as multiple parents referencing one node;
/// circular dependencies appear as back edges, so traversals must
/// guard with a visited set.
#[derive(Debug, Clone)]
pub struct DomainResolution<K, C> {
    pub(crate) nodes: Vec<ResolutionNode<K, C>>,
}

#[derive(Debug, Clone)]
pub(crate) struct ResolutionNode<K, C> {
    pub(crate) entry: (K, C),
    pub(crate) dependencies: Vec<usize>,
}

impl<K, C> DomainResolution<K, C> {
    pub const ROOT: usize = 0;

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn entry(&self, node: usize) -> &(K, C) {
        &self.nodes[node].entry
    }

    /// Direct dependency nodes in declaration order.
    pub fn dependencies(&self, node: usize) -> &[usize] {
        &self.nodes[node].dependencies
    }
}
