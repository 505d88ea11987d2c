// strata-core/src/domain/mod.rs

pub mod codec;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use strata_common::dependency::BundleDependencyInformation;
use strata_common::error::{Result, StrataError};
use strata_common::model::BundleKey;

use crate::resolve::DomainResolution;

/// Immutable arena of isolation domain nodes. Cycles are legal; a
/// node's dependency may be any node in the arena, including an
/// ancestor.
pub struct DomainGraph {
    nodes: Vec<DomainNodeData>,
}

struct DomainNodeData {
    bundle: BundleKey,
    deps: Vec<(BundleKey, DomainEdge)>,
}

#[derive(Clone, Copy)]
struct DomainEdge {
    node: usize,
    private_scope: bool,
}

/// One isolation domain: a bundle together with the ordered dependency
/// domains backing it, each edge flagged private or shared.
///
/// Equality is structural and cycle safe: two domains are equal when
/// their bundle keys match and their dependency lists match pairwise
/// (key, private flag, recursively equal child), with revisited node
/// pairs assumed equal so self-referential domains terminate. The hash
/// covers only the root bundle key; full equality is the authority.
#[derive(Clone)]
pub struct Domain {
    graph: Arc<DomainGraph>,
    index: usize,
}

impl DomainGraph {
    /// Converts a finished resolution into its isolation domain.
    ///
    /// `dep_info` supplies the full declaration set of an already
    /// resolved bundle; an edge is private-scope when every declaration
    /// towards its target is private. Resolution nodes are memoized so
    /// diamond sharing yields one domain node.
    pub fn from_resolution<C>(
        resolution: &DomainResolution<BundleKey, C>,
        mut dep_info: impl FnMut(&BundleKey) -> Result<BundleDependencyInformation>,
    ) -> Result<Domain> {
        let mut nodes = Vec::new();
        let mut created = HashMap::new();
        let root = build_node(
            resolution,
            DomainResolution::<BundleKey, C>::ROOT,
            &mut created,
            &mut nodes,
            &mut dep_info,
        )?;
        Ok(Domain {
            graph: Arc::new(DomainGraph { nodes }),
            index: root,
        })
    }

    pub(crate) fn from_nodes(nodes: Vec<DomainNodeData>, root: usize) -> Domain {
        Domain {
            graph: Arc::new(DomainGraph { nodes }),
            index: root,
        }
    }
}

fn build_node<C>(
    resolution: &DomainResolution<BundleKey, C>,
    res_index: usize,
    created: &mut HashMap<usize, usize>,
    nodes: &mut Vec<DomainNodeData>,
    dep_info: &mut impl FnMut(&BundleKey) -> Result<BundleDependencyInformation>,
) -> Result<usize> {
    if let Some(&idx) = created.get(&res_index) {
        return Ok(idx);
    }
    let bundle = resolution.entry(res_index).0.clone();
    let idx = nodes.len();
    nodes.push(DomainNodeData {
        bundle: bundle.clone(),
        deps: Vec::new(),
    });
    created.insert(res_index, idx);

    let children = resolution.dependencies(res_index).to_vec();
    if !children.is_empty() {
        let info = dep_info(&bundle)?;
        for child in children {
            let child_key = resolution.entry(child).0.clone();
            let versionless = child_key.bundle_id().without_meta_qualifiers();
            let dep_list = info.dependency_list(&versionless).ok_or_else(|| {
                StrataError::Unavailable(format!(
                    "dependency declaration not found: {versionless} in {bundle}"
                ))
            })?;
            let private_scope = dep_list.is_all_private();
            let child_idx = build_node(resolution, child, created, nodes, dep_info)?;
            nodes[idx].deps.push((
                child_key,
                DomainEdge {
                    node: child_idx,
                    private_scope,
                },
            ));
        }
    }
    Ok(idx)
}

impl Domain {
    pub fn bundle_key(&self) -> &BundleKey {
        &self.graph.nodes[self.index].bundle
    }

    /// Direct dependencies in declaration order.
    pub fn dependencies(&self) -> impl Iterator<Item = (&BundleKey, Domain, bool)> {
        self.graph.nodes[self.index].deps.iter().map(|(key, edge)| {
            (
                key,
                Domain {
                    graph: Arc::clone(&self.graph),
                    index: edge.node,
                },
                edge.private_scope,
            )
        })
    }

    /// Every domain reachable from this one, itself included,
    /// preorder. Terminates on cycles.
    pub fn all_domains(&self) -> Vec<Domain> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        self.collect_all(self.index, &mut result, &mut visited);
        result
    }

    fn collect_all(&self, index: usize, result: &mut Vec<Domain>, visited: &mut HashSet<usize>) {
        if !visited.insert(index) {
            return;
        }
        result.push(Domain {
            graph: Arc::clone(&self.graph),
            index,
        });
        for (_, edge) in &self.graph.nodes[index].deps {
            self.collect_all(edge.node, result, visited);
        }
    }

    fn structural_eq(
        &self,
        self_index: usize,
        other: &Domain,
        other_index: usize,
        compared: &mut HashSet<(usize, usize)>,
    ) -> bool {
        if !compared.insert((self_index, other_index)) {
            return true;
        }
        if Arc::ptr_eq(&self.graph, &other.graph) && self_index == other_index {
            return true;
        }
        let a = &self.graph.nodes[self_index];
        let b = &other.graph.nodes[other_index];
        if a.deps.len() != b.deps.len() {
            return false;
        }
        for ((akey, aedge), (bkey, bedge)) in a.deps.iter().zip(b.deps.iter()) {
            if akey != bkey {
                return false;
            }
            if aedge.private_scope != bedge.private_scope {
                return false;
            }
            if !self.structural_eq(aedge.node, other, bedge.node, compared) {
                return false;
            }
        }
        true
    }
}

impl PartialEq for Domain {
    fn eq(&self, other: &Self) -> bool {
        if self.bundle_key() != other.bundle_key() {
            return false;
        }
        self.structural_eq(self.index, other, other.index, &mut HashSet::new())
    }
}

impl Eq for Domain {}

impl Hash for Domain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // dependencies deliberately left out; cycles make a transitive
        // hash impossible and equality is the authority anyway
        self.bundle_key().hash(state);
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut added = HashSet::new();
        self.fmt_node(self.index, f, &mut added)
    }
}

impl Domain {
    fn fmt_node(
        &self,
        index: usize,
        f: &mut fmt::Formatter<'_>,
        added: &mut HashSet<usize>,
    ) -> fmt::Result {
        let node = &self.graph.nodes[index];
        if !added.insert(index) {
            return write!(f, "<previous {}#{index}>", node.bundle.bundle_id());
        }
        write!(f, "{}#{index}{{", node.bundle.bundle_id())?;
        for (i, (_, edge)) in node.deps.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if edge.private_scope {
                write!(f, "<private>: ")?;
            }
            self.fmt_node(edge.node, f, added)?;
        }
        write!(f, "}}")
    }
}
