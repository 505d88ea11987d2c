// strata-core/src/resolve/resolver.rs

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use tracing::{debug, warn};

use strata_common::dependency::{BundleDependencyInformation, BundleDependencyList};
use strata_common::model::BundleIdentifier;

use super::{BundleIdentifierHolder, DomainResolution, ResolutionNode};

/// Resolves the dependency domain of the given bundle.
///
/// The base bundle must carry a version qualifier. `base_dependency_info`
/// is its (already constraint-filtered) dependency declaration set.
/// `lookup_versions` returns the candidate bundles for a versionless
/// identifier in version descending order, each with the context its
/// own dependencies must be resolved against. `lookup_dependencies`
/// returns the declarations of a concrete bundle, or `None` when the
/// bundle cannot be loaded, which disqualifies that candidate.
///
/// Resolution walks the declarations depth first, pinning the newest
/// candidate that satisfies every shared constraint on its logical
/// name and backtracking over earlier choices on conflict. A
/// dependency whose declarations are all private is resolved in a
/// fresh scope that starts from the current pin snapshot; equal
/// private scopes are resolved once and shared. Required declarations
/// are satisfied first; optional ones are then resolved iteratively to
/// a fixed point, and their failures are ignored.
///
/// Returns `None` when no consistent assignment exists.
pub fn satisfy_dependency_domain<K, C>(
    base_bundle: K,
    base_context: C,
    base_dependency_info: &BundleDependencyInformation,
    lookup_versions: impl FnMut(&BundleIdentifier, &C) -> Vec<(K, C)>,
    lookup_dependencies: impl FnMut(&K, &C) -> Option<BundleDependencyInformation>,
) -> Option<DomainResolution<K, C>>
where
    K: BundleIdentifierHolder + Clone + Eq + Ord + Hash,
    C: Clone + Eq + Ord + Hash,
{
    if !base_bundle.bundle_id().has_version_qualifier() {
        warn!(
            bundle = %base_bundle.bundle_id(),
            "dependency resolution requested for versionless bundle"
        );
        return None;
    }
    let base_entry = (base_bundle, base_context);

    let mut resolver = Resolver {
        lookup_versions,
        lookup_dependencies,
        versions_cache: HashMap::new(),
        deps_cache: HashMap::new(),
        plain_deps_cache: HashMap::new(),
        optional_having: HashMap::new(),
        arena: DomainArena { nodes: Vec::new() },
        private_scopes: HashMap::new(),
    };

    let base_plain = base_dependency_info.without_optionals();
    if base_dependency_info.has_optional() {
        resolver
            .optional_having
            .insert(base_entry.0.clone(), base_dependency_info.clone());
    }
    resolver
        .deps_cache
        .insert(base_entry.0.clone(), Some(base_dependency_info.clone()));
    resolver
        .plain_deps_cache
        .insert(base_entry.0.clone(), Some(base_plain.clone()));

    let root = resolver.arena.new_node(None, false, base_entry.clone());
    let mut base_state = BundleResolutionState::new(base_plain, base_entry);
    resolver.satisfy_bundle_version(root, &mut base_state);
    if base_state.back_tracking {
        debug!(bundle = %resolver.arena.node(root).entry.0.bundle_id(), "dependency resolution failed");
        return None;
    }

    resolver.resolve_optionals(root);

    let mut nodes = Vec::new();
    let mut created = HashMap::new();
    build_resolution(
        &resolver.arena,
        &resolver.deps_cache,
        root,
        &mut created,
        &mut nodes,
    );
    Some(DomainResolution { nodes })
}

type NodeId = usize;

struct Resolver<K, C, LV, LD> {
    lookup_versions: LV,
    lookup_dependencies: LD,
    versions_cache: HashMap<(BundleIdentifier, C), Vec<(K, C)>>,
    /// Full declarations per bundle, optionals included.
    deps_cache: HashMap<K, Option<BundleDependencyInformation>>,
    /// Declarations with optionals stripped; what the required pass
    /// resolves against.
    plain_deps_cache: HashMap<K, Option<BundleDependencyInformation>>,
    optional_having: HashMap<K, BundleDependencyInformation>,
    arena: DomainArena<K, C>,
    private_scopes: HashMap<PrivateScopeKey<K, C>, NodeId>,
}

impl<K, C, LV, LD> Resolver<K, C, LV, LD>
where
    K: BundleIdentifierHolder + Clone + Eq + Ord + Hash,
    C: Clone + Eq + Ord + Hash,
    LV: FnMut(&BundleIdentifier, &C) -> Vec<(K, C)>,
    LD: FnMut(&K, &C) -> Option<BundleDependencyInformation>,
{
    fn cached_versions(&mut self, ident: &BundleIdentifier, context: &C) -> Vec<(K, C)> {
        let key = (ident.clone(), context.clone());
        if let Some(cached) = self.versions_cache.get(&key) {
            return cached.clone();
        }
        let looked_up = (self.lookup_versions)(ident, context);
        self.versions_cache.insert(key, looked_up.clone());
        looked_up
    }

    fn cached_plain_deps(&mut self, bundle: &K, context: &C) -> Option<BundleDependencyInformation> {
        if let Some(cached) = self.plain_deps_cache.get(bundle) {
            return cached.clone();
        }
        let full = (self.lookup_dependencies)(bundle, context);
        if let Some(info) = &full {
            if info.has_optional() {
                self.optional_having.insert(bundle.clone(), info.clone());
            }
        }
        let plain = full.as_ref().map(BundleDependencyInformation::without_optionals);
        self.deps_cache.insert(bundle.clone(), full);
        self.plain_deps_cache.insert(bundle.clone(), plain.clone());
        plain
    }

    /// Resolves every pinned dependency slot of the bundle behind
    /// `brs`, backtracking over earlier slots on conflict. On return
    /// the state's backtracking flag tells whether the bundle version
    /// could be satisfied.
    fn satisfy_bundle_version(&mut self, domain: NodeId, brs: &mut BundleResolutionState<K, C>) {
        while let Some(mut deprs) = self.next_dependency_state(brs) {
            self.arena.unpin_backtrack(domain, &deprs.versionless);

            let dep_list = brs
                .dep_info
                .dependency_list(&deprs.versionless.0)
                .cloned()
                .unwrap_or_default();
            let private_scope = dep_list.is_all_private();
            let present = if private_scope {
                self.arena.private_pinned(domain, &deprs.versionless)
            } else {
                self.arena.pinned(domain, &deprs.versionless)
            };
            if let Some(present) = present {
                let satisfies = match self
                    .arena
                    .node(present)
                    .entry
                    .0
                    .bundle_id()
                    .version_number()
                {
                    Some(version) => dep_list
                        .dependencies()
                        .iter()
                        .all(|d| d.range().includes(version)),
                    None => false,
                };
                if !satisfies {
                    debug!(
                        dependency = %deprs.versionless.0,
                        pinned = %self.arena.node(present).entry.0.bundle_id(),
                        "pinned bundle does not satisfy declared range"
                    );
                    brs.start_backtrack();
                    continue;
                }
                self.arena.pin(domain, deprs.versionless.clone(), present);
                if !brs.back_tracking {
                    brs.record(deprs);
                }
                continue;
            }

            if self.satisfy(&mut deprs, domain, private_scope, &dep_list) {
                brs.clear_backtrack();
                brs.record(deprs);
            } else {
                brs.start_backtrack();
            }
        }
    }

    /// Tries candidate versions for one dependency slot until the
    /// subtree below one of them resolves.
    fn satisfy(
        &mut self,
        state: &mut DependencyResolutionState<K, C>,
        domain: NodeId,
        private_scope: bool,
        dep_list: &BundleDependencyList,
    ) -> bool {
        while let Some(mut candidate_state) = self.next_bundle(state) {
            let use_node;
            if private_scope {
                let scope_key = PrivateScopeKey {
                    pin_snapshot: self.arena.private_pin_snapshot(domain),
                    entry: self.arena.node(domain).entry.clone(),
                    dep_list: dep_list.clone(),
                };
                if !candidate_state.back_tracking {
                    // a previous resolution of the same private scope
                    // is reused wholesale, unless we got here by
                    // backtracking into it
                    if let Some(&memoized) = self.private_scopes.get(&scope_key) {
                        self.arena.pin(domain, state.versionless.clone(), memoized);
                        return true;
                    }
                }
                use_node =
                    self.arena
                        .new_node(Some(domain), true, candidate_state.entry.clone());
                self.private_scopes.insert(scope_key, use_node);
            } else {
                use_node =
                    self.arena
                        .new_node(Some(domain), false, candidate_state.entry.clone());
            }
            self.arena.pin(domain, state.versionless.clone(), use_node);

            self.satisfy_bundle_version(use_node, &mut candidate_state);
            if !candidate_state.back_tracking {
                // keep the state so backtracking can resume here
                state.stored_state = Some(Box::new(candidate_state));
                return true;
            }
            self.arena.unpin(domain, &state.versionless, use_node);
        }
        false
    }

    fn next_dependency_state(
        &mut self,
        brs: &mut BundleResolutionState<K, C>,
    ) -> Option<DependencyResolutionState<K, C>> {
        if brs.back_tracking {
            let state = brs.backtrack.pop()?;
            brs.pos -= 1;
            return Some(state);
        }
        while brs.pos < brs.entries.len() {
            let (ident, list) = brs.entries[brs.pos].clone();
            brs.pos += 1;
            if list.is_empty() {
                continue;
            }
            let context = brs.entry.1.clone();
            let candidates = self.cached_versions(&ident, &context);
            return Some(DependencyResolutionState {
                versionless: (ident, context),
                candidates,
                next_candidate: 0,
                dep_list: list,
                stored_state: None,
            });
        }
        None
    }

    /// Advances to the next candidate that satisfies every declared
    /// range of the slot and whose dependencies can be loaded.
    fn next_bundle(
        &mut self,
        state: &mut DependencyResolutionState<K, C>,
    ) -> Option<BundleResolutionState<K, C>> {
        if let Some(mut stored) = state.stored_state.take() {
            // resume backtracking inside the previously chosen bundle
            stored.back_tracking = true;
            return Some(*stored);
        }
        while state.next_candidate < state.candidates.len() {
            let candidate = state.candidates[state.next_candidate].clone();
            state.next_candidate += 1;
            let Some(version) = candidate.0.bundle_id().version_number().map(str::to_owned)
            else {
                continue;
            };
            if !state
                .dep_list
                .dependencies()
                .iter()
                .all(|d| d.range().includes(&version))
            {
                debug!(
                    dependency = %state.versionless.0,
                    candidate = %candidate.0.bundle_id(),
                    "candidate version out of declared range"
                );
                continue;
            }
            let Some(deps) = self.cached_plain_deps(&candidate.0, &candidate.1) else {
                continue;
            };
            return Some(BundleResolutionState::new(deps, candidate));
        }
        None
    }

    /// Second pass: resolve optional declarations of every bundle in
    /// the domain until no pass adds anything. Failures are ignored.
    fn resolve_optionals(&mut self, root: NodeId) {
        let mut checked: HashSet<NodeId> = HashSet::new();
        loop {
            let mut had_change = false;
            for node in self.arena.total_domain(root) {
                if !checked.insert(node) {
                    continue;
                }
                let Some(optional_info) =
                    self.optional_having.get(&self.arena.node(node).entry.0).cloned()
                else {
                    continue;
                };
                for (ident, list) in optional_info.entries() {
                    if !list.has_optional() {
                        continue;
                    }
                    let only = list.only_optionals();
                    let Ok(single) = BundleDependencyInformation::create(
                        None,
                        vec![(ident.clone(), only)],
                    ) else {
                        continue;
                    };
                    let mut state =
                        BundleResolutionState::new(single, self.arena.node(node).entry.clone());
                    self.satisfy_bundle_version(node, &mut state);
                    if !state.back_tracking {
                        had_change = true;
                    }
                }
            }
            if !had_change {
                break;
            }
        }
    }
}

/// Memo key for a private dependency scope: what is visible at its
/// opening (the pin snapshot), who declares it, and the exact
/// declaration list.
#[derive(PartialEq, Eq, Hash)]
struct PrivateScopeKey<K, C> {
    pin_snapshot: BTreeSet<(K, C)>,
    entry: (K, C),
    dep_list: BundleDependencyList,
}

/// Mutable resolution graph. Nodes are never removed; pins are the
/// edges and get retracted on backtracking.
struct DomainArena<K, C> {
    nodes: Vec<DomainNode<K, C>>,
}

struct DomainNode<K, C> {
    parent: Option<NodeId>,
    private_parent: bool,
    entry: (K, C),
    deps: Vec<NodeId>,
    versionless: HashMap<(BundleIdentifier, C), NodeId>,
}

impl<K, C> DomainArena<K, C>
where
    K: BundleIdentifierHolder + Clone + Eq + Ord + Hash,
    C: Clone + Eq + Ord + Hash,
{
    fn new_node(&mut self, parent: Option<NodeId>, private_parent: bool, entry: (K, C)) -> NodeId {
        self.nodes.push(DomainNode {
            parent,
            private_parent,
            entry,
            deps: Vec::new(),
            versionless: HashMap::new(),
        });
        self.nodes.len() - 1
    }

    fn node(&self, id: NodeId) -> &DomainNode<K, C> {
        &self.nodes[id]
    }

    fn pin(&mut self, node: NodeId, versionless: (BundleIdentifier, C), dep: NodeId) {
        let n = &mut self.nodes[node];
        if n.deps.contains(&dep) {
            return;
        }
        debug_assert!(!n.versionless.contains_key(&versionless));
        n.deps.push(dep);
        n.versionless.insert(versionless, dep);
    }

    fn unpin(&mut self, node: NodeId, versionless: &(BundleIdentifier, C), dep: NodeId) {
        let n = &mut self.nodes[node];
        n.versionless.remove(versionless);
        n.deps.retain(|&d| d != dep);
    }

    fn unpin_backtrack(&mut self, node: NodeId, versionless: &(BundleIdentifier, C)) {
        let n = &mut self.nodes[node];
        if let Some(dep) = n.versionless.remove(versionless) {
            n.deps.retain(|&d| d != dep);
        }
    }

    /// The pinned resolution visible from `node` for a logical name in
    /// the shared scope, skipping over private subtrees of others.
    fn pinned(&self, node: NodeId, versionless: &(BundleIdentifier, C)) -> Option<NodeId> {
        let n = &self.nodes[node];
        if n.private_parent {
            let parent = n.parent?;
            return self.find_pinned(parent, versionless, &mut HashSet::new(), false);
        }
        if let Some(parent) = n.parent {
            return self.pinned(parent, versionless);
        }
        self.find_pinned(node, versionless, &mut HashSet::new(), false)
    }

    /// Like [`Self::pinned`] but anchored at the private scope itself.
    fn private_pinned(&self, node: NodeId, versionless: &(BundleIdentifier, C)) -> Option<NodeId> {
        self.find_pinned(node, versionless, &mut HashSet::new(), false)
    }

    fn find_pinned(
        &self,
        node: NodeId,
        versionless: &(BundleIdentifier, C),
        searched: &mut HashSet<NodeId>,
        ignore_private: bool,
    ) -> Option<NodeId> {
        if !searched.insert(node) {
            return None;
        }
        let n = &self.nodes[node];
        if n.entry.0.bundle_id().without_meta_qualifiers() == versionless.0
            && n.entry.1 == versionless.1
        {
            return Some(node);
        }
        if let Some(&dep) = n.versionless.get(versionless) {
            if !ignore_private || !self.nodes[dep].private_parent {
                return Some(dep);
            }
        }
        for &dep in &n.deps {
            if ignore_private && self.nodes[dep].private_parent {
                continue;
            }
            if let Some(found) = self.find_pinned(dep, versionless, searched, true) {
                return Some(found);
            }
        }
        None
    }

    /// The bundle entries visible when a private scope opens under
    /// `node`: the node itself and everything reachable without
    /// crossing a deeper private edge.
    fn private_pin_snapshot(&self, node: NodeId) -> BTreeSet<(K, C)> {
        let mut result = BTreeSet::new();
        self.collect_snapshot(node, &mut result, true);
        result
    }

    fn collect_snapshot(&self, node: NodeId, result: &mut BTreeSet<(K, C)>, include_privates: bool) {
        if !result.insert(self.nodes[node].entry.clone()) {
            return;
        }
        for &dep in &self.nodes[node].deps {
            if !include_privates && self.nodes[dep].private_parent {
                continue;
            }
            self.collect_snapshot(dep, result, false);
        }
    }

    /// Every node reachable from `root`, preorder.
    fn total_domain(&self, root: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        self.collect_total(root, &mut result, &mut visited);
        result
    }

    fn collect_total(&self, node: NodeId, result: &mut Vec<NodeId>, visited: &mut HashSet<NodeId>) {
        if !visited.insert(node) {
            return;
        }
        result.push(node);
        for &dep in &self.nodes[node].deps {
            self.collect_total(dep, result, visited);
        }
    }
}

/// Resolution state of one chosen bundle version: walks its dependency
/// slots, keeping the per-slot states for backtracking.
struct BundleResolutionState<K, C> {
    dep_info: BundleDependencyInformation,
    entries: Vec<(BundleIdentifier, BundleDependencyList)>,
    pos: usize,
    backtrack: Vec<DependencyResolutionState<K, C>>,
    back_tracking: bool,
    entry: (K, C),
}

impl<K, C> BundleResolutionState<K, C>
where
    K: Clone,
    C: Clone,
{
    fn new(dep_info: BundleDependencyInformation, entry: (K, C)) -> Self {
        let entries = dep_info
            .entries()
            .map(|(i, l)| (i.clone(), l.clone()))
            .collect();
        BundleResolutionState {
            dep_info,
            entries,
            pos: 0,
            backtrack: Vec::new(),
            back_tracking: false,
            entry,
        }
    }

    fn record(&mut self, state: DependencyResolutionState<K, C>) {
        self.backtrack.push(state);
    }

    fn start_backtrack(&mut self) {
        if !self.back_tracking {
            self.back_tracking = true;
            self.pos -= 1;
        }
    }

    fn clear_backtrack(&mut self) {
        if self.back_tracking {
            self.back_tracking = false;
            self.pos += 1;
        }
    }
}

/// Resolution state of one dependency slot: the candidate list and
/// where we are in it, plus the stored substate of the last successful
/// choice for resumption.
struct DependencyResolutionState<K, C> {
    versionless: (BundleIdentifier, C),
    candidates: Vec<(K, C)>,
    next_candidate: usize,
    dep_list: BundleDependencyList,
    stored_state: Option<Box<BundleResolutionState<K, C>>>,
}

fn build_resolution<K, C>(
    arena: &DomainArena<K, C>,
    deps_cache: &HashMap<K, Option<BundleDependencyInformation>>,
    node: NodeId,
    created: &mut HashMap<NodeId, usize>,
    nodes: &mut Vec<ResolutionNode<K, C>>,
) -> usize
where
    K: BundleIdentifierHolder + Clone + Eq + Ord + Hash,
    C: Clone + Eq + Ord + Hash,
{
    if let Some(&idx) = created.get(&node) {
        return idx;
    }
    let idx = nodes.len();
    nodes.push(ResolutionNode {
        entry: arena.node(node).entry.clone(),
        dependencies: Vec::new(),
    });
    created.insert(node, idx);

    if let Some(Some(info)) = deps_cache.get(&arena.node(node).entry.0) {
        for (ident, _) in info.entries() {
            // an unresolved optional has no pinned node; skip it
            let child = arena
                .node(node)
                .deps
                .iter()
                .copied()
                .find(|&d| &arena.node(d).entry.0.bundle_id().without_meta_qualifiers() == ident);
            if let Some(child) = child {
                let child_idx = build_resolution(arena, deps_cache, child, created, nodes);
                nodes[idx].dependencies.push(child_idx);
            }
        }
    }
    idx
}
