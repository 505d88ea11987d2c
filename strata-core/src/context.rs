// strata-core/src/context.rs

//! The resolution context ties the configured lookup chain, the
//! environment constraints, and the realized-domain registry together.
//!
//! Resolved domains are cached per root bundle, and structurally equal
//! domains are materialized into at most one handle. Storage change
//! detection and handling run as a strict pair; between a detect and
//! its handle no other detect may run, and handling flushes every
//! cache before the storages apply their changes.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use strata_common::config::ConstraintConfiguration;
use strata_common::dependency::{BundleDependencyInformation, DependencyKind};
use strata_common::error::{Result, StrataError};
use strata_common::model::BundleKey;

use crate::domain::{Domain, DomainGraph};
use crate::lookup::LookupChain;
use crate::resolve::satisfy_dependency_domain;
use crate::storage::BundleStorageView;

/// Creates and wires the per-domain handles during materialization.
///
/// Instantiation and linking are separate phases so that cyclic
/// domains can be wired: every missing domain is instantiated first,
/// then each new handle is linked against the handles of its direct
/// dependencies, which by then all exist.
pub trait DomainHost<H> {
    fn instantiate(&self, domain: &Domain) -> Result<H>;

    /// Wires `handle` with the handles of the direct dependencies of
    /// `domain`, in declaration order, each with its private flag.
    fn link(&self, domain: &Domain, handle: &H, dependencies: &[(BundleKey, H, bool)])
        -> Result<()>;
}

/// Pairs a [`ResolutionContext::detect_changes`] call with the
/// [`ResolutionContext::handle_changes`] call that consumes it.
#[derive(Debug)]
pub struct ChangeToken(u64);

struct PendingChanges {
    next_token: u64,
    detected: Option<(u64, Vec<(Arc<dyn BundleStorageView>, Box<dyn Any + Send>)>)>,
}

struct ContextState {
    closed: bool,
}

/// A configured repository resolution context.
///
/// `H` is the handle type produced by materialization, typically an
/// `Arc` around whatever runtime structure backs a realized domain.
pub struct ResolutionContext<H> {
    chain: LookupChain,
    constraints: ConstraintConfiguration,
    /// Serializes domain construction and materialization; also owns
    /// the closed flag so no construction can complete after close.
    state: Mutex<ContextState>,
    domain_cache: RwLock<HashMap<BundleKey, Domain>>,
    registry: RwLock<HashMap<Domain, H>>,
    pending: Mutex<PendingChanges>,
}

impl<H: Clone> ResolutionContext<H> {
    pub fn new(chain: LookupChain, constraints: ConstraintConfiguration) -> Self {
        ResolutionContext {
            chain,
            constraints,
            state: Mutex::new(ContextState { closed: false }),
            domain_cache: RwLock::new(HashMap::new()),
            registry: RwLock::new(HashMap::new()),
            pending: Mutex::new(PendingChanges {
                next_token: 0,
                detected: None,
            }),
        }
    }

    pub fn lookup_chain(&self) -> &LookupChain {
        &self.chain
    }

    pub fn constraints(&self) -> &ConstraintConfiguration {
        &self.constraints
    }

    /// Resolves the isolation domain of the given versioned bundle,
    /// serving repeated requests for the same root from the cache.
    pub fn resolve_domain(&self, root: &BundleKey) -> Result<Domain> {
        self.check_open()?;
        if let Some(domain) = self.domain_cache.read().unwrap().get(root) {
            return Ok(domain.clone());
        }
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(StrataError::Closed);
        }
        if let Some(domain) = self.domain_cache.read().unwrap().get(root) {
            return Ok(domain.clone());
        }
        let domain = self.resolve_domain_impl(root)?;
        self.domain_cache
            .write()
            .unwrap()
            .insert(root.clone(), domain.clone());
        drop(state);
        Ok(domain)
    }

    fn resolve_domain_impl(&self, root: &BundleKey) -> Result<Domain> {
        if !root.bundle_id().has_version_qualifier() {
            return Err(StrataError::Config(format!(
                "versioned bundle required for domain resolution: {root}"
            )));
        }
        let relative = self.chain.find_storage_view(root.storage_view()).ok_or_else(|| {
            StrataError::Unavailable(format!("storage not found for bundle: {root}"))
        })?;
        let root_storage = self.storage_view_of(root)?;
        let root_info = root_storage.bundle_info(root.bundle_id())?;
        let base_info = self.classpath_dependencies(root_info.dependencies())?;

        // failures of individual candidates are collected and attached
        // to the final error when the whole resolution fails
        let causes = RefCell::new(Vec::new());
        let chain = &self.chain;
        let constraints = &self.constraints;

        let resolution = satisfy_dependency_domain(
            root.clone(),
            relative,
            &base_info,
            |ident, &lookup| match chain.lookup_versions(lookup, ident) {
                Some(found) => {
                    let view_key = found.storage_view.storage_view_key().clone();
                    let relative = found.relative;
                    found
                        .versions
                        .into_iter()
                        .map(|v| (BundleKey::new(view_key.clone(), v), relative))
                        .collect()
                }
                None => {
                    causes
                        .borrow_mut()
                        .push(StrataError::Unavailable(format!("bundle not found: {ident}")));
                    Vec::new()
                }
            },
            |key: &BundleKey, _lookup| {
                let info = match self
                    .storage_view_of(key)
                    .and_then(|s| s.bundle_info(key.bundle_id()))
                {
                    Ok(info) => info,
                    Err(e) => {
                        causes.borrow_mut().push(e);
                        return None;
                    }
                };
                if info.excluded_by(constraints) {
                    debug!(bundle = %key, "bundle excluded by environment constraints");
                    causes.borrow_mut().push(StrataError::Unavailable(format!(
                        "bundle excluded by environment constraints: {key}"
                    )));
                    return None;
                }
                match self.classpath_dependencies(info.dependencies()) {
                    Ok(deps) => Some(deps),
                    Err(e) => {
                        causes.borrow_mut().push(e);
                        None
                    }
                }
            },
        );

        let resolution = match resolution {
            Some(r) => r,
            None => {
                return Err(StrataError::unsatisfied(format!(
                    "failed to resolve dependency domain of {root}"
                ))
                .with_suppressed(causes.into_inner()))
            }
        };
        debug!(root = %root, bundles = resolution.len(), "dependency domain resolved");

        // privateness of the resulting edges comes from the full
        // declaration set, not the classpath-filtered one
        DomainGraph::from_resolution(&resolution, |key| {
            let storage = self.storage_view_of(key)?;
            Ok(storage.bundle_info(key.bundle_id())?.dependencies().clone())
        })
    }

    /// Realizes the domain through `host`, returning the existing
    /// handle when a structurally equal domain was realized before.
    pub fn materialize(&self, domain: &Domain, host: &dyn DomainHost<H>) -> Result<H> {
        self.check_open()?;
        if let Some(handle) = self.registry.read().unwrap().get(domain) {
            return Ok(handle.clone());
        }
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(StrataError::Closed);
        }
        let mut registry = self.registry.write().unwrap();
        if let Some(handle) = registry.get(domain) {
            return Ok(handle.clone());
        }

        let all = domain.all_domains();
        let mut created: HashMap<Domain, H> = HashMap::new();
        for d in &all {
            if registry.contains_key(d) || created.contains_key(d) {
                continue;
            }
            created.insert(d.clone(), host.instantiate(d)?);
        }
        for (d, handle) in &created {
            let mut dependencies = Vec::new();
            for (key, dep, private) in d.dependencies() {
                let dep_handle = created.get(&dep).or_else(|| registry.get(&dep)).ok_or_else(
                    || {
                        StrataError::Config(format!(
                            "dependency domain was not materialized: {}",
                            dep.bundle_key()
                        ))
                    },
                )?;
                dependencies.push((key.clone(), dep_handle.clone(), private));
            }
            host.link(d, handle, &dependencies)?;
        }
        for (d, handle) in created {
            registry.insert(d, handle);
        }
        let handle = registry.get(domain).cloned().ok_or_else(|| {
            StrataError::Config(format!(
                "domain was not materialized: {}",
                domain.bundle_key()
            ))
        })?;
        drop(registry);
        drop(state);
        Ok(handle)
    }

    /// Polls every configured storage for changes. `Ok(None)` when
    /// nothing changed; otherwise the returned token must be passed to
    /// [`ResolutionContext::handle_changes`] before the next detection.
    pub fn detect_changes(&self) -> Result<Option<ChangeToken>> {
        self.check_open()?;
        let mut pending = self.pending.lock().unwrap();
        if pending.detected.is_some() {
            return Err(StrataError::ChangeState(
                "previously detected changes have not been handled".into(),
            ));
        }
        let mut changes = Vec::new();
        for view in self.chain.storage_views() {
            if let Some(c) = view.detect_changes() {
                changes.push((Arc::clone(view), c));
            }
        }
        if changes.is_empty() {
            return Ok(None);
        }
        let token = pending.next_token;
        pending.next_token += 1;
        pending.detected = Some((token, changes));
        debug!(token, "storage changes detected");
        Ok(Some(ChangeToken(token)))
    }

    /// Applies previously detected changes: flushes the domain cache
    /// and the realized-domain registry, then lets every affected
    /// storage apply its own changes.
    pub fn handle_changes(&self, token: ChangeToken) -> Result<()> {
        self.check_open()?;
        let mut pending = self.pending.lock().unwrap();
        let (id, changes) = pending.detected.take().ok_or_else(|| {
            StrataError::ChangeState("no detected changes to handle".into())
        })?;
        if id != token.0 {
            pending.detected = Some((id, changes));
            return Err(StrataError::ChangeState(
                "change token does not match the detected changes".into(),
            ));
        }
        drop(pending);

        self.domain_cache.write().unwrap().clear();
        self.registry.write().unwrap().clear();
        for (view, c) in changes {
            view.handle_changes(c);
        }
        debug!(token = id, "storage changes handled, caches flushed");
        Ok(())
    }

    /// Closes the context. Every cache is dropped and all later
    /// resolution or materialization requests fail with
    /// [`StrataError::Closed`].
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        self.domain_cache.write().unwrap().clear();
        self.registry.write().unwrap().clear();
    }

    fn check_open(&self) -> Result<()> {
        if self.state.lock().unwrap().closed {
            return Err(StrataError::Closed);
        }
        Ok(())
    }

    fn storage_view_of(&self, key: &BundleKey) -> Result<&Arc<dyn BundleStorageView>> {
        self.chain
            .storage_id_for(key.storage_view())
            .and_then(|id| self.chain.storage_view_for_id(id))
            .ok_or_else(|| {
                StrataError::Unavailable(format!("storage not found for bundle: {key}"))
            })
    }

    fn classpath_dependencies(
        &self,
        info: &BundleDependencyInformation,
    ) -> Result<BundleDependencyInformation> {
        let mut failure = None;
        let filtered = info.filter(|_, d| {
            if !d.kinds().contains(DependencyKind::CLASSPATH) {
                return None;
            }
            match self.constraints.excludes_dependency(d) {
                Ok(true) => None,
                Ok(false) => Some(d.clone()),
                Err(e) => {
                    failure = Some(e);
                    None
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(filtered),
        }
    }
}
