// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resolution engine
//!
//! The [`Loader`] drives nodes through their lifecycle. Every public
//! operation takes the registry lock once, mutates the graph, and collects
//! the follow-up work (fetches to dispatch, factories to run, waiters to
//! fire). The lock is released before that work runs, so factories,
//! callbacks and scripts may call back into the loader.
//!
//! Resolution is driven by pending counts: completing a node notifies its
//! dependents, and a dependent whose pending set empties is resolved on
//! the same turn. Nothing is retried, and a cycle simply never drains.

use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::LoaderConfig;
use crate::deferred::{Deferred, ModuleFuture};
use crate::error::{FetchError, LoadError, LoaderError, Result};
use crate::fetcher::ResourceFetcher;
use crate::id::{ModuleId, NormalizedId};
use crate::kind::ResourceKind;
use crate::node::{Dependencies, Factory, LoadState, ModuleNode};
use crate::registry::{Callback, Ready, Registry, ResolvedBy, WaiterId};
use crate::value::ModuleValue;

/// Work collected under the lock and run after it is released
#[derive(Debug)]
pub(crate) enum Step {
    Fetch {
        id: ModuleId,
        url: String,
        kind: ResourceKind,
    },
    Resolve(ModuleId),
    Fire(WaiterId),
}

impl From<Ready> for Step {
    fn from(ready: Ready) -> Self {
        match ready {
            Ready::Module(id) => Step::Resolve(id),
            Ready::Waiter(waiter) => Step::Fire(waiter),
        }
    }
}

/// Snapshot of a node, as returned by [`Loader::get`]
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInfo {
    /// Canonical id
    pub id: ModuleId,
    /// Resource kind
    pub kind: ResourceKind,
    /// Fetch URL
    pub url: String,
    /// Load state
    pub state: LoadState,
    /// Alternate identifiers
    pub aliases: Vec<String>,
    /// Declared dependencies, in order
    pub dependencies: Vec<ModuleId>,
    /// Dependencies still awaited, sorted
    pub pending: Vec<ModuleId>,
    /// Resolved value
    pub value: ModuleValue,
    /// Failure of the last attempt
    pub failure: Option<LoadError>,
}

impl From<&ModuleNode> for ModuleInfo {
    fn from(node: &ModuleNode) -> Self {
        let pending: BTreeSet<_> = node.pending().iter().cloned().collect();
        Self {
            id: node.id().clone(),
            kind: node.kind(),
            url: node.url().to_string(),
            state: node.state(),
            aliases: node.aliases().iter().cloned().collect(),
            dependencies: node.dependencies().to_vec(),
            pending: pending.into_iter().collect(),
            value: node.value().clone(),
            failure: node.failure().cloned(),
        }
    }
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {} {}", self.id, self.state, self.kind, self.url)?;
        if !self.pending.is_empty() {
            let pending: Vec<_> = self.pending.iter().map(ModuleId::as_str).collect();
            write!(f, " waiting on {}", pending.join(", "))?;
        }
        if let Some(failure) = &self.failure {
            write!(f, " ({})", failure)?;
        }
        Ok(())
    }
}

struct LoaderInner {
    registry: Mutex<Registry>,
    fetcher: Arc<dyn ResourceFetcher>,
    config: LoaderConfig,
    fetch_limit: Option<Arc<Semaphore>>,
    runtime: Option<Handle>,
}

/// Module loader: a shared handle to one registry and its fetcher.
///
/// Cloning is cheap; every clone sees the same graph.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
}

impl Loader {
    /// Create a loader with default configuration
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self::with_config(LoaderConfig::default(), fetcher)
    }

    /// Create a loader from configuration.
    ///
    /// Fetches are spawned on the Tokio runtime current at construction,
    /// or on the caller's runtime when the loader was built outside one.
    pub fn with_config(config: LoaderConfig, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        let fetch_limit = match config.max_concurrent_fetches {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        Self {
            inner: Arc::new(LoaderInner {
                registry: Mutex::new(Registry::with_config(&config)),
                fetcher,
                config,
                fetch_limit,
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    /// Loader configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Run `f` against the registry.
    ///
    /// The lock is held for the duration; `f` must not call back into
    /// the loader.
    pub fn with_registry<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
        f(&self.inner.registry.lock())
    }

    /// Normalize an identifier against the current prefix table
    pub fn normalize(&self, raw: &str) -> Result<NormalizedId> {
        self.inner.registry.lock().normalize(raw)
    }

    /// Register a prefix substitution
    pub fn set_prefix(&self, name: &str, value: &str) {
        self.inner.registry.lock().normalizer_mut().set_prefix(name, value);
    }

    /// Register several prefix substitutions
    pub fn set_prefixes<K, V>(&self, prefixes: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut registry = self.inner.registry.lock();
        for (name, value) in prefixes {
            registry
                .normalizer_mut()
                .set_prefix(name.as_ref(), value.as_ref());
        }
    }

    /// Set or clear the cache-busting token for URLs computed from now on
    pub fn set_cache_token(&self, token: Option<String>) {
        self.inner.registry.lock().normalizer_mut().set_cache_token(token);
    }

    /// Snapshot of a node, creating it on first reference
    pub fn get(&self, id: &str) -> Result<ModuleInfo> {
        let mut registry = self.inner.registry.lock();
        let node = registry.get(id)?;
        Ok(ModuleInfo::from(node))
    }

    /// Whether every identifier has loaded (true for none)
    pub fn are_loaded(&self, deps: impl Into<Dependencies>) -> Result<bool> {
        self.inner.registry.lock().are_loaded(&deps.into())
    }

    /// Identifiers that have not loaded
    pub fn get_unloaded(&self, deps: impl Into<Dependencies>) -> Result<Vec<ModuleId>> {
        self.inner.registry.lock().get_unloaded(&deps.into())
    }

    /// Declare a module with a factory.
    ///
    /// The factory runs once every dependency has loaded, with their values
    /// in declaration order. Dependencies that are not loaded yet are
    /// requested. With no outstanding dependencies the factory runs before
    /// this returns.
    pub fn define<F>(
        &self,
        id: &str,
        deps: impl Into<Dependencies>,
        factory: F,
    ) -> Result<ModuleFuture>
    where
        F: Fn(&[ModuleValue]) -> ModuleValue + Send + Sync + 'static,
    {
        self.define_with(id, deps.into(), Some(Arc::new(factory)))
    }

    /// Declare a module without a factory; it resolves to its current value
    /// once its dependencies have loaded.
    pub fn declare(&self, id: &str, deps: impl Into<Dependencies>) -> Result<ModuleFuture> {
        self.define_with(id, deps.into(), None)
    }

    pub(crate) fn define_with(
        &self,
        id: &str,
        deps: Dependencies,
        factory: Option<Factory>,
    ) -> Result<ModuleFuture> {
        let mut steps = Vec::new();
        let future = {
            let mut registry = self.inner.registry.lock();
            let normalized = registry.normalize(id)?;
            for spec in deps.iter() {
                registry.normalize(&spec.id)?;
            }

            let node_id = registry.ensure(&normalized);
            if registry.is_loaded(&node_id) {
                warn!(module = %node_id, "Module already loaded; ignoring redefinition");
                return Ok(self.future_of(&registry, &node_id));
            }

            let unresolved = registry.set_dependencies(&node_id, &deps)?;
            let Some(node) = registry.node_mut(&node_id) else {
                return Err(LoaderError::NotRegistered(node_id.to_string()));
            };
            if let Some(factory) = factory {
                node.set_factory(factory);
            }
            node.begin_loading();
            let future = node.future();
            debug!(
                module = %node_id,
                dependencies = deps.len(),
                unresolved = unresolved.len(),
                "Module defined"
            );

            if unresolved.is_empty() {
                steps.push(Step::Resolve(node_id));
            } else {
                for dep in &unresolved {
                    self.load_locked(&mut registry, dep, false, &mut steps);
                }
            }
            future
        };
        self.run(steps);
        Ok(future)
    }

    /// Request modules and wait for all of them.
    ///
    /// The future resolves to a [`ModuleValue::List`] of their values in
    /// the given order. An empty request settles before this returns.
    pub fn require(&self, deps: impl Into<Dependencies>) -> Result<ModuleFuture> {
        self.require_inner(deps.into(), None)
    }

    /// Request modules and run `callback` with their values once all have
    /// loaded; the future resolves to what the callback returns.
    pub fn require_with<F>(&self, deps: impl Into<Dependencies>, callback: F) -> Result<ModuleFuture>
    where
        F: FnOnce(&[ModuleValue]) -> ModuleValue + Send + 'static,
    {
        self.require_inner(deps.into(), Some(Box::new(callback)))
    }

    fn require_inner(&self, deps: Dependencies, callback: Option<Callback>) -> Result<ModuleFuture> {
        let mut steps = Vec::new();
        let future = {
            let mut registry = self.inner.registry.lock();
            let ids = registry.get_all(&deps)?;
            let unloaded = registry.get_unloaded(&deps)?;

            let label: Vec<_> = ids.iter().map(ModuleId::as_str).collect();
            let deferred = Deferred::new(&format!("require({})", label.join(", ")));
            let future = deferred.future();
            let waiter = registry.add_waiter(ids, unloaded.clone(), callback, deferred);

            if unloaded.is_empty() {
                steps.push(Step::Fire(waiter));
            } else {
                debug!(?waiter, unloaded = unloaded.len(), "Waiting on modules");
                for id in &unloaded {
                    self.load_locked(&mut registry, id, false, &mut steps);
                }
            }
            future
        };
        self.run(steps);
        Ok(future)
    }

    /// Load a module.
    ///
    /// Returns the existing future when the module is loading or loaded,
    /// or when its last attempt failed (see [`reload`](Self::reload)).
    pub fn load(&self, id: &str) -> Result<ModuleFuture> {
        self.load_inner(id, false)
    }

    /// Load a module, starting a fresh attempt if the last one failed.
    ///
    /// Dependents that were waiting on the failed module pick up the new
    /// attempt's result.
    pub fn reload(&self, id: &str) -> Result<ModuleFuture> {
        self.load_inner(id, true)
    }

    fn load_inner(&self, id: &str, retry: bool) -> Result<ModuleFuture> {
        let mut steps = Vec::new();
        let future = {
            let mut registry = self.inner.registry.lock();
            let node_id = registry.materialize(id)?;
            if retry && registry.node(&node_id).map(ModuleNode::state) == Some(LoadState::Failed) {
                info!(module = %node_id, "Retrying failed module");
            }
            self.load_locked(&mut registry, &node_id, retry, &mut steps);
            self.future_of(&registry, &node_id)
        };
        self.run(steps);
        Ok(future)
    }

    fn future_of(&self, registry: &Registry, id: &ModuleId) -> ModuleFuture {
        match registry.node(id) {
            Some(node) => node.future(),
            None => Deferred::settled(id.as_str(), Err(LoadError::Abandoned(id.to_string()))).future(),
        }
    }

    /// Start loading a node. A no-op for nodes already loading or loaded,
    /// and for failed nodes unless `retry` is set.
    pub(crate) fn load_locked(
        &self,
        registry: &mut Registry,
        id: &ModuleId,
        retry: bool,
        steps: &mut Vec<Step>,
    ) {
        let bundle_packages = self.inner.config.bundle_packages;
        let Some(node) = registry.node_mut(id) else {
            return;
        };
        if node.state() == LoadState::Failed && !retry {
            return;
        }
        if !node.begin_loading() {
            return;
        }

        if !node.is_defined() {
            debug!(module = %id, url = node.url(), kind = %node.kind(), "Loading module");
            steps.push(Step::Fetch {
                id: id.clone(),
                url: node.url().to_string(),
                kind: node.kind(),
            });
            return;
        }

        if node.kind() == ResourceKind::Package && bundle_packages && !node.pending().is_empty() {
            info!(package = %id, url = node.url(), "Fetching package bundle");
            steps.push(Step::Fetch {
                id: id.clone(),
                url: node.url().to_string(),
                kind: ResourceKind::Package,
            });
            return;
        }

        self.load_pending_locked(registry, id, steps);
    }

    /// Load every pending dependency of a declared node, resolving it
    /// straight away when nothing is pending
    pub(crate) fn load_pending_locked(
        &self,
        registry: &mut Registry,
        id: &ModuleId,
        steps: &mut Vec<Step>,
    ) {
        let Some(node) = registry.node(id) else {
            return;
        };
        if node.is_ready() {
            steps.push(Step::Resolve(id.clone()));
            return;
        }
        let pending: Vec<ModuleId> = node
            .dependencies()
            .iter()
            .filter(|dep| node.pending().contains(*dep))
            .cloned()
            .collect();
        for dep in &pending {
            self.load_locked(registry, dep, false, steps);
        }
    }

    /// Drain collected work. Runs with the registry unlocked.
    pub(crate) fn run(&self, steps: Vec<Step>) {
        let mut queue: VecDeque<Step> = steps.into();
        while let Some(step) = queue.pop_front() {
            match step {
                Step::Fetch { id, url, kind } => self.spawn_fetch(id, url, kind),
                Step::Resolve(id) => self.resolve(&id, &mut queue),
                Step::Fire(waiter) => self.fire(waiter),
            }
        }
    }

    /// Complete a node with `value` and queue whatever that made ready
    pub(crate) fn complete(
        &self,
        id: &ModuleId,
        value: ModuleValue,
        via: ResolvedBy,
        queue: &mut VecDeque<Step>,
    ) {
        let ready = self.inner.registry.lock().complete(id, value, via);
        queue.extend(ready.into_iter().map(Step::from));
    }

    fn resolve(&self, id: &ModuleId, queue: &mut VecDeque<Step>) {
        let (factory, args) = {
            let mut registry = self.inner.registry.lock();
            let Some(node) = registry.node_mut(id) else {
                return;
            };
            let Some(factory) = node.begin_resolve() else {
                return;
            };
            let Some(factory) = factory else {
                // Declared without a factory: the fetched value stands
                let value = node.take_value();
                drop(registry);
                if value.is_empty() {
                    error!(module = %id, "Module declared without a factory has no value");
                }
                self.complete(id, value, ResolvedBy::Resource, queue);
                return;
            };
            (factory, registry.dependency_values(id))
        };

        let value = factory(&args);
        if value.is_empty() {
            error!(module = %id, "Factory returned an empty value");
        }
        self.complete(id, value, ResolvedBy::Factory, queue);
    }

    fn fire(&self, waiter: WaiterId) {
        let Some((entry, values)) = self.inner.registry.lock().take_waiter(waiter) else {
            return;
        };
        let value = match entry.callback {
            Some(callback) => callback(&values),
            None => ModuleValue::List(values),
        };
        debug!(?waiter, "Require satisfied");
        entry.deferred.settle(Ok(value));
    }

    fn spawn_fetch(&self, id: ModuleId, url: String, kind: ResourceKind) {
        let runtime = self
            .inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok());
        let Some(runtime) = runtime else {
            warn!(module = %id, %url, "No async runtime available; cannot fetch");
            let mut registry = self.inner.registry.lock();
            if let Some(node) = registry.node_mut(&id) {
                node.fail(LoadError::NoRuntime { id: id.to_string() });
            }
            return;
        };

        debug!(module = %id, %url, %kind, "Dispatching fetch");
        let loader = self.clone();
        runtime.spawn(async move {
            let permit = match &loader.inner.fetch_limit {
                Some(limit) => limit.clone().acquire_owned().await.ok(),
                None => None,
            };
            let result = loader.inner.fetcher.fetch(&url, kind).await;
            drop(permit);
            loader.on_fetched(id, url, result);
        });
    }

    fn on_fetched(&self, id: ModuleId, url: String, result: std::result::Result<ModuleValue, FetchError>) {
        let mut steps = Vec::new();
        let mut completion = None;
        {
            let mut registry = self.inner.registry.lock();
            let Some(node) = registry.node_mut(&id) else {
                return;
            };
            if node.state() != LoadState::Loading {
                // Evaluation already declared and resolved it
                return;
            }
            let bundle = node.kind() == ResourceKind::Package && node.is_defined();

            match result {
                Ok(_) if bundle => {
                    info!(package = %id, "Bundle evaluated");
                    self.load_pending_locked(&mut registry, &id, &mut steps);
                }
                Ok(value) if node.is_defined() => {
                    debug!(module = %id, "Module declared itself during evaluation");
                    if !node.has_factory() {
                        node.set_fetched_value(value);
                    }
                    if node.is_ready() {
                        steps.push(Step::Resolve(id.clone()));
                    }
                }
                Ok(value) => completion = Some(value),
                Err(err) if bundle => {
                    warn!(
                        package = %id,
                        %url,
                        error = %err,
                        "Bundle fetch failed; loading members individually"
                    );
                    self.load_pending_locked(&mut registry, &id, &mut steps);
                }
                Err(err) if node.is_defined() => {
                    warn!(
                        module = %id,
                        %url,
                        error = %err,
                        "Fetch failed; continuing with the existing declaration"
                    );
                    self.load_pending_locked(&mut registry, &id, &mut steps);
                }
                Err(err) => {
                    warn!(module = %id, %url, error = %err, "Fetch failed");
                    node.fail(LoadError::Fetch {
                        id: id.to_string(),
                        url,
                        source: err,
                    });
                }
            }
        }

        if let Some(value) = completion {
            let mut queue = VecDeque::new();
            self.complete(&id, value, ResolvedBy::Resource, &mut queue);
            steps.extend(queue);
        }
        self.run(steps);
    }

    /// Lock the registry for a package or preload operation
    pub(crate) fn registry(&self) -> parking_lot::MutexGuard<'_, Registry> {
        self.inner.registry.lock()
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.lock();
        f.debug_struct("Loader")
            .field("modules", &registry.len())
            .field("waiters", &registry.pending_waiters())
            .field("bundle_packages", &self.inner.config.bundle_packages)
            .finish()
    }
}
