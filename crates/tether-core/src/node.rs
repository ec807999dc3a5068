// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module nodes - the unit of the dependency graph
//!
//! A node owns its forward edges (`dependencies`) and the working set of
//! dependencies it is still waiting for. Back-edges live in the
//! [`Registry`](crate::Registry) as a reverse index of ids, so nodes never
//! hold references to one another.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::deferred::{Deferred, ModuleFuture};
use crate::error::LoadError;
use crate::id::{ModuleId, NormalizedId};
use crate::kind::ResourceKind;
use crate::value::ModuleValue;

/// Factory producing a module's value from its dependencies' values, in
/// declaration order
pub type Factory = Arc<dyn Fn(&[ModuleValue]) -> ModuleValue + Send + Sync>;

/// Load state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// Known but never requested
    Unloaded,
    /// Fetch or factory evaluation in flight
    Loading,
    /// Resolved (terminal)
    Loaded,
    /// The node's own fetch failed (terminal for this attempt)
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One dependency specifier, optionally named
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    /// Key for map-style declarations
    pub name: Option<String>,
    /// Raw identifier
    pub id: String,
}

/// Dependency specifiers as accepted by `define`, `require` and friends.
///
/// Converts from a comma-separated string, a list of ids, or a
/// key -> id map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    specs: Vec<DependencySpec>,
}

impl Dependencies {
    /// No dependencies
    pub fn none() -> Self {
        Self::default()
    }

    /// Named dependencies, in the given order
    pub fn named<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            specs: entries
                .into_iter()
                .map(|(name, id)| DependencySpec {
                    name: Some(name.into()),
                    id: id.into(),
                })
                .collect(),
        }
    }

    /// Iterate over the specifiers
    pub fn iter(&self) -> impl Iterator<Item = &DependencySpec> {
        self.specs.iter()
    }

    /// Number of specifiers
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether there are no specifiers
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    fn from_ids<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Self {
        Self {
            specs: ids
                .into_iter()
                .map(|id| DependencySpec {
                    name: None,
                    id: id.into(),
                })
                .collect(),
        }
    }
}

impl From<&str> for Dependencies {
    fn from(list: &str) -> Self {
        Self::from_ids(list.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }
}

impl From<String> for Dependencies {
    fn from(list: String) -> Self {
        Self::from(list.as_str())
    }
}

impl From<Vec<&str>> for Dependencies {
    fn from(ids: Vec<&str>) -> Self {
        Self::from_ids(ids)
    }
}

impl From<Vec<String>> for Dependencies {
    fn from(ids: Vec<String>) -> Self {
        Self::from_ids(ids)
    }
}

impl From<&[&str]> for Dependencies {
    fn from(ids: &[&str]) -> Self {
        Self::from_ids(ids.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Dependencies {
    fn from(ids: [&str; N]) -> Self {
        Self::from_ids(ids)
    }
}

impl From<BTreeMap<String, String>> for Dependencies {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::named(map)
    }
}

impl From<Vec<(&str, &str)>> for Dependencies {
    fn from(entries: Vec<(&str, &str)>) -> Self {
        Self::named(entries)
    }
}

/// A node in the dependency graph
pub struct ModuleNode {
    id: ModuleId,
    kind: ResourceKind,
    url: String,
    aliases: BTreeSet<String>,
    dependencies: Vec<ModuleId>,
    pending: HashSet<ModuleId>,
    state: LoadState,
    factory: Option<Factory>,
    value: ModuleValue,
    failure: Option<LoadError>,
    /// A declaration supplied dependencies or a factory
    defined: bool,
    /// Factory evaluation has started
    resolving: bool,
    deferred: Deferred,
}

impl ModuleNode {
    /// Create an unloaded node
    pub fn new(id: &NormalizedId) -> Self {
        Self {
            id: id.canonical.clone(),
            kind: id.kind,
            url: id.url.clone(),
            aliases: BTreeSet::new(),
            dependencies: Vec::new(),
            pending: HashSet::new(),
            state: LoadState::Unloaded,
            factory: None,
            value: ModuleValue::Undefined,
            failure: None,
            defined: false,
            resolving: false,
            deferred: Deferred::new(id.canonical.as_str()),
        }
    }

    /// Canonical id
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Resource kind
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Fetch URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Alternate identifiers resolving to this node
    pub fn aliases(&self) -> &BTreeSet<String> {
        &self.aliases
    }

    /// Declared dependencies, in order
    pub fn dependencies(&self) -> &[ModuleId] {
        &self.dependencies
    }

    /// Dependencies not yet resolved
    pub fn pending(&self) -> &HashSet<ModuleId> {
        &self.pending
    }

    /// Current state
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Resolved value (`Undefined` until loaded)
    pub fn value(&self) -> &ModuleValue {
        &self.value
    }

    /// Why the last attempt failed
    pub fn failure(&self) -> Option<&LoadError> {
        self.failure.as_ref()
    }

    /// Whether a factory is attached
    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// Whether a declaration supplied dependencies or a factory
    pub fn is_defined(&self) -> bool {
        self.defined
    }

    /// Whether the node has loaded
    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    /// A future for the current load attempt
    pub fn future(&self) -> ModuleFuture {
        self.deferred.future()
    }

    pub(crate) fn add_alias(&mut self, alias: &str) {
        if alias != self.id.as_str() {
            self.aliases.insert(alias.to_string());
        }
    }

    pub(crate) fn set_kind(&mut self, kind: ResourceKind, url: String) {
        self.kind = kind;
        self.url = url;
    }

    /// Replace the dependency list. `pending` must only name entries of it.
    pub(crate) fn set_dependencies(&mut self, dependencies: Vec<ModuleId>, pending: HashSet<ModuleId>) {
        debug_assert!(pending.iter().all(|p| dependencies.contains(p)));
        self.dependencies = dependencies;
        self.pending = pending;
        self.defined = true;
    }

    /// Store the factory without evaluating it
    pub fn set_factory(&mut self, factory: Factory) {
        self.factory = Some(factory);
        self.defined = true;
    }

    /// Enter `Loading`, starting a fresh attempt after a failure.
    ///
    /// Returns `false` if the node was already loading or loaded.
    pub(crate) fn begin_loading(&mut self) -> bool {
        match self.state {
            LoadState::Loading | LoadState::Loaded => false,
            LoadState::Failed => {
                self.deferred = Deferred::new(self.id.as_str());
                self.failure = None;
                self.state = LoadState::Loading;
                true
            }
            LoadState::Unloaded => {
                self.state = LoadState::Loading;
                true
            }
        }
    }

    /// Drop `dependency` from the pending set.
    ///
    /// Returns `true` when this makes the node ready to resolve.
    pub fn notify_dependency_resolved(&mut self, dependency: &ModuleId) -> bool {
        let removed = self.pending.remove(dependency);
        removed && self.is_ready()
    }

    /// Whether every dependency has reported in and resolution has not started.
    ///
    /// A failed node is never ready; it leaves `Failed` only through a new
    /// load attempt.
    pub fn is_ready(&self) -> bool {
        self.pending.is_empty()
            && self.defined
            && !self.resolving
            && matches!(self.state, LoadState::Unloaded | LoadState::Loading)
    }

    /// Claim resolution; hands out the factory and arguments exactly once
    pub(crate) fn begin_resolve(&mut self) -> Option<Option<Factory>> {
        if !self.is_ready() {
            return None;
        }
        self.resolving = true;
        self.state = LoadState::Loading;
        Some(self.factory.clone())
    }

    /// Record the value and settle the attempt
    pub(crate) fn complete(&mut self, value: ModuleValue) {
        self.value = value.clone();
        self.state = LoadState::Loaded;
        self.pending.clear();
        self.resolving = false;
        self.failure = None;
        self.deferred.settle(Ok(value));
    }

    /// Record a failed attempt
    pub(crate) fn fail(&mut self, error: LoadError) {
        self.state = LoadState::Failed;
        self.resolving = false;
        self.failure = Some(error.clone());
        self.deferred.settle(Err(error));
    }

    /// Keep a fetched value for a declaration without a factory
    pub(crate) fn set_fetched_value(&mut self, value: ModuleValue) {
        self.value = value;
    }

    pub(crate) fn take_value(&mut self) -> ModuleValue {
        std::mem::take(&mut self.value)
    }
}

impl fmt::Debug for ModuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("dependencies", &self.dependencies)
            .field("pending", &self.pending.len())
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}
