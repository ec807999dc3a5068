// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry
//!
//! Maps canonical ids to nodes, holds the alias table, the reverse
//! dependents index and the chronological resolution log. The registry is
//! a plain value: the [`Loader`](crate::Loader) owns one behind a mutex and
//! every state change to the graph goes through it.

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

use crate::config::LoaderConfig;
use crate::deferred::Deferred;
use crate::error::{LoaderError, Result};
use crate::id::{ModuleId, NormalizedId, Normalizer};
use crate::node::{Dependencies, ModuleNode};
use crate::value::ModuleValue;

/// Callback run by an ad-hoc `require` once its modules have loaded
pub type Callback = Box<dyn FnOnce(&[ModuleValue]) -> ModuleValue + Send>;

/// Identifier of an ephemeral `require` waiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaiterId(pub u64);

/// Something that declared a node as a dependency
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependent {
    /// A module node
    Module(ModuleId),
    /// A pending `require`
    Waiter(WaiterId),
}

/// How a node came to be loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    /// Its factory ran (or it was declared without one)
    Factory,
    /// Its fetched resource became the value
    Resource,
    /// A preloaded value was supplied
    Preloaded,
}

/// One entry in the resolution log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionEntry {
    /// Position in the log
    pub sequence: usize,
    /// Module that loaded
    pub id: ModuleId,
    /// How it loaded
    pub via: ResolvedBy,
}

/// Work made ready by a completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Ready {
    Module(ModuleId),
    Waiter(WaiterId),
}

/// An ephemeral dependent registered by `require`
pub(crate) struct Waiter {
    /// Requested modules, in the caller's order
    pub(crate) ids: Vec<ModuleId>,
    remaining: HashSet<ModuleId>,
    pub(crate) callback: Option<Callback>,
    pub(crate) deferred: Deferred,
}

/// The module registry
pub struct Registry {
    normalizer: Normalizer,
    nodes: HashMap<ModuleId, ModuleNode>,
    /// Alias -> canonical target
    aliases: HashMap<ModuleId, ModuleId>,
    /// Dependency -> everything waiting on it
    dependents: HashMap<ModuleId, BTreeSet<Dependent>>,
    waiters: HashMap<WaiterId, Waiter>,
    next_waiter: u64,
    log: Vec<ResolutionEntry>,
}

impl Registry {
    /// Create an empty registry
    pub fn new(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            nodes: HashMap::new(),
            aliases: HashMap::new(),
            dependents: HashMap::new(),
            waiters: HashMap::new(),
            next_waiter: 1,
            log: Vec::new(),
        }
    }

    /// Create an empty registry from loader configuration
    pub fn with_config(config: &LoaderConfig) -> Self {
        Self::new(Normalizer::from_config(config))
    }

    /// The identifier normalizer
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Mutable access to the normalizer (prefix table, cache token)
    pub fn normalizer_mut(&mut self) -> &mut Normalizer {
        &mut self.normalizer
    }

    /// Normalize a raw identifier
    pub fn normalize(&self, raw: &str) -> Result<NormalizedId> {
        self.normalizer.normalize(raw)
    }

    /// Follow the alias table
    fn target(&self, canonical: &ModuleId) -> ModuleId {
        self.aliases
            .get(canonical)
            .cloned()
            .unwrap_or_else(|| canonical.clone())
    }

    /// Get or create the node for a normalized id
    pub(crate) fn ensure(&mut self, id: &NormalizedId) -> ModuleId {
        let target = self.target(&id.canonical);
        if !self.nodes.contains_key(&target) {
            debug!(module = %target, kind = %id.kind, "Registering module");
            self.nodes.insert(target.clone(), ModuleNode::new(id));
        }
        target
    }

    /// Normalize and materialize a node, returning its canonical id
    pub fn materialize(&mut self, raw: &str) -> Result<ModuleId> {
        let normalized = self.normalize(raw)?;
        Ok(self.ensure(&normalized))
    }

    /// Get the node for an identifier, creating it on first reference
    pub fn get(&mut self, raw: &str) -> Result<&ModuleNode> {
        let id = self.materialize(raw)?;
        self.nodes
            .get(&id)
            .ok_or_else(|| LoaderError::NotRegistered(id.to_string()))
    }

    /// Look up a node without creating it
    pub fn lookup(&self, raw: &str) -> Option<&ModuleNode> {
        let normalized = self.normalize(raw).ok()?;
        self.nodes.get(&self.target(&normalized.canonical))
    }

    /// Node by canonical id
    pub fn node(&self, id: &ModuleId) -> Option<&ModuleNode> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: &ModuleId) -> Option<&mut ModuleNode> {
        self.nodes.get_mut(id)
    }

    /// Materialize every specifier. Nothing is created if any fails to parse.
    pub fn get_all(&mut self, deps: &Dependencies) -> Result<Vec<ModuleId>> {
        let normalized = deps
            .iter()
            .map(|d| self.normalize(&d.id))
            .collect::<Result<Vec<_>>>()?;
        Ok(normalized.iter().map(|n| self.ensure(n)).collect())
    }

    /// Whether every specifier has loaded (true for an empty set)
    pub fn are_loaded(&mut self, deps: &Dependencies) -> Result<bool> {
        Ok(self.get_unloaded(deps)?.is_empty())
    }

    /// Specifiers that have not loaded, deduplicated, in order
    pub fn get_unloaded(&mut self, deps: &Dependencies) -> Result<Vec<ModuleId>> {
        let ids = self.get_all(deps)?;
        let mut seen = HashSet::new();
        Ok(ids
            .into_iter()
            .filter(|id| !self.is_loaded(id) && seen.insert(id.clone()))
            .collect())
    }

    /// Whether a node exists and has loaded
    pub fn is_loaded(&self, id: &ModuleId) -> bool {
        self.nodes.get(id).is_some_and(ModuleNode::is_loaded)
    }

    /// Register `alias` as another name for `target`.
    ///
    /// An alias already bound elsewhere, or naming a different existing
    /// node, is left alone with a warning. Returns whether the alias now
    /// resolves to `target`.
    pub fn alias(&mut self, alias: &str, target: &ModuleId) -> Result<bool> {
        let key = self.normalize(alias)?.canonical;
        if &key == target {
            return Ok(true);
        }
        if let Some(existing) = self.aliases.get(&key) {
            if existing != target {
                warn!(
                    alias = %key,
                    existing = %existing,
                    requested = %target,
                    "Alias already bound to another module; keeping existing"
                );
                return Ok(false);
            }
            return Ok(true);
        }
        if self.nodes.contains_key(&key) {
            warn!(
                alias = %key,
                requested = %target,
                "Alias names an existing module; keeping existing"
            );
            return Ok(false);
        }

        self.aliases.insert(key.clone(), target.clone());
        if let Some(node) = self.nodes.get_mut(target) {
            node.add_alias(key.as_str());
        }
        Ok(true)
    }

    /// Replace a node's dependency list.
    ///
    /// Every dependency is materialized and gains `id` as a dependent;
    /// back-edges from earlier declarations stay. Returns the dependencies
    /// that have not loaded, deduplicated, in declaration order.
    pub(crate) fn set_dependencies(
        &mut self,
        id: &ModuleId,
        deps: &Dependencies,
    ) -> Result<Vec<ModuleId>> {
        if !self.nodes.contains_key(id) {
            return Err(LoaderError::NotRegistered(id.to_string()));
        }
        let resolved = self.get_all(deps)?;

        for dep in &resolved {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(Dependent::Module(id.clone()));
        }

        let mut pending = HashSet::new();
        let mut unresolved = Vec::new();
        for dep in &resolved {
            if !self.is_loaded(dep) && pending.insert(dep.clone()) {
                unresolved.push(dep.clone());
            }
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.set_dependencies(resolved, pending);
        }
        Ok(unresolved)
    }

    /// Everything that declared `id` as a dependency
    pub fn dependents_of(&self, id: &ModuleId) -> Vec<Dependent> {
        self.dependents
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Values of a node's dependencies, in declaration order
    pub(crate) fn dependency_values(&self, id: &ModuleId) -> Vec<ModuleValue> {
        self.nodes
            .get(id)
            .map(|node| {
                node.dependencies()
                    .iter()
                    .map(|dep| {
                        self.nodes
                            .get(dep)
                            .map(|n| n.value().clone())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark a node loaded with `value` and propagate to its dependents.
    ///
    /// Returns the nodes and waiters this made ready.
    pub(crate) fn complete(
        &mut self,
        id: &ModuleId,
        value: ModuleValue,
        via: ResolvedBy,
    ) -> Vec<Ready> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Vec::new();
        };
        if node.is_loaded() {
            return Vec::new();
        }
        node.complete(value);
        self.log.push(ResolutionEntry {
            sequence: self.log.len(),
            id: id.clone(),
            via,
        });
        debug!(module = %id, ?via, "Module loaded");

        let mut ready = Vec::new();
        for dependent in self.dependents_of(id) {
            match dependent {
                Dependent::Module(m) => {
                    if let Some(n) = self.nodes.get_mut(&m) {
                        if n.notify_dependency_resolved(id) {
                            ready.push(Ready::Module(m));
                        }
                    }
                }
                Dependent::Waiter(w) => {
                    if let Some(waiter) = self.waiters.get_mut(&w) {
                        if waiter.remaining.remove(id) && waiter.remaining.is_empty() {
                            ready.push(Ready::Waiter(w));
                        }
                    }
                }
            }
        }
        ready
    }

    /// Register an ephemeral dependent on every id in `remaining`
    pub(crate) fn add_waiter(
        &mut self,
        ids: Vec<ModuleId>,
        remaining: Vec<ModuleId>,
        callback: Option<Callback>,
        deferred: Deferred,
    ) -> WaiterId {
        let waiter = WaiterId(self.next_waiter);
        self.next_waiter += 1;
        for id in &remaining {
            self.dependents
                .entry(id.clone())
                .or_default()
                .insert(Dependent::Waiter(waiter));
        }
        self.waiters.insert(
            waiter,
            Waiter {
                ids,
                remaining: remaining.into_iter().collect(),
                callback,
                deferred,
            },
        );
        waiter
    }

    /// Remove a fired waiter, returning it with its modules' values
    pub(crate) fn take_waiter(&mut self, waiter: WaiterId) -> Option<(Waiter, Vec<ModuleValue>)> {
        let entry = self.waiters.remove(&waiter)?;
        for id in &entry.ids {
            if let Some(set) = self.dependents.get_mut(id) {
                set.remove(&Dependent::Waiter(waiter));
            }
        }
        let values = entry
            .ids
            .iter()
            .map(|id| {
                self.nodes
                    .get(id)
                    .map(|n| n.value().clone())
                    .unwrap_or_default()
            })
            .collect();
        Some((entry, values))
    }

    /// Modules still awaited by a waiter
    pub fn waiter_remaining(&self, waiter: WaiterId) -> Option<Vec<ModuleId>> {
        self.waiters
            .get(&waiter)
            .map(|w| w.remaining.iter().cloned().collect())
    }

    /// Number of `require` calls still waiting
    pub fn pending_waiters(&self) -> usize {
        self.waiters.len()
    }

    /// Chronological resolution log
    pub fn resolution_log(&self) -> &[ResolutionEntry] {
        &self.log
    }

    /// All nodes
    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.values()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Normalizer::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::LoadState;

    #[test]
    fn test_get_is_identity_stable() {
        let mut reg = Registry::default();
        let first: *const ModuleNode = reg.get("app/main").unwrap();
        let second: *const ModuleNode = reg.get("./app/./main").unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_are_loaded_is_vacuous_for_empty_set() {
        let mut reg = Registry::default();
        assert!(reg.are_loaded(&Dependencies::none()).unwrap());
        assert!(!reg.are_loaded(&Dependencies::from("a")).unwrap());
    }

    #[test]
    fn test_get_unloaded_dedups_in_order() {
        let mut reg = Registry::default();
        let id = reg.materialize("b").unwrap();
        reg.complete(&id, ModuleValue::Evaluated, ResolvedBy::Resource);

        let unloaded = reg.get_unloaded(&Dependencies::from("c, b, a, c")).unwrap();
        assert_eq!(unloaded, vec![ModuleId::new("c"), ModuleId::new("a")]);
    }

    #[test]
    fn test_set_dependencies_records_back_edges() {
        let mut reg = Registry::default();
        let x = reg.materialize("x").unwrap();
        let unresolved = reg.set_dependencies(&x, &Dependencies::from("a, css!b")).unwrap();

        assert_eq!(unresolved, vec![ModuleId::new("a"), ModuleId::new("css!b")]);
        assert_eq!(
            reg.dependents_of(&ModuleId::new("css!b")),
            vec![Dependent::Module(x.clone())]
        );
        assert_eq!(reg.node(&x).unwrap().pending().len(), 2);
    }

    #[test]
    fn test_redeclaration_augments_dependents() {
        let mut reg = Registry::default();
        let a = reg.materialize("a").unwrap();
        let b = reg.materialize("b").unwrap();
        reg.set_dependencies(&a, &Dependencies::from("x")).unwrap();
        reg.set_dependencies(&b, &Dependencies::from("x")).unwrap();
        reg.set_dependencies(&a, &Dependencies::from("x, y")).unwrap();

        let x = ModuleId::new("x");
        let dependents = reg.dependents_of(&x);
        assert!(dependents.contains(&Dependent::Module(a.clone())));
        assert!(dependents.contains(&Dependent::Module(b)));
        assert_eq!(
            reg.dependents_of(&ModuleId::new("y")),
            vec![Dependent::Module(a.clone())]
        );
        assert_eq!(reg.node(&a).unwrap().dependencies().len(), 2);
    }

    #[test]
    fn test_bad_specifier_leaves_graph_untouched() {
        let mut reg = Registry::default();
        let x = reg.materialize("x").unwrap();
        let err = reg.set_dependencies(&x, &Dependencies::from("a, bogus!b"));
        assert!(matches!(err, Err(LoaderError::UnknownKind { .. })));
        assert!(reg.lookup("a").is_none());
        assert!(reg.node(&x).unwrap().dependencies().is_empty());
    }

    #[test]
    fn test_alias_resolves_to_target() {
        let mut reg = Registry::default();
        let x = reg.materialize("lib/x").unwrap();
        assert!(reg.alias("pkg/x", &x).unwrap());
        assert_eq!(reg.materialize("pkg/x").unwrap(), x);
        assert!(reg.node(&x).unwrap().aliases().contains("pkg/x"));
    }

    #[test]
    fn test_inconsistent_alias_keeps_existing() {
        let mut reg = Registry::default();
        let x = reg.materialize("lib/x").unwrap();
        let y = reg.materialize("lib/y").unwrap();
        assert!(reg.alias("pkg/item", &x).unwrap());
        assert!(!reg.alias("pkg/item", &y).unwrap());
        assert_eq!(reg.materialize("pkg/item").unwrap(), x);

        // A name that is already a module of its own is not taken over
        assert!(!reg.alias("lib/y", &x).unwrap());
        assert_eq!(reg.materialize("lib/y").unwrap(), y);
    }

    #[test]
    fn test_complete_propagates_once() {
        let mut reg = Registry::default();
        let x = reg.materialize("x").unwrap();
        reg.set_dependencies(&x, &Dependencies::from("a")).unwrap();
        let a = ModuleId::new("a");

        let ready = reg.complete(&a, ModuleValue::from("A"), ResolvedBy::Resource);
        assert_eq!(ready, vec![Ready::Module(x.clone())]);
        // Completing again is a no-op
        assert!(reg.complete(&a, ModuleValue::from("B"), ResolvedBy::Resource).is_empty());
        assert_eq!(reg.node(&a).unwrap().value(), &ModuleValue::from("A"));
        assert_eq!(reg.node(&a).unwrap().state(), LoadState::Loaded);
        assert_eq!(reg.resolution_log().len(), 1);
    }

    #[test]
    fn test_waiter_fires_when_last_module_loads() {
        let mut reg = Registry::default();
        let ids = reg.get_all(&Dependencies::from("a, b")).unwrap();
        let waiter = reg.add_waiter(ids.clone(), ids.clone(), None, Deferred::new("require"));

        assert!(reg.complete(&ids[0], ModuleValue::from("A"), ResolvedBy::Resource).is_empty());
        let ready = reg.complete(&ids[1], ModuleValue::from("B"), ResolvedBy::Resource);
        assert_eq!(ready, vec![Ready::Waiter(waiter)]);

        let (_, values) = reg.take_waiter(waiter).unwrap();
        assert_eq!(values, vec![ModuleValue::from("A"), ModuleValue::from("B")]);
        assert_eq!(reg.pending_waiters(), 0);
        assert!(reg.dependents_of(&ids[0]).is_empty());
    }
}
