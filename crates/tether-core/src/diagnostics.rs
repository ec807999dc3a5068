// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Diagnostics for graphs that did not drain
//!
//! The engine never gives up on a node: a failed fetch or a cycle leaves
//! its dependents loading forever. These helpers explain why.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::engine::Loader;
use crate::id::ModuleId;
use crate::node::{LoadState, ModuleNode};
use crate::registry::{Registry, ResolutionEntry, ResolvedBy};

/// Why a stalled chain stops where it does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StallCause {
    /// The last module's fetch failed
    Failed(String),
    /// The last module is still being fetched or evaluated
    InFlight,
    /// The last module was never requested
    NotRequested,
    /// The chain runs into a cycle with these members
    Cycle(Vec<ModuleId>),
}

impl fmt::Display for StallCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::InFlight => f.write_str("in flight"),
            Self::NotRequested => f.write_str("never requested"),
            Self::Cycle(members) => {
                let names: Vec<_> = members.iter().map(ModuleId::as_str).collect();
                write!(f, "cycle: {}", names.join(" -> "))
            }
        }
    }
}

/// A module that has not loaded, with the dependency chain holding it up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stalled {
    /// The stalled module
    pub id: ModuleId,
    /// Its state
    pub state: LoadState,
    /// `id` followed by the first unmet dependency at each step
    pub chain: Vec<ModuleId>,
    /// What the chain ends on
    pub cause: StallCause,
}

impl Stalled {
    /// Last module in the chain
    pub fn root(&self) -> &ModuleId {
        self.chain.last().unwrap_or(&self.id)
    }
}

/// First pending dependency in declaration order
fn first_pending(node: &ModuleNode) -> Option<&ModuleId> {
    node.dependencies()
        .iter()
        .find(|dep| node.pending().contains(*dep))
}

/// Follow first unmet dependencies from `start`
fn trace(registry: &Registry, start: &ModuleNode) -> Stalled {
    let mut chain = vec![start.id().clone()];
    let mut current = start;

    let cause = loop {
        if let Some(failure) = current.failure() {
            break StallCause::Failed(failure.to_string());
        }
        let Some(next) = first_pending(current) else {
            break match current.state() {
                LoadState::Unloaded => StallCause::NotRequested,
                _ => StallCause::InFlight,
            };
        };
        if let Some(pos) = chain.iter().position(|id| id == next) {
            break StallCause::Cycle(chain[pos..].to_vec());
        }
        chain.push(next.clone());
        match registry.node(next) {
            Some(node) => current = node,
            None => break StallCause::NotRequested,
        }
    };

    Stalled {
        id: start.id().clone(),
        state: start.state(),
        chain,
        cause,
    }
}

/// Every module that has not loaded, sorted by id
pub fn stalled(registry: &Registry) -> Vec<Stalled> {
    let mut nodes: Vec<_> = registry.modules().filter(|n| !n.is_loaded()).collect();
    nodes.sort_by(|a, b| a.id().cmp(b.id()));
    nodes.into_iter().map(|node| trace(registry, node)).collect()
}

/// Chronological resolution log
pub fn resolution_order(registry: &Registry) -> Vec<ResolutionEntry> {
    registry.resolution_log().to_vec()
}

/// Distinct cycles among unmet dependency edges, each sorted, in id order
pub fn cycles(registry: &Registry) -> Vec<Vec<ModuleId>> {
    let mut graph: BTreeMap<&ModuleId, Vec<&ModuleId>> = BTreeMap::new();
    for node in registry.modules().filter(|n| !n.is_loaded()) {
        let edges = node
            .dependencies()
            .iter()
            .filter(|dep| node.pending().contains(*dep))
            .collect();
        graph.insert(node.id(), edges);
    }

    let mut tarjan = Tarjan {
        graph: &graph,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        stack: Vec::new(),
        on_stack: HashMap::new(),
        next: 0,
        components: Vec::new(),
    };
    for &id in graph.keys() {
        if !tarjan.index.contains_key(id) {
            tarjan.visit(id);
        }
    }

    let mut found: Vec<Vec<ModuleId>> = tarjan
        .components
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || graph
                    .get(component[0])
                    .is_some_and(|edges| edges.contains(&component[0]))
        })
        .map(|component| {
            let mut ids: Vec<ModuleId> = component.into_iter().cloned().collect();
            ids.sort();
            ids
        })
        .collect();
    found.sort();
    found
}

/// Strongly connected components over the pending-edge graph
struct Tarjan<'a> {
    graph: &'a BTreeMap<&'a ModuleId, Vec<&'a ModuleId>>,
    index: HashMap<&'a ModuleId, usize>,
    lowlink: HashMap<&'a ModuleId, usize>,
    stack: Vec<&'a ModuleId>,
    on_stack: HashMap<&'a ModuleId, bool>,
    next: usize,
    components: Vec<Vec<&'a ModuleId>>,
}

impl<'a> Tarjan<'a> {
    /// Visit everything reachable from `root` with an explicit work stack
    fn visit(&mut self, root: &'a ModuleId) {
        let graph = self.graph;
        let mut work: Vec<(&'a ModuleId, usize)> = vec![(root, 0)];
        self.enter(root);

        while let Some(frame) = work.last_mut() {
            let (id, edge) = *frame;
            let edges = graph.get(id).map(Vec::as_slice).unwrap_or_default();

            if let Some(&dep) = edges.get(edge) {
                frame.1 += 1;
                if !self.graph.contains_key(dep) {
                    continue;
                }
                if !self.index.contains_key(dep) {
                    self.enter(dep);
                    work.push((dep, 0));
                } else if self.on_stack.get(dep).copied().unwrap_or(false) {
                    let low = self.lowlink[id].min(self.index[dep]);
                    self.lowlink.insert(id, low);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                let low = self.lowlink[parent].min(self.lowlink[id]);
                self.lowlink.insert(parent, low);
            }

            if self.lowlink[id] == self.index[id] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack.insert(member, false);
                    component.push(member);
                    if member == id {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    fn enter(&mut self, id: &'a ModuleId) {
        self.index.insert(id, self.next);
        self.lowlink.insert(id, self.next);
        self.next += 1;
        self.stack.push(id);
        self.on_stack.insert(id, true);
    }
}

/// Summary of a registry for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsReport {
    /// Number of modules in the registry
    pub modules: usize,
    /// Number of loaded modules
    pub loaded: usize,
    /// Resolution log
    pub order: Vec<ResolutionEntry>,
    /// Modules that have not loaded
    pub stalled: Vec<Stalled>,
    /// Cycles among unmet dependencies
    pub cycles: Vec<Vec<ModuleId>>,
}

impl DiagnosticsReport {
    /// Build a report for a registry
    pub fn from_registry(registry: &Registry) -> Self {
        Self {
            modules: registry.len(),
            loaded: registry.modules().filter(|n| n.is_loaded()).count(),
            order: resolution_order(registry),
            stalled: stalled(registry),
            cycles: cycles(registry),
        }
    }

    /// Whether every module has loaded
    pub fn is_settled(&self) -> bool {
        self.stalled.is_empty()
    }
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}/{} modules loaded", self.loaded, self.modules)?;

        if !self.order.is_empty() {
            writeln!(f, "Resolution order:")?;
            for entry in &self.order {
                let via = match entry.via {
                    ResolvedBy::Factory => "factory",
                    ResolvedBy::Resource => "resource",
                    ResolvedBy::Preloaded => "preloaded",
                };
                writeln!(f, "  {:>3}. {} ({})", entry.sequence + 1, entry.id, via)?;
            }
        }

        if !self.stalled.is_empty() {
            writeln!(f, "Stalled:")?;
            for stall in &self.stalled {
                let chain: Vec<_> = stall.chain.iter().map(ModuleId::as_str).collect();
                writeln!(f, "  {} [{}]: {} ({})", stall.id, stall.state, chain.join(" -> "), stall.cause)?;
            }
        }

        for cycle in &self.cycles {
            let members: Vec<_> = cycle.iter().map(ModuleId::as_str).collect();
            writeln!(f, "Cycle: {}", members.join(", "))?;
        }
        Ok(())
    }
}

impl Loader {
    /// Modules that have not loaded and what holds each one up
    pub fn stalled(&self) -> Vec<Stalled> {
        self.with_registry(stalled)
    }

    /// Modules in the order they loaded
    pub fn resolution_order(&self) -> Vec<ResolutionEntry> {
        self.with_registry(resolution_order)
    }

    /// Cycles among unmet dependencies
    pub fn cycles(&self) -> Vec<Vec<ModuleId>> {
        self.with_registry(cycles)
    }

    /// Full diagnostics report
    pub fn report(&self) -> DiagnosticsReport {
        self.with_registry(DiagnosticsReport::from_registry)
    }
}
