// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Packages and preloading
//!
//! A package is a composite module whose dependencies are its members and
//! whose value is a map of member key to member value. Members are aliased
//! under `"<package>/<key>"` so code can address them through the package.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::deferred::ModuleFuture;
use crate::engine::Loader;
use crate::error::{LoaderError, Result};
use crate::id::{ModuleId, member_key};
use crate::kind::ResourceKind;
use crate::node::{Dependencies, Factory, ModuleNode};
use crate::registry::ResolvedBy;
use crate::value::ModuleValue;

/// Post-processing applied to an assembled package map
pub type Assembler = Arc<dyn Fn(BTreeMap<String, ModuleValue>) -> ModuleValue + Send + Sync>;

impl Loader {
    /// Declare a package.
    ///
    /// Named members are keyed by their name; unnamed ones by the last
    /// segment of their path. The package is declared, not loaded: it
    /// loads on the first `require` or `load` that reaches it. Returns the
    /// package's canonical id.
    pub fn define_package(
        &self,
        id: &str,
        members: impl Into<Dependencies>,
        on_assembled: Option<Assembler>,
    ) -> Result<ModuleId> {
        let members = members.into();
        let mut registry = self.registry();
        let normalized = registry.normalize(id)?;
        let member_ids = registry.get_all(&members)?;

        let package_id = registry.ensure(&normalized);
        if registry.is_loaded(&package_id) {
            warn!(package = %package_id, "Package already loaded; ignoring redefinition");
            return Ok(package_id);
        }

        let mut keys = Vec::with_capacity(member_ids.len());
        let mut scoped = Vec::with_capacity(member_ids.len());
        for (spec, member) in members.iter().zip(&member_ids) {
            let key = spec.name.clone().unwrap_or_else(|| member_key(member));
            let alias = format!("{}/{}", normalized.path, key);
            registry.alias(&alias, member)?;
            scoped.push(alias);
            keys.push(key);
        }

        let url = registry
            .normalizer()
            .url_for(&normalized.path, None, ResourceKind::Package);
        if let Some(node) = registry.node_mut(&package_id) {
            node.set_kind(ResourceKind::Package, url);
        }
        registry.alias(&format!("pkg!{}", normalized.path), &package_id)?;

        registry.set_dependencies(&package_id, &Dependencies::from(scoped))?;
        let factory: Factory = Arc::new(move |values: &[ModuleValue]| {
            let map: BTreeMap<String, ModuleValue> = keys
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect();
            match &on_assembled {
                Some(assemble) => assemble(map),
                None => ModuleValue::Map(map),
            }
        });
        let node = registry
            .node_mut(&package_id)
            .ok_or_else(|| LoaderError::NotRegistered(package_id.to_string()))?;
        node.set_factory(factory);

        info!(package = %package_id, members = member_ids.len(), "Package defined");
        Ok(package_id)
    }

    /// Declare the contents of a bundle that is being injected.
    ///
    /// Every dependency not yet loaded is marked loading without a fetch;
    /// the bundle is expected to declare them. With `value`, `id` loads
    /// with it straight away. Otherwise `id` is defined with `deps` and
    /// `factory` as by [`define`](Self::define).
    pub fn preload(
        &self,
        id: &str,
        deps: impl Into<Dependencies>,
        factory: Option<Factory>,
        value: Option<ModuleValue>,
    ) -> Result<ModuleFuture> {
        let deps = deps.into();
        let node_id = {
            let mut registry = self.registry();
            let normalized = registry.normalize(id)?;
            let dep_ids = registry.get_all(&deps)?;
            for dep in &dep_ids {
                if let Some(node) = registry.node_mut(dep) {
                    if !node.is_loaded() && node.begin_loading() {
                        debug!(module = %dep, "Marked as preloading");
                    }
                }
            }
            registry.ensure(&normalized)
        };

        let Some(value) = value else {
            return self.define_with(id, deps, factory);
        };

        let mut queue = VecDeque::new();
        self.complete(&node_id, value, ResolvedBy::Preloaded, &mut queue);
        self.run(Vec::from(queue));

        self.registry()
            .node(&node_id)
            .map(ModuleNode::future)
            .ok_or_else(|| LoaderError::NotRegistered(node_id.to_string()))
    }
}
