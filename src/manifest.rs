// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module manifests
//!
//! A manifest is a JSON document declaring modules up front, the way a
//! bundle would:
//!
//! ```json
//! {
//!   "prefixes": { "APP": "/app/" },
//!   "modules": {
//!     "{APP}main": { "deps": ["{APP}config", "text!{APP}readme.txt"] },
//!     "{APP}config": { "value": { "debug": true } }
//!   },
//!   "packages": {
//!     "ui": { "members": { "button": "{APP}button", "theme": "css!{APP}theme" } }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tether_core::{Dependencies, Loader, ModuleValue};
use tracing::{debug, info};

/// Name the manifest itself is registered under
const DEFAULT_NAME: &str = "manifest";

/// A parsed manifest
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Registry name for the manifest node
    pub name: Option<String>,
    /// Prefix table entries
    pub prefixes: BTreeMap<String, String>,
    /// Declared modules
    pub modules: BTreeMap<String, ModuleEntry>,
    /// Declared packages
    pub packages: BTreeMap<String, PackageEntry>,
}

/// A declared module
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModuleEntry {
    /// Dependency ids in order
    pub deps: Vec<String>,
    /// Value the module resolves to; defaults to its dependency values
    pub value: Option<serde_json::Value>,
}

/// A declared package
#[derive(Debug, Deserialize)]
pub struct PackageEntry {
    /// Member ids, keyed or listed
    pub members: Members,
}

/// Package members, either keyed or keyed by last path segment
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Members {
    /// `{ "key": "id" }`
    Named(BTreeMap<String, String>),
    /// `["id", ...]`
    Listed(Vec<String>),
}

impl From<&Members> for Dependencies {
    fn from(members: &Members) -> Self {
        match members {
            Members::Named(map) => Dependencies::named(map.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            Members::Listed(ids) => Dependencies::from(ids.clone()),
        }
    }
}

impl Manifest {
    /// Parse a manifest from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid manifest")
    }

    /// Read a manifest file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Number of declared modules and packages
    pub fn len(&self) -> usize {
        self.modules.len() + self.packages.len()
    }

    /// Whether the manifest declares nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register prefixes, modules and packages with a loader.
    ///
    /// Every declared module is marked as arriving with the manifest first,
    /// so modules depending on each other are never fetched.
    pub fn apply(&self, loader: &Loader) -> Result<()> {
        loader.set_prefixes(self.prefixes.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let name = self.name.as_deref().unwrap_or(DEFAULT_NAME);
        let declared: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        loader
            .preload(name, declared, None, Some(ModuleValue::Evaluated))
            .with_context(|| format!("Failed to register manifest '{}'", name))?;

        for (id, entry) in &self.modules {
            let value = entry.value.clone().map(ModuleValue::from);
            loader
                .define(id, entry.deps.clone(), move |values| match &value {
                    Some(value) => value.clone(),
                    None => ModuleValue::List(values.to_vec()),
                })
                .with_context(|| format!("Failed to define '{}'", id))?;
            debug!(module = %id, deps = entry.deps.len(), "Defined from manifest");
        }

        for (id, package) in &self.packages {
            loader
                .define_package(id, Dependencies::from(&package.members), None)
                .with_context(|| format!("Failed to define package '{}'", id))?;
        }

        info!(
            modules = self.modules.len(),
            packages = self.packages.len(),
            "Applied manifest '{}'",
            name
        );
        Ok(())
    }
}
