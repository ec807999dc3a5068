// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{LoaderError, Result};
use crate::kind::ResourceKind;

/// Default number of fetches allowed in flight at once
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 6;

/// Prefix for environment variable overrides
const ENV_PREFIX: &str = "TETHER_";

/// Configuration for a [`Loader`](crate::Loader).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Base URL prepended to relative module paths
    pub base_url: String,

    /// Prefix substitutions (`APP` -> `/app/`)
    pub prefixes: BTreeMap<String, String>,

    /// Cache-busting token appended to every fetch URL
    pub cache_token: Option<String>,

    /// Fetch package bundles instead of individual members
    pub bundle_packages: bool,

    /// Fetches allowed in flight at once (0 = unlimited)
    pub max_concurrent_fetches: usize,

    /// Default file extensions per resource kind
    pub extensions: Extensions,

    /// HTTP request timeout in seconds
    pub http_timeout_secs: u64,

    /// User agent for HTTP fetches
    pub user_agent: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            prefixes: BTreeMap::new(),
            cache_token: None,
            bundle_packages: false,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            extensions: Extensions::default(),
            http_timeout_secs: 30,
            user_agent: format!("tether/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Default extension per resource kind
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Extensions {
    /// Code modules
    pub code: String,
    /// Stylesheets
    pub stylesheet: String,
    /// Templates
    pub template: String,
    /// Package bundles
    pub package: String,
    /// Generic data (usually empty: the id names the file exactly)
    pub generic: String,
}

impl Default for Extensions {
    fn default() -> Self {
        Self {
            code: ".js".to_string(),
            stylesheet: ".css".to_string(),
            template: ".html".to_string(),
            package: ".bundle.js".to_string(),
            generic: String::new(),
        }
    }
}

impl Extensions {
    /// Extension for a kind
    pub fn for_kind(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Code => &self.code,
            ResourceKind::Stylesheet => &self.stylesheet,
            ResourceKind::Template => &self.template,
            ResourceKind::Package => &self.package,
            ResourceKind::Generic => &self.generic,
        }
    }
}

impl LoaderConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.load_from_env();
        Ok(config)
    }

    /// Apply `TETHER_*` environment variables.
    pub fn load_from_env(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                let config_key = config_key.to_lowercase().replace('_', "-");
                if let Err(e) = self.set(&config_key, &value) {
                    tracing::warn!("Ignoring {}: {}", key, e);
                }
            }
        }
    }

    /// Set a configuration value by key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "base-url" => self.base_url = value.to_string(),
            "cache-token" => {
                self.cache_token = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "bundle-packages" => self.bundle_packages = value == "true" || value == "1",
            "max-concurrent-fetches" => {
                self.max_concurrent_fetches = value.parse().map_err(|_| {
                    LoaderError::Config(format!("max-concurrent-fetches: not a number: {}", value))
                })?
            }
            "http-timeout-secs" => {
                self.http_timeout_secs = value.parse().map_err(|_| {
                    LoaderError::Config(format!("http-timeout-secs: not a number: {}", value))
                })?
            }
            "user-agent" => self.user_agent = value.to_string(),
            _ => {
                if let Some(name) = key.strip_prefix("prefix-") {
                    self.prefixes
                        .insert(name.to_uppercase().replace('-', "_"), value.to_string());
                } else {
                    return Err(LoaderError::Config(format!("unknown key '{}'", key)));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.extensions.for_kind(ResourceKind::Code), ".js");
        assert_eq!(config.extensions.for_kind(ResourceKind::Generic), "");
        assert_eq!(config.max_concurrent_fetches, DEFAULT_MAX_CONCURRENT_FETCHES);
        assert!(!config.bundle_packages);
    }

    #[test]
    fn test_from_toml() {
        let config = LoaderConfig::from_toml_str(
            r#"
            base_url = "https://cdn.example.com/"
            cache_token = "v=42"
            bundle_packages = true

            [prefixes]
            APP = "/app/"

            [extensions]
            template = ".tpl"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://cdn.example.com/");
        assert_eq!(config.cache_token.as_deref(), Some("v=42"));
        assert!(config.bundle_packages);
        assert_eq!(config.prefixes.get("APP").map(String::as_str), Some("/app/"));
        assert_eq!(config.extensions.template, ".tpl");
        // Unset fields keep their defaults
        assert_eq!(config.extensions.code, ".js");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrent_fetches = 2").unwrap();
        let config = LoaderConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_concurrent_fetches, 2);
    }

    #[test]
    fn test_set() {
        let mut config = LoaderConfig::default();
        config.set("cache-token", "v=7").unwrap();
        config.set("prefix-app-root", "/srv/").unwrap();
        config.set("bundle-packages", "true").unwrap();
        assert_eq!(config.cache_token.as_deref(), Some("v=7"));
        assert_eq!(
            config.prefixes.get("APP_ROOT").map(String::as_str),
            Some("/srv/")
        );
        assert!(config.bundle_packages);
        assert!(config.set("max-concurrent-fetches", "lots").is_err());
        assert!(config.set("no-such-key", "x").is_err());
    }
}
