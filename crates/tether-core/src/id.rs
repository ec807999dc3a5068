// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Identifier normalization
//!
//! Turns a raw identifier such as `css!{APP}theme/../base` into the
//! registry key (`css!/app/base`) and the URL it is fetched from
//! (`/app/base.css?v=3`). Normalization is pure given the prefix table,
//! and normalizing a canonical id yields the same id again.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::{Extensions, LoaderConfig};
use crate::error::{LoaderError, Result};
use crate::kind::ResourceKind;

/// Canonical module identity; the registry's map key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    /// Wrap an already canonical string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ModuleId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ModuleId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Result of normalizing a raw identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedId {
    /// Resource kind from the `kind!` prefix
    pub kind: ResourceKind,
    /// Normalized path, without kind prefix or query
    pub path: String,
    /// Registry key
    pub canonical: ModuleId,
    /// Fetch URL
    pub url: String,
}

/// Identifier normalizer holding the prefix table and URL settings
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// `{NAME}` token -> fully expanded value
    prefixes: BTreeMap<String, String>,
    base_url: String,
    cache_token: Option<String>,
    extensions: Extensions,
}

impl Normalizer {
    /// Create a normalizer with an empty prefix table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a normalizer from loader configuration
    pub fn from_config(config: &LoaderConfig) -> Self {
        let mut normalizer = Self {
            prefixes: BTreeMap::new(),
            base_url: config.base_url.clone(),
            cache_token: config.cache_token.clone(),
            extensions: config.extensions.clone(),
        };
        normalizer.set_prefixes(config.prefixes.clone());
        normalizer
    }

    /// Register a prefix substitution.
    ///
    /// `name` may be given bare (`APP`) or as a token (`{APP}`). The value is
    /// expanded against the prefixes registered so far.
    pub fn set_prefix(&mut self, name: &str, value: &str) {
        let token = prefix_token(name);
        let value = self.expand(value);
        self.prefixes.insert(token, value);
    }

    /// Register several prefix substitutions
    pub fn set_prefixes<K, V>(&mut self, prefixes: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in prefixes {
            self.set_prefix(name.as_ref(), value.as_ref());
        }
    }

    /// Registered prefixes (token -> expanded value)
    pub fn prefixes(&self) -> &BTreeMap<String, String> {
        &self.prefixes
    }

    /// Set or clear the cache-busting token
    pub fn set_cache_token(&mut self, token: Option<String>) {
        self.cache_token = token.filter(|t| !t.is_empty());
    }

    /// Set the base URL for relative paths
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into();
    }

    /// Substitute known prefixes until none remain.
    ///
    /// Bounded by the number of registered prefixes, so a value that names
    /// itself cannot loop.
    pub fn expand(&self, input: &str) -> String {
        let mut out = input.to_string();
        for _ in 0..self.prefixes.len() {
            let mut changed = false;
            for (token, value) in &self.prefixes {
                if out.contains(token.as_str()) {
                    out = out.replace(token.as_str(), value);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        out
    }

    /// Normalize a raw identifier
    pub fn normalize(&self, raw: &str) -> Result<NormalizedId> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LoaderError::invalid_id(raw, "identifier is empty"));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(LoaderError::invalid_id(raw, "identifier contains whitespace"));
        }

        let (kind, rest) = match raw.split_once('!') {
            Some((prefix, rest)) => {
                let kind =
                    ResourceKind::from_prefix(prefix).ok_or_else(|| LoaderError::UnknownKind {
                        id: raw.to_string(),
                        kind: prefix.to_string(),
                    })?;
                (kind, rest)
            }
            None => (ResourceKind::Code, raw),
        };

        let expanded = self.expand(rest);
        let (path_part, query) = match expanded.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (expanded.as_str(), None),
        };

        let path = normalize_path(path_part);
        if path.is_empty() {
            return Err(LoaderError::invalid_id(raw, "identifier has no path"));
        }

        let canonical = match kind {
            ResourceKind::Code => ModuleId::new(path.clone()),
            other => ModuleId::new(format!("{}!{}", other.prefix(), path)),
        };
        let url = self.url_for(&path, query, kind);

        Ok(NormalizedId {
            kind,
            path,
            canonical,
            url,
        })
    }

    /// Build the fetch URL for a normalized path
    pub fn url_for(&self, path: &str, query: Option<&str>, kind: ResourceKind) -> String {
        let mut url = if self.base_url.is_empty() || path.starts_with('/') || path.contains("://")
        {
            path.to_string()
        } else if self.base_url.ends_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };

        let ext = self.extensions.for_kind(kind);
        if !ext.is_empty() && !has_extension(path) {
            url.push_str(ext);
        }

        let mut query = query.filter(|q| !q.is_empty()).map(str::to_string);
        if let Some(token) = &self.cache_token {
            query = match query {
                Some(q) if q.contains(token.as_str()) => Some(q),
                Some(q) => Some(format!("{}&{}", q, token)),
                None => Some(token.clone()),
            };
        }
        if let Some(q) = query {
            url.push('?');
            url.push_str(&q);
        }
        url
    }
}

/// `APP` -> `{APP}`; tokens pass through
fn prefix_token(name: &str) -> String {
    if name.starts_with('{') && name.ends_with('}') {
        name.to_string()
    } else {
        format!("{{{}}}", name)
    }
}

/// Whether the last path segment carries an extension
fn has_extension(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .is_some_and(|segment| segment.contains('.') && !segment.ends_with('.'))
}

/// Split `scheme://host` from the rest of the path
fn split_origin(path: &str) -> (&str, &str) {
    if let Some(i) = path.find("://") {
        let after = i + 3;
        match path[after..].find('/') {
            Some(j) => path.split_at(after + j),
            None => (path, ""),
        }
    } else {
        ("", path)
    }
}

/// Collapse empty and `.` segments and resolve `..`
pub fn normalize_path(path: &str) -> String {
    let (origin, rest) = split_origin(path);
    let is_absolute = !origin.is_empty() || rest.starts_with('/');
    let mut components: Vec<&str> = Vec::new();

    for component in rest.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                if !components.is_empty() && components.last() != Some(&"..") {
                    components.pop();
                } else if !is_absolute {
                    components.push("..");
                }
            }
            c => components.push(c),
        }
    }

    let joined = components.join("/");
    if is_absolute {
        format!("{}/{}", origin, joined)
    } else {
        joined
    }
}

/// Last path segment of a canonical id, without kind prefix or extension
pub fn member_key(id: &ModuleId) -> String {
    let path = id.as_str().split_once('!').map_or(id.as_str(), |(_, p)| p);
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => segment.to_string(),
    }
}
