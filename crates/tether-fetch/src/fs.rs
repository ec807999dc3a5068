// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Filesystem resource fetcher

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tether_core::id::normalize_path;
use tether_core::{FetchError, ModuleValue, ResourceFetcher, ResourceKind};
use tracing::{debug, instrument};

use crate::content;
use crate::error::from_io;
use crate::host::{NoopHost, ScriptHost};

/// Serves resources from a directory tree.
///
/// A URL maps to `root/<path>`: any scheme and host are dropped along with
/// the query string, and the path is kept inside `root`.
#[derive(Clone)]
pub struct FsFetcher {
    root: PathBuf,
    host: Arc<dyn ScriptHost>,
}

impl FsFetcher {
    /// Serve files under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            host: Arc::new(NoopHost),
        }
    }

    /// Evaluate fetched code with `host`
    pub fn with_host(mut self, host: Arc<dyn ScriptHost>) -> Self {
        self.host = host;
        self
    }

    /// Directory files are served from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File a URL maps to
    pub fn path_for(&self, url: &str) -> PathBuf {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let path = match path.find("://") {
            Some(i) => path[i + 3..].find('/').map_or("", |j| &path[i + 3 + j..]),
            None => path,
        };
        // Anchor at the root so `..` cannot climb out of it
        let relative = normalize_path(&format!("/{}", path));
        self.root.join(relative.trim_start_matches('/'))
    }
}

#[async_trait]
impl ResourceFetcher for FsFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str, kind: ResourceKind) -> Result<ModuleValue, FetchError> {
        let path = self.path_for(url);
        debug!("Reading {}", path.display());
        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| from_io(url, e))?;
        content::into_value(kind, url, body, self.host.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;
    use tether_core::{Dependencies, Loader};
    use tether_macros::assert_ok;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("app/data")).unwrap();
        fs::write(dir.path().join("app/data/greeting.txt"), "hello").unwrap();
        fs::write(dir.path().join("app/theme.css"), "body { margin: 0 }").unwrap();
        fs::write(
            dir.path().join("app/rows.html"),
            r#"<template id="row"><li>{item}</li></template>"#,
        )
        .unwrap();
        fs::write(dir.path().join("app/main.js"), "// main").unwrap();
        dir
    }

    #[test]
    fn test_path_for_stays_under_root() {
        let fetcher = FsFetcher::new("/srv/site");
        assert_eq!(fetcher.path_for("app/main.js?v=3"), PathBuf::from("/srv/site/app/main.js"));
        assert_eq!(fetcher.path_for("/app/main.js"), PathBuf::from("/srv/site/app/main.js"));
        assert_eq!(
            fetcher.path_for("http://example.com/lib/a.js"),
            PathBuf::from("/srv/site/lib/a.js")
        );
        assert_eq!(fetcher.path_for("../../etc/passwd"), PathBuf::from("/srv/site/etc/passwd"));
    }

    #[tokio::test]
    async fn test_missing_file_not_found() {
        let dir = site();
        let fetcher = FsFetcher::new(dir.path());
        let result = fetcher.fetch("app/missing.js", ResourceKind::Code).await;
        assert_eq!(result, Err(FetchError::NotFound("app/missing.js".into())));
    }

    #[tokio::test]
    async fn test_code_goes_through_host() {
        let dir = site();
        let host = |url: &str, source: &str| -> Result<(), String> {
            assert_eq!(url, "app/main.js");
            assert_eq!(source, "// main");
            Ok(())
        };
        let fetcher = FsFetcher::new(dir.path()).with_host(Arc::new(host));
        let value = fetcher.fetch("app/main.js", ResourceKind::Code).await;
        assert_eq!(value, Ok(ModuleValue::Evaluated));
    }

    #[tokio::test]
    async fn test_loader_over_directory() {
        let dir = site();
        let loader = Loader::new(Arc::new(FsFetcher::new(dir.path())));
        loader.set_prefix("APP", "app/");

        let future = assert_ok!(loader.define(
            "page",
            Dependencies::named([
                ("greeting", "text!{APP}data/greeting.txt"),
                ("theme", "css!{APP}theme"),
                ("rows", "tpl!{APP}rows"),
            ]),
            |values| {
                let mut summary = BTreeMap::new();
                summary.insert("greeting".to_string(), values[0].clone());
                summary.insert("theme".to_string(), ModuleValue::from(values[1].type_name()));
                summary.insert("rows".to_string(), values[2].clone());
                ModuleValue::Map(summary)
            }
        ));

        let value = assert_ok!(future.await);
        let map = value.as_map().unwrap();
        assert_eq!(map["greeting"], ModuleValue::from("hello"));
        assert_eq!(map["theme"], ModuleValue::from("stylesheet"));
        assert_eq!(
            map["rows"],
            ModuleValue::Templates(BTreeMap::from([("row".to_string(), "<li>{item}</li>".to_string())]))
        );
    }
}
