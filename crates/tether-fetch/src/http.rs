// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! HTTP resource fetcher

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{FetchError, LoaderConfig, ModuleValue, ResourceFetcher, ResourceKind};
use tracing::{debug, instrument};
use url::Url;

use crate::content;
use crate::error::from_reqwest;
use crate::host::{NoopHost, ScriptHost};

/// Fetches resources over HTTP(S).
///
/// Relative URLs are joined onto the configured base URL.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    base: Option<Url>,
    host: Arc<dyn ScriptHost>,
}

impl HttpFetcher {
    /// Create a fetcher from loader configuration
    pub fn new(config: &LoaderConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(Duration::from_secs(config.http_timeout_secs.min(30)))
            .pool_max_idle_per_host(config.max_concurrent_fetches.max(1))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let base = if config.base_url.is_empty() {
            None
        } else {
            Some(
                Url::parse(&config.base_url)
                    .map_err(|e| FetchError::Network(format!("Invalid base URL: {}", e)))?,
            )
        };

        Ok(Self {
            client,
            base,
            host: Arc::new(NoopHost),
        })
    }

    /// Evaluate fetched code with `host`
    pub fn with_host(mut self, host: Arc<dyn ScriptHost>) -> Self {
        self.host = host;
        self
    }

    /// Base URL relative requests are joined onto
    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    /// Resolve a possibly relative URL
    pub fn resolve_url(&self, url: &str) -> Result<Url, FetchError> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base {
                Some(base) => base
                    .join(url)
                    .map_err(|e| FetchError::Network(format!("Failed to resolve {}: {}", url, e))),
                None => Err(FetchError::Network(format!(
                    "Cannot fetch relative URL {} without a base URL",
                    url
                ))),
            },
            Err(e) => Err(FetchError::Network(format!("Invalid URL {}: {}", url, e))),
        }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str, kind: ResourceKind) -> Result<ModuleValue, FetchError> {
        let target = self.resolve_url(url)?;
        debug!("Fetching {}", target);

        let response = self
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(|e| from_reqwest(url, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(target.to_string()));
        }

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: target.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| from_reqwest(url, e))?;
        content::into_value(kind, target.as_str(), body, self.host.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(base_url: &str) -> HttpFetcher {
        let config = LoaderConfig {
            base_url: base_url.to_string(),
            ..LoaderConfig::default()
        };
        HttpFetcher::new(&config).unwrap()
    }

    #[test]
    fn test_relative_urls_join_base() {
        let http = fetcher("https://cdn.example.com/static/");
        assert_eq!(
            http.resolve_url("app/main.js").unwrap().as_str(),
            "https://cdn.example.com/static/app/main.js"
        );
        assert_eq!(
            http.resolve_url("/lib/a.js?v=2").unwrap().as_str(),
            "https://cdn.example.com/lib/a.js?v=2"
        );
    }

    #[test]
    fn test_absolute_urls_pass_through() {
        let http = fetcher("https://cdn.example.com/");
        assert_eq!(
            http.resolve_url("http://other.example.org/x.css").unwrap().as_str(),
            "http://other.example.org/x.css"
        );
    }

    #[test]
    fn test_relative_url_without_base_fails() {
        let http = fetcher("");
        assert!(http.base().is_none());
        assert!(matches!(http.resolve_url("a.js"), Err(FetchError::Network(_))));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = LoaderConfig {
            base_url: "not a url".into(),
            ..LoaderConfig::default()
        };
        assert!(HttpFetcher::new(&config).is_err());
    }
}
