// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resource fetching contract and an in-memory implementation

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::debug;

use crate::error::FetchError;
use crate::kind::ResourceKind;
use crate::value::ModuleValue;

/// Retrieves the resource behind a URL.
///
/// Code resources are evaluated as part of the fetch; evaluation may
/// declare modules on the loader before the fetch returns.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch `url`, converting the body according to `kind`
    async fn fetch(&self, url: &str, kind: ResourceKind) -> Result<ModuleValue, FetchError>;
}

/// Side effect run when an in-memory script is "evaluated"
pub type Script = Arc<dyn Fn() + Send + Sync>;

/// What an in-memory URL serves
#[derive(Clone)]
pub enum MemoryResource {
    /// Resolve with a value
    Value(ModuleValue),
    /// Run a script, then resolve with [`ModuleValue::Evaluated`]
    Script(Script),
    /// Fail
    Fail(FetchError),
}

/// Fetcher serving resources from memory.
///
/// URLs are matched without their query string. Unknown URLs fail with
/// [`FetchError::NotFound`]. A gated URL holds its fetch until
/// [`release`](Self::release) is called, which lets callers control
/// completion order.
#[derive(Default)]
pub struct MemoryFetcher {
    resources: DashMap<String, MemoryResource>,
    counts: DashMap<String, usize>,
    gates: DashMap<String, Arc<Notify>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryFetcher {
    /// Create an empty fetcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `value` at `url`
    pub fn insert(&self, url: &str, value: impl Into<ModuleValue>) {
        self.resources
            .insert(url.to_string(), MemoryResource::Value(value.into()));
    }

    /// Run `script` when `url` is fetched
    pub fn insert_script(&self, url: &str, script: impl Fn() + Send + Sync + 'static) {
        self.resources
            .insert(url.to_string(), MemoryResource::Script(Arc::new(script)));
    }

    /// Fail fetches of `url`
    pub fn insert_failure(&self, url: &str, error: FetchError) {
        self.resources
            .insert(url.to_string(), MemoryResource::Fail(error));
    }

    /// Stop serving `url`
    pub fn remove(&self, url: &str) {
        self.resources.remove(url);
    }

    /// Hold fetches of `url` until released
    pub fn gate(&self, url: &str) {
        self.gates
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(Notify::new()));
    }

    /// Let one held (or the next) fetch of `url` proceed
    pub fn release(&self, url: &str) {
        if let Some(gate) = self.gates.get(url) {
            gate.notify_one();
        }
    }

    /// How many times `url` was fetched
    pub fn fetch_count(&self, url: &str) -> usize {
        self.counts.get(url).map(|c| *c).unwrap_or(0)
    }

    /// Total number of fetches
    pub fn total_fetches(&self) -> usize {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }

    /// Highest number of fetches observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str, kind: ResourceKind) -> Result<ModuleValue, FetchError> {
        let key = url.split('?').next().unwrap_or(url);
        *self.counts.entry(key.to_string()).or_insert(0) += 1;
        debug!(%url, %kind, "Serving from memory");

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = self.gates.get(key).map(|g| g.clone());
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let resource = self.resources.get(key).map(|r| r.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match resource {
            Some(MemoryResource::Value(value)) => Ok(value),
            Some(MemoryResource::Script(script)) => {
                script();
                Ok(ModuleValue::Evaluated)
            }
            Some(MemoryResource::Fail(error)) => Err(error),
            None => Err(FetchError::NotFound(url.to_string())),
        }
    }
}
