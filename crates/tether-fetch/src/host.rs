// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script evaluation hook
//!
//! Fetched code is handed to a [`ScriptHost`]. A host embedding a script
//! engine evaluates it there, and the code registers its modules on the
//! loader while doing so.

use tracing::debug;

/// Evaluates fetched code
pub trait ScriptHost: Send + Sync {
    /// Evaluate `source`, fetched from `url`. An error fails the fetch.
    fn evaluate(&self, url: &str, source: &str) -> Result<(), String>;
}

/// Host that accepts code without running it
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

impl ScriptHost for NoopHost {
    fn evaluate(&self, url: &str, source: &str) -> Result<(), String> {
        debug!(%url, bytes = source.len(), "Skipping evaluation");
        Ok(())
    }
}

impl<F> ScriptHost for F
where
    F: Fn(&str, &str) -> Result<(), String> + Send + Sync,
{
    fn evaluate(&self, url: &str, source: &str) -> Result<(), String> {
        self(url, source)
    }
}
