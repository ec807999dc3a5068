// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # tether-fetch
//!
//! Concrete [`ResourceFetcher`](tether_core::ResourceFetcher)s for the
//! tether loader:
//!
//! - [`HttpFetcher`] - fetches over HTTP(S) with `reqwest`
//! - [`FsFetcher`] - reads from a local directory tree
//!
//! Both turn response bodies into module values the same way (see
//! [`content::into_value`]) and hand code to a [`ScriptHost`] for
//! evaluation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod content;
pub mod error;
pub mod fs;
pub mod host;
pub mod http;

// Re-exports
pub use fs::FsFetcher;
pub use host::{NoopHost, ScriptHost};
pub use http::HttpFetcher;
