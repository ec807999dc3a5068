// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # tether-core
//!
//! Runtime dependency-graph resolution and asynchronous module loading.
//!
//! A module is named by a logical identifier (`app/main`, `css!theme`,
//! `{APP}widgets/Foo`). Declaring it with [`Loader::define`] records its
//! dependencies and a factory; the loader fetches whatever is missing
//! through a [`ResourceFetcher`], and runs the factory once every
//! dependency has a value. Completion ripples to dependents on the same
//! turn.
//!
//! - Identifier normalization with prefix substitution ([`Normalizer`])
//! - A registry of nodes with a reverse dependents index ([`Registry`])
//! - Packages aggregating several members into one map value
//! - Ad-hoc `require` with a callback or a list of values
//! - Diagnostics for modules that never resolved ([`DiagnosticsReport`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_core::{Dependencies, Loader, MemoryFetcher, ModuleValue};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = Arc::new(MemoryFetcher::new());
//!     fetcher.insert("greeting.js", "hello");
//!
//!     let loader = Loader::new(fetcher);
//!     loader.define("app", "greeting", |values| values[0].clone())?;
//!     let value = loader.require("app")?.await?;
//!     println!("{}", value);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod deferred;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod id;
pub mod kind;
pub mod node;
pub mod package;
pub mod registry;
pub mod value;

// Re-exports
pub use config::{Extensions, LoaderConfig};
pub use deferred::{Deferred, ModuleFuture, Outcome};
pub use diagnostics::{DiagnosticsReport, StallCause, Stalled};
pub use engine::{Loader, ModuleInfo};
pub use error::{FetchError, LoadError, LoaderError, Result};
pub use fetcher::{MemoryFetcher, MemoryResource, ResourceFetcher};
pub use id::{ModuleId, NormalizedId, Normalizer};
pub use kind::ResourceKind;
pub use node::{Dependencies, DependencySpec, Factory, LoadState, ModuleNode};
pub use package::Assembler;
pub use registry::{Dependent, Registry, ResolutionEntry, ResolvedBy, WaiterId};
pub use value::{ModuleValue, StyleHandle};

/// Version of the tether-core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
