// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the loader
//!
//! Two families exist. [`LoaderError`] is returned synchronously from the
//! operation that caused it (a bad identifier, an unreadable config file).
//! [`LoadError`] describes how a load attempt ended; it is stored on the
//! failed node and delivered through its [`ModuleFuture`](crate::ModuleFuture),
//! never thrown across a task boundary.

use thiserror::Error;

/// Result type for synchronous loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Synchronous, structural errors
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Identifier could not be parsed
    #[error("Invalid module identifier '{id}': {reason}")]
    InvalidIdentifier {
        /// Raw identifier as given
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// Unrecognised `kind!` prefix
    #[error("Unknown resource kind '{kind}' in '{id}'")]
    UnknownKind {
        /// Raw identifier as given
        id: String,
        /// The prefix that was not recognised
        kind: String,
    },

    /// Module is not present in the registry
    #[error("Module not registered: {0}")]
    NotRegistered(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoaderError {
    /// Create an invalid identifier error
    pub fn invalid_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a [`ResourceFetcher`](crate::ResourceFetcher)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Server answered with a non-success status
    #[error("Failed to fetch {url}: HTTP {status}")]
    Status {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Local read failure
    #[error("IO error reading {url}: {reason}")]
    Io {
        /// Requested URL
        url: String,
        /// Underlying error text
        reason: String,
    },

    /// The script host rejected fetched code
    #[error("Script error in {url}: {reason}")]
    Script {
        /// Requested URL
        url: String,
        /// Message from the host
        reason: String,
    },
}

/// How a load attempt failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// The node's own resource could not be fetched
    #[error("Failed to load '{id}' from {url}: {source}")]
    Fetch {
        /// Canonical module id
        id: String,
        /// URL that was fetched
        url: String,
        /// Fetcher failure
        #[source]
        source: FetchError,
    },

    /// A fetch was needed but no async runtime was available to run it
    #[error("Cannot load '{id}': no Tokio runtime available")]
    NoRuntime {
        /// Canonical module id
        id: String,
    },

    /// The settlement channel went away before the attempt finished
    #[error("Load of '{0}' was abandoned")]
    Abandoned(String),
}

impl LoadError {
    /// Canonical id of the module the error belongs to
    pub fn module_id(&self) -> &str {
        match self {
            Self::Fetch { id, .. } | Self::NoRuntime { id } | Self::Abandoned(id) => id,
        }
    }
}
