// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Mapping transport errors onto [`FetchError`]

use std::io;
use tether_core::FetchError;

/// Map a `reqwest` failure for `url`
pub fn from_reqwest(url: &str, err: reqwest::Error) -> FetchError {
    match err.status() {
        Some(status) if status == reqwest::StatusCode::NOT_FOUND => {
            FetchError::NotFound(url.to_string())
        }
        Some(status) => FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        },
        None if err.is_timeout() => FetchError::Network(format!("Timed out fetching {}", url)),
        None => FetchError::Network(err.to_string()),
    }
}

/// Map a filesystem failure for `url`
pub fn from_io(url: &str, err: io::Error) -> FetchError {
    match err.kind() {
        io::ErrorKind::NotFound => FetchError::NotFound(url.to_string()),
        _ => FetchError::Io {
            url: url.to_string(),
            reason: err.to_string(),
        },
    }
}
