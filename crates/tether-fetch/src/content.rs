// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Turning fetched bodies into module values

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tether_core::{FetchError, ModuleValue, ResourceKind, StyleHandle};

use crate::host::ScriptHost;

fn template_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<template\s+id\s*=\s*["']([^"']+)["'][^>]*>(.*?)</template>"#)
            .expect("template pattern is valid")
    })
}

/// Split `<template id="...">...</template>` blocks into an id -> markup map
pub fn parse_templates(body: &str) -> BTreeMap<String, String> {
    template_pattern()
        .captures_iter(body)
        .map(|caps| (caps[1].to_string(), caps[2].trim().to_string()))
        .collect()
}

/// Convert a response body according to the resource kind.
///
/// - code and bundles are evaluated by `host` and become `Evaluated`
/// - stylesheets become a `Stylesheet` handle
/// - templates become a `Templates` map, or `Text` when the file has no
///   `<template>` blocks
/// - generic resources become `Json` when the URL names a `.json` file
///   that parses, otherwise `Text`
pub fn into_value(
    kind: ResourceKind,
    url: &str,
    body: String,
    host: &dyn ScriptHost,
) -> Result<ModuleValue, FetchError> {
    match kind {
        ResourceKind::Code | ResourceKind::Package => {
            host.evaluate(url, &body).map_err(|reason| FetchError::Script {
                url: url.to_string(),
                reason,
            })?;
            Ok(ModuleValue::Evaluated)
        }
        ResourceKind::Stylesheet => Ok(ModuleValue::Stylesheet(StyleHandle {
            url: url.to_string(),
            source: Arc::from(body),
        })),
        ResourceKind::Template => {
            let templates = parse_templates(&body);
            if templates.is_empty() {
                Ok(ModuleValue::Text(body))
            } else {
                Ok(ModuleValue::Templates(templates))
            }
        }
        ResourceKind::Generic => {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            if path.ends_with(".json") {
                if let Ok(json) = serde_json::from_str(&body) {
                    return Ok(ModuleValue::Json(json));
                }
            }
            Ok(ModuleValue::Text(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NoopHost;

    #[test]
    fn test_parse_templates() {
        let body = r#"
            <template id="row"><tr><td>{name}</td></tr></template>
            <template id='empty' class="x">
            </template>
            <p>ignored</p>
        "#;
        let templates = parse_templates(body);
        assert_eq!(templates.len(), 2);
        assert_eq!(templates["row"], "<tr><td>{name}</td></tr>");
        assert_eq!(templates["empty"], "");
    }

    #[test]
    fn test_template_without_blocks_is_text() {
        let value = into_value(ResourceKind::Template, "t.html", "<p>hi</p>".into(), &NoopHost);
        assert_eq!(value, Ok(ModuleValue::from("<p>hi</p>")));
    }

    #[test]
    fn test_stylesheet_handle() {
        let value = into_value(ResourceKind::Stylesheet, "a.css", "body{}".into(), &NoopHost);
        assert_eq!(
            value,
            Ok(ModuleValue::Stylesheet(StyleHandle {
                url: "a.css".into(),
                source: Arc::from("body{}"),
            }))
        );
    }

    #[test]
    fn test_generic_json() {
        let value = into_value(ResourceKind::Generic, "data.json?v=1", r#"{"a":1}"#.into(), &NoopHost);
        assert_eq!(value, Ok(ModuleValue::Json(serde_json::json!({"a": 1}))));

        let value = into_value(ResourceKind::Generic, "notes.txt", "plain".into(), &NoopHost);
        assert_eq!(value, Ok(ModuleValue::from("plain")));
    }

    #[test]
    fn test_host_error_fails_code() {
        let host = |_: &str, _: &str| -> Result<(), String> { Err("syntax error".to_string()) };
        let value = into_value(ResourceKind::Code, "bad.js", "(".into(), &host);
        assert_eq!(
            value,
            Err(FetchError::Script {
                url: "bad.js".into(),
                reason: "syntax error".into()
            })
        );
    }
}
