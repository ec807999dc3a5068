// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resolved module values

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Handle to a stylesheet that has been fetched and attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleHandle {
    /// URL the stylesheet was loaded from
    pub url: String,
    /// Stylesheet source
    pub source: Arc<str>,
}

/// The payload of a loaded module
#[derive(Clone, Default)]
pub enum ModuleValue {
    /// No value (the state of every node before it loads)
    #[default]
    Undefined,
    /// Code was fetched and evaluated; it exported nothing of its own
    Evaluated,
    /// Raw response text
    Text(String),
    /// Structured data
    Json(serde_json::Value),
    /// Template id -> markup
    Templates(BTreeMap<String, String>),
    /// Attached stylesheet
    Stylesheet(StyleHandle),
    /// Aggregated package members
    Map(BTreeMap<String, ModuleValue>),
    /// Positional values (callback-less `require`)
    List(Vec<ModuleValue>),
    /// Host value produced by a factory
    Native(Arc<dyn Any + Send + Sync>),
}

impl ModuleValue {
    /// Wrap an arbitrary host value
    pub fn native<T: Any + Send + Sync>(value: T) -> Self {
        Self::Native(Arc::new(value))
    }

    /// Whether the value counts as empty (a malformed factory result)
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Undefined | Self::Json(serde_json::Value::Null))
    }

    /// Borrow text content, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Json(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Borrow JSON content, if any
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow a package map, if any
    pub fn as_map(&self) -> Option<&BTreeMap<String, ModuleValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Downcast a native value
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Native(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Short type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Evaluated => "evaluated",
            Self::Text(_) => "text",
            Self::Json(_) => "json",
            Self::Templates(_) => "templates",
            Self::Stylesheet(_) => "stylesheet",
            Self::Map(_) => "map",
            Self::List(_) => "list",
            Self::Native(_) => "native",
        }
    }

    /// Convert to JSON where a faithful representation exists
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Self::Undefined => J::Null,
            Self::Evaluated => J::Bool(true),
            Self::Text(s) => J::String(s.clone()),
            Self::Json(v) => v.clone(),
            Self::Templates(t) => J::Object(
                t.iter()
                    .map(|(k, v)| (k.clone(), J::String(v.clone())))
                    .collect(),
            ),
            Self::Stylesheet(h) => J::String(h.url.clone()),
            Self::Map(m) => J::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            Self::List(l) => J::Array(l.iter().map(ModuleValue::to_json).collect()),
            Self::Native(_) => J::String("[native]".to_string()),
        }
    }
}

impl PartialEq for ModuleValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Evaluated, Self::Evaluated) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Templates(a), Self::Templates(b)) => a == b,
            (Self::Stylesheet(a), Self::Stylesheet(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            // Host values compare by identity
            (Self::Native(a), Self::Native(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ModuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "Undefined"),
            Self::Evaluated => write!(f, "Evaluated"),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Templates(t) => f.debug_tuple("Templates").field(t).finish(),
            Self::Stylesheet(h) => f.debug_tuple("Stylesheet").field(&h.url).finish(),
            Self::Map(m) => f.debug_tuple("Map").field(m).finish(),
            Self::List(l) => f.debug_tuple("List").field(l).finish(),
            Self::Native(_) => write!(f, "Native(..)"),
        }
    }
}

impl fmt::Display for ModuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Evaluated => write!(f, "[evaluated]"),
            Self::Text(s) => write!(f, "{}", s),
            Self::Stylesheet(h) => write!(f, "[stylesheet {}]", h.url),
            Self::Native(_) => write!(f, "[native]"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for ModuleValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ModuleValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<serde_json::Value> for ModuleValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}
