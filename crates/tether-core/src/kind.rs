// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resource kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a module's underlying resource; selects the fetch strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Executable code that may declare modules when evaluated
    Code,
    /// Stylesheet attached to the document
    Stylesheet,
    /// Markup templates
    Template,
    /// Composite module aggregating several members
    Package,
    /// Raw data
    Generic,
}

impl ResourceKind {
    /// Parse an identifier prefix (`css` in `css!theme`)
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "js" => Some(Self::Code),
            "css" => Some(Self::Stylesheet),
            "tpl" | "template" => Some(Self::Template),
            "pkg" | "package" => Some(Self::Package),
            "text" | "data" => Some(Self::Generic),
            _ => None,
        }
    }

    /// Prefix used in canonical ids
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Code => "js",
            Self::Stylesheet => "css",
            Self::Template => "tpl",
            Self::Package => "pkg",
            Self::Generic => "text",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Code => "code",
            Self::Stylesheet => "stylesheet",
            Self::Template => "template",
            Self::Package => "package",
            Self::Generic => "generic",
        };
        f.write_str(name)
    }
}
