// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work items and their classification by affinity and scope

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Position of an item in the host's frozen collection
pub type ItemIndex = usize;

/// What kind of execution slot an item needs
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum Affinity {
    /// Ordinary CPU-bound worker, no meter
    #[default]
    None,
    /// Exclusive use of one meter
    Single,
    /// Exclusive use of a peer group of meters
    Multi,
    /// Application-defined tag
    Named(String),
}

impl Affinity {
    pub fn as_str(&self) -> &str {
        match self {
            Affinity::None => "none",
            Affinity::Single => "single",
            Affinity::Multi => "multi",
            Affinity::Named(name) => name,
        }
    }

    /// Whether workers of this affinity are bound to locked meters
    pub fn needs_resource(&self) -> bool {
        matches!(self, Affinity::Single | Affinity::Multi)
    }
}

impl From<String> for Affinity {
    fn from(s: String) -> Self {
        Affinity::from(s.as_str())
    }
}

impl From<&str> for Affinity {
    fn from(s: &str) -> Self {
        match s {
            "" | "none" | "default" => Affinity::None,
            "single" | "single_meter" => Affinity::Single,
            "multi" | "multi_meter" => Affinity::Multi,
            other => Affinity::Named(other.to_string()),
        }
    }
}

impl From<Affinity> for String {
    fn from(a: Affinity) -> Self {
        a.as_str().to_string()
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping key; items sharing a scope prefer the same worker
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(pub String);

impl Scope {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Built-in scope aggregation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    /// Every item is its own scope
    #[default]
    ByTest,
    /// Items from the same source file share a scope
    ByFile,
    /// Items from the same module share a scope
    ByModule,
}

impl ScopeMode {
    fn keyword(value: &str) -> Option<Self> {
        match value {
            "bytest" => Some(ScopeMode::ByTest),
            "byfile" => Some(ScopeMode::ByFile),
            "bymodule" => Some(ScopeMode::ByModule),
            _ => None,
        }
    }

    /// Derive the scope of an item id such as `tests/test_a.py::TestX::test_y`
    pub fn scope_of(&self, node_id: &str) -> Scope {
        let file = node_id.split("::").next().unwrap_or(node_id);
        match self {
            ScopeMode::ByTest => Scope::new(node_id),
            ScopeMode::ByFile => Scope::new(file),
            ScopeMode::ByModule => match file.rsplit_once('.') {
                Some((module, _ext)) => Scope::new(module),
                None => Scope::new(file),
            },
        }
    }
}

/// A declaration attached to an item by its author
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// Explicit affinity tag
    Affinity(String),
    /// Explicit grouping; `bytest`/`byfile`/`bymodule` select a mode,
    /// anything else is a literal scope name
    Group(String),
}

/// An item as delivered by the host framework, before classification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemSpec {
    pub node_id: String,
    #[serde(default)]
    pub markers: Vec<Marker>,
    /// Names of fixtures the item uses
    #[serde(default)]
    pub fixtures: Vec<String>,
}

impl WorkItemSpec {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            markers: Vec::new(),
            fixtures: Vec::new(),
        }
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn with_fixture(mut self, fixture: impl Into<String>) -> Self {
        self.fixtures.push(fixture.into());
        self
    }
}

/// A classified item owned by the router
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub index: ItemIndex,
    pub node_id: String,
    pub affinity: Affinity,
    pub scope: Scope,
    pub completed: bool,
}

/// Derives affinity and scope from item declarations
#[derive(Clone, Debug)]
pub struct Classifier {
    default_scope: ScopeMode,
    fixture_affinity: BTreeMap<String, Affinity>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ScopeMode::ByTest)
            .with_fixtures(Affinity::Single, ["meter", "preinstalled_meter", "meter_db"])
            .with_fixtures(Affinity::Multi, ["multi_meter", "preinstalled_multi_meter"])
    }
}

impl Classifier {
    /// A classifier with no fixture mapping
    pub fn new(default_scope: ScopeMode) -> Self {
        Self {
            default_scope,
            fixture_affinity: BTreeMap::new(),
        }
    }

    /// Items using any of `fixtures` get `affinity` unless a marker says otherwise
    pub fn with_fixtures<I, S>(mut self, affinity: Affinity, fixtures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for fixture in fixtures {
            self.fixture_affinity.insert(fixture.into(), affinity.clone());
        }
        self
    }

    pub fn classify(&self, spec: &WorkItemSpec) -> (Affinity, Scope) {
        (self.affinity_of(spec), self.scope_of(spec))
    }

    fn affinity_of(&self, spec: &WorkItemSpec) -> Affinity {
        let marked = spec.markers.iter().find_map(|m| match m {
            Marker::Affinity(name) => Some(Affinity::from(name.as_str())),
            Marker::Group(_) => None,
        });
        if let Some(affinity) = marked {
            return affinity;
        }
        spec.fixtures
            .iter()
            .find_map(|f| self.fixture_affinity.get(f).cloned())
            .unwrap_or_default()
    }

    fn scope_of(&self, spec: &WorkItemSpec) -> Scope {
        let group = spec.markers.iter().find_map(|m| match m {
            Marker::Group(name) => Some(name.as_str()),
            Marker::Affinity(_) => None,
        });
        match group {
            Some(name) => match ScopeMode::keyword(name) {
                Some(mode) => mode.scope_of(&spec.node_id),
                None => Scope::new(name),
            },
            None => self.default_scope.scope_of(&spec.node_id),
        }
    }
}

#[cfg(test)]
#[path = "work_tests.rs"]
mod tests;
