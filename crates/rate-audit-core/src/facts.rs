//! The fact mapping accumulated over a run.
//!
//! Facts only grow: merging adds keys or overwrites values, never removes.
//! A `null` value counts as absent.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::FactMap;

/// What a merge did to the fact set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Keys that were absent before
    pub added: Vec<String>,

    /// Keys whose value changed
    pub updated: Vec<String>,

    /// Keys received with the value already held (or with `null`)
    pub unchanged: Vec<String>,
}

impl MergeReport {
    /// True when the merge added or changed at least one fact.
    pub fn made_progress(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty()
    }
}

/// Facts known about the record under audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactSet {
    facts: FactMap,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a map, dropping `null` values.
    pub fn from_map(map: FactMap) -> Self {
        let mut set = Self::new();
        set.merge(map);
        set
    }

    /// Value of a fact, if present and not `null`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.facts.get(name).filter(|v| !v.is_null())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Numeric value. Numeric strings ("12.5") are accepted, since data
    /// sources are not consistent about number encoding.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Scalar value rendered as text.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Fact names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.facts.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &FactMap {
        &self.facts
    }

    pub fn into_map(self) -> FactMap {
        self.facts
    }

    /// The subset of `names` that is not present.
    pub fn absent<'a, I>(&self, names: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter(|name| !self.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// The subset of `names` that is already present.
    pub fn present<'a, I>(&self, names: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter(|name| self.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// Merge incoming facts. Incoming values overwrite; `null` never
    /// overwrites and is never inserted, so the key set cannot shrink.
    pub fn merge(&mut self, incoming: FactMap) -> MergeReport {
        let mut report = MergeReport::default();

        for (name, value) in incoming {
            if value.is_null() {
                report.unchanged.push(name);
                continue;
            }

            match self.facts.get(&name) {
                Some(existing) if *existing == value => report.unchanged.push(name),
                Some(_) => {
                    self.facts.insert(name.clone(), value);
                    report.updated.push(name);
                }
                None => {
                    self.facts.insert(name.clone(), value);
                    report.added.push(name);
                }
            }
        }

        report
    }
}
