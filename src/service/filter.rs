//! Ignorable input locations
//!
//! Sources under the evaluator's own bootstrap namespaces are never sent to the
//! checker. The check is pure and never touches the shared resource.

use crate::value::{SourceLocation, Value};
use serde::{Deserialize, Serialize};

/// Locations with this scheme, and one of these authorities, are ignored.
/// An empty authority list matches every authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRule {
    pub scheme: String,
    #[serde(default)]
    pub authorities: Vec<String>,
}

impl IgnoreRule {
    pub fn matches(&self, location: &SourceLocation) -> bool {
        self.scheme == location.scheme
            && (self.authorities.is_empty()
                || self.authorities.iter().any(|a| *a == location.authority))
    }
}

pub fn default_ignore_rules() -> Vec<IgnoreRule> {
    vec![IgnoreRule {
        scheme: "project".to_string(),
        authorities: vec!["rascal".to_string(), "rascal-eclipse".to_string()],
    }]
}

#[derive(Debug, Clone)]
pub struct LocationFilter {
    rules: Vec<IgnoreRule>,
}

impl Default for LocationFilter {
    fn default() -> Self {
        Self::new(default_ignore_rules())
    }
}

impl LocationFilter {
    pub fn new(rules: Vec<IgnoreRule>) -> Self {
        Self { rules }
    }

    pub fn is_ignored(&self, location: &SourceLocation) -> bool {
        self.rules.iter().any(|rule| rule.matches(location))
    }

    /// Keep only source locations that are not ignored. Values that are not
    /// locations are dropped.
    pub fn retain_sources(&self, files: Vec<Value>) -> Vec<Value> {
        files
            .into_iter()
            .filter(|value| matches!(value.as_location(), Some(loc) if !self.is_ignored(loc)))
            .collect()
    }
}
