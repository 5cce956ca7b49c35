//! Values exchanged with the hosted evaluator.
//!
//! Only the shapes the services need are modelled: source locations, path
//! configurations, and a small tree of evaluator values for arguments and
//! results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A source location in `scheme://authority/path` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub scheme: String,
    #[serde(default)]
    pub authority: String,
    #[serde(default)]
    pub path: String,
}

impl SourceLocation {
    pub fn new(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            authority: authority.into(),
            path: path.into(),
        }
    }

    /// Parse `scheme://authority/path`. A location without `://` is rejected.
    pub fn parse(uri: &str) -> Option<Self> {
        let (scheme, rest) = uri.split_once("://")?;
        if scheme.is_empty() {
            return None;
        }
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        Some(Self::new(scheme, authority, path))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)
    }
}

/// Search paths handed to the checker for one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    pub bin: SourceLocation,
    #[serde(default)]
    pub srcs: Vec<SourceLocation>,
    #[serde(default)]
    pub libs: Vec<SourceLocation>,
}

impl PathConfig {
    pub fn new(bin: SourceLocation) -> Self {
        Self {
            bin,
            srcs: Vec::new(),
            libs: Vec::new(),
        }
    }

    /// Evaluator representation: `pathConfig(bin, [srcs], [libs])`
    pub fn to_value(&self) -> Value {
        Value::node(
            "pathConfig",
            vec![
                Value::Loc(self.bin.clone()),
                Value::List(self.srcs.iter().cloned().map(Value::Loc).collect()),
                Value::List(self.libs.iter().cloned().map(Value::Loc).collect()),
            ],
        )
    }
}

/// Evaluator value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    Loc(SourceLocation),
    List(Vec<Value>),
    Node { name: String, children: Vec<Value> },
}

impl Value {
    pub fn node(name: impl Into<String>, children: Vec<Value>) -> Self {
        Value::Node {
            name: name.into(),
            children,
        }
    }

    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    pub fn as_location(&self) -> Option<&SourceLocation> {
        match self {
            Value::Loc(loc) => Some(loc),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short description used in diagnostics
    pub fn describe(&self) -> String {
        match self {
            Value::Loc(loc) => loc.to_string(),
            Value::Str(text) => text.clone(),
            other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
        }
    }
}

impl From<SourceLocation> for Value {
    fn from(loc: SourceLocation) -> Self {
        Value::Loc(loc)
    }
}
