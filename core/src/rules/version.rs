use serde::{Deserialize, Serialize};
use std::slice;

use crate::error::{AuditError, Result};

/// Version labels describing the device under test, most specific last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionContext {
    Single(String),
    Multiple(Vec<String>),
}

impl VersionContext {
    pub fn labels(&self) -> &[String] {
        match self {
            VersionContext::Single(label) => slice::from_ref(label),
            VersionContext::Multiple(labels) => labels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.labels().is_empty()
    }
}

impl Default for VersionContext {
    fn default() -> Self {
        VersionContext::Multiple(Vec::new())
    }
}

impl From<&str> for VersionContext {
    fn from(label: &str) -> Self {
        VersionContext::Single(label.to_string())
    }
}

impl From<String> for VersionContext {
    fn from(label: String) -> Self {
        VersionContext::Single(label)
    }
}

impl From<Vec<String>> for VersionContext {
    fn from(labels: Vec<String>) -> Self {
        VersionContext::Multiple(labels)
    }
}

impl From<&[&str]> for VersionContext {
    fn from(labels: &[&str]) -> Self {
        VersionContext::Multiple(labels.iter().map(|l| l.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for VersionContext {
    fn from(labels: [&str; N]) -> Self {
        VersionContext::from(&labels[..])
    }
}

/// Accepts a string or a sequence of strings; anything else is
/// `InvalidVersionContext`.
impl TryFrom<&serde_yaml::Value> for VersionContext {
    type Error = AuditError;

    fn try_from(value: &serde_yaml::Value) -> Result<Self> {
        match value {
            serde_yaml::Value::String(label) => Ok(VersionContext::Single(label.clone())),
            serde_yaml::Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        AuditError::InvalidVersionContext(format!(
                            "{:?} is not a version label",
                            item
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(VersionContext::Multiple),
            other => Err(AuditError::InvalidVersionContext(format!(
                "{:?} is not a string or a list of strings",
                other
            ))),
        }
    }
}
