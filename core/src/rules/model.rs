use regex::Regex;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AuditError, Result};

/// 规则文件格式（YAML）
#[derive(Debug, Default, Deserialize)]
pub struct RuleSource {
    #[serde(rename = "TestItems", default)]
    pub items: OrderedItems,
    #[serde(rename = "TestGroups", default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

/// `TestItems` in document order: version label -> rule definitions.
#[derive(Debug, Default)]
pub struct OrderedItems(pub Vec<(String, BTreeMap<String, RuleDefinition>)>);

impl<'de> Deserialize<'de> for OrderedItems {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ItemsVisitor;

        impl<'de> Visitor<'de> for ItemsVisitor {
            type Value = OrderedItems;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of version label to rule definitions")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut items = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((label, rules)) =
                    map.next_entry::<String, Option<BTreeMap<String, RuleDefinition>>>()?
                {
                    items.push((label, rules.unwrap_or_default()));
                }
                Ok(OrderedItems(items))
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(OrderedItems::default())
            }
        }

        deserializer.deserialize_any(ItemsVisitor)
    }
}

/// `match:` is either one regex or a root-first sequence of regexes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MatchSpec {
    Single(String),
    Sequence(Vec<String>),
}

/// A rule as written in a rule file, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(rename = "match")]
    pub pattern: MatchSpec,
    #[serde(deserialize_with = "scalar_string")]
    pub expected: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

// `expected: 2` and `expected: "2"` mean the same thing.
fn scalar_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(de::Error::custom(format!(
            "expected value must be a string or scalar, found {:?}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Line-by-line search of the raw text.
    Text,
    /// Descent through the indentation tree.
    Config,
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(RuleKind::Text),
            "config" => Ok(RuleKind::Config),
            other => Err(format!("unknown rule type '{}' (expected text or config)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RulePattern {
    Flat(Regex),
    /// Root pattern first; never empty.
    Hierarchical(Vec<Regex>),
}

impl RulePattern {
    pub fn sources(&self) -> Vec<&str> {
        match self {
            RulePattern::Flat(regex) => vec![regex.as_str()],
            RulePattern::Hierarchical(levels) => levels.iter().map(Regex::as_str).collect(),
        }
    }
}

/// A rule resolved for one version context, with its patterns compiled.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    /// Command that produces the text this rule inspects. Informational only.
    pub command: Option<String>,
    pub pattern: RulePattern,
    pub expected: String,
    pub kind: RuleKind,
    /// Label of the bucket the rule was resolved from.
    pub version: String,
}

impl Rule {
    pub fn from_definition(
        name: impl Into<String>,
        version: impl Into<String>,
        definition: &RuleDefinition,
    ) -> Result<Self> {
        let name = name.into();
        let declared = definition
            .kind
            .as_deref()
            .map(RuleKind::from_str)
            .transpose()
            .map_err(|reason| AuditError::InvalidRule {
                rule: name.clone(),
                reason,
            })?;

        let compile = |source: &str| {
            Regex::new(source).map_err(|source| AuditError::InvalidPattern {
                rule: name.clone(),
                source,
            })
        };

        // A sequence is always walked as a tree, whatever `type` says.
        let (pattern, kind) = match (&definition.pattern, declared) {
            (MatchSpec::Sequence(levels), _) => {
                if levels.is_empty() {
                    return Err(AuditError::InvalidRule {
                        rule: name.clone(),
                        reason: "match sequence must not be empty".to_string(),
                    });
                }
                let levels = levels
                    .iter()
                    .map(|level| compile(level))
                    .collect::<Result<Vec<_>>>()?;
                (RulePattern::Hierarchical(levels), RuleKind::Config)
            }
            (MatchSpec::Single(source), Some(RuleKind::Config)) => {
                (RulePattern::Hierarchical(vec![compile(source)?]), RuleKind::Config)
            }
            (MatchSpec::Single(source), _) => {
                let regex = compile(source)?;
                if regex.captures_len() < 2 {
                    tracing::warn!(
                        rule = %name,
                        pattern = %source,
                        "flat rule has no capture group and can never pass"
                    );
                }
                (RulePattern::Flat(regex), RuleKind::Text)
            }
        };

        Ok(Self {
            name,
            command: definition.cmd.clone(),
            pattern,
            expected: definition.expected.clone(),
            kind,
            version: version.into(),
        })
    }
}

/// Outcome of evaluating one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub name: String,
    pub outcome: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RuleResult {
    pub fn new(name: impl Into<String>, outcome: bool, message: Option<String>) -> Self {
        Self {
            name: name.into(),
            outcome,
            message,
        }
    }
}
