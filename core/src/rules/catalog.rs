use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{AuditError, Result};
use crate::rules::loader::rule_files;
use crate::rules::model::{Rule, RuleDefinition, RuleSource};
use crate::rules::version::VersionContext;

/// Label of the fallback bucket consulted after every version-specific one.
pub const DEFAULT_LABEL: &str = "Default";

/// Rules defined for one version label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBucket {
    label: String,
    rules: BTreeMap<String, RuleDefinition>,
}

impl VersionBucket {
    pub fn new(label: impl Into<String>, rules: BTreeMap<String, RuleDefinition>) -> Self {
        Self {
            label: label.into(),
            rules,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn rules(&self) -> &BTreeMap<String, RuleDefinition> {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&RuleDefinition> {
        self.rules.get(name)
    }

    pub fn is_default(&self) -> bool {
        self.label == DEFAULT_LABEL
    }
}

/// Rule definitions grouped by version label, plus named rule groups.
///
/// Buckets are kept in load order except that `Default` buckets are always
/// placed ahead of every other label. Nothing is merged: when a label occurs
/// more than once, the bucket loaded last is the one resolution uses.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    buckets: Vec<VersionBucket>,
    groups: BTreeMap<String, Vec<String>>,
}

impl RuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.load_str(source)?;
        Ok(catalog)
    }

    pub fn load_str(&mut self, source: &str) -> Result<()> {
        self.load_named(source, "<string>")
    }

    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        self.load_named(&content, &path.display().to_string())
    }

    /// Loads every rule file below `path`. Returns the number of files read.
    ///
    /// All files are parsed before any is added, so a malformed file leaves
    /// the catalog untouched.
    pub fn load_dir<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let mut sources = Vec::new();
        for file in rule_files(path)? {
            let content = fs::read_to_string(&file)?;
            sources.push(parse_source(&content, &file.display().to_string())?);
        }

        let count = sources.len();
        for source in sources {
            self.extend(source);
        }
        Ok(count)
    }

    pub fn extend(&mut self, source: RuleSource) {
        for (label, rules) in source.items.0 {
            self.push_bucket(VersionBucket::new(label, rules));
        }
        self.groups.extend(source.groups);
    }

    pub fn push_bucket(&mut self, bucket: VersionBucket) {
        if bucket.is_default() {
            // Behind earlier `Default` buckets, ahead of everything else. The
            // last `Default` loaded shadows earlier ones; they are not merged.
            let at = self.buckets.iter().take_while(|b| b.is_default()).count();
            self.buckets.insert(at, bucket);
        } else {
            self.buckets.push(bucket);
        }
    }

    pub fn set_group(&mut self, name: impl Into<String>, rules: Vec<String>) {
        self.groups.insert(name.into(), rules);
    }

    pub fn buckets(&self) -> &[VersionBucket] {
        &self.buckets
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(VersionBucket::label)
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&[String]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// The bucket resolution uses for `label`: the last one in catalog order.
    pub fn bucket(&self, label: &str) -> Option<&VersionBucket> {
        self.buckets.iter().rev().find(|b| b.label == label)
    }

    /// Finds the definition of `name` for `version`.
    ///
    /// Labels are searched most specific first with `Default` last. The first
    /// bucket that defines `name` wins. A label with no bucket at all stops
    /// the search with `BucketNotFound`, even if a later label would match.
    pub fn resolve(&self, name: &str, version: &VersionContext) -> Result<Rule> {
        let search_order = version
            .labels()
            .iter()
            .map(String::as_str)
            .rev()
            .chain(std::iter::once(DEFAULT_LABEL));

        for label in search_order {
            let bucket = self
                .bucket(label)
                .ok_or_else(|| AuditError::BucketNotFound(label.to_string()))?;

            if let Some(definition) = bucket.get(name) {
                debug!(rule = name, version = label, "resolved rule");
                return Rule::from_definition(name, label, definition);
            }
            debug!(rule = name, version = label, "rule not in bucket, falling back");
        }

        Err(AuditError::RuleNotFound(name.to_string()))
    }

    fn load_named(&mut self, content: &str, origin: &str) -> Result<()> {
        let source = parse_source(content, origin)?;
        self.extend(source);
        Ok(())
    }
}

fn parse_source(content: &str, origin: &str) -> Result<RuleSource> {
    serde_yaml::from_str(content).map_err(|source| AuditError::Parse {
        origin: origin.to_string(),
        source,
    })
}
