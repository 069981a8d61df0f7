use tracing::info;

use crate::audit::evaluator::RuleEvaluator;
use crate::config::ConfigDocument;
use crate::error::{AuditError, Result};
use crate::rules::catalog::RuleCatalog;
use crate::rules::model::RuleResult;
use crate::rules::version::VersionContext;

/// Runs named rule groups from a catalog against one configuration snapshot.
///
/// The runner keeps the result list of its most recent successful run.
/// It is not meant to be shared between threads; use one runner per audit.
#[derive(Debug, Clone)]
pub struct AuditRunner {
    document: ConfigDocument,
    catalog: RuleCatalog,
    evaluator: RuleEvaluator,
    group: Option<String>,
    version: VersionContext,
    last_results: Option<Vec<RuleResult>>,
}

impl AuditRunner {
    pub fn new(document: ConfigDocument, catalog: RuleCatalog) -> Self {
        Self {
            document,
            catalog,
            evaluator: RuleEvaluator::new(),
            group: None,
            version: VersionContext::default(),
            last_results: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<VersionContext>) -> Self {
        self.version = version.into();
        self
    }

    pub fn set_group(&mut self, group: impl Into<String>) {
        self.group = Some(group.into());
    }

    pub fn set_version(&mut self, version: impl Into<VersionContext>) {
        self.version = version.into();
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn version(&self) -> &VersionContext {
        &self.version
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// Results of the last successful [`AuditRunner::run`], if any.
    pub fn last_results(&self) -> Option<&[RuleResult]> {
        self.last_results.as_deref()
    }

    /// Resolves and evaluates every rule of a group, in group order.
    ///
    /// A `group` passed here also becomes the runner's group for later runs.
    /// The first resolution error aborts the run and leaves the previous
    /// results in place.
    pub fn run(&mut self, group: Option<&str>) -> Result<&[RuleResult]> {
        if let Some(group) = group {
            self.group = Some(group.to_string());
        }
        let group = self.group.as_deref().ok_or(AuditError::GroupNotSet)?;
        let names = self
            .catalog
            .group(group)
            .ok_or_else(|| AuditError::GroupNotFound(group.to_string()))?;

        info!(
            group,
            rules = names.len(),
            versions = ?self.version.labels(),
            "running audit group"
        );

        let results = names
            .iter()
            .map(|name| {
                let rule = self.catalog.resolve(name, &self.version)?;
                Ok(self.evaluator.evaluate(&rule, &self.document))
            })
            .collect::<Result<Vec<_>>>()?;

        let passed = results.iter().filter(|r| r.outcome).count();
        info!(
            group,
            passed,
            failed = results.len() - passed,
            "audit group finished"
        );

        Ok(self.last_results.insert(results).as_slice())
    }
}
