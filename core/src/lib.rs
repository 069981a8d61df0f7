// netaudit Core Library
// 核心功能库，包含配置文档、规则目录、匹配引擎和设备会话

mod audit;
mod config;
mod rules;
pub mod session;

// 重新导出常用类型
pub use audit::{evaluator::RuleEvaluator, runner::AuditRunner};
pub use config::{ConfigDocument, ConfigLine};

// 规则系统
pub use rules::catalog::{RuleCatalog, VersionBucket, DEFAULT_LABEL};
pub use rules::loader::rule_files;
pub use rules::model::{
    MatchSpec, Rule, RuleDefinition, RuleKind, RulePattern, RuleResult, RuleSource,
};
pub use rules::version::VersionContext;

pub mod error {
    use std::time::Duration;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum AuditError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Parse error in {origin}: {source}")]
        Parse {
            origin: String,
            #[source]
            source: serde_yaml::Error,
        },

        #[error("test group must be set before running an audit")]
        GroupNotSet,

        #[error("test group '{0}' does not exist in the rule catalog")]
        GroupNotFound(String),

        #[error("no rule bucket is defined for version '{0}'")]
        BucketNotFound(String),

        #[error("rule '{0}' is not defined for any version in the search order")]
        RuleNotFound(String),

        #[error("invalid version context: {0}")]
        InvalidVersionContext(String),

        #[error("invalid rule '{rule}': {reason}")]
        InvalidRule { rule: String, reason: String },

        #[error("invalid pattern in rule '{rule}': {source}")]
        InvalidPattern {
            rule: String,
            #[source]
            source: regex::Error,
        },

        #[error("Session error: {0}")]
        Session(String),

        #[error("timed out after {0:?}")]
        Timeout(Duration),
    }

    pub type Result<T> = std::result::Result<T, AuditError>;
}
