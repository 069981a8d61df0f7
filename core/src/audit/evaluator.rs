use regex::Regex;

use crate::config::{ConfigDocument, ConfigLine};
use crate::rules::model::{Rule, RulePattern, RuleResult};

/// Evaluates resolved rules against a configuration snapshot.
///
/// Evaluation never fails: a rule that does not match is reported as a
/// false outcome, with diagnostics for hierarchical rules that went wrong
/// partway down the tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, rule: &Rule, document: &ConfigDocument) -> RuleResult {
        let (outcome, message) = match &rule.pattern {
            RulePattern::Flat(regex) => (match_lines(regex, &rule.expected, document), None),
            RulePattern::Hierarchical(levels) => match_tree(levels, &rule.expected, document),
        };
        RuleResult::new(rule.name.clone(), outcome, message)
    }
}

/// True when any line's first capture group equals `expected`.
fn match_lines(regex: &Regex, expected: &str, document: &ConfigDocument) -> bool {
    document
        .lines()
        .iter()
        .any(|line| first_group(regex, &line.text) == Some(expected))
}

fn first_group<'t>(regex: &Regex, text: &'t str) -> Option<&'t str> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

// The value a leaf pattern extracts from a parent: group 1 of the first
// child that matches, or the whole match if the pattern has no group.
fn leaf_value<'t>(regex: &Regex, children: &[&'t ConfigLine]) -> Option<&'t str> {
    children.iter().find_map(|child| {
        regex
            .captures(&child.text)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| m.as_str())
    })
}

fn match_tree(
    levels: &[Regex],
    expected: &str,
    document: &ConfigDocument,
) -> (bool, Option<String>) {
    let Some((root, descent)) = levels.split_first() else {
        return (false, None);
    };
    if descent.is_empty() {
        return (match_lines(root, expected, document), None);
    }

    // A root that matches nothing yields false with no diagnostic.
    let mut parents = document.find_lines(root);
    let mut matched = false;
    let mut failed = false;
    let mut message = String::new();

    for (depth, pattern) in descent.iter().enumerate() {
        let is_leaf = depth + 1 == descent.len();
        let mut next = Vec::new();

        for parent in &parents {
            let children = document.children(parent);

            if is_leaf {
                match leaf_value(pattern, &children) {
                    Some(value) if value == expected => matched = true,
                    _ => {
                        failed = true;
                        message.push_str(&format!(
                            "Match failed for configuration, line {}.\n",
                            parent.number
                        ));
                    }
                }
            } else {
                match children.into_iter().find(|child| pattern.is_match(&child.text)) {
                    Some(child) => next.push(child),
                    None => {
                        failed = true;
                        message.push_str(&format!(
                            "Could not find child, line {}.\n",
                            parent.number
                        ));
                    }
                }
            }
        }

        parents = next;
    }

    let message = (!message.is_empty()).then_some(message);
    (matched && !failed, message)
}
