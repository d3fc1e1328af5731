use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::alerts::templates::{MessageContext, QueryContext, TemplateRenderer};
use crate::alerts::thresholds::{Direction, Threshold};
use crate::error::ConfigError;

/// One alert rule as written in the rule file. Field names follow the
/// existing file format, including the `treshold` spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "prometheus_query", default)]
    pub query_template: String,
    #[serde(rename = "treshold", default)]
    pub threshold: Threshold,
    #[serde(rename = "above", default)]
    pub direction: Direction,
    #[serde(rename = "subject", default)]
    pub subject_template: String,
    #[serde(rename = "message", default)]
    pub body_template: String,
    /// Suppression hint forwarded to the notification service, e.g. "24h".
    #[serde(rename = "notification_interval", default)]
    pub notify_interval: String,
}

/// Rules for one service type, evaluated in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertRuleSet(Vec<AlertRule>);

impl AlertRuleSet {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self(rules)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertRule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Static mapping from service label to its rule set, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleCatalog {
    sets: HashMap<String, AlertRuleSet>,
}

/// Problems found when dry-running a rule's templates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleCheck {
    pub label: String,
    pub rule: String,
    pub direction: Direction,
    pub threshold: String,
    pub problems: Vec<String>,
}

impl RuleCatalog {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents, &path.display().to_string())
    }

    pub fn from_json(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        let sets: HashMap<String, AlertRuleSet> =
            serde_json::from_str(contents).map_err(|e| ConfigError::InvalidRules {
                path: origin.to_string(),
                reason: e.to_string(),
            })?;

        let catalog = Self { sets };
        catalog.validate(origin)?;
        Ok(catalog)
    }

    pub fn from_sets(sets: HashMap<String, AlertRuleSet>) -> Self {
        Self { sets }
    }

    fn validate(&self, origin: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidRules {
            path: origin.to_string(),
            reason,
        };

        for (label, set) in &self.sets {
            if label.trim().is_empty() {
                return Err(invalid("empty service label".to_string()));
            }

            let mut names = HashSet::new();
            for (idx, rule) in set.iter().enumerate() {
                if rule.name.trim().is_empty() {
                    return Err(invalid(format!("{label}[{idx}]: rule has no name")));
                }
                if rule.query_template.trim().is_empty() {
                    return Err(invalid(format!(
                        "{label}/{}: prometheus_query is empty",
                        rule.name
                    )));
                }
                // Rule names feed the notification id, so they must be
                // unique per service type.
                if !names.insert(rule.name.as_str()) {
                    return Err(invalid(format!("{label}: duplicate rule name {}", rule.name)));
                }
                if rule.threshold.parse().is_err() {
                    tracing::warn!(
                        label = %label,
                        rule = %rule.name,
                        threshold = %rule.threshold,
                        "rule threshold is not an integer; the rule will be skipped at evaluation"
                    );
                }
            }
        }
        Ok(())
    }

    pub fn rule_set(&self, label: &str) -> Option<&AlertRuleSet> {
        self.sets.get(label)
    }

    /// Service labels in sorted order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.sets.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }

    pub fn rule_count(&self) -> usize {
        self.sets.values().map(AlertRuleSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Dry-run every rule: parse the threshold and render the query, subject
    /// and body against a placeholder instance.
    pub fn check(&self, renderer: &TemplateRenderer) -> Vec<RuleCheck> {
        let sample = MessageContext {
            alert_name: "sample-alert".to_string(),
            instance_id: "00000000-0000-0000-0000-000000000000".to_string(),
            instance_name: "sample-instance".to_string(),
            environment_name: "sample-env".to_string(),
            space_name: "sample-space".to_string(),
            org_name: "sample-org".to_string(),
            treshold: "0".to_string(),
            threshold: "0".to_string(),
            metric_value: "0.00".to_string(),
        };

        let mut checks = Vec::new();
        for label in self.labels() {
            for rule in self.sets[label].iter() {
                let mut problems = Vec::new();
                if let Err(e) = rule.threshold.parse() {
                    problems.push(e.to_string());
                }
                let query_ctx = QueryContext {
                    instance_id: &sample.instance_id,
                };
                if let Err(e) = renderer.render("query", &rule.query_template, &query_ctx) {
                    problems.push(e.to_string());
                }
                if let Err(e) = renderer.render("subject", &rule.subject_template, &sample) {
                    problems.push(e.to_string());
                }
                if let Err(e) = renderer.render("message", &rule.body_template, &sample) {
                    problems.push(e.to_string());
                }

                checks.push(RuleCheck {
                    label: label.to_string(),
                    rule: rule.name.clone(),
                    direction: rule.direction,
                    threshold: rule.threshold.to_string(),
                    problems,
                });
            }
        }
        checks
    }
}
