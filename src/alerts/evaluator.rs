use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::alerts::rules::AlertRule;
use crate::alerts::templates::{QueryContext, TemplateRenderer};
use crate::alerts::thresholds::is_breach;
use crate::error::{EvaluationError, bounded};
use crate::metrics::{MetricSample, MetricsSource, QueryValue};

/// Outcome for one returned sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub breached: bool,
    pub sample: MetricSample,
}

/// Runs one rule's metric query for one instance and tests every returned
/// sample against the rule threshold.
pub struct Evaluator {
    metrics: Arc<dyn MetricsSource>,
    templates: Arc<TemplateRenderer>,
    query_timeout: Duration,
}

impl Evaluator {
    pub fn new(
        metrics: Arc<dyn MetricsSource>,
        templates: Arc<TemplateRenderer>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            metrics,
            templates,
            query_timeout,
        }
    }

    pub async fn evaluate(
        &self,
        rule: &AlertRule,
        instance_id: &str,
    ) -> Result<Vec<Evaluation>, EvaluationError> {
        // A threshold that cannot be compared makes the query pointless.
        let threshold = rule.threshold.parse()?;

        let query = self.templates.render(
            "query",
            &rule.query_template,
            &QueryContext { instance_id },
        )?;
        debug!(rule = %rule.name, instance_id, query = %query, "querying metrics");

        let samples = match bounded("metric query", self.query_timeout, self.metrics.query(&query)).await? {
            QueryValue::Vector(samples) => samples,
            other => return Err(EvaluationError::NotAVector(other.kind().to_string())),
        };

        let mut evaluations = Vec::with_capacity(samples.len());
        for sample in samples {
            let breached = match is_breach(rule.direction, threshold, sample.value) {
                Ok(breached) => breached,
                Err(e) => {
                    warn!(
                        rule = %rule.name,
                        instance_id,
                        labels = %sample.labels,
                        error = %e,
                        "ignoring sample"
                    );
                    false
                }
            };
            evaluations.push(Evaluation { breached, sample });
        }
        Ok(evaluations)
    }
}
