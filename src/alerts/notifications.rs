use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::alerts::rules::AlertRule;
use crate::alerts::templates::{MessageContext, TemplateRenderer};
use crate::error::EvaluationError;
use crate::metrics::MetricSample;
use crate::notify::{DispatchOutcome, Dispatcher, NotificationMessage, NotificationTarget};
use crate::platform::{ServiceInstance, Space};

/// Dedup key for a breach. Stable across cycles and replicas so the
/// notification service can suppress repeats.
pub fn notification_id(instance_id: &str, rule_name: &str) -> String {
    format!("{instance_id}-{rule_name}")
}

pub fn format_metric_value(value: f64) -> String {
    format!("{value:.2}")
}

/// Builds notification messages for breaches and hands them to the
/// dispatcher. Holds no delivery history.
pub struct Notifier {
    dispatcher: Arc<dyn Dispatcher>,
    templates: Arc<TemplateRenderer>,
    environment: String,
    dispatch_timeout: Duration,
}

impl Notifier {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        templates: Arc<TemplateRenderer>,
        environment: impl Into<String>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            templates,
            environment: environment.into(),
            dispatch_timeout,
        }
    }

    pub fn render(
        &self,
        rule: &AlertRule,
        instance: &ServiceInstance,
        space: &Space,
        sample: &MetricSample,
    ) -> Result<NotificationMessage, EvaluationError> {
        let context = MessageContext {
            alert_name: rule.name.clone(),
            instance_id: instance.guid.clone(),
            instance_name: instance.name.clone(),
            environment_name: self.environment.clone(),
            space_name: space.name.clone(),
            org_name: space.org_name.clone(),
            treshold: rule.threshold.to_string(),
            threshold: rule.threshold.to_string(),
            metric_value: format_metric_value(sample.value),
        };

        Ok(NotificationMessage {
            id: notification_id(&instance.guid, &rule.name),
            subject: self
                .templates
                .render("subject", &rule.subject_template, &context)?,
            body: self
                .templates
                .render("message", &rule.body_template, &context)?,
            expires_in: rule.notify_interval.clone(),
            target: NotificationTarget::space(&self.environment, &space.guid),
        })
    }

    /// Send one message. Every outcome is logged here; none is escalated.
    pub async fn dispatch(&self, message: &NotificationMessage) -> DispatchOutcome {
        let outcome = match tokio::time::timeout(
            self.dispatch_timeout,
            self.dispatcher.dispatch(message),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => DispatchOutcome::TransportError(format!(
                "notification dispatch timed out after {:?}",
                self.dispatch_timeout
            )),
        };

        match &outcome {
            DispatchOutcome::Sent => {
                info!(notification_id = %message.id, subject = %message.subject, "notification sent")
            }
            DispatchOutcome::AlreadySent => {
                info!(notification_id = %message.id, "notification already sent")
            }
            DispatchOutcome::Unauthorized => {
                warn!(notification_id = %message.id, "notification service rejected credentials")
            }
            DispatchOutcome::TransportError(reason) => {
                warn!(notification_id = %message.id, reason = %reason, "notification not delivered")
            }
        }
        outcome
    }
}
