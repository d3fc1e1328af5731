pub mod evaluator;
pub mod notifications;
pub mod rules;
pub mod templates;
pub mod thresholds;

pub use evaluator::{Evaluation, Evaluator};
pub use notifications::{Notifier, notification_id};
pub use rules::{AlertRule, AlertRuleSet, RuleCatalog, RuleCheck};
pub use templates::TemplateRenderer;
pub use thresholds::{Direction, Threshold};
