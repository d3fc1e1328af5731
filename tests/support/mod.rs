// In-memory stand-ins for the inventory, metrics backend and notification
// service.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use service_alerter::alerts::{
    AlertRule, AlertRuleSet, Direction, Evaluator, Notifier, RuleCatalog, TemplateRenderer,
    Threshold,
};
use service_alerter::error::FetchError;
use service_alerter::metrics::{LabelSet, MetricSample, MetricsSource, QueryValue};
use service_alerter::notify::{DispatchOutcome, Dispatcher, NotificationMessage};
use service_alerter::platform::{Inventory, Service, ServiceInstance, ServicePlan, Space};
use service_alerter::scan::{NodeIdentity, ScanOrchestrator};

pub const APP_GUID: &str = "alerter-app";

#[derive(Default)]
pub struct FakeInventory {
    pub replicas: u32,
    pub fail_replica_count: bool,
    pub fail_listing: bool,
    pub stall_listing: bool,
    pub fail_spaces: bool,
    pub instances: Vec<ServiceInstance>,
    // plan guid -> service guid
    pub plans: HashMap<String, String>,
    // service guid -> label
    pub services: HashMap<String, String>,
    pub replica_calls: AtomicUsize,
    pub listing_calls: AtomicUsize,
    pub space_calls: AtomicUsize,
}

impl FakeInventory {
    pub fn new(replicas: u32) -> Self {
        Self {
            replicas,
            ..Default::default()
        }
    }

    /// Register an instance whose plan resolves to `label`.
    pub fn with_instance(mut self, guid: &str, label: &str) -> Self {
        let plan = format!("plan-{label}");
        let service = format!("service-{label}");
        self.plans.insert(plan.clone(), service.clone());
        self.services.insert(service, label.to_string());
        self.instances.push(ServiceInstance {
            guid: guid.to_string(),
            name: format!("{guid}-name"),
            service_plan_guid: Some(plan),
            space_guid: format!("space-of-{guid}"),
        });
        self
    }

    /// Register a user-provided instance with no plan.
    pub fn with_unplanned_instance(mut self, guid: &str) -> Self {
        self.instances.push(ServiceInstance {
            guid: guid.to_string(),
            name: guid.to_string(),
            service_plan_guid: None,
            space_guid: "space-ups".to_string(),
        });
        self
    }
}

#[async_trait]
impl Inventory for FakeInventory {
    async fn replica_count(&self, app_guid: &str) -> Result<u32, FetchError> {
        assert_eq!(app_guid, APP_GUID);
        self.replica_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_replica_count {
            return Err(FetchError::Other("process lookup failed".to_string()));
        }
        Ok(self.replicas)
    }

    async fn list_service_instances(&self) -> Result<Vec<ServiceInstance>, FetchError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if self.stall_listing {
            std::future::pending::<()>().await;
        }
        if self.fail_listing {
            return Err(FetchError::Other("inventory unavailable".to_string()));
        }
        Ok(self.instances.clone())
    }

    async fn service_plan(&self, plan_guid: &str) -> Result<ServicePlan, FetchError> {
        self.plans
            .get(plan_guid)
            .map(|service_guid| ServicePlan {
                guid: plan_guid.to_string(),
                service_guid: service_guid.clone(),
            })
            .ok_or_else(|| FetchError::Other(format!("no plan {plan_guid}")))
    }

    async fn service(&self, service_guid: &str) -> Result<Service, FetchError> {
        self.services
            .get(service_guid)
            .map(|label| Service {
                guid: service_guid.to_string(),
                label: label.clone(),
            })
            .ok_or_else(|| FetchError::Other(format!("no service {service_guid}")))
    }

    async fn space(&self, space_guid: &str) -> Result<Space, FetchError> {
        self.space_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_spaces {
            return Err(FetchError::Other("space lookup failed".to_string()));
        }
        Ok(Space {
            guid: space_guid.to_string(),
            name: "dev".to_string(),
            org_name: "acme".to_string(),
        })
    }
}

/// Answers `<metric>{id="<instance>"}` queries from a table of values.
#[derive(Default)]
pub struct FakeMetrics {
    // rendered query -> sample values
    pub values: HashMap<String, Vec<f64>>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeMetrics {
    pub fn with_values(mut self, metric: &str, instance: &str, values: &[f64]) -> Self {
        self.values
            .insert(query_for(metric, instance), values.to_vec());
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queried_instances(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .queries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|q| q.split('"').nth(1).map(str::to_string))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

pub fn query_for(metric: &str, instance: &str) -> String {
    format!(r#"{metric}{{id="{instance}"}}"#)
}

#[async_trait]
impl MetricsSource for FakeMetrics {
    async fn query(&self, query: &str) -> Result<QueryValue, FetchError> {
        self.queries.lock().unwrap().push(query.to_string());
        let values = self.values.get(query).cloned().unwrap_or_default();
        Ok(QueryValue::Vector(
            values
                .into_iter()
                .enumerate()
                .map(|(i, value)| MetricSample {
                    value,
                    timestamp: Utc::now(),
                    labels: [("series", i.to_string())].into_iter().collect::<LabelSet>(),
                })
                .collect(),
        ))
    }
}

/// Records every message it is handed. Ids without a configured outcome are
/// answered with `Sent`.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<NotificationMessage>>,
    pub outcomes: HashMap<String, DispatchOutcome>,
}

impl RecordingDispatcher {
    pub fn with_outcome(mut self, id: &str, outcome: DispatchOutcome) -> Self {
        self.outcomes.insert(id.to_string(), outcome);
        self
    }

    pub fn ids(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.id.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, message: &NotificationMessage) -> DispatchOutcome {
        self.sent.lock().unwrap().push(message.clone());
        self.outcomes
            .get(&message.id)
            .cloned()
            .unwrap_or(DispatchOutcome::Sent)
    }
}

pub fn rule(name: &str, metric: &str, threshold: &str, direction: Direction) -> AlertRule {
    AlertRule {
        name: name.to_string(),
        query_template: format!(r#"{metric}{{id="{{{{.InstanceId}}}}"}}"#),
        threshold: Threshold::new(threshold),
        direction,
        subject_template: "{{.AlertName}} on {{.InstanceName}}: {{.MetricValue}}".to_string(),
        body_template: "{{.InstanceName}} in {{.SpaceName}}/{{.OrgName}} ({{.EnvironmentName}})"
            .to_string(),
        notify_interval: "24h".to_string(),
    }
}

pub fn catalog(sets: Vec<(&str, Vec<AlertRule>)>) -> RuleCatalog {
    RuleCatalog::from_sets(
        sets.into_iter()
            .map(|(label, rules)| (label.to_string(), AlertRuleSet::new(rules)))
            .collect(),
    )
}

pub struct Harness {
    pub inventory: Arc<FakeInventory>,
    pub metrics: Arc<FakeMetrics>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub orchestrator: ScanOrchestrator,
}

pub fn harness(
    replica_index: u32,
    inventory: FakeInventory,
    metrics: FakeMetrics,
    catalog: RuleCatalog,
) -> Harness {
    let inventory = Arc::new(inventory);
    let metrics = Arc::new(metrics);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    harness_with(replica_index, inventory, metrics, dispatcher, catalog)
}

pub fn harness_with(
    replica_index: u32,
    inventory: Arc<FakeInventory>,
    metrics: Arc<FakeMetrics>,
    dispatcher: Arc<RecordingDispatcher>,
    catalog: RuleCatalog,
) -> Harness {
    let templates = Arc::new(TemplateRenderer::new());
    let timeout = Duration::from_secs(10);
    let orchestrator = ScanOrchestrator::new(
        NodeIdentity {
            app_guid: APP_GUID.to_string(),
            replica_index,
        },
        inventory.clone(),
        Arc::new(catalog),
        Evaluator::new(metrics.clone(), templates.clone(), timeout),
        Notifier::new(dispatcher.clone(), templates, "prod", timeout),
        4,
        timeout,
    );

    Harness {
        inventory,
        metrics,
        dispatcher,
        orchestrator,
    }
}
