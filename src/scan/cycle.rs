use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::alerts::{AlertRuleSet, Evaluator, Notifier, RuleCatalog};
use crate::error::{FetchError, bounded};
use crate::notify::DispatchOutcome;
use crate::platform::{Inventory, ServiceInstance, Space};
use crate::scan::ring::HashRing;

/// Which replica this process is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeIdentity {
    pub app_guid: String,
    pub replica_index: u32,
}

/// Everything a cycle decided up front. Built once per cycle and only read
/// afterwards.
#[derive(Debug, Clone)]
pub struct CycleSnapshot {
    pub replica_index: u32,
    pub replica_count: u32,
    pub ring: HashRing,
    /// Instances the inventory listed this cycle.
    pub listed: usize,
    pub owned: Vec<ServiceInstance>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub instances_seen: usize,
    pub instances_owned: usize,
    pub instances_skipped: usize,
    pub rules_evaluated: usize,
    pub rule_failures: usize,
    pub breaches: usize,
    pub notifications_sent: usize,
    pub notifications_suppressed: usize,
    pub notifications_failed: usize,
}

impl AddAssign for CycleStats {
    fn add_assign(&mut self, other: Self) {
        self.instances_seen += other.instances_seen;
        self.instances_owned += other.instances_owned;
        self.instances_skipped += other.instances_skipped;
        self.rules_evaluated += other.rules_evaluated;
        self.rule_failures += other.rule_failures;
        self.breaches += other.breaches;
        self.notifications_sent += other.notifications_sent;
        self.notifications_suppressed += other.notifications_suppressed;
        self.notifications_failed += other.notifications_failed;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleReport {
    Completed { replica_count: u32, stats: CycleStats },
    Aborted { reason: String },
}

impl CycleReport {
    pub fn is_aborted(&self) -> bool {
        matches!(self, CycleReport::Aborted { .. })
    }

    pub fn replica_count(&self) -> Option<u32> {
        match self {
            CycleReport::Completed { replica_count, .. } => Some(*replica_count),
            CycleReport::Aborted { .. } => None,
        }
    }
}

/// Runs one scan cycle: decide what this replica owns, then evaluate every
/// owned instance against the rules for its service type.
pub struct ScanOrchestrator {
    identity: NodeIdentity,
    inventory: Arc<dyn Inventory>,
    catalog: Arc<RuleCatalog>,
    evaluator: Evaluator,
    notifier: Notifier,
    concurrency: usize,
    call_timeout: Duration,
}

impl ScanOrchestrator {
    pub fn new(
        identity: NodeIdentity,
        inventory: Arc<dyn Inventory>,
        catalog: Arc<RuleCatalog>,
        evaluator: Evaluator,
        notifier: Notifier,
        concurrency: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            inventory,
            catalog,
            evaluator,
            notifier,
            concurrency: concurrency.max(1),
            call_timeout,
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let snapshot = match self.take_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "aborting scan cycle");
                return CycleReport::Aborted {
                    reason: e.to_string(),
                };
            }
        };

        debug!(
            replica_index = snapshot.replica_index,
            replica_count = snapshot.replica_count,
            owned = snapshot.owned.len(),
            listed = snapshot.listed,
            "scan cycle started"
        );

        let owned = snapshot.owned.len();
        let mut stats = stream::iter(snapshot.owned)
            .map(|instance| self.process_instance(instance))
            .buffer_unordered(self.concurrency)
            .fold(CycleStats::default(), |mut acc, stats| async move {
                acc += stats;
                acc
            })
            .await;
        stats.instances_seen = snapshot.listed;
        stats.instances_owned = owned;

        info!(
            replica_count = snapshot.replica_count,
            owned = stats.instances_owned,
            breaches = stats.breaches,
            sent = stats.notifications_sent,
            "scan cycle completed"
        );

        CycleReport::Completed {
            replica_count: snapshot.replica_count,
            stats,
        }
    }

    /// Serial reads that decide the cycle's work. Any failure aborts the
    /// cycle.
    pub async fn take_snapshot(&self) -> Result<CycleSnapshot, FetchError> {
        let replica_count = bounded(
            "replica count lookup",
            self.call_timeout,
            self.inventory.replica_count(&self.identity.app_guid),
        )
        .await?;

        let ring = HashRing::new(replica_count).map_err(|e| FetchError::Malformed {
            endpoint: "replica count".to_string(),
            reason: e.to_string(),
        })?;

        if self.identity.replica_index >= replica_count {
            warn!(
                replica_index = self.identity.replica_index,
                replica_count, "replica index outside the current replica count; owning nothing"
            );
        }

        let instances = bounded(
            "service instance listing",
            self.call_timeout,
            self.inventory.list_service_instances(),
        )
        .await?;
        let listed = instances.len();

        let owned = instances
            .into_iter()
            .filter(|instance| ring.is_owned_by(&instance.guid, self.identity.replica_index))
            .collect();

        Ok(CycleSnapshot {
            replica_index: self.identity.replica_index,
            replica_count,
            ring,
            listed,
            owned,
        })
    }

    async fn resolve_rules(&self, instance: &ServiceInstance) -> Option<&AlertRuleSet> {
        let Some(plan_guid) = instance.plan_guid() else {
            debug!(instance_id = %instance.guid, "no service plan (user-provided service); skipping");
            return None;
        };

        let plan = match bounded(
            "service plan lookup",
            self.call_timeout,
            self.inventory.service_plan(plan_guid),
        )
        .await
        {
            Ok(plan) => plan,
            Err(e) => {
                warn!(instance_id = %instance.guid, error = %e, "skipping instance: service plan lookup failed");
                return None;
            }
        };

        let service = match bounded(
            "service lookup",
            self.call_timeout,
            self.inventory.service(&plan.service_guid),
        )
        .await
        {
            Ok(service) => service,
            Err(e) => {
                warn!(instance_id = %instance.guid, error = %e, "skipping instance: service lookup failed");
                return None;
            }
        };

        let rules = self.catalog.rule_set(&service.label);
        if rules.is_none() {
            debug!(instance_id = %instance.guid, label = %service.label, "no rules for service type");
        }
        rules
    }

    async fn resolve_space(&self, instance: &ServiceInstance) -> Option<Space> {
        match bounded(
            "space lookup",
            self.call_timeout,
            self.inventory.space(&instance.space_guid),
        )
        .await
        {
            Ok(space) => Some(space),
            Err(e) => {
                warn!(
                    instance_id = %instance.guid,
                    space_guid = %instance.space_guid,
                    error = %e,
                    "space lookup failed; breaches for this instance will not be notified"
                );
                None
            }
        }
    }

    async fn process_instance(&self, instance: ServiceInstance) -> CycleStats {
        let instance = &instance;
        let mut stats = CycleStats::default();

        let Some(rules) = self.resolve_rules(instance).await else {
            stats.instances_skipped += 1;
            return stats;
        };

        // Resolved on the first breach, at most once per cycle.
        let mut space: Option<Option<Space>> = None;

        for rule in rules.iter() {
            stats.rules_evaluated += 1;
            let evaluations = match self.evaluator.evaluate(rule, &instance.guid).await {
                Ok(evaluations) => evaluations,
                Err(e) => {
                    stats.rule_failures += 1;
                    warn!(rule = %rule.name, instance_id = %instance.guid, error = %e, "rule evaluation failed");
                    continue;
                }
            };

            for evaluation in evaluations.iter().filter(|e| e.breached) {
                stats.breaches += 1;
                debug!(
                    rule = %rule.name,
                    instance_id = %instance.guid,
                    value = evaluation.sample.value,
                    labels = %evaluation.sample.labels,
                    "threshold breached"
                );

                if space.is_none() {
                    space = Some(self.resolve_space(instance).await);
                }
                let Some(Some(owning_space)) = &space else {
                    stats.notifications_failed += 1;
                    continue;
                };

                let message = match self
                    .notifier
                    .render(rule, instance, owning_space, &evaluation.sample)
                {
                    Ok(message) => message,
                    Err(e) => {
                        stats.notifications_failed += 1;
                        warn!(rule = %rule.name, instance_id = %instance.guid, error = %e, "could not build notification");
                        continue;
                    }
                };

                match self.notifier.dispatch(&message).await {
                    DispatchOutcome::Sent => stats.notifications_sent += 1,
                    DispatchOutcome::AlreadySent => stats.notifications_suppressed += 1,
                    DispatchOutcome::Unauthorized | DispatchOutcome::TransportError(_) => {
                        stats.notifications_failed += 1
                    }
                }
            }
        }
        stats
    }
}
