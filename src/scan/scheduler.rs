use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::scan::cycle::{CycleReport, ScanOrchestrator};

/// What this replica last observed, served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub replica_index: u32,
    pub replica_count: Option<u32>,
    pub cycles_completed: u64,
    pub cycles_aborted: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleReport>,
}

impl NodeStatus {
    pub fn new(replica_index: u32) -> Self {
        Self {
            replica_index,
            replica_count: None,
            cycles_completed: 0,
            cycles_aborted: 0,
            last_cycle_at: None,
            last_cycle: None,
        }
    }

    /// Fold a finished cycle in. An aborted cycle keeps the last known
    /// replica count.
    pub fn record(&mut self, report: CycleReport, at: DateTime<Utc>) {
        if report.is_aborted() {
            self.cycles_aborted += 1;
        } else {
            self.cycles_completed += 1;
        }
        if let Some(count) = report.replica_count() {
            self.replica_count = Some(count);
        }
        self.last_cycle_at = Some(at);
        self.last_cycle = Some(report);
    }
}

/// Fires a scan cycle every `interval`. The first cycle runs one interval
/// after start; ticks missed while a cycle overran are dropped.
pub struct ScanScheduler {
    orchestrator: Arc<ScanOrchestrator>,
    interval: Duration,
}

impl ScanScheduler {
    pub fn new(orchestrator: Arc<ScanOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    pub fn start(self) -> SchedulerHandle {
        self.start_with_token(CancellationToken::new())
    }

    /// Start under an existing token so other tasks can share shutdown.
    pub fn start_with_token(self, cancel: CancellationToken) -> SchedulerHandle {
        let (status_tx, status_rx) =
            watch::channel(NodeStatus::new(self.orchestrator.identity().replica_index));
        let task = tokio::spawn(self.run(cancel.clone(), status_tx));

        SchedulerHandle {
            cancel,
            status: status_rx,
            task,
        }
    }

    async fn run(self, cancel: CancellationToken, status: watch::Sender<NodeStatus>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.interval, "scan scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // A cycle that has started runs to completion even if shutdown
            // is requested meanwhile.
            let report = self.orchestrator.run_cycle().await;
            debug!(?report, "cycle finished");
            status.send_modify(|s| s.record(report, Utc::now()));
        }

        info!("scan scheduler stopped");
    }
}

pub struct SchedulerHandle {
    cancel: CancellationToken,
    status: watch::Receiver<NodeStatus>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn status(&self) -> watch::Receiver<NodeStatus> {
        self.status.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop taking ticks and wait for any in-flight cycle to finish.
    pub async fn stop(self) -> Result<(), tokio::task::JoinError> {
        self.cancel.cancel();
        self.task.await
    }

    /// Wait for the scheduler to exit after its token was cancelled elsewhere.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::cycle::CycleStats;

    #[test]
    fn test_status_record_keeps_last_known_replica_count() {
        let mut status = NodeStatus::new(1);
        let now = Utc::now();

        status.record(
            CycleReport::Completed {
                replica_count: 3,
                stats: CycleStats::default(),
            },
            now,
        );
        status.record(
            CycleReport::Aborted {
                reason: "inventory down".to_string(),
            },
            now,
        );

        assert_eq!(status.replica_count, Some(3));
        assert_eq!(status.cycles_completed, 1);
        assert_eq!(status.cycles_aborted, 1);
        assert!(status.last_cycle.as_ref().unwrap().is_aborted());
        assert_eq!(status.last_cycle_at, Some(now));
    }
}
