// Periodic scan of the service inventory: partitioning, per-cycle
// orchestration and the timer that drives it.
pub mod cycle;
pub mod ring;
pub mod scheduler;

pub use cycle::{CycleReport, CycleSnapshot, CycleStats, NodeIdentity, ScanOrchestrator};
pub use ring::{HashRing, RingError, owner_of};
pub use scheduler::{NodeStatus, ScanScheduler, SchedulerHandle};
