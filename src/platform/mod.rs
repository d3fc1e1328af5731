// Platform inventory: service instances, plans, offerings and spaces
pub mod cloudfoundry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub use cloudfoundry::{CloudFoundryClient, PlatformCredentials};

/// A provisioned service instance as reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub guid: String,
    pub name: String,
    /// Absent for user-provided services, which carry no plan.
    pub service_plan_guid: Option<String>,
    pub space_guid: String,
}

impl ServiceInstance {
    pub fn plan_guid(&self) -> Option<&str> {
        self.service_plan_guid
            .as_deref()
            .filter(|guid| !guid.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServicePlan {
    pub guid: String,
    pub service_guid: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub guid: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Space {
    pub guid: String,
    pub name: String,
    pub org_name: String,
}

/// Read-only view of the platform the scan cycle needs. Every call is a
/// fresh request; nothing is cached between cycles.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Number of running instances of the application `app_guid`, i.e. the
    /// size of the alerting fleet.
    async fn replica_count(&self, app_guid: &str) -> Result<u32, FetchError>;

    async fn list_service_instances(&self) -> Result<Vec<ServiceInstance>, FetchError>;

    async fn service_plan(&self, plan_guid: &str) -> Result<ServicePlan, FetchError>;

    async fn service(&self, service_guid: &str) -> Result<Service, FetchError>;

    /// Space with its organization name resolved.
    async fn space(&self, space_guid: &str) -> Result<Space, FetchError>;
}
