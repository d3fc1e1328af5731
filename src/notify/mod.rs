// Outbound notification service: wire message and dispatch contract
pub mod client;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::NotificationClient;

/// Message posted to the notification service. `id` is the dedup key the
/// service uses to suppress repeats within `validity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub id: String,
    pub subject: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "validity", default, skip_serializing_if = "String::is_empty")]
    pub expires_in: String,
    pub target: NotificationTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTarget {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment: String,
    pub id: String,
}

impl NotificationTarget {
    pub fn space(environment: impl Into<String>, space_guid: impl Into<String>) -> Self {
        Self {
            kind: "space".to_string(),
            environment: environment.into(),
            id: space_guid.into(),
        }
    }
}

/// How the notification service answered. None of these are escalated; the
/// caller logs them and moves on.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Sent,
    /// The service already delivered a message with this id inside its
    /// validity window.
    AlreadySent,
    Unauthorized,
    TransportError(String),
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Sent => f.write_str("sent"),
            DispatchOutcome::AlreadySent => f.write_str("already sent"),
            DispatchOutcome::Unauthorized => f.write_str("unauthorized"),
            DispatchOutcome::TransportError(reason) => write!(f, "transport error: {reason}"),
        }
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, message: &NotificationMessage) -> DispatchOutcome;
}
