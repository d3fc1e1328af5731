use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use super::{DispatchOutcome, Dispatcher, NotificationMessage};
use crate::error::FetchError;

/// HTTP client for the notification service's `POST /send` endpoint.
#[derive(Debug, Clone)]
pub struct NotificationClient {
    send_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl NotificationClient {
    pub fn new(
        base_url: &Url,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let send_url = format!("{}/send", base_url.as_str().trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Transport {
                endpoint: send_url.clone(),
                source,
            })?;

        Ok(Self {
            send_url,
            username: username.into(),
            password: password.into(),
            client,
        })
    }

    pub fn send_url(&self) -> &str {
        &self.send_url
    }

    fn classify(status: StatusCode) -> DispatchOutcome {
        match status {
            StatusCode::OK => DispatchOutcome::Sent,
            StatusCode::UNAUTHORIZED => DispatchOutcome::Unauthorized,
            StatusCode::CONFLICT => DispatchOutcome::AlreadySent,
            other => DispatchOutcome::TransportError(format!(
                "notification service returned status {}",
                other.as_u16()
            )),
        }
    }
}

#[async_trait]
impl Dispatcher for NotificationClient {
    async fn dispatch(&self, message: &NotificationMessage) -> DispatchOutcome {
        let response = self
            .client
            .post(&self.send_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(message)
            .send()
            .await;

        match response {
            Ok(response) => Self::classify(response.status()),
            Err(e) => DispatchOutcome::TransportError(format!(
                "error calling notification service: {e}"
            )),
        }
    }
}
