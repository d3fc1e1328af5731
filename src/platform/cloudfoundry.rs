use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use url::Url;

use super::{Inventory, Service, ServiceInstance, ServicePlan, Space};
use crate::error::FetchError;

// Refresh tokens a little before the UAA says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);
const INSTANCES_PAGE_SIZE: u32 = 5000;

/// How the alerter authenticates against the platform's UAA.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCredentials {
    /// Password grant through the public `cf` client.
    Password { username: String, password: String },
    /// Client-credentials grant.
    Client { client_id: String, secret: String },
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Cloud Foundry v3 API client implementing [`Inventory`].
#[derive(Debug)]
pub struct CloudFoundryClient {
    api: Url,
    credentials: PlatformCredentials,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct RootLinks {
    links: RootLinkSet,
}

#[derive(Debug, Deserialize)]
struct RootLinkSet {
    uaa: Option<Link>,
    login: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    resources: Vec<T>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next: Option<Link>,
}

#[derive(Debug, Default, Deserialize)]
struct Relationship {
    data: Option<RelationshipData>,
}

#[derive(Debug, Deserialize)]
struct RelationshipData {
    guid: String,
}

impl Relationship {
    fn guid(&self) -> Option<&str> {
        self.data.as_ref().map(|data| data.guid.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ProcessResource {
    instances: u32,
}

#[derive(Debug, Deserialize)]
struct InstanceResource {
    guid: String,
    name: String,
    relationships: InstanceRelationships,
}

#[derive(Debug, Deserialize)]
struct InstanceRelationships {
    #[serde(default)]
    space: Relationship,
    #[serde(default)]
    service_plan: Relationship,
}

#[derive(Debug, Deserialize)]
struct PlanResource {
    guid: String,
    relationships: PlanRelationships,
}

#[derive(Debug, Deserialize)]
struct PlanRelationships {
    service_offering: Relationship,
}

#[derive(Debug, Deserialize)]
struct OfferingResource {
    guid: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpaceResource {
    guid: String,
    name: String,
    relationships: SpaceRelationships,
}

#[derive(Debug, Deserialize)]
struct SpaceRelationships {
    organization: Relationship,
}

#[derive(Debug, Deserialize)]
struct OrganizationResource {
    name: String,
}

impl CloudFoundryClient {
    pub fn new(
        api: Url,
        credentials: PlatformCredentials,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("service-alerter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| FetchError::Transport {
                endpoint: api.to_string(),
                source,
            })?;

        Ok(Self {
            api,
            credentials,
            client,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.api.join(path).map_err(|e| FetchError::Malformed {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Find the UAA base URL advertised by the API root.
    async fn uaa_endpoint(&self) -> Result<Url, FetchError> {
        let root = self.api.to_string();
        let links: RootLinks = self.send_json(self.client.get(self.api.clone()), &root).await?;
        let href = links
            .links
            .uaa
            .or(links.links.login)
            .map(|link| link.href)
            .ok_or_else(|| FetchError::Malformed {
                endpoint: root.clone(),
                reason: "API root advertises no uaa or login link".to_string(),
            })?;
        let mut uaa = Url::parse(&href).map_err(|e| FetchError::Malformed {
            endpoint: root,
            reason: format!("invalid uaa link {href}: {e}"),
        })?;
        // Keep any path prefix when joining `oauth/token` onto it.
        if !uaa.path().ends_with('/') {
            let path = format!("{}/", uaa.path());
            uaa.set_path(&path);
        }
        Ok(uaa)
    }

    async fn fetch_token(&self) -> Result<CachedToken, FetchError> {
        let uaa = self.uaa_endpoint().await?;
        let token_url = uaa.join("oauth/token").map_err(|e| FetchError::Malformed {
            endpoint: uaa.to_string(),
            reason: e.to_string(),
        })?;

        // The serializer is not Send, so it must not live across an await.
        let (client_id, secret, body) = {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            let (client_id, secret) = match &self.credentials {
                PlatformCredentials::Password { username, password } => {
                    form.append_pair("grant_type", "password")
                        .append_pair("username", username)
                        .append_pair("password", password);
                    ("cf", "")
                }
                PlatformCredentials::Client { client_id, secret } => {
                    form.append_pair("grant_type", "client_credentials");
                    (client_id.as_str(), secret.as_str())
                }
            };
            (client_id, secret, form.finish())
        };

        let endpoint = token_url.to_string();
        let request = self
            .client
            .post(token_url)
            .basic_auth(client_id, Some(secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body(body);

        let response = request
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(FetchError::Auth {
                endpoint,
                reason: format!("token request rejected with status {status}"),
            });
        }
        let token: TokenResponse = Self::decode(response, &endpoint).await?;

        // Tokens without an expiry are refreshed every ten minutes.
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(600));
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        })
    }

    async fn access_token(&self) -> Result<String, FetchError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        tracing::debug!(api = %self.api, "requesting platform access token");
        let token = self.fetch_token().await?;
        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let token = self.access_token().await?;
        let endpoint = url.to_string();
        let request = self.client.get(url).bearer_auth(token);

        match self.send_json(request, &endpoint).await {
            Err(err @ FetchError::Auth { .. }) => {
                // Drop the cached token so the next call logs in again.
                *self.token.lock().await = None;
                Err(err)
            }
            other => other,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<T, FetchError> {
        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(FetchError::Auth {
                endpoint: endpoint.to_string(),
                reason: "access token rejected".to_string(),
            });
        }
        Self::decode(response, endpoint).await
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T, FetchError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: preview(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| FetchError::Malformed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Inventory for CloudFoundryClient {
    async fn replica_count(&self, app_guid: &str) -> Result<u32, FetchError> {
        let url = self.endpoint(&format!("/v3/apps/{app_guid}/processes/web"))?;
        let process: ProcessResource = self.get(url).await?;
        Ok(process.instances)
    }

    async fn list_service_instances(&self) -> Result<Vec<ServiceInstance>, FetchError> {
        let mut url = self.endpoint(&format!(
            "/v3/service_instances?per_page={INSTANCES_PAGE_SIZE}"
        ))?;
        let mut instances = Vec::new();

        loop {
            let page: Page<InstanceResource> = self.get(url).await?;
            instances.extend(page.resources.into_iter().map(|resource| ServiceInstance {
                service_plan_guid: resource.relationships.service_plan.guid().map(String::from),
                space_guid: resource
                    .relationships
                    .space
                    .guid()
                    .unwrap_or_default()
                    .to_string(),
                guid: resource.guid,
                name: resource.name,
            }));

            match page.pagination.next {
                Some(next) => {
                    url = Url::parse(&next.href).map_err(|e| FetchError::Malformed {
                        endpoint: next.href.clone(),
                        reason: e.to_string(),
                    })?;
                }
                None => break,
            }
        }

        Ok(instances)
    }

    async fn service_plan(&self, plan_guid: &str) -> Result<ServicePlan, FetchError> {
        let url = self.endpoint(&format!("/v3/service_plans/{plan_guid}"))?;
        let plan: PlanResource = self.get(url).await?;
        let service_guid = plan
            .relationships
            .service_offering
            .guid()
            .ok_or_else(|| FetchError::Malformed {
                endpoint: format!("/v3/service_plans/{plan_guid}"),
                reason: "plan has no service offering".to_string(),
            })?
            .to_string();

        Ok(ServicePlan {
            guid: plan.guid,
            service_guid,
        })
    }

    async fn service(&self, service_guid: &str) -> Result<Service, FetchError> {
        let url = self.endpoint(&format!("/v3/service_offerings/{service_guid}"))?;
        let offering: OfferingResource = self.get(url).await?;
        Ok(Service {
            guid: offering.guid,
            label: offering.name,
        })
    }

    async fn space(&self, space_guid: &str) -> Result<Space, FetchError> {
        let url = self.endpoint(&format!("/v3/spaces/{space_guid}"))?;
        let space: SpaceResource = self.get(url).await?;
        let org_guid = space
            .relationships
            .organization
            .guid()
            .ok_or_else(|| FetchError::Malformed {
                endpoint: format!("/v3/spaces/{space_guid}"),
                reason: "space has no organization".to_string(),
            })?
            .to_string();

        let url = self.endpoint(&format!("/v3/organizations/{org_guid}"))?;
        let org: OrganizationResource = self.get(url).await?;

        Ok(Space {
            guid: space.guid,
            name: space.name,
            org_name: org.name,
        })
    }
}

fn preview(text: &str) -> String {
    if text.len() > 200 {
        let cut = text
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= 200)
            .last()
            .unwrap_or(0);
        format!("{}...", &text[..cut])
    } else {
        text.to_string()
    }
}
