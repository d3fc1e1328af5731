use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::IgnoredAny;
use url::Url;

use super::{LabelSet, MetricSample, MetricsSource, QueryValue};
use crate::error::FetchError;

/// Prometheus HTTP API client. Usually pointed at a Grafana datasource
/// proxy, in which case `api_key` is sent as a bearer token.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    query_url: Url,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    data: Option<QueryData>,
    #[serde(rename = "errorType")]
    error_type: Option<String>,
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<VectorSample>),
    Scalar((f64, String)),
    Matrix(IgnoredAny),
    String((f64, String)),
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

impl PrometheusClient {
    pub fn new(
        base_url: &Url,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let query_url = base
            .join("api/v1/query")
            .map_err(|e| FetchError::Malformed {
                endpoint: base_url.to_string(),
                reason: e.to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Transport {
                endpoint: query_url.to_string(),
                source,
            })?;

        Ok(Self {
            query_url,
            api_key: api_key.filter(|key| !key.is_empty()),
            client,
        })
    }

    fn parse_value(raw: &str, endpoint: &str) -> Result<f64, FetchError> {
        raw.parse::<f64>().map_err(|e| FetchError::Malformed {
            endpoint: endpoint.to_string(),
            reason: format!("sample value {raw:?}: {e}"),
        })
    }

    fn parse_timestamp(seconds: f64, endpoint: &str) -> Result<DateTime<Utc>, FetchError> {
        DateTime::<Utc>::from_timestamp_millis((seconds * 1000.0) as i64).ok_or_else(|| {
            FetchError::Malformed {
                endpoint: endpoint.to_string(),
                reason: format!("sample timestamp {seconds} out of range"),
            }
        })
    }

    fn into_value(data: QueryData, endpoint: &str) -> Result<QueryValue, FetchError> {
        Ok(match data {
            QueryData::Vector(samples) => QueryValue::Vector(
                samples
                    .into_iter()
                    .map(|sample| {
                        let (ts, raw) = sample.value;
                        Ok(MetricSample {
                            value: Self::parse_value(&raw, endpoint)?,
                            timestamp: Self::parse_timestamp(ts, endpoint)?,
                            labels: sample.metric.into_iter().collect::<LabelSet>(),
                        })
                    })
                    .collect::<Result<Vec<_>, FetchError>>()?,
            ),
            QueryData::Scalar((_, raw)) => QueryValue::Scalar(Self::parse_value(&raw, endpoint)?),
            QueryData::Matrix(_) => QueryValue::Matrix,
            QueryData::String((_, raw)) => QueryValue::String(raw),
        })
    }
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn query(&self, query: &str) -> Result<QueryValue, FetchError> {
        let mut url = self.query_url.clone();
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("time", &Utc::now().timestamp().to_string());
        let endpoint = self.query_url.to_string();

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|source| FetchError::Transport {
            endpoint: endpoint.clone(),
            source,
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let parsed: ApiResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(FetchError::Status {
                    endpoint,
                    status: status.as_u16(),
                    body: text.chars().take(200).collect(),
                });
            }
            Err(e) => {
                return Err(FetchError::Malformed {
                    endpoint,
                    reason: e.to_string(),
                });
            }
        };

        if !parsed.warnings.is_empty() {
            tracing::warn!(query, warnings = ?parsed.warnings, "prometheus returned warnings");
        }

        if parsed.status != "success" {
            return Err(FetchError::Status {
                endpoint,
                status: status.as_u16(),
                body: format!(
                    "{}: {}",
                    parsed.error_type.unwrap_or_default(),
                    parsed.error.unwrap_or_default()
                ),
            });
        }

        let data = parsed.data.ok_or_else(|| FetchError::Malformed {
            endpoint: endpoint.clone(),
            reason: "successful response without data".to_string(),
        })?;
        Self::into_value(data, &endpoint)
    }
}
