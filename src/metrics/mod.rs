// Metrics backend: sample model and query interface
pub mod prometheus;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub use prometheus::PrometheusClient;

/// Label name → value for one series, ordered by label name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The series' `__name__` label, when the query preserved it.
    pub fn metric_name(&self) -> Option<&str> {
        self.get("__name__")
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}=\"{value}\"")?;
        }
        f.write_str("}")
    }
}

/// One point of an instant-vector query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub labels: LabelSet,
}

/// Result of an instant query. Only vectors can be evaluated against rules;
/// the other shapes are kept so the caller can report what it got.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Vector(Vec<MetricSample>),
    Scalar(f64),
    Matrix,
    String(String),
}

impl QueryValue {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryValue::Vector(_) => "vector",
            QueryValue::Scalar(_) => "scalar",
            QueryValue::Matrix => "matrix",
            QueryValue::String(_) => "string",
        }
    }
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Run an instant query evaluated at the current time.
    async fn query(&self, query: &str) -> Result<QueryValue, FetchError>;
}
