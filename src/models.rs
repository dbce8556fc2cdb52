//! Data models for search responses.
//!
//! This module contains the typed envelope around a raw search response:
//! shard statistics, hits and the untouched `aggregations` payload that the
//! serializers work on.

use crate::aggs::AggTree;
use crate::error::{AggError, Result};
use crate::serialize::Aggregations;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Shard statistics of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shards {
    /// Number of shards queried.
    pub total: u64,
    /// Number of shards that answered successfully.
    pub successful: u64,
    /// Number of shards skipped.
    #[serde(default)]
    pub skipped: u64,
    /// Number of shards that failed.
    #[serde(default)]
    pub failed: u64,
}

/// Total hit count, either a bare number or `{value, relation}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    /// Legacy integer form.
    Count(u64),
    /// Counted form; `relation` is `eq` or `gte`.
    Counted { value: u64, relation: String },
}

impl TotalHits {
    /// Returns the total as displayed in summaries: `34` or `>=10000`.
    pub fn repr(&self) -> Result<String> {
        match self {
            TotalHits::Count(n) => Ok(n.to_string()),
            TotalHits::Counted { value, relation } => match relation.as_str() {
                "eq" => Ok(value.to_string()),
                "gte" => Ok(format!(">={}", value)),
                other => Err(AggError::malformed(format!("invalid total relation <{}>", other))),
            },
        }
    }
}

/// A single returned document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index", default)]
    pub index: Option<String>,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

impl fmt::Display for Hit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Hit {}> score={:.2}",
            self.id.as_deref().unwrap_or("?"),
            self.score.unwrap_or(0.0)
        )
    }
}

/// The `hits` section of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hits {
    pub total: TotalHits,
    pub max_score: Option<f64>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

impl Hits {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

impl fmt::Display for Hits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total.repr().unwrap_or_else(|_| "?".to_string());
        write!(f, "<Hits> total: {}, contains {} hits", total, self.hits.len())
    }
}

/// A complete search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Server-side duration in milliseconds.
    pub took: u64,
    pub timed_out: bool,
    #[serde(rename = "_shards")]
    pub shards: Shards,
    pub hits: Hits,
    /// Raw aggregations payload, empty when none were requested.
    #[serde(default = "empty_object")]
    pub aggregations: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl SearchResponse {
    /// Parse a response from its JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| AggError::malformed(e.to_string()))
    }

    /// Parse a response from an already decoded JSON value.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(|e| AggError::malformed(e.to_string()))
    }

    /// True when every shard answered and the search did not time out.
    pub fn success(&self) -> bool {
        self.shards.total == self.shards.successful && !self.timed_out
    }

    /// Number of returned hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Bind the aggregations payload to the tree it was requested with.
    pub fn aggregations<'a>(&'a self, aggs: &'a AggTree) -> Aggregations<'a> {
        Aggregations::new(&self.aggregations, aggs)
    }
}

impl fmt::Display for SearchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.hits.total.repr().unwrap_or_else(|_| "?".to_string());
        write!(
            f,
            "<Response> took {}ms, success: {}, total result {}, contains {} hits",
            self.took,
            self.success(),
            total,
            self.hits.len()
        )
    }
}
