//! Aggregation node definitions.
//!
//! Each aggregation type is a variant of [`AggKind`]. The kind decides how
//! buckets are pulled out of a raw response fragment, which attributes hold
//! the bucket value, and whether the node yields one implicit bucket or many
//! keyed ones.

use crate::error::{AggError, Result};
use serde_json::{json, Map, Value};
use std::fmt;

/// Name of the synthetic node wrapping the top-level `aggs` envelope.
pub const ROOT_NAME: &str = "root";

/// Key of the "other" bucket when a `filters` aggregation doesn't name it.
pub const DEFAULT_OTHER_KEY: &str = "_other_";

/// Mapping types accepted by numeric aggregations.
pub const NUMERIC_TYPES: &[&str] = &[
    "long",
    "integer",
    "short",
    "byte",
    "double",
    "float",
    "half_float",
    "scaled_float",
    "ip",
    "token_count",
    "date",
    "boolean",
];

const DEFAULT_BLACKLIST: &[&str] = &["nested", "object"];

/// Aggregation type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggKind {
    /// Synthetic root, never part of a request body.
    Root,
    Terms,
    Filters,
    Histogram,
    DateHistogram,
    Range,
    DateRange,
    Global,
    Filter,
    Nested,
    ReverseNested,
    Missing,
    Avg,
    Max,
    Min,
    Sum,
    Cardinality,
    Stats,
    ExtendedStats,
    Percentiles,
    PercentileRanks,
    GeoBounds,
    GeoCentroid,
    TopHits,
    ValueCount,
}

impl AggKind {
    /// Every kind that may appear in a request body.
    pub const ALL: &'static [AggKind] = &[
        AggKind::Terms,
        AggKind::Filters,
        AggKind::Histogram,
        AggKind::DateHistogram,
        AggKind::Range,
        AggKind::DateRange,
        AggKind::Global,
        AggKind::Filter,
        AggKind::Nested,
        AggKind::ReverseNested,
        AggKind::Missing,
        AggKind::Avg,
        AggKind::Max,
        AggKind::Min,
        AggKind::Sum,
        AggKind::Cardinality,
        AggKind::Stats,
        AggKind::ExtendedStats,
        AggKind::Percentiles,
        AggKind::PercentileRanks,
        AggKind::GeoBounds,
        AggKind::GeoCentroid,
        AggKind::TopHits,
        AggKind::ValueCount,
    ];

    /// Type name as used in request bodies.
    pub fn type_name(&self) -> &'static str {
        match self {
            AggKind::Root => "root",
            AggKind::Terms => "terms",
            AggKind::Filters => "filters",
            AggKind::Histogram => "histogram",
            AggKind::DateHistogram => "date_histogram",
            AggKind::Range => "range",
            AggKind::DateRange => "date_range",
            AggKind::Global => "global",
            AggKind::Filter => "filter",
            AggKind::Nested => "nested",
            AggKind::ReverseNested => "reverse_nested",
            AggKind::Missing => "missing",
            AggKind::Avg => "avg",
            AggKind::Max => "max",
            AggKind::Min => "min",
            AggKind::Sum => "sum",
            AggKind::Cardinality => "cardinality",
            AggKind::Stats => "stats",
            AggKind::ExtendedStats => "extended_stats",
            AggKind::Percentiles => "percentiles",
            AggKind::PercentileRanks => "percentile_ranks",
            AggKind::GeoBounds => "geo_bounds",
            AggKind::GeoCentroid => "geo_centroid",
            AggKind::TopHits => "top_hits",
            AggKind::ValueCount => "value_count",
        }
    }

    /// Look up a kind from its request body type name.
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.type_name() == name)
    }

    /// Response attributes holding this kind's value, most significant first.
    pub fn value_attrs(&self) -> &'static [&'static str] {
        match self {
            AggKind::Root => &[],
            AggKind::Terms => &["doc_count", "doc_count_error_upper_bound", "sum_other_doc_count"],
            AggKind::Filters
            | AggKind::Histogram
            | AggKind::DateHistogram
            | AggKind::Range
            | AggKind::DateRange
            | AggKind::Global
            | AggKind::Filter
            | AggKind::Nested
            | AggKind::ReverseNested
            | AggKind::Missing => &["doc_count"],
            AggKind::Avg
            | AggKind::Max
            | AggKind::Min
            | AggKind::Sum
            | AggKind::Cardinality
            | AggKind::ValueCount => &["value"],
            AggKind::Stats => &["count", "min", "max", "avg", "sum"],
            AggKind::ExtendedStats => &[
                "count",
                "min",
                "max",
                "avg",
                "sum",
                "sum_of_squares",
                "variance",
                "std_deviation",
                "std_deviation_bounds",
            ],
            AggKind::Percentiles | AggKind::PercentileRanks => &["values"],
            AggKind::GeoBounds => &["bounds"],
            AggKind::GeoCentroid => &["location"],
            AggKind::TopHits => &["hits"],
        }
    }

    /// True for kinds producing exactly one implicit bucket per parent.
    pub fn is_unique_bucket(&self) -> bool {
        matches!(
            self,
            AggKind::Global
                | AggKind::Filter
                | AggKind::Nested
                | AggKind::ReverseNested
                | AggKind::Missing
        )
    }

    /// True for leaf metric kinds.
    pub fn is_metric(&self) -> bool {
        matches!(
            self,
            AggKind::Avg
                | AggKind::Max
                | AggKind::Min
                | AggKind::Sum
                | AggKind::Cardinality
                | AggKind::Stats
                | AggKind::ExtendedStats
                | AggKind::Percentiles
                | AggKind::PercentileRanks
                | AggKind::GeoBounds
                | AggKind::GeoCentroid
                | AggKind::TopHits
                | AggKind::ValueCount
        )
    }

    /// True for bucket kinds, unique or keyed.
    pub fn is_bucket(&self) -> bool {
        !self.is_metric() && *self != AggKind::Root
    }

    /// Mapping types this kind accepts, `None` when unrestricted by whitelist.
    pub fn whitelisted_mapping_types(&self) -> Option<&'static [&'static str]> {
        match self {
            AggKind::Histogram
            | AggKind::Range
            | AggKind::Avg
            | AggKind::Max
            | AggKind::Min
            | AggKind::Sum
            | AggKind::Stats
            | AggKind::ExtendedStats
            | AggKind::Percentiles
            | AggKind::PercentileRanks => Some(NUMERIC_TYPES),
            AggKind::DateHistogram | AggKind::DateRange => Some(&["date"]),
            AggKind::Nested | AggKind::ReverseNested => Some(&["nested"]),
            AggKind::GeoBounds | AggKind::GeoCentroid => Some(&["geo_point"]),
            _ => None,
        }
    }

    /// Mapping types this kind rejects.
    pub fn blacklisted_mapping_types(&self) -> &'static [&'static str] {
        match self {
            AggKind::Terms | AggKind::Missing | AggKind::ValueCount => &[],
            _ if self.whitelisted_mapping_types().is_some() => &[],
            _ => DEFAULT_BLACKLIST,
        }
    }

    /// Check whether a field of the given mapping type can be aggregated.
    pub fn accepts_field_type(&self, field_type: &str) -> bool {
        if let Some(whitelist) = self.whitelisted_mapping_types() {
            return whitelist.contains(&field_type);
        }
        !self.blacklisted_mapping_types().contains(&field_type)
    }

    fn key_separator(&self) -> &'static str {
        // ISO dates contain '-'
        if *self == AggKind::DateRange {
            "::"
        } else {
            "-"
        }
    }
}

impl fmt::Display for AggKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// One key/bucket pair extracted from a response fragment.
pub type Bucket<'a> = (Option<Value>, &'a Value);

/// Immutable definition of one aggregation step.
#[derive(Debug, Clone, PartialEq)]
pub struct AggNode {
    name: String,
    kind: AggKind,
    body: Map<String, Value>,
    meta: Option<Value>,
    key_as_string: bool,
}

impl AggNode {
    /// Create a node, checking the parameters each kind requires.
    pub fn new(name: impl Into<String>, kind: AggKind, body: Map<String, Value>) -> Result<Self> {
        let name = name.into();
        if kind == AggKind::Root {
            return Err(AggError::invalid(name, "root is reserved for the synthetic envelope"));
        }
        match kind {
            AggKind::Filters if !body.get("filters").map_or(false, Value::is_object) => {
                return Err(AggError::invalid(name, "filters aggregation requires a \"filters\" object"));
            }
            AggKind::Range | AggKind::DateRange
                if !body.get("ranges").map_or(false, Value::is_array) =>
            {
                return Err(AggError::invalid(name, "range aggregation requires a \"ranges\" array"));
            }
            AggKind::Nested if !body.contains_key("path") => {
                return Err(AggError::invalid(name, "nested aggregation requires a \"path\""));
            }
            AggKind::DateHistogram
                if !["interval", "calendar_interval", "fixed_interval"]
                    .iter()
                    .any(|k| body.contains_key(*k)) =>
            {
                return Err(AggError::invalid(
                    name,
                    "one of \"interval\", \"calendar_interval\" or \"fixed_interval\" must be provided",
                ));
            }
            AggKind::Filter if body.is_empty() => {
                return Err(AggError::invalid(name, "filter aggregation requires a filter clause"));
            }
            _ => {}
        }

        Ok(Self {
            name,
            kind,
            body,
            meta: None,
            key_as_string: kind == AggKind::DateHistogram,
        })
    }

    /// Build a node from its request type name and parameter object.
    pub fn from_body(name: &str, type_name: &str, params: &Value) -> Result<Self> {
        let kind = AggKind::from_type_name(type_name)
            .ok_or_else(|| AggError::invalid(name, format!("unknown aggregation type <{}>", type_name)))?;
        let body = match params {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            _ => return Err(AggError::invalid(name, "aggregation parameters must be an object")),
        };
        Self::new(name, kind, body)
    }

    pub(crate) fn root() -> Self {
        Self {
            name: ROOT_NAME.to_string(),
            kind: AggKind::Root,
            body: Map::new(),
            meta: None,
            key_as_string: false,
        }
    }

    /// Attach request metadata, echoed back under `meta` in responses.
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Use `key_as_string` rather than `key` for histogram bucket keys.
    pub fn with_key_as_string(mut self, key_as_string: bool) -> Self {
        self.key_as_string = key_as_string;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AggKind {
        self.kind
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    pub fn field(&self) -> Option<&str> {
        self.body.get("field").and_then(Value::as_str)
    }

    pub fn value_attrs(&self) -> &'static [&'static str] {
        self.kind.value_attrs()
    }

    pub fn is_metric(&self) -> bool {
        self.kind.is_metric()
    }

    pub fn is_unique_bucket(&self) -> bool {
        self.kind.is_unique_bucket()
    }

    pub fn is_bucket(&self) -> bool {
        self.kind.is_bucket()
    }

    fn keyed(&self) -> bool {
        self.body.get("keyed").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Request body form: `{"<type>": {params}}`, sub-aggregations excluded.
    pub fn to_request(&self) -> Value {
        let mut out = Map::new();
        out.insert(self.kind.type_name().to_string(), Value::Object(self.body.clone()));
        if let Some(meta) = &self.meta {
            out.insert("meta".to_string(), meta.clone());
        }
        Value::Object(out)
    }

    /// Split a raw response fragment into `(key, bucket)` pairs, in a
    /// deterministic order.
    ///
    /// Unique-bucket, metric and root nodes yield the fragment itself once,
    /// with no key.
    pub fn extract_buckets<'a>(&self, raw: &'a Value) -> Result<Vec<Bucket<'a>>> {
        match self.kind {
            AggKind::Histogram | AggKind::DateHistogram if self.keyed() => {
                match self.buckets_field(raw)? {
                    Value::Object(map) => Ok(map
                        .iter()
                        .map(|(k, bucket)| (Some(Value::String(k.clone())), bucket))
                        .collect()),
                    _ => Err(AggError::malformed(format!(
                        "keyed histogram <{}> expects a buckets object",
                        self.name
                    ))),
                }
            }
            AggKind::Terms | AggKind::Histogram | AggKind::DateHistogram => {
                let key_path = if self.key_as_string { "key_as_string" } else { "key" };
                self.bucket_list(raw)?
                    .iter()
                    .map(|bucket| {
                        let key = bucket
                            .get(key_path)
                            .or_else(|| bucket.get("key"))
                            .ok_or_else(|| {
                                AggError::malformed(format!("bucket without key in <{}>", self.name))
                            })?;
                        Ok((Some(key.clone()), bucket))
                    })
                    .collect()
            }
            AggKind::Filters => match self.buckets_field(raw)? {
                Value::Object(map) => Ok(sorted_entries(map)),
                Value::Array(list) => list
                    .iter()
                    .map(|bucket| {
                        let key = bucket.get("key").ok_or_else(|| {
                            AggError::malformed(format!("bucket without key in <{}>", self.name))
                        })?;
                        Ok((Some(key.clone()), bucket))
                    })
                    .collect(),
                _ => Err(AggError::malformed(format!("unexpected buckets shape in <{}>", self.name))),
            },
            AggKind::Range | AggKind::DateRange => {
                if self.keyed() {
                    match self.buckets_field(raw)? {
                        Value::Object(map) => Ok(sorted_entries(map)),
                        _ => Err(AggError::malformed(format!(
                            "keyed range <{}> expects a buckets object",
                            self.name
                        ))),
                    }
                } else {
                    Ok(self
                        .bucket_list(raw)?
                        .iter()
                        .map(|bucket| (Some(Value::String(self.range_key(bucket))), bucket))
                        .collect())
                }
            }
            _ => Ok(vec![(None, raw)]),
        }
    }

    /// First value attribute read off a bucket, `Null` when absent.
    pub fn extract_bucket_value(&self, bucket: &Value) -> Value {
        self.value_attrs()
            .first()
            .and_then(|attr| bucket.get(*attr))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// All value attributes read off a bucket, in declaration order.
    pub fn extract_bucket_values(&self, bucket: &Value) -> Map<String, Value> {
        self.value_attrs()
            .iter()
            .map(|attr| (attr.to_string(), bucket.get(*attr).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    /// Query clause selecting the documents that fall in the bucket of `key`.
    ///
    /// Returns `Ok(None)` for kinds whose buckets can't be expressed as a filter.
    pub fn get_filter(&self, key: &Value) -> Result<Option<Value>> {
        let field = self.field().unwrap_or_default();
        match self.kind {
            AggKind::Terms => {
                if key.as_str() == Some("missing") {
                    Ok(Some(must_not_exists(field)))
                } else {
                    Ok(Some(json!({ "term": { field: { "value": key } } })))
                }
            }
            AggKind::Missing => Ok(Some(must_not_exists(field))),
            AggKind::Filter => Ok(Some(Value::Object(self.body.clone()))),
            AggKind::Filters => self.filters_filter(key).map(Some),
            AggKind::Histogram => {
                let unresolved = || AggError::UnresolvedKey {
                    agg: self.name.clone(),
                    key: key_repr(key),
                };
                let start = match key {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.parse::<f64>().ok(),
                    _ => None,
                }
                .filter(|f| f.is_finite())
                .ok_or_else(unresolved)?;
                let interval = self
                    .body
                    .get("interval")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| AggError::invalid(&self.name, "histogram requires a numeric \"interval\""))?;
                Ok(Some(json!({ "range": { field: { "gte": start, "lt": start + interval } } })))
            }
            AggKind::DateHistogram => {
                let interval = ["interval", "calendar_interval", "fixed_interval"]
                    .iter()
                    .find_map(|k| self.body.get(*k))
                    .map(key_repr)
                    .ok_or_else(|| AggError::invalid(&self.name, "date_histogram requires an interval"))?;
                let upper = format!("{}||+{}", key_repr(key), interval);
                Ok(Some(json!({ "range": { field: { "gte": key, "lt": upper } } })))
            }
            AggKind::Range | AggKind::DateRange => {
                let unresolved = || AggError::UnresolvedKey {
                    agg: self.name.clone(),
                    key: key_repr(key),
                };
                let key = key.as_str().ok_or_else(unresolved)?;
                let (from, to) = key.split_once(self.kind.key_separator()).ok_or_else(unresolved)?;
                let mut inner = Map::new();
                if from != "*" {
                    inner.insert("gte".to_string(), bound_value(from));
                }
                if to != "*" {
                    inner.insert("lt".to_string(), bound_value(to));
                }
                Ok(Some(json!({ "range": { field: inner } })))
            }
            _ => Ok(None),
        }
    }

    fn filters_filter(&self, key: &Value) -> Result<Value> {
        let filters = self.body.get("filters").and_then(Value::as_object);
        if let (Some(filters), Some(k)) = (filters, key.as_str()) {
            if let Some(filter) = filters.get(k) {
                return Ok(filter.clone());
            }
            let other_key = self.body.get("other_bucket_key").and_then(Value::as_str);
            let other_bucket = self
                .body
                .get("other_bucket")
                .and_then(Value::as_bool)
                .unwrap_or(false)
                || other_key.is_some();
            if other_bucket && (k == DEFAULT_OTHER_KEY || Some(k) == other_key) {
                let declared: Vec<Value> = sorted_entries(filters)
                    .into_iter()
                    .map(|(_, filter)| filter.clone())
                    .collect();
                return Ok(json!({ "bool": { "must_not": bool_if_required(declared, "should") } }));
            }
        }
        Err(AggError::UnresolvedKey {
            agg: self.name.clone(),
            key: key_repr(key),
        })
    }

    fn buckets_field<'a>(&self, raw: &'a Value) -> Result<&'a Value> {
        raw.get("buckets")
            .ok_or_else(|| AggError::malformed(format!("missing buckets in <{}>", self.name)))
    }

    fn bucket_list<'a>(&self, raw: &'a Value) -> Result<&'a Vec<Value>> {
        self.buckets_field(raw)?.as_array().ok_or_else(|| {
            AggError::malformed(format!("<{}> expects a buckets list", self.name))
        })
    }

    fn range_key(&self, bucket: &Value) -> String {
        let bound = |name: &str| {
            let as_string = format!("{}_as_string", name);
            let value = if self.kind == AggKind::DateRange {
                bucket.get(as_string.as_str()).or_else(|| bucket.get(name))
            } else {
                bucket.get(name)
            };
            value.map(key_repr).unwrap_or_else(|| "*".to_string())
        };
        format!("{}{}{}", bound("from"), self.kind.key_separator(), bound("to"))
    }
}

/// Display form of a bucket key or value: strings unquoted, everything else as JSON.
pub fn key_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sorted_entries(map: &Map<String, Value>) -> Vec<Bucket<'_>> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(k, v)| (Some(Value::String(k.clone())), v))
        .collect()
}

fn must_not_exists(field: &str) -> Value {
    json!({ "bool": { "must_not": { "exists": { "field": field } } } })
}

fn bool_if_required(mut clauses: Vec<Value>, operator: &str) -> Value {
    if clauses.len() == 1 {
        return clauses.remove(0);
    }
    json!({ "bool": { operator: clauses } })
}

fn bound_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f),
        _ => Value::String(raw.to_string()),
    }
}
