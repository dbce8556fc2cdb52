//! Normalized nested projection.
//!
//! Each bucket becomes `{level, key, value, children}`; `children` is omitted
//! for leaf buckets.

use super::Aggregations;
use crate::aggs::{AggNode, ROOT_NAME};
use crate::error::{AggError, Result};
use crate::response::tree::is_empty_fragment;
use serde_json::{json, Map, Value};

impl<'a> Aggregations<'a> {
    /// Rebuild the payload as nested normalized buckets under a synthetic
    /// root. Top-level aggregations are listed in sorted name order.
    pub fn serialize_as_normalized(&self) -> Result<Value> {
        let aggs = self.aggs();
        let mut names = self.keys();
        names.sort_unstable();

        let mut children = Vec::new();
        for name in names {
            if !aggs.contains(name) || name == ROOT_NAME {
                return Err(AggError::SchemaMismatch(name.to_string()));
            }
            children.extend(self.normalize_buckets(self.data(), aggs.get(name)?)?);
        }
        Ok(json!({
            "level": ROOT_NAME,
            "key": null,
            "value": null,
            "children": children,
        }))
    }

    /// Normalized buckets of `agg_node` found in `response`; empty when the
    /// aggregation is absent.
    pub(crate) fn normalize_buckets(&self, response: &Value, agg_node: &AggNode) -> Result<Vec<Value>> {
        let fragment = match response.get(agg_node.name()) {
            Some(fragment) if !is_empty_fragment(fragment) => fragment,
            _ => return Ok(Vec::new()),
        };
        let agg_children = self.aggs().children(agg_node.name())?;

        let mut out = Vec::new();
        for (key, bucket) in agg_node.extract_buckets(fragment)? {
            let mut result = Map::new();
            result.insert("level".to_string(), Value::String(agg_node.name().to_string()));
            result.insert("key".to_string(), key.unwrap_or(Value::Null));
            result.insert("value".to_string(), agg_node.extract_bucket_value(bucket));

            let mut children = Vec::new();
            for child in &agg_children {
                children.extend(self.normalize_buckets(bucket, child)?);
            }
            if !children.is_empty() {
                result.insert("children".to_string(), Value::Array(children));
            }
            out.push(Value::Object(result));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggs::AggTree;

    #[test]
    fn test_normalized_fixture() {
        let request: Value =
            serde_json::from_str(include_str!("../../fixtures/classification_aggs.json")).unwrap();
        let response: Value =
            serde_json::from_str(include_str!("../../fixtures/classification_response.json")).unwrap();
        let aggs = AggTree::from_request(&request).unwrap();
        let normalized = Aggregations::new(&response["aggregations"], &aggs)
            .serialize_as_normalized()
            .unwrap();

        assert_eq!(normalized["level"], json!("root"));
        assert_eq!(normalized["key"], Value::Null);
        let children = normalized["children"].as_array().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0]["key"], json!("multilabel"));
        assert_eq!(children[0]["value"], json!(323));

        let gpc = &children[0]["children"][1];
        assert_eq!(
            gpc,
            &json!({
                "level": "global_metrics.field.name",
                "key": "gpc",
                "value": 119,
                "children": [
                    {"level": "avg_nb_classes", "key": null, "value": 183.21},
                    {"level": "avg_f1_micro", "key": null, "value": 0.95}
                ]
            })
        );
    }

    #[test]
    fn test_top_level_sorted_regardless_of_request_order() {
        let aggs = AggTree::from_request(&json!({
            "zeta": {"avg": {"field": "price"}},
            "alpha": {"terms": {"field": "color"}},
            "mid": {"max": {"field": "price"}}
        }))
        .unwrap();
        let raw = json!({
            "zeta": {"value": 3.0},
            "mid": {"value": 9.0},
            "alpha": {"buckets": [{"key": "blue", "doc_count": 2}]}
        });
        let normalized = Aggregations::new(&raw, &aggs).serialize_as_normalized().unwrap();
        let levels: Vec<&str> = normalized["children"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["level"].as_str().unwrap())
            .collect();
        assert_eq!(levels, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_filters_buckets_follow_key_order() {
        let aggs = AggTree::from_request(&json!({
            "by_kind": {"filters": {"filters": {
                "b": {"term": {"kind": "b"}},
                "a": {"term": {"kind": "a"}}
            }}}
        }))
        .unwrap();
        let raw = json!({"by_kind": {"buckets": {
            "b": {"doc_count": 1},
            "a": {"doc_count": 4}
        }}});
        let normalized = Aggregations::new(&raw, &aggs).serialize_as_normalized().unwrap();
        assert_eq!(
            normalized["children"],
            json!([
                {"level": "by_kind", "key": "a", "value": 4},
                {"level": "by_kind", "key": "b", "value": 1}
            ])
        );
    }

    #[test]
    fn test_unknown_top_level_aggregation() {
        let aggs = AggTree::from_request(&json!({"alpha": {"avg": {"field": "price"}}})).unwrap();
        let raw = json!({"omega": {"value": 1}});
        assert!(matches!(
            Aggregations::new(&raw, &aggs).serialize_as_normalized(),
            Err(AggError::SchemaMismatch(ref n)) if n == "omega"
        ));
    }

    #[test]
    fn test_empty_payload() {
        let aggs = AggTree::default();
        let raw = json!({});
        assert_eq!(
            Aggregations::new(&raw, &aggs).serialize_as_normalized().unwrap(),
            json!({"level": "root", "key": null, "value": null, "children": []})
        );
    }
}
