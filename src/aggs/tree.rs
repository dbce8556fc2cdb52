//! Ordered tree of aggregation nodes.
//!
//! Nodes live in an arena and reference each other by index. The first
//! entry is always the synthetic root standing for the request's `aggs`
//! envelope; children keep their insertion order.

use super::node::{AggKind, AggNode, ROOT_NAME};
use crate::error::{AggError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

const ROOT_ID: usize = 0;

#[derive(Debug, Clone)]
struct Entry {
    node: AggNode,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Aggregation request modeled as a tree, read-only once built.
#[derive(Debug, Clone)]
pub struct AggTree {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl Default for AggTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AggTree {
    /// Create a tree holding only the synthetic root.
    pub fn new() -> Self {
        let mut index = HashMap::new();
        index.insert(ROOT_NAME.to_string(), ROOT_ID);
        Self {
            entries: vec![Entry {
                node: AggNode::root(),
                parent: None,
                children: Vec::new(),
            }],
            index,
        }
    }

    /// Parse an aggregations clause: `{name: {<type>: {params}, "aggs": {...}}}`.
    pub fn from_request(aggs: &Value) -> Result<Self> {
        let mut tree = Self::new();
        let map = aggs
            .as_object()
            .ok_or_else(|| AggError::invalid(ROOT_NAME, "aggregations clause must be an object"))?;
        tree.insert_clause(ROOT_NAME, map)?;
        debug!("Parsed aggregation tree with {} nodes", tree.len());
        Ok(tree)
    }

    /// Parse the `aggs` (or `aggregations`) clause of a full search body.
    pub fn from_search_body(body: &Value) -> Result<Self> {
        match body.get("aggs").or_else(|| body.get("aggregations")) {
            Some(aggs) => Self::from_request(aggs),
            None => Ok(Self::new()),
        }
    }

    /// Parse either a full search body or a bare aggregations clause.
    ///
    /// The body counts as a search body when its `aggs` or `aggregations`
    /// entry is a clause of named aggregations. A bare clause may itself
    /// hold an aggregation named `aggs`, whose value is a definition instead.
    pub fn from_body(body: &Value) -> Result<Self> {
        if is_search_body(body) {
            Self::from_search_body(body)
        } else {
            Self::from_request(body)
        }
    }

    fn insert_clause(&mut self, parent: &str, clause: &Map<String, Value>) -> Result<()> {
        for (name, definition) in clause {
            let definition = definition
                .as_object()
                .ok_or_else(|| AggError::invalid(name, "aggregation definition must be an object"))?;

            let mut type_entries = definition
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "aggs" | "aggregations" | "meta"));
            let (type_name, params) = match (type_entries.next(), type_entries.next()) {
                (Some(entry), None) => entry,
                (None, _) => return Err(AggError::invalid(name, "missing aggregation type")),
                (Some(_), Some(_)) => {
                    return Err(AggError::invalid(name, "more than one aggregation type"))
                }
            };

            let mut node = AggNode::from_body(name, type_name, params)?;
            if let Some(meta) = definition.get("meta") {
                node = node.with_meta(meta.clone());
            }
            self.insert(parent, node)?;

            if let Some(children) = definition.get("aggs").or_else(|| definition.get("aggregations")) {
                let children = children
                    .as_object()
                    .ok_or_else(|| AggError::invalid(name, "sub-aggregations must be an object"))?;
                self.insert_clause(name, children)?;
            }
        }
        Ok(())
    }

    /// Append `node` as the last child of `parent`.
    pub fn insert(&mut self, parent: &str, node: AggNode) -> Result<()> {
        let parent_id = self.id(parent)?;
        if self.entries[parent_id].node.is_metric() {
            return Err(AggError::invalid(
                node.name(),
                format!("metric aggregation <{}> cannot have children", parent),
            ));
        }
        if self.index.contains_key(node.name()) {
            return Err(AggError::invalid(node.name(), "duplicate aggregation name"));
        }

        let id = self.entries.len();
        self.index.insert(node.name().to_string(), id);
        self.entries.push(Entry {
            node,
            parent: Some(parent_id),
            children: Vec::new(),
        });
        self.entries[parent_id].children.push(id);
        Ok(())
    }

    fn id(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| AggError::SchemaMismatch(name.to_string()))
    }

    /// Name of the synthetic root.
    pub fn root(&self) -> &str {
        ROOT_NAME
    }

    pub fn root_node(&self) -> &AggNode {
        &self.entries[ROOT_ID].node
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of aggregations, the synthetic root excluded.
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Result<&AggNode> {
        Ok(&self.entries[self.id(name)?].node)
    }

    /// Direct children of `name`, in insertion order.
    pub fn children(&self, name: &str) -> Result<Vec<&AggNode>> {
        let id = self.id(name)?;
        Ok(self.entries[id]
            .children
            .iter()
            .map(|c| &self.entries[*c].node)
            .collect())
    }

    /// Parent of `name`; the synthetic root has none.
    pub fn parent(&self, name: &str) -> Result<Option<&AggNode>> {
        let id = self.id(name)?;
        Ok(self.entries[id].parent.map(|p| &self.entries[p].node))
    }

    /// Ancestors of `name`, synthetic root excluded.
    pub fn ancestors(&self, name: &str, from_root: bool) -> Result<Vec<&AggNode>> {
        let mut current = self.entries[self.id(name)?].parent;
        let mut ancestors = Vec::new();
        while let Some(id) = current {
            if id == ROOT_ID {
                break;
            }
            ancestors.push(&self.entries[id].node);
            current = self.entries[id].parent;
        }
        if from_root {
            ancestors.reverse();
        }
        Ok(ancestors)
    }

    /// Deepest bucket aggregation that neither has bucket siblings nor an
    /// ancestor with bucket siblings.
    pub fn deepest_linear_bucket_agg(&self) -> Option<&str> {
        let mut deepest = None;
        let mut current = ROOT_ID;
        loop {
            let mut bucket_children = self.entries[current]
                .children
                .iter()
                .copied()
                .filter(|c| self.entries[*c].node.is_bucket());
            match (bucket_children.next(), bucket_children.next()) {
                (Some(only), None) => {
                    current = only;
                    deepest = Some(self.entries[only].node.name());
                }
                _ => return deepest,
            }
        }
    }

    /// All aggregations in insertion order, synthetic root excluded.
    pub fn iter(&self) -> impl Iterator<Item = &AggNode> {
        self.entries.iter().skip(1).map(|e| &e.node)
    }

    /// Rebuild the aggregations clause this tree was parsed from.
    pub fn to_request(&self) -> Value {
        self.clause(ROOT_ID)
    }

    fn clause(&self, id: usize) -> Value {
        let mut out = Map::new();
        for child in &self.entries[id].children {
            let entry = &self.entries[*child];
            let mut body = match entry.node.to_request() {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            if !entry.children.is_empty() {
                body.insert("aggs".to_string(), self.clause(*child));
            }
            out.insert(entry.node.name().to_string(), Value::Object(body));
        }
        Value::Object(out)
    }

    /// Check every field-based aggregation against the mapping types of its field.
    ///
    /// Fields missing from `field_types` are not checked.
    pub fn validate_field_types(&self, field_types: &HashMap<String, String>) -> Result<()> {
        for node in self.iter() {
            let Some(field) = node.field() else { continue };
            if let Some(field_type) = field_types.get(field) {
                if !node.kind().accepts_field_type(field_type) {
                    return Err(AggError::invalid(
                        node.name(),
                        format!(
                            "{} aggregation cannot be applied on field <{}> of type <{}>",
                            node.kind(),
                            field,
                            field_type
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn is_search_body(body: &Value) -> bool {
    ["aggs", "aggregations"].iter().any(|key| match body.get(*key) {
        Some(Value::Object(inner)) => !inner.keys().any(|k| AggKind::from_type_name(k).is_some()),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classification_tree() -> AggTree {
        AggTree::from_request(&json!({
            "classification_type": {
                "terms": {"field": "classification_type"},
                "aggs": {
                    "global_metrics.field.name": {
                        "terms": {"field": "global_metrics.field.name"},
                        "aggs": {
                            "avg_nb_classes": {"avg": {"field": "global_metrics.dataset.nb_classes"}},
                            "avg_f1_micro": {"avg": {"field": "global_metrics.performance.test.micro.f1_score"}}
                        }
                    }
                }
            }
        }))
        .unwrap()
    }

    fn names(nodes: &[&AggNode]) -> Vec<String> {
        nodes.iter().map(|n| n.name().to_string()).collect()
    }

    #[test]
    fn test_from_request_structure() {
        let tree = classification_tree();
        assert_eq!(tree.len(), 4);
        assert_eq!(names(&tree.children("root").unwrap()), vec!["classification_type"]);
        assert_eq!(
            names(&tree.children("global_metrics.field.name").unwrap()),
            vec!["avg_nb_classes", "avg_f1_micro"]
        );
        assert_eq!(
            names(&tree.ancestors("avg_f1_micro", true).unwrap()),
            vec!["classification_type", "global_metrics.field.name"]
        );
        assert_eq!(
            names(&tree.ancestors("avg_f1_micro", false).unwrap()),
            vec!["global_metrics.field.name", "classification_type"]
        );
        assert_eq!(
            tree.parent("classification_type").unwrap().map(|n| n.name()),
            Some("root")
        );
        assert!(tree.parent("root").unwrap().is_none());
    }

    #[test]
    fn test_unknown_name_is_schema_mismatch() {
        let tree = classification_tree();
        assert!(matches!(tree.get("nope"), Err(AggError::SchemaMismatch(_))));
        assert!(tree.children("nope").is_err());
    }

    #[test]
    fn test_deepest_linear_bucket_agg() {
        let tree = AggTree::from_request(&json!({
            "week": {
                "date_histogram": {"field": "date", "interval": "1w"},
                "aggs": {
                    "local_metrics.field_class.name": {
                        "terms": {"field": "local_metrics.field_class.name", "size": 10},
                        "aggs": {"min_f1_score": {"min": {"field": "f1"}}}
                    }
                }
            }
        }))
        .unwrap();
        assert_eq!(
            tree.deepest_linear_bucket_agg(),
            Some("local_metrics.field_class.name")
        );

        let branching = AggTree::from_request(&json!({
            "week": {
                "date_histogram": {"field": "date", "interval": "1w"},
                "aggs": {
                    "local_metrics.field_class.name": {"terms": {"field": "x"}},
                    "f1_score_above_threshold": {"filter": {"range": {"f1": {"gte": 0.5}}}}
                }
            }
        }))
        .unwrap();
        assert_eq!(branching.deepest_linear_bucket_agg(), Some("week"));

        let metrics_only = AggTree::from_request(&json!({"avg_price": {"avg": {"field": "price"}}})).unwrap();
        assert_eq!(metrics_only.deepest_linear_bucket_agg(), None);
    }

    #[test]
    fn test_insert_rules() {
        let mut tree = classification_tree();
        let dup = AggNode::from_body("avg_f1_micro", "max", &json!({"field": "x"})).unwrap();
        assert!(tree.insert("root", dup).is_err());

        let under_metric = AggNode::from_body("deeper", "max", &json!({"field": "x"})).unwrap();
        assert!(tree.insert("avg_f1_micro", under_metric).is_err());

        let under_missing = AggNode::from_body("other", "max", &json!({"field": "x"})).unwrap();
        assert!(matches!(
            tree.insert("missing_parent", under_missing),
            Err(AggError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(AggTree::from_request(&json!([])).is_err());
        assert!(AggTree::from_request(&json!({"a": {"aggs": {}}})).is_err());
        assert!(AggTree::from_request(&json!({"a": {"terms": {}, "avg": {}}})).is_err());
        assert!(AggTree::from_request(&json!({"a": {"terms": {}, "aggs": []}})).is_err());
    }

    #[test]
    fn test_search_body_and_round_trip() {
        let body = json!({
            "query": {"match_all": {}},
            "aggs": {"by_color": {"terms": {"field": "color"}, "meta": {"owner": "ui"}}}
        });
        let tree = AggTree::from_search_body(&body).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get("by_color").unwrap().meta(), Some(&json!({"owner": "ui"})));
        assert_eq!(
            tree.to_request(),
            json!({"by_color": {"terms": {"field": "color"}, "meta": {"owner": "ui"}}})
        );

        let empty = AggTree::from_search_body(&json!({"query": {}})).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_from_body_detects_shape() {
        let wrapped = AggTree::from_body(&json!({
            "size": 0,
            "aggregations": {"by_color": {"terms": {"field": "color"}}}
        }))
        .unwrap();
        assert!(wrapped.contains("by_color"));

        let bare = AggTree::from_body(&json!({
            "aggs": {"terms": {"field": "color"}},
            "avg_price": {"avg": {"field": "price"}}
        }))
        .unwrap();
        assert_eq!(bare.len(), 2);
        assert_eq!(bare.get("aggs").unwrap().kind(), AggKind::Terms);
        assert!(bare.contains("avg_price"));

        let nested = AggTree::from_body(&json!({
            "aggregations": {
                "date_histogram": {"field": "date", "interval": "1d"},
                "aggs": {"count": {"value_count": {"field": "id"}}}
            }
        }))
        .unwrap();
        assert_eq!(nested.get("aggregations").unwrap().kind(), AggKind::DateHistogram);
        assert!(nested.contains("count"));
    }

    #[test]
    fn test_validate_field_types() {
        let tree = classification_tree();
        let mut types = HashMap::new();
        types.insert("classification_type".to_string(), "keyword".to_string());
        types.insert(
            "global_metrics.performance.test.micro.f1_score".to_string(),
            "float".to_string(),
        );
        assert!(tree.validate_field_types(&types).is_ok());

        types.insert("global_metrics.dataset.nb_classes".to_string(), "keyword".to_string());
        assert!(tree.validate_field_types(&types).is_err());
    }
}
