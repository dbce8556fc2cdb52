//! Grouped rows and columnar projections.
//!
//! Suppose an aggregation of this shape (A and B bucket aggregations):
//!
//! ```text
//! A──> B──> C1
//!      ├──> C2
//!      └──> C3
//! ```
//!
//! Grouped by `B`, the response becomes one row per `(A, B)` key pair, with
//! one column per child of `B`.

use super::Aggregations;
use crate::aggs::{AggNode, ROOT_NAME};
use crate::error::{AggError, Result};
use crate::response::tree::is_empty_fragment;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Row key of a grouped row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowIndex {
    /// Keys in level order.
    Tuple(Vec<Value>),
    /// `{level: key}` in level order.
    Mapping(Map<String, Value>),
}

impl RowIndex {
    /// Keys in level order, whatever the representation.
    pub fn keys(&self) -> Vec<Value> {
        match self {
            RowIndex::Tuple(keys) => keys.clone(),
            RowIndex::Mapping(map) => map.values().cloned().collect(),
        }
    }
}

/// Grouped rows: index, names of the index levels, one mapping per row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tabular {
    pub index: Vec<RowIndex>,
    pub index_names: Vec<String>,
    pub values: Vec<Map<String, Value>>,
}

impl Tabular {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// `{index, index_names, values}` as plain JSON.
    pub fn to_json(&self) -> Value {
        let index = self
            .index
            .iter()
            .map(|row| match row {
                RowIndex::Tuple(keys) => Value::Array(keys.clone()),
                RowIndex::Mapping(map) => Value::Object(map.clone()),
            })
            .collect();
        let mut out = Map::new();
        out.insert("index".to_string(), Value::Array(index));
        out.insert(
            "index_names".to_string(),
            Value::Array(self.index_names.iter().cloned().map(Value::String).collect()),
        );
        out.insert(
            "values".to_string(),
            Value::Array(self.values.iter().cloned().map(Value::Object).collect()),
        );
        Value::Object(out)
    }
}

/// Column-oriented projection of grouped rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataFrame {
    pub index_names: Vec<String>,
    /// One key tuple per row; empty tuples when nothing is grouped.
    pub index: Vec<Vec<Value>>,
    /// Union of row columns, in first-seen order.
    pub columns: Vec<String>,
    /// Cells, row-major, aligned with `columns`; absent cells are `null`.
    pub data: Vec<Vec<Value>>,
}

impl DataFrame {
    /// Re-key grouped rows on their key tuples.
    pub fn from_tabular(tabular: Tabular) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &tabular.values {
            for name in row.keys() {
                if !columns.contains(name) {
                    columns.push(name.clone());
                }
            }
        }
        let data = tabular
            .values
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self {
            index_names: tabular.index_names,
            index: tabular.index.iter().map(RowIndex::keys).collect(),
            columns,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All cells of one column, in row order. Short rows read as `null`.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        static NULL: Value = Value::Null;
        let position = self.columns.iter().position(|c| c == name)?;
        Some(self.data.iter().map(|row| row.get(position).unwrap_or(&NULL)).collect())
    }

    /// Cell at the row whose key tuple equals `key`.
    pub fn get(&self, key: &[Value], column: &str) -> Option<&Value> {
        let position = self.columns.iter().position(|c| c == column)?;
        let row = self.index.iter().position(|k| k.as_slice() == key)?;
        self.data.get(row).and_then(|r| r.get(position))
    }
}

type GroupedRow<'a> = (Vec<(String, Value)>, &'a Value);

impl<'a> Aggregations<'a> {
    /// Build grouped rows until `grouped_by` (included) is reached, using the
    /// children of the grouping level as columns.
    ///
    /// Without `grouped_by`, the deepest linear bucket aggregation is used;
    /// when there is none, a single row holds every top-level aggregation.
    pub fn serialize_as_tabular(
        &self,
        grouped_by: Option<&str>,
        row_as_tuple: bool,
        normalize_children: bool,
    ) -> Result<Tabular> {
        let aggs = self.aggs();
        let grouped_by = match grouped_by {
            Some(name) if !aggs.contains(name) => {
                return Err(AggError::SchemaMismatch(name.to_string()));
            }
            Some(name) if name == ROOT_NAME => None,
            Some(name) => Some(name),
            None => aggs.deepest_linear_bucket_agg(),
        };

        let (grouping, rows, index_names) = match grouped_by {
            Some(name) => {
                let grouping = aggs.get(name)?;
                let mut path = aggs.ancestors(name, true)?;
                path.push(grouping);
                let index_names = path
                    .iter()
                    .filter(|a| !a.is_unique_bucket())
                    .map(|a| a.name().to_string())
                    .collect();
                let mut rows = Vec::new();
                self.parse_group_by(self.data(), &path, Vec::new(), &mut rows)?;
                (grouping, rows, index_names)
            }
            None => (aggs.root_node(), vec![(Vec::new(), self.data())], Vec::new()),
        };
        debug!("Grouped response by <{}> into {} rows", grouping.name(), rows.len());

        let children = aggs.children(grouping.name())?;
        let mut index = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());
        for (row, bucket) in rows {
            values.push(self.serialize_columns(bucket, grouping, &children, normalize_children)?);
            index.push(if row_as_tuple {
                RowIndex::Tuple(row.into_iter().map(|(_, key)| key).collect())
            } else {
                RowIndex::Mapping(row.into_iter().collect())
            });
        }

        Ok(Tabular {
            index,
            index_names,
            values,
        })
    }

    /// Grouped rows re-keyed as a column-oriented frame.
    pub fn serialize_as_dataframe(
        &self,
        grouped_by: Option<&str>,
        normalize_children: bool,
    ) -> Result<DataFrame> {
        let tabular = self.serialize_as_tabular(grouped_by, true, normalize_children)?;
        Ok(DataFrame::from_tabular(tabular))
    }

    /// Walk the linear chain `path`, yielding one row per bucket of its last
    /// aggregation. Unique-bucket levels add no key component.
    fn parse_group_by(
        &self,
        response: &'a Value,
        path: &[&'a AggNode],
        row: Vec<(String, Value)>,
        out: &mut Vec<GroupedRow<'a>>,
    ) -> Result<()> {
        let Some((agg_node, rest)) = path.split_first() else {
            return Ok(());
        };
        let fragment = match response.get(agg_node.name()) {
            Some(fragment) if !is_empty_fragment(fragment) => fragment,
            _ => return Ok(()),
        };

        for (key, bucket) in agg_node.extract_buckets(fragment)? {
            let mut sub_row = row.clone();
            if !agg_node.is_unique_bucket() {
                sub_row.push((agg_node.name().to_string(), key.unwrap_or(Value::Null)));
            }
            if rest.is_empty() {
                out.push((sub_row, bucket));
            } else {
                self.parse_group_by(bucket, rest, sub_row, out)?;
            }
        }
        Ok(())
    }

    fn serialize_columns(
        &self,
        bucket: &Value,
        grouping: &AggNode,
        children: &[&AggNode],
        normalize_children: bool,
    ) -> Result<Map<String, Value>> {
        let mut result = Map::new();
        // value of the grouping level itself, usually doc_count
        if let Some(attr) = grouping.value_attrs().first() {
            result.insert(attr.to_string(), grouping.extract_bucket_value(bucket));
        }

        for child in children {
            let raw = bucket.get(child.name());
            let column = if !normalize_children {
                raw.cloned().unwrap_or(Value::Null)
            } else if child.is_unique_bucket() || child.is_metric() {
                raw.map(|r| child.extract_bucket_value(r)).unwrap_or(Value::Null)
            } else {
                Value::Array(self.normalize_buckets(bucket, child)?)
            };
            result.insert(child.name().to_string(), column);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggs::AggTree;
    use serde_json::json;

    fn material_tree() -> AggTree {
        AggTree::from_request(&json!({
            "A": {
                "terms": {"field": "material"},
                "aggs": {
                    "B": {
                        "terms": {"field": "color"},
                        "aggs": {
                            "C": {"avg": {"field": "price"}},
                            "D": {"max": {"field": "weight"}}
                        }
                    }
                }
            }
        }))
        .unwrap()
    }

    fn material_response() -> Value {
        json!({
            "A": {"buckets": [
                {"key": "wood", "doc_count": 5, "B": {"buckets": [
                    {"key": "blue", "doc_count": 3, "C": {"value": 10}, "D": {"value": 1}},
                    {"key": "red", "doc_count": 2, "C": {"value": 7}, "D": {"value": 9}}
                ]}},
                {"key": "steel", "doc_count": 1, "B": {"buckets": [
                    {"key": "blue", "doc_count": 1, "C": {"value": 1}, "D": {"value": 3}}
                ]}}
            ]}
        })
    }

    #[test]
    fn test_grouped_rows_as_tuples() {
        let aggs = material_tree();
        let raw = material_response();
        let tabular = Aggregations::new(&raw, &aggs)
            .serialize_as_tabular(Some("B"), true, true)
            .unwrap();

        assert_eq!(tabular.index_names, vec!["A", "B"]);
        assert_eq!(
            tabular.index,
            vec![
                RowIndex::Tuple(vec![json!("wood"), json!("blue")]),
                RowIndex::Tuple(vec![json!("wood"), json!("red")]),
                RowIndex::Tuple(vec![json!("steel"), json!("blue")]),
            ]
        );
        let values: Vec<Value> = tabular.values.into_iter().map(Value::Object).collect();
        assert_eq!(
            values,
            vec![
                json!({"doc_count": 3, "C": 10, "D": 1}),
                json!({"doc_count": 2, "C": 7, "D": 9}),
                json!({"doc_count": 1, "C": 1, "D": 3}),
            ]
        );
    }

    #[test]
    fn test_default_grouping_uses_deepest_linear_agg() {
        let aggs = material_tree();
        let raw = material_response();
        let aggregations = Aggregations::new(&raw, &aggs);
        assert_eq!(
            aggregations.serialize_as_tabular(None, true, true).unwrap(),
            aggregations.serialize_as_tabular(Some("B"), true, true).unwrap()
        );
    }

    #[test]
    fn test_grouped_rows_as_mappings_with_column_order() {
        let aggs = material_tree();
        let raw = material_response();
        let tabular = Aggregations::new(&raw, &aggs)
            .serialize_as_tabular(Some("B"), false, true)
            .unwrap();
        match &tabular.index[2] {
            RowIndex::Mapping(map) => {
                assert_eq!(map.keys().collect::<Vec<_>>(), vec!["A", "B"]);
                assert_eq!(map["A"], json!("steel"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            tabular.values[0].keys().collect::<Vec<_>>(),
            vec!["doc_count", "C", "D"]
        );
    }

    #[test]
    fn test_grouping_at_upper_level_normalizes_bucket_children() {
        let aggs = material_tree();
        let raw = material_response();
        let tabular = Aggregations::new(&raw, &aggs)
            .serialize_as_tabular(Some("A"), true, true)
            .unwrap();
        assert_eq!(tabular.index_names, vec!["A"]);
        assert_eq!(tabular.len(), 2);
        assert_eq!(
            Value::Object(tabular.values[1].clone()),
            json!({
                "doc_count": 1,
                "B": [{
                    "level": "B",
                    "key": "blue",
                    "value": 1,
                    "children": [
                        {"level": "C", "key": null, "value": 1},
                        {"level": "D", "key": null, "value": 3}
                    ]
                }]
            })
        );

        let raw_children = Aggregations::new(&raw, &aggs)
            .serialize_as_tabular(Some("A"), true, false)
            .unwrap();
        assert_eq!(raw_children.values[1]["B"], raw["A"]["buckets"][1]["B"]);
    }

    #[test]
    fn test_unique_bucket_levels_add_no_key() {
        let aggs = AggTree::from_request(&json!({
            "all": {
                "global": {},
                "aggs": {
                    "by_color": {
                        "terms": {"field": "color"},
                        "aggs": {"avg_price": {"avg": {"field": "price"}}}
                    }
                }
            }
        }))
        .unwrap();
        let raw = json!({"all": {"doc_count": 4, "by_color": {"buckets": [
            {"key": "blue", "doc_count": 4, "avg_price": {"value": 2.5}}
        ]}}});
        let tabular = Aggregations::new(&raw, &aggs)
            .serialize_as_tabular(None, true, true)
            .unwrap();
        assert_eq!(tabular.index_names, vec!["by_color"]);
        assert_eq!(tabular.index, vec![RowIndex::Tuple(vec![json!("blue")])]);
        assert_eq!(tabular.values[0]["avg_price"], json!(2.5));
    }

    #[test]
    fn test_multiple_roots_single_row() {
        let aggs = AggTree::from_request(&json!({
            "classification_type": {"terms": {"field": "classification_type"}},
            "avg_f1_score": {"avg": {"field": "f1"}},
            "all": {"global": {}}
        }))
        .unwrap();
        let raw = json!({
            "classification_type": {"buckets": [
                {"key": "multiclass", "doc_count": 439},
                {"key": "multilabel", "doc_count": 433}
            ]},
            "avg_f1_score": {"value": 0.815},
            "all": {"doc_count": 872}
        });
        let tabular = Aggregations::new(&raw, &aggs)
            .serialize_as_tabular(None, true, true)
            .unwrap();
        assert!(tabular.index_names.is_empty());
        assert_eq!(tabular.index, vec![RowIndex::Tuple(vec![])]);
        assert_eq!(tabular.values[0]["avg_f1_score"], json!(0.815));
        assert_eq!(tabular.values[0]["all"], json!(872));
        assert_eq!(
            tabular.values[0]["classification_type"],
            json!([
                {"level": "classification_type", "key": "multiclass", "value": 439},
                {"level": "classification_type", "key": "multilabel", "value": 433}
            ])
        );
    }

    #[test]
    fn test_unknown_grouping_is_schema_mismatch() {
        let aggs = material_tree();
        let raw = material_response();
        let err = Aggregations::new(&raw, &aggs)
            .serialize_as_tabular(Some("Z"), true, true)
            .unwrap_err();
        assert!(matches!(err, AggError::SchemaMismatch(ref n) if n == "Z"));
    }

    #[test]
    fn test_empty_response_yields_no_rows() {
        let aggs = material_tree();
        let raw = json!({});
        let tabular = Aggregations::new(&raw, &aggs)
            .serialize_as_tabular(None, true, true)
            .unwrap();
        assert!(tabular.is_empty());
        assert!(tabular.values.is_empty());
        assert_eq!(tabular.index_names, vec!["A", "B"]);
    }

    #[test]
    fn test_column_with_short_rows() {
        let df = DataFrame {
            index_names: vec!["color".to_string()],
            index: vec![vec![json!("red")], vec![json!("blue")]],
            columns: vec!["doc_count".to_string(), "avg_price".to_string()],
            data: vec![vec![json!(3), json!(9.5)], vec![json!(1)]],
        };
        assert_eq!(df.column("avg_price").unwrap(), vec![&json!(9.5), &Value::Null]);
        assert_eq!(df.get(&[json!("blue")], "avg_price"), None);
    }

    #[test]
    fn test_dataframe() {
        let request: Value =
            serde_json::from_str(include_str!("../../fixtures/classification_aggs.json")).unwrap();
        let response: Value =
            serde_json::from_str(include_str!("../../fixtures/classification_response.json")).unwrap();
        let aggs = AggTree::from_request(&request).unwrap();
        let df = Aggregations::new(&response["aggregations"], &aggs)
            .serialize_as_dataframe(None, true)
            .unwrap();

        assert_eq!(df.index_names, vec!["classification_type", "global_metrics.field.name"]);
        assert_eq!(df.columns, vec!["doc_count", "avg_nb_classes", "avg_f1_micro"]);
        assert_eq!(
            df.index,
            vec![
                vec![json!("multilabel"), json!("ispracticecompatible")],
                vec![json!("multilabel"), json!("gpc")],
                vec![json!("multilabel"), json!("preservationmethods")],
                vec![json!("multiclass"), json!("kind")],
                vec![json!("multiclass"), json!("gpc")],
            ]
        );
        assert_eq!(
            df.column("doc_count").unwrap(),
            vec![&json!(128), &json!(119), &json!(76), &json!(370), &json!(198)]
        );
        assert_eq!(
            df.get(&[json!("multiclass"), json!("gpc")], "avg_f1_micro"),
            Some(&json!(0.93))
        );
        assert!(df.column("missing").is_none());
    }
}
