//! Text rendering of serialized aggregations.
//!
//! This module turns the projections produced by [`crate::serialize`] into
//! printable text: an indented tree for response trees, a Markdown table for
//! data frames, and pretty JSON for everything else.

use crate::aggs::key_repr;
use crate::response::{NodeId, ResponseTree};
use crate::serialize::{DataFrame, Serialized};
use serde_json::Value;

/// Minimum number of spaces between a bucket label and its value.
const MIN_PAD: usize = 4;

/// Render any serialization result.
pub fn render(serialized: &Serialized<'_>, line_width: usize) -> String {
    match serialized {
        Serialized::Raw(value) | Serialized::NormalizedTree(value) => render_json(value),
        Serialized::Tree(tree) => tree.show(line_width),
        Serialized::InteractiveTree(itree) => itree.show(line_width),
        Serialized::DictRows(tabular) => render_json(&tabular.to_json()),
        Serialized::DataFrame(df) => generate_dataframe_table(df),
    }
}

/// Pretty JSON, two-space indented.
pub fn render_json(value: &Value) -> String {
    format!("{:#}", value)
}

/// Render the subtree of `tree` rooted at `from`.
///
/// Each bucket is printed as `level=key` (or `level` for keyless buckets),
/// followed by its value right-aligned so that lines fit in `line_width`
/// when nesting allows it.
pub fn render_response_tree(tree: &ResponseTree<'_>, from: NodeId, line_width: usize) -> String {
    let mut output = String::new();
    if tree.get(from).is_none() {
        return output;
    }
    render_node(tree, from, line_width, "", None, &mut output);
    output
}

/// `is_last` is `None` for the first rendered node, which gets no branch.
fn render_node(
    tree: &ResponseTree<'_>,
    id: NodeId,
    line_width: usize,
    prefix: &str,
    is_last: Option<bool>,
    output: &mut String,
) {
    let Some(node) = tree.get(id) else { return };

    let child_prefix = match is_last {
        None => String::new(),
        Some(last) => {
            output.push_str(prefix);
            output.push_str(if last { "└── " } else { "├── " });
            format!("{}{}", prefix, if last { "    " } else { "│   " })
        }
    };
    output.push_str(&bucket_line(
        &node.label(),
        &node.extract_bucket_value(),
        node.level(),
        line_width,
    ));
    output.push('\n');

    let children = node.children_ids();
    for (i, child) in children.iter().enumerate() {
        render_node(
            tree,
            *child,
            line_width,
            &child_prefix,
            Some(i + 1 == children.len()),
            output,
        );
    }
}

fn bucket_line(label: &str, value: &Value, level: usize, line_width: usize) -> String {
    if value.is_null() {
        return label.to_string();
    }
    let value = key_repr(value);
    let pad = line_width
        .saturating_sub(4 * level)
        .saturating_sub(label.chars().count())
        .saturating_sub(value.chars().count())
        .max(MIN_PAD);
    format!("{}{}{}", label, " ".repeat(pad), value)
}

/// Generate a Markdown table from a data frame.
///
/// Index columns come first and are left-aligned, value columns are centered.
pub fn generate_dataframe_table(df: &DataFrame) -> String {
    let mut table = String::new();

    let headers: Vec<&str> = df
        .index_names
        .iter()
        .chain(df.columns.iter())
        .map(String::as_str)
        .collect();
    if headers.is_empty() {
        table.push_str("*No columns*\n");
        return table;
    }

    table.push_str(&format!("| {} |\n", headers.join(" | ")));
    let separator: Vec<&str> = df
        .index_names
        .iter()
        .map(|_| ":---")
        .chain(df.columns.iter().map(|_| ":---:"))
        .collect();
    table.push_str(&format!("|{}|\n", separator.join("|")));

    for (key, row) in df.index.iter().zip(df.data.iter()) {
        let cells: Vec<String> = key
            .iter()
            .map(|k| cell(k, true))
            .chain(row.iter().map(|v| cell(v, false)))
            .collect();
        table.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    table
}

fn cell(value: &Value, is_key: bool) -> String {
    let text = match value {
        Value::Null if !is_key => String::new(),
        Value::Array(_) | Value::Object(_) => format!("`{}`", value),
        other => key_repr(other),
    };
    text.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggs::AggTree;
    use crate::serialize::Aggregations;
    use serde_json::json;

    fn create_test_aggs() -> (AggTree, Value) {
        let aggs = AggTree::from_request(&json!({
            "by_material": {
                "terms": {"field": "material"},
                "aggs": {
                    "by_color": {
                        "terms": {"field": "color"},
                        "aggs": {"avg_price": {"avg": {"field": "price"}}}
                    }
                }
            }
        }))
        .unwrap();
        let raw = json!({
            "by_material": {"buckets": [
                {"key": "wood", "doc_count": 3, "by_color": {"buckets": [
                    {"key": "blue", "doc_count": 2, "avg_price": {"value": 10.0}},
                    {"key": "red", "doc_count": 1, "avg_price": {"value": 7.0}}
                ]}}
            ]}
        });
        (aggs, raw)
    }

    #[test]
    fn test_render_response_tree() {
        let (aggs, raw) = create_test_aggs();
        let tree = ResponseTree::build(&aggs, &raw).unwrap();
        let expected = [
            "root".to_string(),
            format!("└── by_material=wood{}3", " ".repeat(19)),
            format!("    ├── by_color=blue{}2", " ".repeat(18)),
            format!("    │   └── avg_price{}10.0", " ".repeat(15)),
            format!("    └── by_color=red{}1", " ".repeat(19)),
            format!("        └── avg_price{}7.0", " ".repeat(16)),
        ]
        .join("\n")
            + "\n";
        assert_eq!(render_response_tree(&tree, 0, 40), expected);
    }

    #[test]
    fn test_minimum_padding() {
        assert_eq!(bucket_line("by_color=blue", &json!(2), 3, 10), "by_color=blue    2");
        assert_eq!(bucket_line("root", &Value::Null, 0, 60), "root");
        assert_eq!(bucket_line("by_color", &json!("x"), 0, 13), "by_color    x");
    }

    #[test]
    fn test_render_unknown_node_is_empty() {
        let (aggs, raw) = create_test_aggs();
        let tree = ResponseTree::build(&aggs, &raw).unwrap();
        assert!(render_response_tree(&tree, 99, 60).is_empty());
    }

    #[test]
    fn test_generate_dataframe_table() {
        let (aggs, raw) = create_test_aggs();
        let df = Aggregations::new(&raw, &aggs)
            .serialize_as_dataframe(None, true)
            .unwrap();
        let table = generate_dataframe_table(&df);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "| by_material | by_color | doc_count | avg_price |");
        assert_eq!(lines[1], "|:---|:---|:---:|:---:|");
        assert_eq!(lines[2], "| wood | blue | 2 | 10.0 |");
        assert_eq!(lines[3], "| wood | red | 1 | 7.0 |");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_nested_cells_are_inline_json() {
        let df = DataFrame {
            index_names: vec![],
            index: vec![vec![]],
            columns: vec!["sub".to_string(), "missing".to_string()],
            data: vec![vec![json!([{"key": "a|b"}]), Value::Null]],
        };
        let table = generate_dataframe_table(&df);
        assert!(table.contains("| `[{\"key\":\"a\\|b\"}]` |  |"));
    }

    #[test]
    fn test_render_dispatch() {
        let (aggs, raw) = create_test_aggs();
        let aggregations = Aggregations::new(&raw, &aggs);
        let options = crate::serialize::SerializeOptions::default();

        let text = render(&aggregations.serialize("raw", &options).unwrap(), 60);
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), raw);

        let text = render(&aggregations.serialize("tree", &options).unwrap(), 60);
        assert!(text.starts_with("root\n"));

        let text = render(&aggregations.serialize("dict_rows", &options).unwrap(), 60);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["index_names"], json!(["by_material", "by_color"]));
        assert_eq!(parsed["index"][1], json!({"by_material": "wood", "by_color": "red"}));

        let text = render(&aggregations.serialize("dataframe", &options).unwrap(), 60);
        assert!(text.starts_with("| by_material |"));
    }
}
