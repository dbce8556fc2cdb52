//! Aggregation response serialization.
//!
//! [`Aggregations`] binds a raw `aggregations` payload to the [`AggTree`]
//! it was requested with, and projects it into one of several output
//! shapes. None of the projections mutate their inputs, so every mode can
//! be called repeatedly on the same payload.

mod normalized;
mod tabular;

pub use tabular::{DataFrame, RowIndex, Tabular};

use crate::aggs::AggTree;
use crate::error::{AggError, Result};
use crate::response::{InteractiveTree, ResponseTree};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Output shapes accepted by [`Aggregations::serialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// The payload as received.
    Raw,
    /// A [`ResponseTree`].
    Tree,
    /// A [`ResponseTree`] wrapped for navigation.
    InteractiveTree,
    /// Nested `{level, key, value, children}` mappings.
    NormalizedTree,
    /// Row keys plus one column mapping per row.
    DictRows,
    /// Columnar projection of the dict rows.
    DataFrame,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Raw => "raw",
            OutputMode::Tree => "tree",
            OutputMode::InteractiveTree => "interactive_tree",
            OutputMode::NormalizedTree => "normalized_tree",
            OutputMode::DictRows => "dict_rows",
            OutputMode::DataFrame => "dataframe",
        }
    }
}

impl FromStr for OutputMode {
    type Err = AggError;

    fn from_str(s: &str) -> Result<Self> {
        match s.replace('-', "_").as_str() {
            "raw" => Ok(OutputMode::Raw),
            "tree" => Ok(OutputMode::Tree),
            "interactive_tree" => Ok(OutputMode::InteractiveTree),
            "normalized_tree" => Ok(OutputMode::NormalizedTree),
            "dict_rows" => Ok(OutputMode::DictRows),
            "dataframe" => Ok(OutputMode::DataFrame),
            _ => Err(AggError::UnsupportedOutputMode(s.to_string())),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Options shared by the tabular projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Last grouping level; defaults to the deepest linear bucket aggregation.
    pub grouped_by: Option<String>,
    /// Row keys as tuples instead of `{level: key}` mappings.
    pub row_as_tuple: bool,
    /// Express bucket children columns as normalized trees.
    pub normalize_children: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            grouped_by: None,
            row_as_tuple: false,
            normalize_children: true,
        }
    }
}

/// Result of [`Aggregations::serialize`].
#[derive(Debug, Clone)]
pub enum Serialized<'a> {
    Raw(Value),
    Tree(ResponseTree<'a>),
    InteractiveTree(InteractiveTree<'a>),
    NormalizedTree(Value),
    DictRows(Tabular),
    DataFrame(DataFrame),
}

/// Raw aggregations payload bound to its aggregation tree.
#[derive(Debug, Clone, Copy)]
pub struct Aggregations<'a> {
    data: &'a Value,
    aggs: &'a AggTree,
}

impl<'a> Aggregations<'a> {
    pub fn new(data: &'a Value, aggs: &'a AggTree) -> Self {
        Self { data, aggs }
    }

    pub fn data(&self) -> &'a Value {
        self.data
    }

    pub fn aggs(&self) -> &'a AggTree {
        self.aggs
    }

    /// Top-level aggregation names present in the payload, in payload order.
    pub fn keys(&self) -> Vec<&'a str> {
        self.data
            .as_object()
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Raw payload of one top-level aggregation.
    pub fn get(&self, name: &str) -> Result<&'a Value> {
        self.data
            .get(name)
            .ok_or_else(|| AggError::malformed(format!("aggregation <{}> not in response", name)))
    }

    /// Materialize the response tree.
    pub fn serialize_as_tree(&self) -> Result<ResponseTree<'a>> {
        ResponseTree::build(self.aggs, self.data)
    }

    /// Materialize the response tree, wrapped for navigation.
    pub fn serialize_as_interactive_tree(&self) -> Result<InteractiveTree<'a>> {
        Ok(InteractiveTree::new(self.serialize_as_tree()?))
    }

    /// Dispatch on a mode name; unknown names fail with
    /// [`AggError::UnsupportedOutputMode`].
    pub fn serialize(&self, output: &str, options: &SerializeOptions) -> Result<Serialized<'a>> {
        self.serialize_as(output.parse()?, options)
    }

    pub fn serialize_as(&self, mode: OutputMode, options: &SerializeOptions) -> Result<Serialized<'a>> {
        debug!("Serializing aggregations as {}", mode);
        let grouped_by = options.grouped_by.as_deref();
        Ok(match mode {
            OutputMode::Raw => Serialized::Raw(self.data.clone()),
            OutputMode::Tree => Serialized::Tree(self.serialize_as_tree()?),
            OutputMode::InteractiveTree => {
                Serialized::InteractiveTree(self.serialize_as_interactive_tree()?)
            }
            OutputMode::NormalizedTree => Serialized::NormalizedTree(self.serialize_as_normalized()?),
            OutputMode::DictRows => Serialized::DictRows(self.serialize_as_tabular(
                grouped_by,
                options.row_as_tuple,
                options.normalize_children,
            )?),
            OutputMode::DataFrame => Serialized::DataFrame(
                self.serialize_as_dataframe(grouped_by, options.normalize_children)?,
            ),
        })
    }
}

impl fmt::Display for Aggregations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.keys();
        if keys.is_empty() {
            return write!(f, "<Aggregations> empty");
        }
        write!(f, "<Aggregations> {:?}", keys)
    }
}
