//! Text output for serialized aggregations.

pub mod generator;

pub use generator::{generate_dataframe_table, render, render_json, render_response_tree};
