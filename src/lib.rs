//! aggview - aggregation response trees and serialization.
//!
//! Bind a raw search `aggregations` payload to the [`AggTree`] it was
//! requested with, then project it as a bucket tree, a normalized nested
//! structure, grouped rows or a column-oriented frame.
//!
//! ```no_run
//! use aggview::{AggTree, SearchResponse, SerializeOptions};
//! use serde_json::json;
//!
//! # fn main() -> aggview::Result<()> {
//! let aggs = AggTree::from_request(&json!({
//!     "by_color": {"terms": {"field": "color"}}
//! }))?;
//! let response = SearchResponse::from_json(r#"{
//!     "took": 1, "timed_out": false,
//!     "_shards": {"total": 1, "successful": 1},
//!     "hits": {"total": 2, "max_score": null, "hits": []},
//!     "aggregations": {"by_color": {"buckets": [{"key": "blue", "doc_count": 2}]}}
//! }"#)?;
//! let rows = response
//!     .aggregations(&aggs)
//!     .serialize("dict_rows", &SerializeOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod aggs;
pub mod error;
pub mod models;
pub mod report;
pub mod response;
pub mod serialize;

pub use aggs::{AggKind, AggNode, AggTree};
pub use error::{AggError, Result};
pub use models::SearchResponse;
pub use response::{InteractiveTree, ResponseNode, ResponseTree};
pub use serialize::{Aggregations, DataFrame, OutputMode, SerializeOptions, Serialized, Tabular};
