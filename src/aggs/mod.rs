//! Aggregation request modeling.
//!
//! [`AggNode`] describes one aggregation step and how its response is
//! shaped; [`AggTree`] orders them as nested in the request.

pub mod node;
pub mod tree;

pub use node::{key_repr, AggKind, AggNode, Bucket, DEFAULT_OTHER_KEY, NUMERIC_TYPES, ROOT_NAME};
pub use tree::AggTree;
