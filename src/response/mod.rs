//! Response bucket trees.

pub mod interactive;
pub mod tree;

pub use interactive::InteractiveTree;
pub use tree::{NodeId, ResponseNode, ResponseTree};
