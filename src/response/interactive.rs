//! Cursor-based navigation over a response tree.

use super::tree::{NodeId, ResponseNode, ResponseTree};
use crate::error::{AggError, Result};
use serde_json::{json, Map, Value};

/// A [`ResponseTree`] with a movable focus bucket.
#[derive(Debug, Clone)]
pub struct InteractiveTree<'a> {
    tree: ResponseTree<'a>,
    focus: NodeId,
}

impl<'a> InteractiveTree<'a> {
    /// Wrap `tree`, focused on its root.
    pub fn new(tree: ResponseTree<'a>) -> Self {
        Self { tree, focus: 0 }
    }

    pub fn tree(&self) -> &ResponseTree<'a> {
        &self.tree
    }

    pub fn into_tree(self) -> ResponseTree<'a> {
        self.tree
    }

    pub fn focus(&self) -> &ResponseNode<'a> {
        self.tree.get(self.focus).unwrap_or_else(|| self.tree.root())
    }

    /// Labels of the focused bucket's children, in response order.
    pub fn child_labels(&self) -> Vec<String> {
        self.tree.children(self.focus).iter().map(|c| c.label()).collect()
    }

    /// Move the focus to the child labelled `label` (`level=key` or `level`).
    pub fn descend(&mut self, label: &str) -> Result<&ResponseNode<'a>> {
        let child = self
            .tree
            .children(self.focus)
            .into_iter()
            .find(|c| c.label() == label)
            .map(|c| c.id())
            .ok_or_else(|| AggError::SchemaMismatch(label.to_string()))?;
        self.focus = child;
        Ok(self.focus())
    }

    /// Move the focus to the parent bucket. Returns false at the root.
    pub fn ascend(&mut self) -> bool {
        match self.tree.parent(self.focus).map(|p| p.id()) {
            Some(parent) => {
                self.focus = parent;
                true
            }
            None => false,
        }
    }

    /// `{level: key}` path of the focused bucket, leaf first.
    pub fn path(&self) -> Result<Map<String, Value>> {
        self.tree.bucket_id_dict(self.focus, None, None)
    }

    /// Query filter selecting the documents of the focused bucket.
    pub fn query_filter(&self) -> Result<Value> {
        let filters = self.tree.bucket_filters(self.focus)?;
        Ok(json!({ "bool": { "filter": filters } }))
    }

    /// Render the subtree under the focus.
    pub fn show(&self, line_width: usize) -> String {
        crate::report::render_response_tree(&self.tree, self.focus, line_width)
    }
}
