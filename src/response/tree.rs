//! Response tree construction.
//!
//! Walks a raw `aggregations` payload guided by an [`AggTree`] and
//! materializes one [`ResponseNode`] per bucket. Nodes are stored in an
//! arena; the raw JSON is borrowed, never copied.

use crate::aggs::{key_repr, AggNode, AggTree};
use crate::error::{AggError, Result};
use serde_json::{Map, Value};
use tracing::debug;

/// Index of a node inside its [`ResponseTree`].
pub type NodeId = usize;

/// One concrete bucket of the response.
#[derive(Debug, Clone)]
pub struct ResponseNode<'a> {
    id: NodeId,
    aggregation_node: &'a AggNode,
    current_key: Option<Value>,
    value: &'a Value,
    level: usize,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl<'a> ResponseNode<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Aggregation that produced this bucket.
    pub fn aggregation_node(&self) -> &'a AggNode {
        self.aggregation_node
    }

    /// Name of the producing aggregation.
    pub fn current_level(&self) -> &'a str {
        self.aggregation_node.name()
    }

    /// Bucket key; `None` for unique buckets, metrics and the root.
    pub fn current_key(&self) -> Option<&Value> {
        self.current_key.as_ref()
    }

    /// Raw JSON fragment of this bucket.
    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Nesting depth, root = 0.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children_ids(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn extract_bucket_value(&self) -> Value {
        self.aggregation_node.extract_bucket_value(self.value)
    }

    pub fn extract_bucket_values(&self) -> Map<String, Value> {
        self.aggregation_node.extract_bucket_values(self.value)
    }

    /// `level=key`, or just `level` for keyless buckets.
    pub fn label(&self) -> String {
        match &self.current_key {
            Some(key) => format!("{}={}", self.current_level(), key_repr(key)),
            None => self.current_level().to_string(),
        }
    }
}

/// Tree of response buckets, isomorphic to the reachable part of the
/// aggregation tree expanded by the keys actually present.
#[derive(Debug, Clone)]
pub struct ResponseTree<'a> {
    aggs: &'a AggTree,
    nodes: Vec<ResponseNode<'a>>,
}

impl<'a> ResponseTree<'a> {
    /// Build the tree from the raw `aggregations` mapping of a response.
    pub fn build(aggs: &'a AggTree, raw: &'a Value) -> Result<Self> {
        let mut tree = Self {
            aggs,
            nodes: vec![ResponseNode {
                id: 0,
                aggregation_node: aggs.root_node(),
                current_key: None,
                value: raw,
                level: 0,
                parent: None,
                children: Vec::new(),
            }],
        };
        for child in aggs.children(aggs.root())? {
            tree.parse_node_with_children(child, 0)?;
        }
        debug!("Built response tree with {} buckets", tree.nodes.len());
        Ok(tree)
    }

    fn parse_node_with_children(&mut self, agg_node: &'a AggNode, parent: NodeId) -> Result<()> {
        let parent_value = self.nodes[parent].value;
        let fragment = match parent_value.get(agg_node.name()) {
            Some(fragment) if !is_empty_fragment(fragment) => fragment,
            // no matching documents: the engine omits the aggregation
            _ => {
                debug!("Aggregation <{}> absent from bucket, skipping", agg_node.name());
                return Ok(());
            }
        };

        let level = self.nodes[parent].level + 1;
        for (key, bucket) in agg_node.extract_buckets(fragment)? {
            let id = self.nodes.len();
            self.nodes.push(ResponseNode {
                id,
                aggregation_node: agg_node,
                current_key: key,
                value: bucket,
                level,
                parent: Some(parent),
                children: Vec::new(),
            });
            self.nodes[parent].children.push(id);
            let aggs = self.aggs;
            for child in aggs.children(agg_node.name())? {
                self.parse_node_with_children(child, id)?;
            }
        }
        Ok(())
    }

    /// Aggregation tree this response was parsed against.
    pub fn aggs(&self) -> &'a AggTree {
        self.aggs
    }

    pub fn root(&self) -> &ResponseNode<'a> {
        &self.nodes[0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no aggregation produced any bucket.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn get(&self, id: NodeId) -> Option<&ResponseNode<'a>> {
        self.nodes.get(id)
    }

    fn node(&self, id: NodeId) -> Result<&ResponseNode<'a>> {
        self.nodes
            .get(id)
            .ok_or_else(|| AggError::SchemaMismatch(format!("bucket #{}", id)))
    }

    pub fn parent(&self, id: NodeId) -> Option<&ResponseNode<'a>> {
        self.nodes.get(id)?.parent.map(|p| &self.nodes[p])
    }

    pub fn children(&self, id: NodeId) -> Vec<&ResponseNode<'a>> {
        self.nodes
            .get(id)
            .map(|n| n.children.iter().map(|c| &self.nodes[*c]).collect())
            .unwrap_or_default()
    }

    /// Ancestors of `id`, closest first, root included.
    pub fn ancestors(&self, id: NodeId) -> Vec<&ResponseNode<'a>> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            out.push(node);
            current = self.parent(node.id);
        }
        out
    }

    /// Every bucket in pre-order, optionally restricted to one level.
    pub fn list_buckets(&self, level: Option<&str>) -> Vec<&ResponseNode<'a>> {
        self.list_buckets_under(0, level)
    }

    /// Buckets of the subtree rooted at `id` (included), in pre-order.
    pub fn list_buckets_under(&self, id: NodeId, level: Option<&str>) -> Vec<&ResponseNode<'a>> {
        let mut out = Vec::new();
        let mut stack = match self.nodes.get(id) {
            Some(_) => vec![id],
            None => return out,
        };
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if level.map_or(true, |l| node.current_level() == l) {
                out.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Key of the closest bucket at `level`, starting from `id` itself and
    /// walking up.
    ///
    /// When no such bucket exists, returns `Ok(None)` or, with `exact`, a
    /// [`AggError::SchemaMismatch`].
    pub fn bucket_level_key(&self, id: NodeId, level: &str, exact: bool) -> Result<Option<&Value>> {
        let mut current = Some(self.node(id)?);
        while let Some(node) = current {
            if node.current_level() == level {
                return Ok(node.current_key());
            }
            current = self.parent(node.id);
        }
        if exact {
            return Err(AggError::SchemaMismatch(level.to_string()));
        }
        Ok(None)
    }

    /// `{level: key}` pairs from `id` upward, leaf first.
    ///
    /// Stops after the bucket at `end_level`, after `depth` entries, or below
    /// the synthetic root (which is never included). Keyless buckets map to
    /// `null`.
    pub fn bucket_id_dict(
        &self,
        id: NodeId,
        end_level: Option<&str>,
        depth: Option<usize>,
    ) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        let mut remaining = depth;
        let mut current = Some(self.node(id)?);
        while let Some(node) = current {
            if node.is_root() || remaining == Some(0) {
                break;
            }
            out.insert(
                node.current_level().to_string(),
                node.current_key().cloned().unwrap_or(Value::Null),
            );
            remaining = remaining.map(|d| d - 1);
            if Some(node.current_level()) == end_level {
                break;
            }
            current = self.parent(node.id);
        }
        Ok(out)
    }

    /// Query clauses restricting documents to the bucket `id` belongs to,
    /// root-most first.
    pub fn bucket_filters(&self, id: NodeId) -> Result<Vec<Value>> {
        let node = self.node(id)?;
        let mut filters = Vec::new();
        for bucket in std::iter::once(node).chain(self.ancestors(id)) {
            if bucket.is_root() || bucket.aggregation_node.is_metric() {
                continue;
            }
            let key = bucket.current_key().cloned().unwrap_or(Value::Null);
            if let Some(filter) = bucket.aggregation_node.get_filter(&key)? {
                filters.push(filter);
            }
        }
        filters.reverse();
        Ok(filters)
    }

    /// Indented text rendering, values right-aligned within `line_width`.
    pub fn show(&self, line_width: usize) -> String {
        crate::report::render_response_tree(self, 0, line_width)
    }
}

/// Null, `{}` and `[]` fragments carry no buckets.
pub(crate) fn is_empty_fragment(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(list) => list.is_empty(),
        _ => false,
    }
}
