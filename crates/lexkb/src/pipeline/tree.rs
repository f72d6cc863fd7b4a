//! Owned form of the hierarchical outline and its summary statistics.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

/// One outline node. Children live under `nodes`; every other key the tree
/// builder emits (`title`, `node_id`, `line_num`, `summary`, ...) is kept
/// as-is in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub nodes: Vec<TreeNode>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TreeNode {
    pub fn new(title: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("title".to_string(), Value::String(title.to_string()));
        Self {
            nodes: Vec::new(),
            fields,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.nodes = children;
        self
    }

    /// `(depth, count)` of the subtree rooted here, children first.
    fn measure(&self) -> (usize, usize) {
        let mut deepest_child = 0;
        let mut count = 1;
        for child in &self.nodes {
            let (depth, child_count) = child.measure();
            deepest_child = deepest_child.max(depth);
            count += child_count;
        }
        (deepest_child + 1, count)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<TreeNode>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<TreeNode>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Depth and node count of an outline forest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeSummary {
    /// Levels on the longest root-to-leaf path; 0 for an empty forest.
    pub depth: usize,
    pub node_count: usize,
}

impl TreeSummary {
    pub fn of(forest: &[TreeNode]) -> Self {
        forest
            .iter()
            .map(TreeNode::measure)
            .fold(Self::default(), |acc, (depth, count)| Self {
                depth: acc.depth.max(depth),
                node_count: acc.node_count + count,
            })
    }

    /// The persisted `pageindex_metadata` object.
    pub fn to_metadata(&self, generated_at: &str) -> Value {
        json!({
            "tree_depth": self.depth,
            "node_count": self.node_count,
            "generated_at": generated_at,
        })
    }
}

/// Reads the node forest out of a tree-builder result.
///
/// Accepts `{structure: [...]}`, a bare node list, a single node object, or
/// null (empty).
pub fn parse_structure(tree: &Value) -> Result<Vec<TreeNode>, serde_json::Error> {
    let structure = match tree {
        Value::Object(map) => map.get("structure").unwrap_or(tree),
        other => other,
    };
    match structure {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => serde_json::from_value(structure.clone()),
        Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        Value::Object(_) => Ok(vec![serde_json::from_value(structure.clone())?]),
        other => Err(serde::de::Error::custom(format!(
            "expected a node list, found {}",
            other
        ))),
    }
}

/// `(depth, node_count)` of a tree-builder result.
pub fn tree_depth_and_count(tree: &Value) -> Result<(usize, usize), serde_json::Error> {
    let summary = TreeSummary::of(&parse_structure(tree)?);
    Ok((summary.depth, summary.node_count))
}
