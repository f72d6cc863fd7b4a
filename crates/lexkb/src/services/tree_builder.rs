use async_trait::async_trait;
use serde_json::{json, Value};

use super::converter::parse_atx_heading;
use super::{TreeBuilder, TreeOptions};
use crate::error::ServiceError;
use crate::pipeline::tree::TreeNode;
use crate::sanitize::truncate_chars;

/// Longest per-node summary, in characters.
const MAX_SUMMARY_CHARS: usize = 300;

/// Builds the outline from markdown ATX headings, nesting each heading
/// under the closest preceding heading of a lower level.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownTreeBuilder;

struct Section {
    level: usize,
    title: String,
    line_num: usize,
    body: String,
}

impl MarkdownTreeBuilder {
    pub fn new() -> Self {
        Self
    }

    fn sections(text: &str) -> Vec<Section> {
        let mut sections: Vec<Section> = Vec::new();
        let mut in_fence = false;

        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
            } else if !in_fence {
                if let Some((level, title)) = parse_atx_heading(trimmed) {
                    sections.push(Section {
                        level,
                        title,
                        line_num: idx + 1,
                        body: String::new(),
                    });
                    continue;
                }
            }
            if let Some(current) = sections.last_mut() {
                if !current.body.is_empty() {
                    current.body.push('\n');
                }
                current.body.push_str(line);
            }
        }
        sections
    }

    fn build(text: &str, options: TreeOptions) -> Vec<TreeNode> {
        let mut roots: Vec<TreeNode> = Vec::new();
        let mut stack: Vec<(usize, TreeNode)> = Vec::new();

        for (index, section) in Self::sections(text).into_iter().enumerate() {
            while stack.last().is_some_and(|(level, _)| *level >= section.level) {
                if let Some((_, done)) = stack.pop() {
                    attach(&mut stack, &mut roots, done);
                }
            }

            let mut node = TreeNode::new(&section.title);
            node.fields
                .insert("node_id".to_string(), json!(format!("{:04}", index)));
            node.fields
                .insert("line_num".to_string(), json!(section.line_num));
            if options.add_summary {
                let body = section.body.split_whitespace().collect::<Vec<_>>().join(" ");
                if !body.is_empty() {
                    node.fields.insert(
                        "summary".to_string(),
                        json!(truncate_chars(&body, MAX_SUMMARY_CHARS)),
                    );
                }
            }
            stack.push((section.level, node));
        }

        while let Some((_, done)) = stack.pop() {
            attach(&mut stack, &mut roots, done);
        }
        roots
    }
}

fn attach(stack: &mut [(usize, TreeNode)], roots: &mut Vec<TreeNode>, node: TreeNode) {
    match stack.last_mut() {
        Some((_, parent)) => parent.nodes.push(node),
        None => roots.push(node),
    }
}

#[async_trait]
impl TreeBuilder for MarkdownTreeBuilder {
    async fn build_tree(&self, text: &str, options: TreeOptions) -> Result<Value, ServiceError> {
        let structure = Self::build(text, options);
        let structure = serde_json::to_value(structure)
            .map_err(|e| ServiceError::InvalidResponse(format!("tree encoding: {}", e)))?;
        Ok(json!({ "structure": structure }))
    }
}
