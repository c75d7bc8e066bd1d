use crate::{RankerError, Result};
use serde::Serialize;
use serde_yaml::{Mapping, Value};

/// Keys that describe a node rather than name a child topic.
const STRUCTURAL_KEYS: &[&str] = &[
    "Alias",
    "umbrella",
    "leaf",
    "parent",
    "display_name",
    "Version",
    "priority",
    "metadata",
    "value_parent",
];

/// One node of the topic hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicNode {
    pub name: String,
    /// Full slash-separated path, root first.
    pub path: String,
    /// Smaller is more important. Leaves carry it directly, aggregation points in `metadata`.
    pub priority: Option<u32>,
    pub leaf: bool,
    pub umbrella: bool,
    pub display_name: Option<String>,
    /// Topic an aggregation point rolls its value up into, if any.
    pub value_parent: Option<String>,
    pub children: Vec<TopicNode>,
}

impl TopicNode {
    /// Leaves and aggregation points are the topics that can be voted on.
    #[must_use]
    pub const fn is_candidate(&self) -> bool {
        self.leaf || self.umbrella
    }
}

/// A candidate topic with its priority, in taxonomy pre-order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicPriority {
    pub topic: String,
    pub priority: u32,
}

/// Immutable snapshot of one taxonomy version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Taxonomy {
    pub roots: Vec<TopicNode>,
}

impl Taxonomy {
    pub fn from_yaml(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_yaml::from_slice(bytes)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Mapping(mapping) = value else {
            return Err(RankerError::InvalidTaxonomy(
                "document root is not a mapping".to_string(),
            ));
        };
        Ok(Self {
            roots: parse_children(mapping, ""),
        })
    }

    /// Pre-order walk over every node.
    pub fn walk(&self) -> impl Iterator<Item = &TopicNode> {
        let mut stack: Vec<&TopicNode> = self.roots.iter().rev().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Every leaf and aggregation point that has a non-zero priority, in pre-order.
    #[must_use]
    pub fn flatten(&self) -> Vec<TopicPriority> {
        self.walk()
            .filter(|node| node.is_candidate())
            .filter_map(|node| match node.priority {
                Some(priority) if priority > 0 => Some(TopicPriority {
                    topic: node.path.clone(),
                    priority,
                }),
                _ => {
                    log::debug!("topic {} has no priority; not ranked", node.path);
                    None
                }
            })
            .collect()
    }

    /// Paths of every leaf and aggregation point, priority or not.
    #[must_use]
    pub fn topic_paths(&self) -> Vec<String> {
        self.walk()
            .filter(|node| node.is_candidate())
            .map(|node| node.path.clone())
            .collect()
    }

    #[must_use]
    pub fn aggregation_points(&self) -> Vec<&TopicNode> {
        self.walk().filter(|node| node.umbrella).collect()
    }

    #[must_use]
    pub fn find(&self, path: &str) -> Option<&TopicNode> {
        self.walk().find(|node| node.path == path)
    }
}

fn parse_children(mapping: &Mapping, parent: &str) -> Vec<TopicNode> {
    mapping
        .iter()
        .filter_map(|(key, value)| {
            let name = key_name(key)?;
            if STRUCTURAL_KEYS.contains(&name.as_str()) {
                return None;
            }
            let path = if parent.is_empty() {
                name.clone()
            } else {
                format!("{parent}/{name}")
            };
            parse_node(name, path, value)
        })
        .collect()
}

fn parse_node(name: String, path: String, value: &Value) -> Option<TopicNode> {
    match value {
        Value::Null => Some(TopicNode {
            name,
            path,
            priority: None,
            leaf: true,
            umbrella: false,
            display_name: None,
            value_parent: None,
            children: Vec::new(),
        }),
        Value::Mapping(fields) => {
            let leaf = fields.get("leaf").and_then(Value::as_bool).unwrap_or(false);
            let metadata = fields.get("metadata").and_then(Value::as_mapping);
            let umbrella = !leaf
                && metadata
                    .and_then(|m| m.get("umbrella"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
            let priority = if leaf {
                fields.get("priority").and_then(priority_value)
            } else if umbrella {
                metadata
                    .and_then(|m| m.get("priority"))
                    .and_then(priority_value)
            } else {
                None
            };
            let value_parent = metadata
                .and_then(|m| m.get("value_parent"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let children = if leaf {
                Vec::new()
            } else {
                parse_children(fields, &path)
            };
            Some(TopicNode {
                display_name: fields
                    .get("display_name")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                name,
                path,
                priority,
                leaf,
                umbrella,
                value_parent,
                children,
            })
        }
        // Scalars and sequences are annotations, not topics.
        _ => None,
    }
}

fn key_name(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn priority_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
