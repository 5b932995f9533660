// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Outline Model
//!
//! A document outline is a flat collection of [`Node`]s. Hierarchy is encoded
//! by each node's `parent_id` (`""` marks a root); sibling order is the order
//! in which nodes appear in the collection.
//!
//! Every operation here is a pure function over `&[Node]`: structural edits
//! return a new collection and never mutate the input. Traversals carry a
//! visited set so that malformed input containing a cycle terminates instead
//! of looping.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Parent id used by root nodes.
pub const ROOT_PARENT: &str = "";

/// A single outline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub parent_id: String,
    pub label: String,
    /// `None` and `Some(false)` both mean expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    /// Source file this node was derived from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, parent_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            label: label.into(),
            collapsed: None,
            file_id: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id == ROOT_PARENT
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed.unwrap_or(false)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutlineError {
    #[error("Invalid outline: {0}")]
    Validation(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Cycle detected at node {0}")]
    CycleDetected(String),
}

/// How generated or imported nodes combine with an existing outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    Replace,
    #[default]
    Extend,
}

fn index_by_id(nodes: &[Node]) -> HashMap<&str, &Node> {
    nodes.iter().map(|n| (n.id.as_str(), n)).collect()
}

/// Children of each parent id, in collection order.
fn children_by_parent(nodes: &[Node]) -> HashMap<&str, Vec<&Node>> {
    let mut children: HashMap<&str, Vec<&Node>> = HashMap::new();
    for node in nodes {
        children.entry(node.parent_id.as_str()).or_default().push(node);
    }
    children
}

/// Depth of a node: number of parent edges between it and its root.
///
/// A parent reference that points at a missing node ends the walk as if the
/// node above were a root.
pub fn compute_depth(node_id: &str, nodes: &[Node]) -> Result<usize, OutlineError> {
    let by_id = index_by_id(nodes);
    let mut current = *by_id
        .get(node_id)
        .ok_or_else(|| OutlineError::NodeNotFound(node_id.to_string()))?;

    let mut seen = HashSet::new();
    let mut depth = 0;
    seen.insert(current.id.as_str());

    while !current.is_root() {
        match by_id.get(current.parent_id.as_str()) {
            Some(parent) => {
                if !seen.insert(parent.id.as_str()) {
                    return Err(OutlineError::CycleDetected(parent.id.clone()));
                }
                depth += 1;
                current = parent;
            }
            None => break,
        }
    }

    Ok(depth)
}

/// Depth of every node, memoised across the batch.
pub fn depth_map(nodes: &[Node]) -> Result<HashMap<String, usize>, OutlineError> {
    let by_id = index_by_id(nodes);
    let mut depths: HashMap<String, usize> = HashMap::with_capacity(nodes.len());

    for node in nodes {
        if depths.contains_key(&node.id) {
            continue;
        }

        // Walk up until a root, a dangling parent or an already-known depth.
        let mut chain: Vec<&Node> = Vec::new();
        let mut on_chain: HashSet<&str> = HashSet::new();
        let mut current = node;
        let base = loop {
            if let Some(known) = depths.get(&current.id) {
                break *known + 1;
            }
            if !on_chain.insert(current.id.as_str()) {
                return Err(OutlineError::CycleDetected(current.id.clone()));
            }
            chain.push(current);
            if current.is_root() {
                break 0;
            }
            match by_id.get(current.parent_id.as_str()) {
                Some(parent) => current = parent,
                None => break 0,
            }
        };

        for (offset, entry) in chain.iter().rev().enumerate() {
            depths.insert(entry.id.clone(), base + offset);
        }
    }

    Ok(depths)
}

/// Fails with [`OutlineError::CycleDetected`] if any parent chain loops.
pub fn validate_acyclic(nodes: &[Node]) -> Result<(), OutlineError> {
    depth_map(nodes).map(|_| ())
}

/// Pre-order ids of every node reachable without entering a collapsed subtree.
///
/// Roots come first in collection order; collapsed nodes are listed but their
/// descendants are not.
pub fn visible_order(nodes: &[Node]) -> Vec<String> {
    let children = children_by_parent(nodes);
    let mut order = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();

    let mut stack: Vec<&Node> = children
        .get(ROOT_PARENT)
        .map(|roots| roots.iter().rev().copied().collect())
        .unwrap_or_default();

    while let Some(node) = stack.pop() {
        if !visited.insert(node.id.as_str()) {
            continue;
        }
        order.push(node.id.clone());

        if node.is_collapsed() {
            continue;
        }
        if let Some(kids) = children.get(node.id.as_str()) {
            stack.extend(kids.iter().rev().copied());
        }
    }

    order
}

/// Id of the node visually after `node_id`, if any.
pub fn next_visible(node_id: &str, nodes: &[Node]) -> Option<String> {
    let order = visible_order(nodes);
    let position = order.iter().position(|id| id == node_id)?;
    order.get(position + 1).cloned()
}

/// Id of the node visually before `node_id`, if any.
pub fn previous_visible(node_id: &str, nodes: &[Node]) -> Option<String> {
    let order = visible_order(nodes);
    let position = order.iter().position(|id| id == node_id)?;
    position.checked_sub(1).and_then(|p| order.get(p).cloned())
}

/// True if `ancestor_id` appears on the parent chain of `node_id`.
fn is_ancestor(ancestor_id: &str, node_id: &str, nodes: &[Node]) -> bool {
    let by_id = index_by_id(nodes);
    let mut seen = HashSet::new();
    let mut current = by_id.get(node_id).copied();
    while let Some(node) = current {
        if !seen.insert(node.id.as_str()) || node.is_root() {
            return false;
        }
        if node.parent_id == ancestor_id {
            return true;
        }
        current = by_id.get(node.parent_id.as_str()).copied();
    }
    false
}

fn with_parent(nodes: &[Node], node_id: &str, parent_id: &str) -> Vec<Node> {
    nodes
        .iter()
        .map(|n| {
            if n.id == node_id {
                Node { parent_id: parent_id.to_string(), ..n.clone() }
            } else {
                n.clone()
            }
        })
        .collect()
}

/// Make the node a child of its immediately preceding sibling.
///
/// The first child of a parent (or the first root) is left where it is.
pub fn indent(node_id: &str, nodes: &[Node]) -> Result<Vec<Node>, OutlineError> {
    let target = nodes
        .iter()
        .find(|n| n.id == node_id)
        .ok_or_else(|| OutlineError::NodeNotFound(node_id.to_string()))?;

    let previous_sibling = nodes
        .iter()
        .filter(|n| n.parent_id == target.parent_id)
        .take_while(|n| n.id != target.id)
        .last();

    let Some(new_parent) = previous_sibling else {
        return Ok(nodes.to_vec());
    };

    if new_parent.id == target.id || is_ancestor(&target.id, &new_parent.id, nodes) {
        return Err(OutlineError::CycleDetected(target.id.clone()));
    }

    Ok(with_parent(nodes, &target.id, &new_parent.id))
}

/// Move the node up one level, making it a sibling of its current parent.
///
/// Roots are left where they are. A child of a root becomes a root.
pub fn outdent(node_id: &str, nodes: &[Node]) -> Result<Vec<Node>, OutlineError> {
    let target = nodes
        .iter()
        .find(|n| n.id == node_id)
        .ok_or_else(|| OutlineError::NodeNotFound(node_id.to_string()))?;

    if target.is_root() {
        return Ok(nodes.to_vec());
    }

    let grandparent = nodes
        .iter()
        .find(|n| n.id == target.parent_id)
        .map(|parent| parent.parent_id.clone())
        .unwrap_or_else(|| ROOT_PARENT.to_string());

    if grandparent == target.id || is_ancestor(&target.id, &grandparent, nodes) {
        return Err(OutlineError::CycleDetected(target.id.clone()));
    }

    Ok(with_parent(nodes, &target.id, &grandparent))
}

fn set_collapsed_by_depth(
    nodes: &[Node],
    should_change: impl Fn(usize) -> bool,
    collapsed: bool,
) -> Result<Vec<Node>, OutlineError> {
    let depths = depth_map(nodes)?;
    Ok(nodes
        .iter()
        .map(|n| {
            let depth = depths.get(&n.id).copied().unwrap_or(0);
            if should_change(depth) {
                Node { collapsed: Some(collapsed), ..n.clone() }
            } else {
                n.clone()
            }
        })
        .collect())
}

/// Expand every node whose depth is at least `level`; shallower nodes keep
/// their flag.
pub fn expand_to_level(level: usize, nodes: &[Node]) -> Result<Vec<Node>, OutlineError> {
    set_collapsed_by_depth(nodes, |depth| depth >= level, false)
}

/// Collapse every node whose depth is at least `level`; shallower nodes keep
/// their flag.
pub fn collapse_to_level(level: usize, nodes: &[Node]) -> Result<Vec<Node>, OutlineError> {
    set_collapsed_by_depth(nodes, |depth| depth >= level, true)
}

/// Set the collapsed flag of a single node.
pub fn set_collapsed(node_id: &str, collapsed: bool, nodes: &[Node]) -> Result<Vec<Node>, OutlineError> {
    if !nodes.iter().any(|n| n.id == node_id) {
        return Err(OutlineError::NodeNotFound(node_id.to_string()));
    }
    Ok(nodes
        .iter()
        .map(|n| {
            if n.id == node_id {
                Node { collapsed: Some(collapsed), ..n.clone() }
            } else {
                n.clone()
            }
        })
        .collect())
}

/// Hierarchical numbering of the whole outline, one line per node:
///
/// ```text
/// 1. Root
/// 1.1. Child
/// 2. Second root
/// ```
///
/// Collapse flags are ignored.
pub fn build_numbered_outline(nodes: &[Node]) -> String {
    let children = children_by_parent(nodes);
    let mut lines = Vec::with_capacity(nodes.len());
    let mut visited: HashSet<&str> = HashSet::new();

    let mut stack: Vec<(&Node, String)> = children
        .get(ROOT_PARENT)
        .map(|roots| {
            roots
                .iter()
                .enumerate()
                .rev()
                .map(|(i, n)| (*n, (i + 1).to_string()))
                .collect()
        })
        .unwrap_or_default();

    while let Some((node, number)) = stack.pop() {
        if !visited.insert(node.id.as_str()) {
            continue;
        }
        lines.push(format!("{}. {}", number, node.label));

        if let Some(kids) = children.get(node.id.as_str()) {
            for (i, child) in kids.iter().enumerate().rev() {
                stack.push((*child, format!("{}.{}", number, i + 1)));
            }
        }
    }

    lines.join("\n")
}

/// Largest numeric id in the outline, or 0 if none are numeric.
pub fn max_numeric_id(nodes: &[Node]) -> u64 {
    nodes
        .iter()
        .filter_map(|n| n.id.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

pub fn next_id(nodes: &[Node]) -> String {
    (max_numeric_id(nodes) + 1).to_string()
}

/// Append a new node under `parent_id` and return the new collection with the
/// assigned id.
pub fn add_child(parent_id: &str, label: &str, nodes: &[Node]) -> Result<(Vec<Node>, String), OutlineError> {
    if parent_id != ROOT_PARENT && !nodes.iter().any(|n| n.id == parent_id) {
        return Err(OutlineError::NodeNotFound(parent_id.to_string()));
    }
    let id = next_id(nodes);
    let mut updated = nodes.to_vec();
    updated.push(Node::new(id.clone(), parent_id, label));
    Ok((updated, id))
}

/// Insert a new node directly after `sibling_id`, sharing its parent.
pub fn add_sibling(sibling_id: &str, label: &str, nodes: &[Node]) -> Result<(Vec<Node>, String), OutlineError> {
    let position = nodes
        .iter()
        .position(|n| n.id == sibling_id)
        .ok_or_else(|| OutlineError::NodeNotFound(sibling_id.to_string()))?;
    let id = next_id(nodes);
    let mut updated = nodes.to_vec();
    let parent_id = updated[position].parent_id.clone();
    updated.insert(position + 1, Node::new(id.clone(), parent_id, label));
    Ok((updated, id))
}

pub fn rename(node_id: &str, label: &str, nodes: &[Node]) -> Result<Vec<Node>, OutlineError> {
    if !nodes.iter().any(|n| n.id == node_id) {
        return Err(OutlineError::NodeNotFound(node_id.to_string()));
    }
    Ok(nodes
        .iter()
        .map(|n| {
            if n.id == node_id {
                Node { label: label.to_string(), ..n.clone() }
            } else {
                n.clone()
            }
        })
        .collect())
}

/// Remove a node together with all of its descendants.
pub fn remove_subtree(node_id: &str, nodes: &[Node]) -> Result<Vec<Node>, OutlineError> {
    if !nodes.iter().any(|n| n.id == node_id) {
        return Err(OutlineError::NodeNotFound(node_id.to_string()));
    }

    let children = children_by_parent(nodes);
    let mut doomed: HashSet<&str> = HashSet::new();
    let mut stack = vec![node_id];
    while let Some(id) = stack.pop() {
        if !doomed.insert(id) {
            continue;
        }
        if let Some(kids) = children.get(id) {
            stack.extend(kids.iter().map(|k| k.id.as_str()));
        }
    }

    Ok(nodes
        .iter()
        .filter(|n| !doomed.contains(n.id.as_str()))
        .cloned()
        .collect())
}

/// Combine `incoming` with `existing`.
///
/// In extend mode, incoming nodes whose id collides with an existing one (or
/// is not a number above the current maximum) are renumbered from `max + 1`.
/// Parent references inside the incoming batch follow the renumbering;
/// references to existing nodes are kept.
pub fn merge(existing: &[Node], incoming: &[Node], mode: MergeMode) -> Vec<Node> {
    match mode {
        MergeMode::Replace => incoming.to_vec(),
        MergeMode::Extend => {
            let max_existing = max_numeric_id(existing);
            let existing_ids: HashSet<&str> = existing.iter().map(|n| n.id.as_str()).collect();
            let incoming_ids: HashSet<&str> = incoming.iter().map(|n| n.id.as_str()).collect();

            let mut next = max_existing.max(max_numeric_id(incoming)) + 1;
            let mut remap: HashMap<&str, String> = HashMap::new();
            let mut taken: HashSet<String> = HashSet::new();
            let mut assigned = Vec::with_capacity(incoming.len());

            for node in incoming {
                let fits = node
                    .id
                    .parse::<u64>()
                    .map(|v| v > max_existing)
                    .unwrap_or(false)
                    && !existing_ids.contains(node.id.as_str())
                    && !taken.contains(&node.id);

                let id = if fits {
                    node.id.clone()
                } else {
                    let fresh = next.to_string();
                    next += 1;
                    fresh
                };
                taken.insert(id.clone());
                // Parent references resolve to the first node carrying an id.
                remap.entry(node.id.as_str()).or_insert_with(|| id.clone());
                assigned.push(id);
            }

            let mut merged = existing.to_vec();
            for (node, id) in incoming.iter().zip(assigned) {
                let parent_id = if incoming_ids.contains(node.parent_id.as_str()) {
                    remap
                        .get(node.parent_id.as_str())
                        .cloned()
                        .unwrap_or_else(|| node.parent_id.clone())
                } else {
                    node.parent_id.clone()
                };
                merged.push(Node { id, parent_id, ..node.clone() });
            }
            merged
        }
    }
}

#[derive(Serialize)]
struct ExportEnvelope<'a> {
    nodes: &'a [Node],
}

/// Serialize the outline as `{"nodes": [...]}`.
pub fn export_json(nodes: &[Node]) -> Result<String, OutlineError> {
    serde_json::to_string_pretty(&ExportEnvelope { nodes })
        .map_err(|e| OutlineError::Validation(e.to_string()))
}

/// Parse `{"nodes": [...]}`, validating each entry.
///
/// Unknown fields are ignored. A `collapsed` or `fileId` of the wrong type is
/// dropped rather than rejected.
pub fn import_json(text: &str) -> Result<Vec<Node>, OutlineError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| OutlineError::Validation(format!("not valid JSON: {}", e)))?;
    let nodes = value
        .get("nodes")
        .ok_or_else(|| OutlineError::Validation("missing \"nodes\" array".to_string()))?;
    nodes_from_value(nodes)
}

/// Validate a JSON array of nodes.
pub fn nodes_from_value(value: &Value) -> Result<Vec<Node>, OutlineError> {
    let entries = value
        .as_array()
        .ok_or_else(|| OutlineError::Validation("\"nodes\" must be an array".to_string()))?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let object = entry
                .as_object()
                .ok_or_else(|| OutlineError::Validation(format!("node {} is not an object", index)))?;

            let text_field = |name: &str| -> Result<String, OutlineError> {
                object
                    .get(name)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        OutlineError::Validation(format!("node {} is missing string field \"{}\"", index, name))
                    })
            };

            Ok(Node {
                id: text_field("id")?,
                parent_id: text_field("parentId")?,
                label: text_field("label")?,
                collapsed: object.get("collapsed").and_then(Value::as_bool),
                file_id: object.get("fileId").and_then(Value::as_str).map(str::to_string),
            })
        })
        .collect()
}
