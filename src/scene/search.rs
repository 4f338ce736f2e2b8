use std::str::FromStr;

use super::components::ComponentRegistry;
use super::{NodeId, SceneGraph};
use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    ByName,
    ByTag,
    ByLayer,
    ByComponent,
    ByPath,
    ById,
}

impl FromStr for SearchMethod {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "by_name" => Ok(SearchMethod::ByName),
            "by_tag" => Ok(SearchMethod::ByTag),
            "by_layer" => Ok(SearchMethod::ByLayer),
            "by_component" => Ok(SearchMethod::ByComponent),
            "by_path" => Ok(SearchMethod::ByPath),
            "by_id" | "by_instance_id" => Ok(SearchMethod::ById),
            _ => Err(BridgeError::unknown("searchMethod", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeQuery {
    pub target: String,
    pub method: SearchMethod,
    pub find_all: bool,
    pub include_inactive: bool,
    pub include_children: bool,
}

impl NodeQuery {
    pub fn by_name(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method: SearchMethod::ByName,
            find_all: false,
            include_inactive: true,
            include_children: true,
        }
    }

    pub fn all(mut self) -> Self {
        self.find_all = true;
        self
    }
}

/// Runs a query. With `find_all == false` the result is the first match
/// in the graph's enumeration order.
pub fn find(
    graph: &dyn SceneGraph,
    registry: &ComponentRegistry,
    query: &NodeQuery,
) -> BridgeResult<Vec<NodeId>> {
    let target = query.target.trim();
    let mut found = match query.method {
        SearchMethod::ByPath => find_by_path(graph, target),
        method => {
            let pool = if query.include_children {
                graph.all_nodes()
            } else {
                graph.roots()
            };
            let predicate = node_predicate(graph, registry, method, target);
            pool.into_iter()
                .filter(|id| graph.node(*id).is_some_and(|node| predicate(node)))
                .collect()
        }
    };
    if !query.include_inactive {
        found.retain(|id| graph.active_in_hierarchy(*id));
    }
    if !query.find_all {
        found.truncate(1);
    }
    Ok(found)
}

fn node_predicate<'a>(
    graph: &dyn SceneGraph,
    registry: &ComponentRegistry,
    method: SearchMethod,
    target: &'a str,
) -> Box<dyn Fn(&super::Node) -> bool + 'a> {
    match method {
        SearchMethod::ByName => Box::new(move |node| node.name == target),
        SearchMethod::ByTag => Box::new(move |node| node.tag == target),
        SearchMethod::ByLayer => {
            let layer = target
                .parse::<u32>()
                .ok()
                .or_else(|| graph.layer_index(target));
            if layer.is_none() {
                tracing::warn!(layer = target, "unknown layer name");
            }
            Box::new(move |node| Some(node.layer) == layer)
        }
        SearchMethod::ByComponent => {
            let type_name = registry
                .resolve(target)
                .map(|kind| kind.name.to_string())
                .unwrap_or_else(|| target.to_string());
            Box::new(move |node| node.has_component(&type_name))
        }
        SearchMethod::ById => {
            let id = target.parse::<u64>().ok().map(NodeId);
            Box::new(move |node| Some(node.id) == id)
        }
        SearchMethod::ByPath => Box::new(|_| false),
    }
}

/// `Root/Child/Leaf`, either anchored at a root's own name or relative to
/// a root's children. A leading `/` is ignored.
fn find_by_path(graph: &dyn SceneGraph, path: &str) -> Vec<NodeId> {
    let segments: Vec<&str> = path
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let Some((first, rest)) = segments.split_first() else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for root in graph.roots() {
        let Some(node) = graph.node(root) else {
            continue;
        };
        if node.name == *first {
            if let Some(id) = walk(graph, root, rest) {
                found.push(id);
            }
        }
        if let Some(id) = walk(graph, root, &segments) {
            found.push(id);
        }
    }
    found.dedup();
    found
}

fn walk(graph: &dyn SceneGraph, from: NodeId, segments: &[&str]) -> Option<NodeId> {
    let mut current = from;
    for segment in segments {
        current = graph
            .children(current)
            .into_iter()
            .find(|child| graph.node(*child).is_some_and(|n| n.name == *segment))?;
    }
    Some(current)
}
