//! In-process scene graph used by the headless host and by tests.

use std::collections::HashMap;

use super::{Node, NodeId, NodeSpec, SceneGraph};
use crate::error::{BridgeError, BridgeResult};

const BUILTIN_LAYERS: &[(&str, u32)] = &[
    ("Default", 0),
    ("TransparentFX", 1),
    ("Ignore Raycast", 2),
    ("Water", 4),
    ("UI", 5),
];

pub struct MemoryScene {
    nodes: HashMap<NodeId, Node>,
    order: Vec<NodeId>,
    roots: Vec<NodeId>,
    children: HashMap<NodeId, Vec<NodeId>>,
    layers: Vec<(String, u32)>,
    default_scene: String,
    next_id: u64,
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new("Main")
    }
}

impl MemoryScene {
    pub fn new(default_scene: impl Into<String>) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            roots: Vec::new(),
            children: HashMap::new(),
            layers: BUILTIN_LAYERS
                .iter()
                .map(|(name, index)| (name.to_string(), *index))
                .collect(),
            default_scene: default_scene.into(),
            next_id: 1,
        }
    }

    pub fn with_layer(mut self, name: impl Into<String>, index: u32) -> Self {
        self.layers.push((name.into(), index));
        self
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn siblings_mut(&mut self, parent: Option<NodeId>) -> &mut Vec<NodeId> {
        match parent {
            Some(parent) => self.children.entry(parent).or_default(),
            None => &mut self.roots,
        }
    }

    fn is_descendant(&self, candidate: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.nodes.get(&candidate).and_then(|n| n.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }
}

impl SceneGraph for MemoryScene {
    fn all_nodes(&self) -> Vec<NodeId> {
        self.order.clone()
    }

    fn roots(&self) -> Vec<NodeId> {
        self.roots.clone()
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.children.get(&id).cloned().unwrap_or_default()
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    fn create_node(&mut self, spec: NodeSpec) -> BridgeResult<NodeId> {
        let scene = match spec.parent {
            Some(parent) => match self.nodes.get(&parent) {
                Some(parent_node) => parent_node.scene.clone(),
                None => {
                    return Err(BridgeError::not_found(format!(
                        "Parent node {parent} not found."
                    )))
                }
            },
            None => spec
                .scene
                .clone()
                .unwrap_or_else(|| self.default_scene.clone()),
        };
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                id,
                name: spec.name,
                tag: spec.tag,
                layer: spec.layer,
                active: spec.active,
                scene,
                parent: spec.parent,
                transform: spec.transform,
                components: Vec::new(),
            },
        );
        self.order.push(id);
        self.siblings_mut(spec.parent).push(id);
        Ok(id)
    }

    fn destroy_node(&mut self, id: NodeId) -> BridgeResult<()> {
        let parent = self
            .nodes
            .get(&id)
            .map(|n| n.parent)
            .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))?;
        let doomed = self.subtree(id);
        self.siblings_mut(parent).retain(|c| *c != id);
        for node in &doomed {
            self.nodes.remove(node);
            self.children.remove(node);
        }
        self.order.retain(|n| !doomed.contains(n));
        Ok(())
    }

    fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> BridgeResult<()> {
        let old_parent = self
            .nodes
            .get(&id)
            .map(|n| n.parent)
            .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))?;
        if let Some(new_parent) = parent {
            if !self.nodes.contains_key(&new_parent) {
                return Err(BridgeError::not_found(format!(
                    "Parent node {new_parent} not found."
                )));
            }
            if new_parent == id || self.is_descendant(new_parent, id) {
                return Err(BridgeError::precondition(
                    "Cannot parent a node under itself or one of its descendants.",
                ));
            }
        }
        if old_parent == parent {
            return Ok(());
        }
        self.siblings_mut(old_parent).retain(|c| *c != id);
        self.siblings_mut(parent).push(id);
        let scene = parent.and_then(|p| self.nodes.get(&p).map(|n| n.scene.clone()));
        for node in self.subtree(id) {
            if let (Some(scene), Some(entry)) = (&scene, self.nodes.get_mut(&node)) {
                entry.scene = scene.clone();
            }
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = parent;
        }
        Ok(())
    }

    fn layer_index(&self, name: &str) -> Option<u32> {
        let name = name.trim();
        self.layers
            .iter()
            .find(|(layer, _)| layer.eq_ignore_ascii_case(name))
            .map(|(_, index)| *index)
    }
}
