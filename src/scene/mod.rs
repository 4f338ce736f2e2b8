pub mod components;
pub mod info;
pub mod lifecycle;
pub mod members;
pub mod memory;
pub mod ops;
pub mod search;

use bevy::math::{Affine3A, EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, BridgeResult};
use components::{ComponentRegistry, SceneComponent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Local pose of a node relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl NodeTransform {
    pub const IDENTITY: NodeTransform = NodeTransform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn affine(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn from_affine(affine: &Affine3A) -> Self {
        let (scale, rotation, translation) = affine.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }
}

/// Euler angles in degrees, applied Z then X then Y.
pub fn quat_from_euler_degrees(euler: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::YXZ,
        euler.y.to_radians(),
        euler.x.to_radians(),
        euler.z.to_radians(),
    )
}

/// Inverse of [`quat_from_euler_degrees`], each angle wrapped into `[0, 360)`.
pub fn euler_degrees(rotation: Quat) -> Vec3 {
    let (y, x, z) = rotation.to_euler(EulerRot::YXZ);
    Vec3::new(wrap_degrees(x), wrap_degrees(y), wrap_degrees(z))
}

fn wrap_degrees(radians: f32) -> f32 {
    let wrapped = radians.to_degrees().rem_euclid(360.0);
    if 360.0 - wrapped < 1e-3 {
        0.0
    } else {
        wrapped
    }
}

pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub tag: String,
    pub layer: u32,
    pub active: bool,
    pub scene: String,
    pub parent: Option<NodeId>,
    pub transform: NodeTransform,
    pub components: Vec<Box<dyn SceneComponent>>,
}

impl Node {
    pub fn has_component(&self, type_name: &str) -> bool {
        type_name == components::TRANSFORM
            || self.components.iter().any(|c| c.type_name() == type_name)
    }

    pub fn component(&self, type_name: &str) -> Option<&dyn SceneComponent> {
        self.components
            .iter()
            .find(|c| c.type_name() == type_name)
            .map(|c| c.as_ref() as &dyn SceneComponent)
    }

    pub fn component_mut(&mut self, type_name: &str) -> Option<&mut dyn SceneComponent> {
        for component in self.components.iter_mut() {
            if component.type_name() == type_name {
                return Some(component.as_mut());
            }
        }
        None
    }

    pub fn get<T: SceneComponent>(&self) -> Option<&T> {
        self.components
            .iter()
            .find_map(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: SceneComponent>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|c| c.as_any_mut().downcast_mut::<T>())
    }

    /// Transform first, then attached components in order.
    pub fn component_names(&self) -> Vec<String> {
        std::iter::once(components::TRANSFORM)
            .chain(self.components.iter().map(|c| c.type_name()))
            .map(str::to_string)
            .collect()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("components", &self.component_names())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub name: String,
    pub parent: Option<NodeId>,
    pub transform: NodeTransform,
    pub tag: String,
    pub layer: u32,
    pub active: bool,
    pub scene: Option<String>,
}

impl NodeSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            transform: NodeTransform::IDENTITY,
            tag: "Untagged".to_string(),
            layer: 0,
            active: true,
            scene: None,
        }
    }

    pub fn under(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// A spawnable description of a node subtree, as stored by an asset index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeTemplate {
    pub name: String,
    pub tag: Option<String>,
    pub layer: Option<u32>,
    pub position: Option<[f32; 3]>,
    pub rotation: Option<[f32; 3]>,
    pub scale: Option<[f32; 3]>,
    pub components: Vec<ComponentTemplate>,
    pub children: Vec<NodeTemplate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComponentTemplate {
    pub type_name: String,
    pub properties: Map<String, Value>,
}

impl NodeTemplate {
    fn local_transform(&self) -> NodeTransform {
        NodeTransform {
            translation: self.position.map(Vec3::from).unwrap_or(Vec3::ZERO),
            rotation: self
                .rotation
                .map(|r| quat_from_euler_degrees(Vec3::from(r)))
                .unwrap_or(Quat::IDENTITY),
            scale: self.scale.map(Vec3::from).unwrap_or(Vec3::ONE),
        }
    }
}

/// The external scene graph. All access happens on the scene owner.
pub trait SceneGraph: Send + Sync {
    /// Every node, in the graph's own enumeration order.
    fn all_nodes(&self) -> Vec<NodeId>;

    fn roots(&self) -> Vec<NodeId>;

    fn children(&self, id: NodeId) -> Vec<NodeId>;

    fn node(&self, id: NodeId) -> Option<&Node>;

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node>;

    fn create_node(&mut self, spec: NodeSpec) -> BridgeResult<NodeId>;

    /// Destroys the node and its whole subtree.
    fn destroy_node(&mut self, id: NodeId) -> BridgeResult<()>;

    /// Re-parents without touching the local transform.
    fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> BridgeResult<()>;

    fn layer_index(&self, name: &str) -> Option<u32>;

    fn find_nodes(&self, predicate: &dyn Fn(&Node) -> bool) -> Vec<NodeId> {
        self.all_nodes()
            .into_iter()
            .filter(|id| self.node(*id).is_some_and(predicate))
            .collect()
    }

    fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    fn world_matrix(&self, id: NodeId) -> Option<Affine3A> {
        let node = self.node(id)?;
        let local = node.transform.affine();
        match node.parent {
            Some(parent) => Some(self.world_matrix(parent)? * local),
            None => Some(local),
        }
    }

    fn active_in_hierarchy(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(id) = current {
            match self.node(id) {
                Some(node) if node.active => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// Depth-first pre-order walk of the subtree rooted at `id`, root included.
    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).into_iter().rev());
        }
        out
    }

    /// Spawns a template subtree. Component failures are returned as
    /// warnings; the nodes are kept.
    fn instantiate(
        &mut self,
        template: &NodeTemplate,
        registry: &ComponentRegistry,
        parent: Option<NodeId>,
        scene: Option<String>,
    ) -> BridgeResult<(NodeId, Vec<String>)> {
        let mut spec = NodeSpec::named(if template.name.is_empty() {
            "Instance"
        } else {
            template.name.as_str()
        });
        spec.parent = parent;
        spec.transform = template.local_transform();
        spec.scene = scene.clone();
        if let Some(tag) = &template.tag {
            spec.tag = tag.clone();
        }
        if let Some(layer) = template.layer {
            spec.layer = layer;
        }
        let id = self.create_node(spec)?;
        let mut warnings = Vec::new();
        for component in &template.components {
            match attach_component(self, registry, id, &component.type_name) {
                Ok(type_name) => {
                    warnings.extend(apply_component_properties(
                        self,
                        id,
                        type_name,
                        &component.properties,
                    )?);
                }
                Err(err) => warnings.push(err.to_string()),
            }
        }
        for child in &template.children {
            let (_, child_warnings) = self.instantiate(child, registry, Some(id), scene.clone())?;
            warnings.extend(child_warnings);
        }
        Ok((id, warnings))
    }
}

/// Adds a registered component kind to a node and returns its canonical
/// name. Structural kinds and duplicates are rejected.
pub fn attach_component<G: SceneGraph + ?Sized>(
    graph: &mut G,
    registry: &ComponentRegistry,
    id: NodeId,
    type_name: &str,
) -> BridgeResult<&'static str> {
    let kind = registry
        .resolve(type_name)
        .ok_or_else(|| BridgeError::not_found(format!("Component type '{type_name}' not found.")))?;
    if kind.structural {
        return Err(BridgeError::precondition(format!(
            "Cannot add '{}': it is a structural component.",
            kind.name
        )));
    }
    let node = graph
        .node_mut(id)
        .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))?;
    if node.has_component(kind.name) {
        return Err(BridgeError::precondition(format!(
            "'{}' already has a '{}' component.",
            node.name, kind.name
        )));
    }
    let component = kind.instantiate().ok_or_else(|| {
        BridgeError::collaborator(format!("Component type '{}' cannot be created.", kind.name))
    })?;
    node.components.push(component);
    Ok(kind.name)
}

/// Applies a property bag to one component of a node, returning per-key
/// warnings.
pub fn apply_component_properties<G: SceneGraph + ?Sized>(
    graph: &mut G,
    id: NodeId,
    type_name: &str,
    props: &Map<String, Value>,
) -> BridgeResult<Vec<String>> {
    if props.is_empty() {
        return Ok(Vec::new());
    }
    if type_name == components::TRANSFORM {
        return ops::apply_transform_properties(graph, id, props);
    }
    let node = graph
        .node_mut(id)
        .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))?;
    let node_name = node.name.clone();
    let component = node.component_mut(type_name).ok_or_else(|| {
        BridgeError::not_found(format!("Component '{type_name}' not found on '{node_name}'."))
    })?;
    Ok(members::apply_properties(component, props))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euler_round_trip_stays_within_tolerance() {
        let euler = Vec3::new(10.0, 20.0, 30.0);
        let back = euler_degrees(quat_from_euler_degrees(euler));
        assert!((back - euler).abs().max_element() < 1e-3, "{back:?}");
    }

    #[test]
    fn yaw_rotates_forward_axis_towards_positive_x() {
        let rotated = quat_from_euler_degrees(Vec3::new(0.0, 90.0, 0.0)) * Vec3::Z;
        assert!((rotated - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn negative_angles_wrap_into_positive_range() {
        let back = euler_degrees(quat_from_euler_degrees(Vec3::new(0.0, -90.0, 0.0)));
        assert!((back.y - 270.0).abs() < 1e-3);
    }
}
