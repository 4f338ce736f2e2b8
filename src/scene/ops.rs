//! Node-level operations behind the `scene_node` domain. Everything here
//! runs on the scene owner with exclusive access to the stage.

use bevy::math::{Affine3A, Quat, Vec3};
use serde_json::{Map, Value};

use super::components::{Mesh, Renderer, MESH_SHAPES, TRANSFORM};
use super::info::{component_infos, ComponentInfo};
use super::members::{self, MemberKind, MemberSpec, MemberValue, Members, Rgba};
use super::search::{self, NodeQuery};
use super::{
    apply_component_properties, attach_component, euler_degrees, quat_from_euler_degrees, NodeId,
    NodeSpec, NodeTransform, SceneGraph,
};
use crate::error::{BridgeError, BridgeResult};
use crate::stage::Stage;

#[derive(Debug, Clone, PartialEq)]
pub enum LayerRef {
    Index(u32),
    Name(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentRequest {
    pub type_name: String,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateRequest {
    pub name: Option<String>,
    pub primitive: Option<String>,
    pub prefab_path: Option<String>,
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub scale: Option<Vec3>,
    pub parent: Option<NodeQuery>,
    pub tag: Option<String>,
    pub layer: Option<LayerRef>,
    pub active: Option<bool>,
    pub components: Vec<ComponentRequest>,
    pub color: Option<Rgba>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifyRequest {
    pub name: Option<String>,
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub scale: Option<Vec3>,
    pub tag: Option<String>,
    pub layer: Option<LayerRef>,
    pub active: Option<bool>,
    /// `Some(None)` moves the node to the scene root.
    pub parent: Option<Option<NodeQuery>>,
    pub component_properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

/// Resolves a query that must match at least one node.
pub fn find_required(stage: &Stage, query: &NodeQuery) -> BridgeResult<Vec<NodeId>> {
    let found = search::find(stage.graph.as_ref(), &stage.registry, query)?;
    if found.is_empty() {
        return Err(BridgeError::not_found(format!(
            "Target GameObject ('{}') not found.",
            query.target
        )));
    }
    Ok(found)
}

pub fn find_one(stage: &Stage, query: &NodeQuery) -> BridgeResult<NodeId> {
    let query = NodeQuery {
        find_all: false,
        ..query.clone()
    };
    Ok(find_required(stage, &query)?[0])
}

pub fn create(stage: &mut Stage, req: &CreateRequest) -> BridgeResult<Applied<NodeId>> {
    let parent = match &req.parent {
        Some(query) => Some(find_one(stage, query).map_err(|_| {
            BridgeError::not_found(format!("Parent '{}' not found.", query.target))
        })?),
        None => None,
    };
    let scene = stage.scenes.active_name();
    let Stage {
        graph,
        registry,
        assets,
        ..
    } = stage;
    let mut warnings = Vec::new();

    let id = if let Some(path) = &req.prefab_path {
        let template = assets
            .load(path)
            .ok_or_else(|| BridgeError::not_found(format!("Prefab '{path}' not found.")))?;
        let (id, prefab_warnings) = graph.instantiate(&template, registry, parent, scene)?;
        warnings.extend(prefab_warnings);
        if let (Some(name), Some(node)) = (&req.name, graph.node_mut(id)) {
            node.name = name.clone();
        }
        id
    } else {
        let shape = match &req.primitive {
            Some(raw) => Some(
                MESH_SHAPES
                    .iter()
                    .copied()
                    .find(|s| s.eq_ignore_ascii_case(raw.trim()))
                    .ok_or_else(|| {
                        BridgeError::malformed(format!(
                            "Invalid primitiveType '{raw}'. Valid types: {}.",
                            MESH_SHAPES.join(", ")
                        ))
                    })?,
            ),
            None => None,
        };
        let mut spec = NodeSpec::named(req.name.clone().unwrap_or_else(|| "NewObject".to_string()));
        spec.parent = parent;
        spec.scene = scene;
        let id = graph.create_node(spec)?;
        if let (Some(shape), Some(node)) = (shape, graph.node_mut(id)) {
            node.components.push(Box::new(Mesh { shape }));
            node.components.push(Box::<Renderer>::default());
        }
        id
    };

    if let Some(node) = graph.node_mut(id) {
        if let Some(position) = req.position {
            node.transform.translation = position;
        }
        if let Some(rotation) = req.rotation {
            node.transform.rotation = quat_from_euler_degrees(rotation);
        }
        if let Some(scale) = req.scale {
            node.transform.scale = scale;
        }
        if let Some(tag) = &req.tag {
            node.tag = tag.clone();
        }
        if let Some(active) = req.active {
            node.active = active;
        }
    }
    if let Some(layer) = &req.layer {
        if let Err(warning) = set_layer(graph.as_mut(), id, layer) {
            warnings.push(warning);
        }
    }

    for component in &req.components {
        match attach_component(graph.as_mut(), registry, id, &component.type_name) {
            Ok(type_name) => warnings.extend(apply_component_properties(
                graph.as_mut(),
                id,
                type_name,
                &component.properties,
            )?),
            Err(err) => {
                tracing::warn!(component = %component.type_name, error = %err, "component not added");
                warnings.push(err.to_string());
            }
        }
    }

    if let Some(color) = req.color {
        let painted = graph
            .node_mut(id)
            .and_then(|node| node.get_mut::<Renderer>())
            .map(|renderer| renderer.material.color = color)
            .is_some();
        if !painted {
            warnings.push("color ignored: node has no Renderer".to_string());
        }
    }

    Ok(Applied {
        value: id,
        warnings,
    })
}

/// Returns whether anything changed, plus per-key warnings.
pub fn modify(stage: &mut Stage, id: NodeId, req: &ModifyRequest) -> BridgeResult<Applied<bool>> {
    let new_parent = match &req.parent {
        Some(Some(query)) => Some(Some(find_one(stage, query).map_err(|_| {
            BridgeError::not_found(format!("New parent ('{}') not found.", query.target))
        })?)),
        Some(None) => Some(None),
        None => None,
    };
    let graph = stage.graph.as_mut();
    let mut changed = false;
    let mut warnings = Vec::new();

    if let Some(parent) = new_parent {
        let current = graph.node(id).and_then(|n| n.parent);
        if current != parent {
            reparent_keep_world(graph, id, parent)?;
            changed = true;
        }
    }

    let node = graph
        .node_mut(id)
        .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))?;
    if let Some(name) = req.name.as_ref().filter(|n| **n != node.name) {
        node.name = name.clone();
        changed = true;
    }
    if let Some(position) = req.position.filter(|p| *p != node.transform.translation) {
        node.transform.translation = position;
        changed = true;
    }
    if let Some(rotation) = req.rotation {
        let rotation = quat_from_euler_degrees(rotation);
        if !rotation.abs_diff_eq(node.transform.rotation, 1e-6) {
            node.transform.rotation = rotation;
            changed = true;
        }
    }
    if let Some(scale) = req.scale.filter(|s| *s != node.transform.scale) {
        node.transform.scale = scale;
        changed = true;
    }
    if let Some(tag) = req.tag.as_ref().filter(|t| **t != node.tag) {
        node.tag = tag.clone();
        changed = true;
    }
    if let Some(active) = req.active.filter(|a| *a != node.active) {
        node.active = active;
        changed = true;
    }
    if let Some(layer) = &req.layer {
        let before = graph.node(id).map(|n| n.layer);
        match set_layer(graph, id, layer) {
            Ok(()) => changed |= graph.node(id).map(|n| n.layer) != before,
            Err(warning) => warnings.push(warning),
        }
    }

    for (component, props) in &req.component_properties {
        let Some(props) = props.as_object() else {
            warnings.push(format!("properties for '{component}' must be an object"));
            continue;
        };
        let type_name = stage
            .registry
            .resolve(component)
            .map(|k| k.name)
            .unwrap_or(component.as_str());
        let graph = stage.graph.as_mut();
        if !graph.node(id).is_some_and(|n| n.has_component(type_name)) {
            warnings.push(format!("component '{component}' not found on node"));
            continue;
        }
        let failed = apply_component_properties(graph, id, type_name, props)?;
        changed |= failed.len() < props.len();
        warnings.extend(failed);
    }

    Ok(Applied {
        value: changed,
        warnings,
    })
}

pub fn delete(stage: &mut Stage, ids: &[NodeId]) -> BridgeResult<Vec<(String, NodeId)>> {
    let mut deleted = Vec::new();
    for id in ids {
        // An earlier deletion may already have taken this node with its parent.
        let Some(name) = stage.graph.node(*id).map(|n| n.name.clone()) else {
            continue;
        };
        stage.graph.destroy_node(*id)?;
        deleted.push((name, *id));
    }
    Ok(deleted)
}

pub fn components(stage: &Stage, id: NodeId) -> BridgeResult<Vec<ComponentInfo>> {
    component_infos(stage.graph.as_ref(), id)
        .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))
}

pub fn add_component(
    stage: &mut Stage,
    id: NodeId,
    request: &ComponentRequest,
) -> BridgeResult<Applied<&'static str>> {
    let Stage {
        graph, registry, ..
    } = stage;
    let type_name = attach_component(graph.as_mut(), registry, id, &request.type_name)?;
    let warnings = apply_component_properties(graph.as_mut(), id, type_name, &request.properties)?;
    Ok(Applied {
        value: type_name,
        warnings,
    })
}

pub fn remove_component(stage: &mut Stage, id: NodeId, type_name: &str) -> BridgeResult<&'static str> {
    let kind = stage
        .registry
        .resolve(type_name)
        .ok_or_else(|| BridgeError::not_found(format!("Component type '{type_name}' not found.")))?;
    if kind.structural {
        return Err(BridgeError::precondition(format!(
            "Cannot remove the '{}' component.",
            kind.name
        )));
    }
    let name = kind.name;
    let node = stage
        .graph
        .node_mut(id)
        .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))?;
    let before = node.components.len();
    node.components.retain(|c| c.type_name() != name);
    if node.components.len() == before {
        return Err(BridgeError::not_found(format!(
            "Component '{name}' not found on '{}'.",
            node.name
        )));
    }
    Ok(name)
}

pub fn set_properties(
    stage: &mut Stage,
    id: NodeId,
    type_name: &str,
    props: &Map<String, Value>,
) -> BridgeResult<Applied<&'static str>> {
    let kind = stage
        .registry
        .resolve(type_name)
        .ok_or_else(|| BridgeError::not_found(format!("Component type '{type_name}' not found.")))?;
    let name = kind.name;
    let graph = stage.graph.as_mut();
    let node = graph
        .node(id)
        .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))?;
    if !node.has_component(name) {
        return Err(BridgeError::not_found(format!(
            "Component '{name}' not found on '{}'.",
            node.name
        )));
    }
    let warnings = apply_component_properties(graph, id, name, props)?;
    Ok(Applied {
        value: name,
        warnings,
    })
}

fn set_layer(graph: &mut dyn SceneGraph, id: NodeId, layer: &LayerRef) -> Result<(), String> {
    let index = match layer {
        LayerRef::Index(index) => *index,
        LayerRef::Name(name) => graph
            .layer_index(name)
            .ok_or_else(|| format!("layer '{name}' is not defined"))?,
    };
    if let Some(node) = graph.node_mut(id) {
        node.layer = index;
    }
    Ok(())
}

fn reparent_keep_world(
    graph: &mut dyn SceneGraph,
    id: NodeId,
    parent: Option<NodeId>,
) -> BridgeResult<()> {
    let world = graph
        .world_matrix(id)
        .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))?;
    graph.set_parent(id, parent)?;
    let parent_world = parent
        .and_then(|p| graph.world_matrix(p))
        .unwrap_or(Affine3A::IDENTITY);
    if let Some(node) = graph.node_mut(id) {
        node.transform = NodeTransform::from_affine(&(parent_world.inverse() * world));
    }
    Ok(())
}

/// Transform exposed through the member interface. World-space members
/// are converted through the parent's world matrix.
struct TransformMembers {
    local: NodeTransform,
    parent_world: Affine3A,
}

impl TransformMembers {
    fn parent_rotation(&self) -> Quat {
        self.parent_world.to_scale_rotation_translation().1
    }
}

impl Members for TransformMembers {
    fn type_name(&self) -> &'static str {
        TRANSFORM
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[
            MemberSpec::rw("position", MemberKind::Vec3),
            MemberSpec::rw("localPosition", MemberKind::Vec3),
            MemberSpec::rw("rotation", MemberKind::Vec3),
            MemberSpec::rw("localRotation", MemberKind::Vec3),
            MemberSpec::rw("scale", MemberKind::Vec3),
        ];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        let value = match member {
            "position" => self.parent_world.transform_point3(self.local.translation),
            "localPosition" => self.local.translation,
            "rotation" => euler_degrees(self.parent_rotation() * self.local.rotation),
            "localRotation" => euler_degrees(self.local.rotation),
            "scale" => self.local.scale,
            _ => return None,
        };
        Some(MemberValue::Vec3(value))
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        let MemberValue::Vec3(v) = value else {
            return false;
        };
        match member {
            "position" => self.local.translation = self.parent_world.inverse().transform_point3(v),
            "localPosition" => self.local.translation = v,
            "rotation" => {
                self.local.rotation = self.parent_rotation().inverse() * quat_from_euler_degrees(v)
            }
            "localRotation" => self.local.rotation = quat_from_euler_degrees(v),
            "scale" => self.local.scale = v,
            _ => return false,
        }
        true
    }
}

pub fn apply_transform_properties<G: SceneGraph + ?Sized>(
    graph: &mut G,
    id: NodeId,
    props: &Map<String, Value>,
) -> BridgeResult<Vec<String>> {
    let node = graph
        .node(id)
        .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))?;
    let parent_world = node
        .parent
        .and_then(|p| graph.world_matrix(p))
        .unwrap_or(Affine3A::IDENTITY);
    let mut adapter = TransformMembers {
        local: node.transform,
        parent_world,
    };
    let warnings = members::apply_properties(&mut adapter, props);
    if let Some(node) = graph.node_mut(id) {
        node.transform = adapter.local;
    }
    Ok(warnings)
}
