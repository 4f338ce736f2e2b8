use bevy::math::Vec3;
use serde::Serialize;
use serde_json::{Map, Value};

use super::components::TRANSFORM;
use super::members::snapshot;
use super::{euler_degrees, NodeId, NodeTransform, SceneGraph};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vec3Json {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for Vec3Json {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformInfo {
    pub position: Vec3Json,
    pub local_position: Vec3Json,
    pub rotation: Vec3Json,
    pub local_rotation: Vec3Json,
    pub scale: Vec3Json,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub name: String,
    #[serde(rename = "instanceID")]
    pub instance_id: NodeId,
    pub tag: String,
    pub layer: u32,
    pub active_self: bool,
    pub active_in_hierarchy: bool,
    pub scene: String,
    pub transform: TransformInfo,
    #[serde(rename = "parentInstanceID")]
    pub parent_instance_id: Option<NodeId>,
    pub component_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInfo {
    pub type_name: String,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub name: String,
    #[serde(rename = "instanceID")]
    pub instance_id: NodeId,
    pub active_self: bool,
    pub children: Vec<HierarchyNode>,
}

pub fn world_transform(graph: &dyn SceneGraph, id: NodeId) -> Option<NodeTransform> {
    graph
        .world_matrix(id)
        .map(|m| NodeTransform::from_affine(&m))
}

pub fn node_info(graph: &dyn SceneGraph, id: NodeId) -> Option<NodeInfo> {
    let node = graph.node(id)?;
    let world = world_transform(graph, id)?;
    Some(NodeInfo {
        name: node.name.clone(),
        instance_id: node.id,
        tag: node.tag.clone(),
        layer: node.layer,
        active_self: node.active,
        active_in_hierarchy: graph.active_in_hierarchy(id),
        scene: node.scene.clone(),
        transform: TransformInfo {
            position: world.translation.into(),
            local_position: node.transform.translation.into(),
            rotation: euler_degrees(world.rotation).into(),
            local_rotation: euler_degrees(node.transform.rotation).into(),
            scale: node.transform.scale.into(),
        },
        parent_instance_id: node.parent,
        component_names: node.component_names(),
    })
}

pub fn component_infos(graph: &dyn SceneGraph, id: NodeId) -> Option<Vec<ComponentInfo>> {
    let node = graph.node(id)?;
    let info = node_info(graph, id)?;
    let transform = serde_json::to_value(&info.transform)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    let mut out = vec![ComponentInfo {
        type_name: TRANSFORM.to_string(),
        properties: transform,
    }];
    out.extend(node.components.iter().map(|component| ComponentInfo {
        type_name: component.type_name().to_string(),
        properties: snapshot(component.as_ref()),
    }));
    Some(out)
}

pub fn hierarchy(graph: &dyn SceneGraph, id: NodeId) -> Option<HierarchyNode> {
    let node = graph.node(id)?;
    Some(HierarchyNode {
        name: node.name.clone(),
        instance_id: node.id,
        active_self: node.active,
        children: graph
            .children(id)
            .into_iter()
            .filter_map(|child| hierarchy(graph, child))
            .collect(),
    })
}
