pub mod path;
pub mod run;
pub mod solver;

use crate::error::{BridgeError, BridgeResult};
use crate::scene::components::MotionController;
use crate::scene::{Node, NodeId, NodeSpec};
use crate::stage::Stage;

pub const ENVIRONMENT_NODE: &str = "MotionEnvironment";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvSource {
    Exists,
    Created,
}

impl EnvSource {
    pub fn label(&self) -> &'static str {
        match self {
            EnvSource::Exists => "Exists",
            EnvSource::Created => "Created",
        }
    }
}

/// Finds the node carrying `MotionController`, creating one at the root
/// of the active scene when there is none.
pub fn ensure_environment(stage: &mut Stage) -> BridgeResult<(NodeId, EnvSource)> {
    let existing = stage
        .graph
        .find_nodes(&|node: &Node| node.get::<MotionController>().is_some())
        .into_iter()
        .next();
    if let Some(id) = existing {
        return Ok((id, EnvSource::Exists));
    }
    let mut spec = NodeSpec::named(ENVIRONMENT_NODE);
    spec.scene = stage.scenes.active_name();
    let id = stage.graph.create_node(spec)?;
    if let Some(node) = stage.graph.node_mut(id) {
        node.components.push(Box::<MotionController>::default());
    }
    tracing::info!(%id, "motion environment created");
    Ok((id, EnvSource::Created))
}

/// Instantiates a robot prefab at the scene root under the given name.
pub fn spawn_robot(
    stage: &mut Stage,
    prefab_path: &str,
    name: &str,
) -> BridgeResult<(NodeId, Vec<String>)> {
    let template = stage
        .assets
        .load(prefab_path)
        .ok_or_else(|| BridgeError::not_found(format!("Prefab '{prefab_path}' not found.")))?;
    let scene = stage.scenes.active_name();
    let (id, warnings) = stage
        .graph
        .instantiate(&template, &stage.registry, None, scene)?;
    if let Some(node) = stage.graph.node_mut(id) {
        node.name = name.to_string();
    }
    tracing::info!(%id, prefab = prefab_path, name, "robot spawned");
    Ok((id, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::components::RobotIk;

    #[test]
    fn environment_is_created_once() {
        let mut stage = Stage::in_memory_default();
        let (first, source) = ensure_environment(&mut stage).unwrap();
        assert_eq!(source, EnvSource::Created);
        let (second, source) = ensure_environment(&mut stage).unwrap();
        assert_eq!(source, EnvSource::Exists);
        assert_eq!(first, second);
    }

    #[test]
    fn spawned_robot_is_renamed_and_drivable() {
        let mut stage = Stage::in_memory_default();
        let (id, warnings) =
            spawn_robot(&mut stage, "Prefabs/Robots/Robot01.prefab", "Welder").unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
        let node = stage.graph.node(id).unwrap();
        assert_eq!(node.name, "Welder");
        assert_eq!(node.get::<RobotIk>().unwrap().axes.len(), 6);
        assert_eq!(stage.graph.children(id).len(), 1);
        assert!(matches!(
            spawn_robot(&mut stage, "Prefabs/None.prefab", "X"),
            Err(BridgeError::EntityNotFound(_))
        ));
    }
}
