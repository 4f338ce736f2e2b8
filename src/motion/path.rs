//! Path and target authoring under a robot subtree.

use std::cmp::Ordering;
use std::str::FromStr;

use bevy::math::{Affine3A, Vec3};

use crate::error::{BridgeError, BridgeResult};
use crate::scene::components::{IkPath, IkTarget, MotionMode, RobotIk};
use crate::scene::{quat_from_euler_degrees, Node, NodeId, NodeSpec, NodeTransform, SceneGraph};
use crate::stage::Stage;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathOptions {
    pub looped: Option<bool>,
    pub speed_override: Option<f32>,
    pub draw_path: Option<bool>,
}

/// Frame in which a target pose is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TargetSpace {
    World,
    Robot,
    #[default]
    Path,
}

impl FromStr for TargetSpace {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "world" => Ok(TargetSpace::World),
            "robot" => Ok(TargetSpace::Robot),
            "local" | "path" => Ok(TargetSpace::Path),
            _ => Err(BridgeError::unknown("space", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TargetOrder {
    Declaration,
    #[default]
    ByName,
    Hierarchy,
}

impl FromStr for TargetOrder {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "declaration" => Ok(TargetOrder::Declaration),
            "by_name" | "name" => Ok(TargetOrder::ByName),
            "by_hierarchy" | "hierarchy" => Ok(TargetOrder::Hierarchy),
            _ => Err(BridgeError::unknown("order", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetRequest {
    pub name: Option<String>,
    pub space: TargetSpace,
    pub position: Vec3,
    /// Euler degrees.
    pub rotation: Vec3,
    pub mode: MotionMode,
    pub axis_correction: Vec<f32>,
    pub turn_correction: bool,
    pub wait_for_signal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddedTarget {
    pub name: String,
    /// `None` when the target was unreachable and discarded.
    pub id: Option<NodeId>,
    pub reachable: bool,
}

/// First node anywhere in the graph with exactly this name.
pub fn find_robot(graph: &dyn SceneGraph, name: &str) -> BridgeResult<NodeId> {
    let name = name.trim();
    graph
        .find_nodes(&|node: &Node| node.name == name)
        .into_iter()
        .next()
        .ok_or_else(|| BridgeError::not_found(format!("Robot '{name}' not found.")))
}

/// The robot's solver node: the first `RobotIK` in its subtree. A solver
/// without axes cannot drive anything and is rejected.
pub fn robot_solver(graph: &dyn SceneGraph, robot: NodeId) -> BridgeResult<NodeId> {
    let robot_name = graph.node(robot).map(|n| n.name.clone()).unwrap_or_default();
    let solver = graph
        .subtree(robot)
        .into_iter()
        .find(|id| graph.node(*id).is_some_and(|n| n.get::<RobotIk>().is_some()))
        .ok_or_else(|| {
            BridgeError::precondition(format!("RobotIK component not found under '{robot_name}'."))
        })?;
    let axes_empty = graph
        .node(solver)
        .and_then(|n| n.get::<RobotIk>())
        .is_some_and(|ik| ik.axes.is_empty());
    if axes_empty {
        return Err(BridgeError::precondition(format!(
            "RobotIK on '{robot_name}' has no axes configured."
        )));
    }
    Ok(solver)
}

/// Resolves `robot/path` to the path node, which must carry `IKPath`.
pub fn find_path(graph: &dyn SceneGraph, robot: &str, path: &str) -> BridgeResult<(NodeId, NodeId)> {
    let robot_id = find_robot(graph, robot)?;
    let path = path.trim();
    let path_id = graph
        .subtree(robot_id)
        .into_iter()
        .skip(1)
        .find(|id| graph.node(*id).is_some_and(|n| n.name == path))
        .ok_or_else(|| {
            BridgeError::not_found(format!("Path '{path}' not found under robot '{robot}'."))
        })?;
    if !graph.node(path_id).is_some_and(|n| n.get::<IkPath>().is_some()) {
        return Err(BridgeError::not_found(format!(
            "IKPath component not found on '{path}'."
        )));
    }
    Ok((robot_id, path_id))
}

/// Creates the path under the robot, or reuses a direct child with the
/// same name, and binds it to the robot's solver.
pub fn create_path(
    stage: &mut Stage,
    robot: &str,
    path: &str,
    options: &PathOptions,
) -> BridgeResult<NodeId> {
    let path = path.trim();
    if path.is_empty() {
        return Err(BridgeError::missing("path"));
    }
    let graph = stage.graph.as_mut();
    let robot_id = find_robot(graph, robot)?;
    let solver = robot_solver(graph, robot_id)?;

    let existing = graph
        .children(robot_id)
        .into_iter()
        .find(|id| graph.node(*id).is_some_and(|n| n.name == path));
    let path_id = match existing {
        Some(id) => id,
        None => graph.create_node(NodeSpec::named(path).under(robot_id))?,
    };
    let node = graph
        .node_mut(path_id)
        .ok_or_else(|| BridgeError::collaborator("Path node vanished after creation."))?;
    if node.get::<IkPath>().is_none() {
        node.components.push(Box::<IkPath>::default());
    }
    if let Some(ik_path) = node.get_mut::<IkPath>() {
        ik_path.robot_ik = Some(solver);
        if let Some(looped) = options.looped {
            ik_path.looped = looped;
        }
        if let Some(speed) = options.speed_override {
            ik_path.speed_override = speed;
        }
        if let Some(draw) = options.draw_path {
            ik_path.draw_path = draw;
        }
    }
    tracing::info!(robot, path, reused = existing.is_some(), "path ready");
    Ok(path_id)
}

/// Appends `_1`, `_2`, ... until no direct child of `parent` has the name.
pub fn unique_child_name(graph: &dyn SceneGraph, parent: NodeId, base: &str) -> String {
    let taken: Vec<String> = graph
        .children(parent)
        .into_iter()
        .filter_map(|id| graph.node(id).map(|n| n.name.clone()))
        .collect();
    let mut candidate = base.to_string();
    let mut suffix = 0;
    while taken.contains(&candidate) {
        suffix += 1;
        candidate = format!("{base}_{suffix}");
    }
    candidate
}

fn local_pose(
    graph: &dyn SceneGraph,
    space: TargetSpace,
    robot: NodeId,
    path: NodeId,
    pose: Affine3A,
) -> NodeTransform {
    let world = match space {
        TargetSpace::Path => return NodeTransform::from_affine(&pose),
        TargetSpace::World => pose,
        TargetSpace::Robot => graph.world_matrix(robot).unwrap_or(Affine3A::IDENTITY) * pose,
    };
    let path_world = graph.world_matrix(path).unwrap_or(Affine3A::IDENTITY);
    NodeTransform::from_affine(&(path_world.inverse() * world))
}

/// Adds a target to a path. Unreachable targets are created, tested and
/// destroyed again, so a path only ever holds reachable targets.
pub fn add_target(
    stage: &mut Stage,
    robot: &str,
    path: &str,
    request: &TargetRequest,
) -> BridgeResult<AddedTarget> {
    let graph = stage.graph.as_mut();
    let (robot_id, path_id) = find_path(graph, robot, path)?;
    let robot_ik = match graph
        .node(path_id)
        .and_then(|n| n.get::<IkPath>())
        .and_then(|p| p.robot_ik)
        .filter(|id| graph.contains(*id))
    {
        Some(id) => id,
        None => robot_solver(graph, robot_id)?,
    };

    let base: String = request
        .name
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .collect();
    let base = if base.is_empty() {
        format!("Target{}", graph.children(path_id).len())
    } else {
        base
    };
    let name = unique_child_name(graph, path_id, &base);

    let pose = Affine3A::from_rotation_translation(
        quat_from_euler_degrees(request.rotation),
        request.position,
    );
    let mut spec = NodeSpec::named(name.clone()).under(path_id);
    spec.transform = local_pose(graph, request.space, robot_id, path_id, pose);
    let id = graph.create_node(spec)?;
    if let Some(node) = graph.node_mut(id) {
        node.components.push(Box::new(IkTarget {
            robot_ik: Some(robot_ik),
            mode: request.mode,
            axis_correction: request.axis_correction.clone(),
            turn_correction: request.turn_correction,
            wait_for_signal: request.wait_for_signal,
            reachable: false,
        }));
    }

    let reachable = match stage.solver.test_reachable(stage.graph.as_mut(), robot_ik, id) {
        Ok(reachable) => reachable,
        Err(err) => {
            stage.graph.destroy_node(id)?;
            return Err(err);
        }
    };
    if !reachable {
        stage.graph.destroy_node(id)?;
        tracing::info!(robot, path, target = %name, "unreachable target discarded");
        return Ok(AddedTarget {
            name,
            id: None,
            reachable: false,
        });
    }
    if let Some(ik_path) = stage
        .graph
        .node_mut(path_id)
        .and_then(|n| n.get_mut::<IkPath>())
    {
        ik_path.targets.push(id);
    }
    Ok(AddedTarget {
        name,
        id: Some(id),
        reachable: true,
    })
}

/// Numeric-aware ordering: digit runs compare by value, so `T2 < T10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let start_a = i;
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            let start_b = j;
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            let va = digits_value(&a[start_a..i]);
            let vb = digits_value(&b[start_b..j]);
            match va.cmp(&vb) {
                Ordering::Equal => {}
                other => return other,
            }
        } else {
            match a[i].cmp(&b[j]) {
                Ordering::Equal => {}
                other => return other,
            }
            i += 1;
            j += 1;
        }
    }
    (a.len() - i).cmp(&(b.len() - j))
}

fn digits_value(digits: &[u8]) -> u64 {
    digits.iter().fold(0u64, |acc, d| {
        acc.saturating_mul(10).saturating_add(u64::from(d - b'0'))
    })
}

/// Targets of a path in the requested order. `Declaration` is the path's
/// own target list; the other orders collect every `IKTarget` in the
/// path's subtree.
pub fn ordered_targets(graph: &dyn SceneGraph, path: NodeId, order: TargetOrder) -> Vec<NodeId> {
    let is_target = |id: &NodeId| graph.node(*id).is_some_and(|n| n.get::<IkTarget>().is_some());
    match order {
        TargetOrder::Declaration => graph
            .node(path)
            .and_then(|n| n.get::<IkPath>())
            .map(|p| p.targets.iter().copied().filter(is_target).collect())
            .unwrap_or_default(),
        TargetOrder::Hierarchy => graph.subtree(path).into_iter().filter(is_target).collect(),
        TargetOrder::ByName => {
            let mut targets: Vec<NodeId> = graph.subtree(path).into_iter().filter(is_target).collect();
            // Stable sort keeps hierarchy order among equal names.
            targets.sort_by(|a, b| {
                let name = |id: &NodeId| graph.node(*id).map(|n| n.name.as_str()).unwrap_or("");
                natural_cmp(name(a), name(b))
            });
            targets
        }
    }
}

/// Rewrites the path's target list from its subtree.
pub fn connect_targets(
    stage: &mut Stage,
    robot: &str,
    path: &str,
    order: TargetOrder,
) -> BridgeResult<Vec<NodeId>> {
    let graph = stage.graph.as_mut();
    let (robot_id, path_id) = find_path(graph, robot, path)?;
    robot_solver(graph, robot_id)?;
    let targets = ordered_targets(graph, path_id, order);
    if targets.is_empty() {
        return Err(BridgeError::not_found(format!(
            "No IKTarget found under '{robot}/{path}'."
        )));
    }
    if let Some(ik_path) = graph.node_mut(path_id).and_then(|n| n.get_mut::<IkPath>()) {
        ik_path.targets = targets.clone();
    }
    tracing::info!(robot, path, count = targets.len(), ?order, "targets connected");
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ops::{self, CreateRequest};

    fn robot_stage(reach: f32) -> Stage {
        let mut stage = Stage::in_memory_default();
        let robot = ops::create(
            &mut stage,
            &CreateRequest {
                name: Some("Robot01".to_string()),
                ..Default::default()
            },
        )
        .unwrap()
        .value;
        stage
            .graph
            .node_mut(robot)
            .unwrap()
            .components
            .push(Box::new(RobotIk {
                axes: vec!["A1".to_string(), "A2".to_string()],
                reach,
            }));
        stage
    }

    fn child_names(stage: &Stage, parent: NodeId) -> Vec<String> {
        stage
            .graph
            .children(parent)
            .into_iter()
            .map(|id| stage.graph.node(id).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn create_path_reuses_existing_child() {
        let mut stage = robot_stage(1.0);
        let opts = PathOptions {
            looped: Some(true),
            ..Default::default()
        };
        let first = create_path(&mut stage, "Robot01", "Weld", &opts).unwrap();
        let second = create_path(&mut stage, "Robot01", "Weld", &PathOptions::default()).unwrap();
        assert_eq!(first, second);
        let ik_path = stage.graph.node(first).unwrap().get::<IkPath>().unwrap();
        assert!(ik_path.looped);
        assert!(ik_path.robot_ik.is_some());
    }

    #[test]
    fn create_path_requires_configured_solver() {
        let mut stage = robot_stage(1.0);
        let robot = find_robot(stage.graph.as_ref(), "Robot01").unwrap();
        stage
            .graph
            .node_mut(robot)
            .unwrap()
            .get_mut::<RobotIk>()
            .unwrap()
            .axes
            .clear();
        assert!(matches!(
            create_path(&mut stage, "Robot01", "Weld", &PathOptions::default()),
            Err(BridgeError::PreconditionFailed(_))
        ));
        assert!(matches!(
            create_path(&mut stage, "Robot02", "Weld", &PathOptions::default()),
            Err(BridgeError::EntityNotFound(_))
        ));
    }

    #[test]
    fn unreachable_target_is_never_kept() {
        let mut stage = robot_stage(1.0);
        let path = create_path(&mut stage, "Robot01", "Weld", &PathOptions::default()).unwrap();
        let added = add_target(
            &mut stage,
            "Robot01",
            "Weld",
            &TargetRequest {
                position: Vec3::new(10.0, 0.0, 0.0),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!added.reachable);
        assert_eq!(added.id, None);
        assert!(stage.graph.children(path).is_empty());
        assert!(stage.graph.node(path).unwrap().get::<IkPath>().unwrap().targets.is_empty());
    }

    #[test]
    fn target_names_are_unique_and_whitespace_free() {
        let mut stage = robot_stage(5.0);
        let path = create_path(&mut stage, "Robot01", "Weld", &PathOptions::default()).unwrap();
        let request = TargetRequest {
            name: Some("Pick Up".to_string()),
            position: Vec3::new(0.5, 0.0, 0.0),
            ..Default::default()
        };
        for _ in 0..3 {
            assert!(add_target(&mut stage, "Robot01", "Weld", &request).unwrap().reachable);
        }
        let unnamed = add_target(&mut stage, "Robot01", "Weld", &TargetRequest::default()).unwrap();
        assert_eq!(unnamed.name, "Target3");
        assert_eq!(
            child_names(&stage, path),
            vec!["PickUp", "PickUp_1", "PickUp_2", "Target3"]
        );
    }

    #[test]
    fn world_space_pose_is_expressed_relative_to_the_path() {
        let mut stage = robot_stage(5.0);
        let robot = find_robot(stage.graph.as_ref(), "Robot01").unwrap();
        stage.graph.node_mut(robot).unwrap().transform =
            NodeTransform::from_translation(Vec3::new(2.0, 0.0, 0.0));
        create_path(&mut stage, "Robot01", "Weld", &PathOptions::default()).unwrap();
        let added = add_target(
            &mut stage,
            "Robot01",
            "Weld",
            &TargetRequest {
                space: TargetSpace::World,
                position: Vec3::new(3.0, 0.0, 0.0),
                ..Default::default()
            },
        )
        .unwrap();
        let node = stage.graph.node(added.id.unwrap()).unwrap();
        assert!((node.transform.translation - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn natural_order_compares_digit_runs_by_value() {
        let mut names = vec!["T10", "T2", "T1", "Home", "T2b"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["Home", "T1", "T2", "T2b", "T10"]);
        assert_eq!(natural_cmp("A", "A"), Ordering::Equal);
    }

    #[test]
    fn connect_orders_by_name_and_hierarchy() {
        let mut stage = robot_stage(5.0);
        let path = create_path(&mut stage, "Robot01", "Weld", &PathOptions::default()).unwrap();
        for name in ["T10", "T2", "T1"] {
            add_target(
                &mut stage,
                "Robot01",
                "Weld",
                &TargetRequest {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        let names = |stage: &Stage, ids: &[NodeId]| -> Vec<String> {
            ids.iter()
                .map(|id| stage.graph.node(*id).unwrap().name.clone())
                .collect()
        };
        let by_name = connect_targets(&mut stage, "Robot01", "Weld", TargetOrder::ByName).unwrap();
        assert_eq!(names(&stage, &by_name), vec!["T1", "T2", "T10"]);
        let by_tree = connect_targets(&mut stage, "Robot01", "Weld", TargetOrder::Hierarchy).unwrap();
        assert_eq!(names(&stage, &by_tree), vec!["T10", "T2", "T1"]);
        assert_eq!(
            stage.graph.node(path).unwrap().get::<IkPath>().unwrap().targets,
            by_tree
        );

        create_path(&mut stage, "Robot01", "Empty", &PathOptions::default()).unwrap();
        assert!(matches!(
            connect_targets(&mut stage, "Robot01", "Empty", TargetOrder::ByName),
            Err(BridgeError::EntityNotFound(_))
        ));
    }
}
