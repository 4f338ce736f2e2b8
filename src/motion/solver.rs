use std::collections::HashMap;
use std::time::Duration;

use bevy::math::Vec3;
use serde_json::{json, Value};

use crate::error::{BridgeError, BridgeResult};
use crate::scene::components::{IkPath, IkTarget, RobotIk};
use crate::scene::{NodeId, SceneGraph};

/// Seconds spent on each target at `speedOverride == 1`.
pub const DEFAULT_DWELL_SECS: f32 = 0.25;

const REACH_EPSILON: f32 = 1e-4;

/// The motion solver behind robots and paths. Implementations own any
/// run bookkeeping; the scene graph only carries the observable flags.
pub trait Solver: Send + Sync {
    /// Tests one target against a robot and records the result on the
    /// target's `IKTarget`.
    fn test_reachable(
        &mut self,
        graph: &mut dyn SceneGraph,
        robot_ik: NodeId,
        target: NodeId,
    ) -> BridgeResult<bool>;

    /// Moves the robot onto a target.
    fn solve(&mut self, graph: &mut dyn SceneGraph, target: NodeId) -> BridgeResult<()>;

    fn start_path(
        &mut self,
        graph: &mut dyn SceneGraph,
        path: NodeId,
        targets: &[NodeId],
    ) -> BridgeResult<()>;

    fn stop_path(&mut self, graph: &mut dyn SceneGraph, path: NodeId);

    /// Advances running paths by one scene-owner tick.
    fn step(&mut self, _graph: &mut dyn SceneGraph, _dt: Duration) {}

    fn recalculate(&mut self, graph: &mut dyn SceneGraph, robot_ik: NodeId) -> BridgeResult<Value>;
}

struct SolverRun {
    targets: Vec<NodeId>,
    index: usize,
    elapsed: f32,
}

/// Treats a robot as a sphere of radius `reach` around its solver node
/// and walks paths one target per dwell interval.
pub struct RadialSolver {
    default_reach: f32,
    runs: HashMap<NodeId, SolverRun>,
}

impl RadialSolver {
    pub fn new(default_reach: f32) -> Self {
        Self {
            default_reach,
            runs: HashMap::new(),
        }
    }

    pub fn reach(&self, graph: &dyn SceneGraph, robot_ik: NodeId) -> f32 {
        graph
            .node(robot_ik)
            .and_then(|n| n.get::<RobotIk>())
            .map(|ik| ik.reach)
            .filter(|reach| *reach > 0.0)
            .unwrap_or(self.default_reach)
    }

    pub fn is_running(&self, path: NodeId) -> bool {
        self.runs.contains_key(&path)
    }

    fn world_position(graph: &dyn SceneGraph, id: NodeId) -> BridgeResult<Vec3> {
        graph
            .world_matrix(id)
            .map(|m| Vec3::from(m.translation))
            .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))
    }
}

impl Default for RadialSolver {
    fn default() -> Self {
        Self::new(1.5)
    }
}

impl Solver for RadialSolver {
    fn test_reachable(
        &mut self,
        graph: &mut dyn SceneGraph,
        robot_ik: NodeId,
        target: NodeId,
    ) -> BridgeResult<bool> {
        if !graph.node(robot_ik).is_some_and(|n| n.get::<RobotIk>().is_some()) {
            return Err(BridgeError::precondition(format!(
                "Node {robot_ik} has no RobotIK component."
            )));
        }
        let origin = Self::world_position(graph, robot_ik)?;
        let point = Self::world_position(graph, target)?;
        let reachable = origin.distance(point) <= self.reach(graph, robot_ik) + REACH_EPSILON;
        if let Some(ik) = graph.node_mut(target).and_then(|n| n.get_mut::<IkTarget>()) {
            ik.reachable = reachable;
        }
        tracing::debug!(%robot_ik, %target, reachable, "reachability tested");
        Ok(reachable)
    }

    fn solve(&mut self, graph: &mut dyn SceneGraph, target: NodeId) -> BridgeResult<()> {
        let robot_ik = graph
            .node(target)
            .and_then(|n| n.get::<IkTarget>())
            .and_then(|t| t.robot_ik)
            .ok_or_else(|| {
                BridgeError::precondition(format!("Target {target} is not bound to a robot."))
            })?;
        if !self.test_reachable(graph, robot_ik, target)? {
            return Err(BridgeError::precondition(format!(
                "Target {target} is out of reach."
            )));
        }
        Ok(())
    }

    fn start_path(
        &mut self,
        graph: &mut dyn SceneGraph,
        path: NodeId,
        targets: &[NodeId],
    ) -> BridgeResult<()> {
        if targets.is_empty() {
            return Err(BridgeError::precondition("Path has no targets to run."));
        }
        let ik_path = graph
            .node_mut(path)
            .and_then(|n| n.get_mut::<IkPath>())
            .ok_or_else(|| BridgeError::not_found(format!("Node {path} has no IKPath.")))?;
        ik_path.is_active = true;
        ik_path.is_finished = false;
        self.runs.insert(
            path,
            SolverRun {
                targets: targets.to_vec(),
                index: 0,
                elapsed: 0.0,
            },
        );
        if let Err(err) = self.solve(graph, targets[0]) {
            self.stop_path(graph, path);
            return Err(err);
        }
        Ok(())
    }

    fn stop_path(&mut self, graph: &mut dyn SceneGraph, path: NodeId) {
        self.runs.remove(&path);
        if let Some(ik_path) = graph.node_mut(path).and_then(|n| n.get_mut::<IkPath>()) {
            ik_path.is_active = false;
        }
    }

    fn step(&mut self, graph: &mut dyn SceneGraph, dt: Duration) {
        let dt = dt.as_secs_f32();
        let mut ended = Vec::new();
        let mut arrived = Vec::new();
        for (path, run) in self.runs.iter_mut() {
            let Some(ik_path) = graph.node(*path).and_then(|n| n.get::<IkPath>()) else {
                ended.push(*path);
                continue;
            };
            let (looped, speed) = (ik_path.looped, ik_path.speed_override);
            let current = run.targets[run.index];
            let holding = graph
                .node(current)
                .and_then(|n| n.get::<IkTarget>())
                .is_some_and(|t| t.wait_for_signal);
            if holding {
                continue;
            }
            run.elapsed += dt;
            let dwell = DEFAULT_DWELL_SECS / speed.max(0.01);
            if run.elapsed < dwell {
                continue;
            }
            run.elapsed = 0.0;
            run.index += 1;
            if run.index >= run.targets.len() {
                if looped {
                    run.index = 0;
                } else {
                    if let Some(ik_path) = graph.node_mut(*path).and_then(|n| n.get_mut::<IkPath>())
                    {
                        ik_path.is_finished = true;
                        ik_path.is_active = false;
                    }
                    ended.push(*path);
                    continue;
                }
            }
            arrived.push(run.targets[run.index]);
        }
        for path in ended {
            self.runs.remove(&path);
        }
        for target in arrived {
            if let Err(err) = self.solve(graph, target) {
                tracing::warn!(%target, error = %err, "target skipped");
            }
        }
    }

    fn recalculate(&mut self, graph: &mut dyn SceneGraph, robot_ik: NodeId) -> BridgeResult<Value> {
        let node = graph
            .node(robot_ik)
            .ok_or_else(|| BridgeError::not_found(format!("Node {robot_ik} not found.")))?;
        let ik = node.get::<RobotIk>().ok_or_else(|| {
            BridgeError::precondition(format!("'{}' has no RobotIK component.", node.name))
        })?;
        if ik.axes.is_empty() {
            return Err(BridgeError::precondition(format!(
                "RobotIK on '{}' has no axes configured.",
                node.name
            )));
        }
        Ok(json!({
            "robot": node.name,
            "axes": ik.axes,
            "reach": self.reach(graph, robot_ik),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::memory::MemoryScene;
    use crate::scene::{NodeSpec, NodeTransform};

    fn rig(reach: f32) -> (MemoryScene, NodeId, NodeId) {
        let mut scene = MemoryScene::default();
        let robot = scene.create_node(NodeSpec::named("Robot01")).unwrap();
        scene.node_mut(robot).unwrap().components.push(Box::new(RobotIk {
            axes: vec!["A1".to_string()],
            reach,
        }));
        let path = scene.create_node(NodeSpec::named("Path").under(robot)).unwrap();
        scene
            .node_mut(path)
            .unwrap()
            .components
            .push(Box::new(IkPath {
                robot_ik: Some(robot),
                ..Default::default()
            }));
        (scene, robot, path)
    }

    fn target_at(scene: &mut MemoryScene, path: NodeId, robot: NodeId, x: f32) -> NodeId {
        let mut spec = NodeSpec::named(format!("T{x}")).under(path);
        spec.transform = NodeTransform::from_translation(Vec3::new(x, 0.0, 0.0));
        let id = scene.create_node(spec).unwrap();
        scene.node_mut(id).unwrap().components.push(Box::new(IkTarget {
            robot_ik: Some(robot),
            ..Default::default()
        }));
        id
    }

    #[test]
    fn reachability_is_a_radius_check_recorded_on_the_target() {
        let (mut scene, robot, path) = rig(1.0);
        let near = target_at(&mut scene, path, robot, 0.5);
        let far = target_at(&mut scene, path, robot, 10.0);
        let mut solver = RadialSolver::default();
        assert!(solver.test_reachable(&mut scene, robot, near).unwrap());
        assert!(!solver.test_reachable(&mut scene, robot, far).unwrap());
        assert!(!scene.node(far).unwrap().get::<IkTarget>().unwrap().reachable);
    }

    #[test]
    fn run_walks_targets_then_finishes() {
        let (mut scene, robot, path) = rig(0.0);
        let a = target_at(&mut scene, path, robot, 0.2);
        let b = target_at(&mut scene, path, robot, 0.4);
        let mut solver = RadialSolver::default();
        solver.start_path(&mut scene, path, &[a, b]).unwrap();
        assert!(scene.node(path).unwrap().get::<IkPath>().unwrap().is_active);

        for _ in 0..2 {
            solver.step(&mut scene, Duration::from_millis(300));
        }
        let ik_path = scene.node(path).unwrap().get::<IkPath>().unwrap();
        assert!(ik_path.is_finished);
        assert!(!ik_path.is_active);
        assert!(!solver.is_running(path));
    }

    #[test]
    fn wait_for_signal_holds_the_run() {
        let (mut scene, robot, path) = rig(0.0);
        let a = target_at(&mut scene, path, robot, 0.2);
        scene
            .node_mut(a)
            .unwrap()
            .get_mut::<IkTarget>()
            .unwrap()
            .wait_for_signal = true;
        let mut solver = RadialSolver::default();
        solver.start_path(&mut scene, path, &[a]).unwrap();
        solver.step(&mut scene, Duration::from_secs(5));
        assert!(solver.is_running(path));
        solver.stop_path(&mut scene, path);
        assert!(!scene.node(path).unwrap().get::<IkPath>().unwrap().is_active);
    }

    #[test]
    fn recalculate_needs_axes() {
        let (mut scene, robot, _) = rig(0.0);
        let mut solver = RadialSolver::new(2.0);
        let params = solver.recalculate(&mut scene, robot).unwrap();
        assert_eq!(params["reach"], json!(2.0));
        scene
            .node_mut(robot)
            .unwrap()
            .get_mut::<RobotIk>()
            .unwrap()
            .axes
            .clear();
        assert!(matches!(
            solver.recalculate(&mut scene, robot),
            Err(BridgeError::PreconditionFailed(_))
        ));
    }
}
