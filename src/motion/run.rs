//! Path runs: start, stop, status, and the per-path watcher that polls
//! the solver flags on the scene-owner tick.

use std::collections::HashMap;
use std::time::Duration;

use bevy::prelude::*;
use rand::Rng;
use serde::Serialize;

use super::path::{find_path, ordered_targets, TargetOrder};
use crate::error::{BridgeError, BridgeResult};
use crate::scene::components::IkPath;
use crate::scene::NodeId;
use crate::stage::{with_stage, Stage};

pub const WATCH_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Finished,
    Stopped,
}

/// Whether the scene owner is live. Runs may only start while active and
/// not paused.
#[derive(Resource, Debug, Clone, Copy)]
pub struct OwnerStatus {
    pub active: bool,
    pub paused: bool,
}

impl Default for OwnerStatus {
    fn default() -> Self {
        Self {
            active: true,
            paused: false,
        }
    }
}

struct PathWatch {
    run_id: String,
    timer: Timer,
    armed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// Live watchers plus the last known state of every path that has run.
#[derive(Resource, Default)]
pub struct PathRuns {
    watches: HashMap<NodeId, PathWatch>,
    records: HashMap<NodeId, RunRecord>,
}

impl PathRuns {
    pub fn record(&self, path: NodeId) -> RunRecord {
        self.records.get(&path).cloned().unwrap_or_default()
    }

    pub fn is_running(&self, path: NodeId) -> bool {
        self.watches.contains_key(&path)
    }

    pub fn watching(&self) -> usize {
        self.watches.len()
    }

    /// Whether a run state is kept for `path`, live or ended.
    pub fn remembers(&self, path: NodeId) -> bool {
        self.records.contains_key(&path)
    }

    fn begin(&mut self, path: NodeId, run_id: String) {
        self.watches.insert(
            path,
            PathWatch {
                run_id: run_id.clone(),
                timer: Timer::new(WATCH_INTERVAL, TimerMode::Repeating),
                armed: false,
            },
        );
        self.records.insert(
            path,
            RunRecord {
                state: RunState::Running,
                run_id: Some(run_id),
            },
        );
    }

    fn complete(&mut self, path: NodeId, state: RunState) -> Option<String> {
        let watch = self.watches.remove(&path)?;
        self.records.insert(
            path,
            RunRecord {
                state,
                run_id: Some(watch.run_id.clone()),
            },
        );
        Some(watch.run_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartRequest {
    pub robot: String,
    pub path: String,
    pub looped: Option<bool>,
    pub order: Option<TargetOrder>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartedRun {
    pub path: NodeId,
    pub run_id: String,
    pub targets: usize,
}

/// `RUN#HHMMSS.mmm-xxxxxx`
pub fn new_run_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!(
        "RUN#{}-{suffix:06x}",
        chrono::Local::now().format("%H%M%S%.3f")
    )
}

fn owner_is_live(world: &World) -> BridgeResult<()> {
    let status = world.get_resource::<OwnerStatus>().copied().unwrap_or_default();
    if !status.active {
        return Err(BridgeError::precondition("Scene owner is not active."));
    }
    let clock_stopped = world
        .get_resource::<Time<Virtual>>()
        .is_some_and(|t| t.is_paused() || t.relative_speed() == 0.0);
    if status.paused || clock_stopped {
        return Err(BridgeError::precondition("Scene owner is paused."));
    }
    Ok(())
}

/// Starts a path and attaches its watcher. The first poll happens one
/// interval later, never in the tick that started the run.
pub fn start_path(world: &mut World, request: &StartRequest) -> BridgeResult<StartedRun> {
    owner_is_live(world)?;
    with_stage(world, |stage, world| {
        let (_, path) = find_path(stage.graph.as_ref(), &request.robot, &request.path)?;
        let mut runs = world.get_resource_or_insert_with(PathRuns::default);
        if runs.is_running(path) {
            return Err(BridgeError::precondition(format!(
                "Path '{}' is already running.",
                request.path
            )));
        }

        let order = request.order.unwrap_or(TargetOrder::Declaration);
        let robot_ik = stage
            .graph
            .node(path)
            .and_then(|n| n.get::<IkPath>())
            .and_then(|p| p.robot_ik)
            .ok_or_else(|| BridgeError::precondition("Path is not bound to a RobotIK."))?;
        let mut reachable = Vec::new();
        for target in ordered_targets(stage.graph.as_ref(), path, order) {
            if stage.solver.test_reachable(stage.graph.as_mut(), robot_ik, target)? {
                reachable.push(target);
            }
        }
        if reachable.is_empty() {
            return Err(BridgeError::precondition(format!(
                "Path '{}' has no reachable targets.",
                request.path
            )));
        }

        stage.solver.start_path(stage.graph.as_mut(), path, &reachable)?;
        if let Some(ik_path) = stage.graph.node_mut(path).and_then(|n| n.get_mut::<IkPath>()) {
            if let Some(looped) = request.looped {
                ik_path.looped = looped;
            }
            ik_path.activation = "Always";
        }

        let run_id = new_run_id();
        runs.begin(path, run_id.clone());
        tracing::info!(run = %run_id, robot = %request.robot, path = %request.path, targets = reachable.len(), "path run started");
        Ok(StartedRun {
            path,
            run_id,
            targets: reachable.len(),
        })
    })
}

pub fn stop_path(world: &mut World, robot: &str, path_name: &str) -> BridgeResult<RunRecord> {
    with_stage(world, |stage, world| {
        let (_, path) = find_path(stage.graph.as_ref(), robot, path_name)?;
        let mut runs = world.get_resource_or_insert_with(PathRuns::default);
        if !runs.is_running(path) {
            return Err(BridgeError::precondition(format!(
                "Path '{path_name}' is not running."
            )));
        }
        reset_path(stage, path);
        runs.complete(path, RunState::Stopped);
        tracing::info!(robot, path = path_name, "path run stopped");
        Ok(runs.record(path))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStatus {
    #[serde(flatten)]
    pub record: RunRecord,
    pub is_active: bool,
    pub is_finished: bool,
    pub targets: usize,
}

pub fn path_status(world: &mut World, robot: &str, path_name: &str) -> BridgeResult<PathStatus> {
    with_stage(world, |stage, world| {
        let (_, path) = find_path(stage.graph.as_ref(), robot, path_name)?;
        let record = world
            .get_resource::<PathRuns>()
            .map(|runs| runs.record(path))
            .unwrap_or_default();
        let ik_path = stage
            .graph
            .node(path)
            .and_then(|n| n.get::<IkPath>())
            .ok_or_else(|| BridgeError::not_found(format!("IKPath component not found on '{path_name}'.")))?;
        Ok(PathStatus {
            record,
            is_active: ik_path.is_active,
            is_finished: ik_path.is_finished,
            targets: ik_path.targets.len(),
        })
    })
}

/// Stop entry point plus the reset that keeps a finished path from
/// restarting on its own.
fn reset_path(stage: &mut Stage, path: NodeId) {
    stage.solver.stop_path(stage.graph.as_mut(), path);
    if let Some(ik_path) = stage.graph.node_mut(path).and_then(|n| n.get_mut::<IkPath>()) {
        ik_path.looped = false;
        ik_path.activation = "Never";
    }
}

pub fn step_solver(time: Res<Time>, status: Res<OwnerStatus>, stage: Option<ResMut<Stage>>) {
    if !status.active || status.paused {
        return;
    }
    let Some(mut stage) = stage else {
        return;
    };
    let Stage { graph, solver, .. } = &mut *stage;
    solver.step(graph.as_mut(), time.delta());
}

/// Polls every watched path. A run ends when the path reports finished,
/// reports inactive, or disappears from the graph.
pub fn monitor_path_runs(
    time: Res<Time>,
    mut runs: ResMut<PathRuns>,
    stage: Option<ResMut<Stage>>,
) {
    if runs.watches.is_empty() {
        return;
    }
    let Some(mut stage) = stage else {
        return;
    };
    let runs = &mut *runs;
    let mut ended = Vec::new();
    for (path, watch) in runs.watches.iter_mut() {
        if !watch.armed {
            watch.armed = true;
            continue;
        }
        watch.timer.tick(time.delta());
        if !watch.timer.just_finished() {
            continue;
        }
        let outcome = match stage.graph.node(*path).and_then(|n| n.get::<IkPath>()) {
            None => Some(RunState::Stopped),
            Some(ik_path) if ik_path.is_finished => Some(RunState::Finished),
            Some(ik_path) if !ik_path.is_active => Some(RunState::Stopped),
            Some(_) => None,
        };
        if let Some(state) = outcome {
            ended.push((*path, state));
        }
    }
    for (path, state) in ended {
        reset_path(&mut stage, path);
        if let Some(run_id) = runs.complete(path, state) {
            tracing::info!(run = %run_id, ?state, "path run ended");
        }
        if stage.graph.node(path).is_none() {
            runs.records.remove(&path);
        }
    }
}
