use serde_json::{json, Value};

use super::dispatcher::SceneDispatcher;
use super::params::Params;
use super::response::Reply;
use super::router::{ActionCtx, Domain};
use crate::error::{BridgeError, BridgeResult};
use crate::motion::path::{self, PathOptions, TargetOrder, TargetRequest, TargetSpace};
use crate::motion::run::{self, StartRequest};
use crate::scene::components::MotionMode;
use crate::scene::info::{node_info, NodeInfo};
use crate::scene::{NodeId, SceneGraph};
use crate::stage::with_stage;

pub(super) fn domain() -> Domain {
    Domain::new("path", &["manage_path"])
        .action("make_path", make_path)
        .action("make_target", make_target)
        .action("connect_targets", connect_targets)
        .action("start_path", start_path)
        .action("stop_path", stop_path)
        .action("path_status", path_status)
}

fn robot_and_path(params: &Params, path_key: &str) -> BridgeResult<(String, String)> {
    Ok((params.require_str("robot")?, params.require_str(path_key)?))
}

fn info(graph: &dyn SceneGraph, id: NodeId) -> BridgeResult<NodeInfo> {
    node_info(graph, id).ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))
}

fn order(params: &Params, default: TargetOrder) -> BridgeResult<TargetOrder> {
    match params.str("order").filter(|o| !o.is_empty()) {
        Some(order) => order.parse(),
        None => Ok(default),
    }
}

pub(super) fn path_options(params: &Params) -> BridgeResult<PathOptions> {
    Ok(PathOptions {
        looped: params.bool("loop")?,
        speed_override: params.f32("speedOverride")?,
        draw_path: params.bool("drawPath")?,
    })
}

/// Target fields; the pose keys differ between the `path` and `ik`
/// vocabularies.
pub(super) fn target_request(
    params: &Params,
    position_key: &str,
    rotation_key: &str,
) -> BridgeResult<TargetRequest> {
    let space = match params.str("space").filter(|s| !s.is_empty()) {
        Some(space) => space.parse()?,
        None => TargetSpace::default(),
    };
    let mode = match params.str("mode").filter(|m| !m.is_empty()) {
        Some(mode) => MotionMode::parse(&mode).ok_or_else(|| BridgeError::unknown("mode", mode))?,
        None => MotionMode::default(),
    };
    Ok(TargetRequest {
        name: params.str("name"),
        space,
        position: params.vec3(position_key)?.unwrap_or_default(),
        rotation: params.vec3(rotation_key)?.unwrap_or_default(),
        mode,
        axis_correction: params.floats("axisCorrection")?,
        turn_correction: params.bool_or("turnCorrection", false)?,
        wait_for_signal: params.bool_or("waitForSignal", false)?,
    })
}

pub(super) async fn create_path(
    dispatcher: &SceneDispatcher,
    robot: String,
    path_name: String,
    options: PathOptions,
) -> BridgeResult<Reply> {
    let node = dispatcher
        .stage(move |stage| {
            let id = path::create_path(stage, &robot, &path_name, &options)?;
            info(stage.graph.as_ref(), id)
        })
        .await?;
    Ok(Reply::new(format!("Path '{}' ready.", node.name)).with_data(node))
}

pub(super) async fn add_target(
    dispatcher: &SceneDispatcher,
    robot: String,
    path_name: String,
    request: TargetRequest,
) -> BridgeResult<Reply> {
    let (added, node) = dispatcher
        .stage(move |stage| {
            let added = path::add_target(stage, &robot, &path_name, &request)?;
            let node = match added.id {
                Some(id) => Some(info(stage.graph.as_ref(), id)?),
                None => None,
            };
            Ok((added, node))
        })
        .await?;
    match node {
        Some(node) => Ok(Reply::new(format!("Target '{}' added.", added.name)).with_data(json!({
            "name": added.name,
            "reachable": true,
            "target": node,
        }))),
        None => Ok(
            Reply::new(format!("Target '{}' is not reachable and was discarded.", added.name))
                .with_data(json!({ "name": added.name, "reachable": false })),
        ),
    }
}

pub(super) async fn run_path(
    dispatcher: &SceneDispatcher,
    request: StartRequest,
) -> BridgeResult<Reply> {
    let (node, started) = dispatcher
        .submit(move |world| {
            let started = run::start_path(world, &request)?;
            let node = with_stage(world, |stage, _| info(stage.graph.as_ref(), started.path))?;
            Ok((node, started))
        })
        .await?;
    let mut data = serde_json::to_value(&node)?;
    if let Value::Object(map) = &mut data {
        map.insert("runId".to_string(), json!(started.run_id));
        map.insert("targetCount".to_string(), json!(started.targets));
    }
    Ok(Reply::new(format!(
        "Path '{}' started with {} target(s).",
        node.name, started.targets
    ))
    .with_data(data))
}

async fn make_path(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let (robot, path_name) = robot_and_path(&params, "path")?;
    create_path(&ctx.dispatcher, robot, path_name, path_options(&params)?).await
}

async fn make_target(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let (robot, path_name) = robot_and_path(&params, "path")?;
    let request = target_request(&params, "position", "rotation")?;
    add_target(&ctx.dispatcher, robot, path_name, request).await
}

async fn connect_targets(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let (robot, path_name) = robot_and_path(&params, "path")?;
    let order = order(&params, TargetOrder::ByName)?;
    let names = ctx
        .dispatcher
        .stage(move |stage| {
            let ids = path::connect_targets(stage, &robot, &path_name, order)?;
            Ok(ids
                .into_iter()
                .filter_map(|id| stage.graph.node(id).map(|n| n.name.clone()))
                .collect::<Vec<_>>())
        })
        .await?;
    Ok(Reply::new(format!("Connected {} target(s).", names.len()))
        .with_data(json!({ "targets": names })))
}

async fn start_path(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let (robot, path) = robot_and_path(&params, "path")?;
    let request = StartRequest {
        robot,
        path,
        looped: params.bool("loop")?,
        order: Some(order(&params, TargetOrder::Declaration)?),
    };
    run_path(&ctx.dispatcher, request).await
}

async fn stop_path(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let (robot, path_name) = robot_and_path(&params, "path")?;
    let label = format!("{robot}/{path_name}");
    let record = ctx
        .dispatcher
        .submit(move |world| run::stop_path(world, &robot, &path_name))
        .await?;
    Ok(Reply::new(format!("Path '{label}' stopped.")).with_data(record))
}

async fn path_status(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let (robot, path_name) = robot_and_path(&params, "path")?;
    let status = ctx
        .dispatcher
        .submit(move |world| run::path_status(world, &robot, &path_name))
        .await?;
    Ok(Reply::new(format!("Path is {:?}.", status.record.state)).with_data(status))
}
