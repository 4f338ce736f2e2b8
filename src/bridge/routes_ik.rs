use serde_json::json;

use super::response::Reply;
use super::router::{ActionCtx, Domain};
use super::routes_paths::{add_target, create_path, path_options, run_path, target_request};
use crate::error::{BridgeError, BridgeResult};
use crate::motion::path::{find_robot, robot_solver, TargetOrder};
use crate::motion::run::StartRequest;
use crate::motion::{ensure_environment, spawn_robot as spawn_robot_at};
use crate::scene::info::node_info;

const DEFAULT_ROBOT_NAME: &str = "Robot01";

pub(super) fn domain() -> Domain {
    Domain::new("ik", &["manage_ik"])
        .action("ensure_env", ensure_env)
        .action("spawn_robot", spawn_robot)
        .action("calc_params", calc_params)
        .action("path_create", path_create)
        .action("path_add_target", path_add_target)
        .action("path_run", path_run)
}

async fn ensure_env(ctx: ActionCtx) -> BridgeResult<Reply> {
    let (id, name, source) = ctx
        .dispatcher
        .stage(|stage| {
            let (id, source) = ensure_environment(stage)?;
            let name = stage
                .graph
                .node(id)
                .map(|n| n.name.clone())
                .unwrap_or_default();
            Ok((id, name, source))
        })
        .await?;
    Ok(Reply::new(format!("Motion environment: {}.", source.label())).with_data(json!({
        "source": source.label(),
        "name": name,
        "instanceID": id,
    })))
}

async fn spawn_robot(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let prefab = params
        .first_of(&["prefab_path", "prefabPath"])
        .filter(|p| !p.is_empty())
        .ok_or_else(|| BridgeError::missing("prefab_path"))?;
    let name = params
        .str("name")
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_ROBOT_NAME.to_string());
    let ensure_env_first = params.bool_or("ensureEnvFirst", true)?;
    let (node, warnings) = ctx
        .dispatcher
        .stage(move |stage| {
            if ensure_env_first {
                ensure_environment(stage)?;
            }
            let (id, warnings) = spawn_robot_at(stage, &prefab, &name)?;
            let node = node_info(stage.graph.as_ref(), id)
                .ok_or_else(|| BridgeError::collaborator("Robot vanished after spawn."))?;
            Ok((node, warnings))
        })
        .await?;
    Ok(Reply::new(format!("Robot '{}' spawned.", node.name))
        .with_warnings(&warnings)
        .with_data(node))
}

async fn calc_params(ctx: ActionCtx) -> BridgeResult<Reply> {
    let robot = ctx.params.payload()?.require_str("robot")?;
    let computed = ctx
        .dispatcher
        .stage(move |stage| {
            let robot_id = find_robot(stage.graph.as_ref(), &robot)?;
            let solver = robot_solver(stage.graph.as_ref(), robot_id)?;
            stage.solver.recalculate(stage.graph.as_mut(), solver)
        })
        .await?;
    Ok(Reply::new("Robot parameters recalculated.").with_data(computed))
}

async fn path_create(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let robot = params.require_str("robot")?;
    let path_name = params.require_str("pathName")?;
    let options = path_options(&params.nested("props")?)?;
    create_path(&ctx.dispatcher, robot, path_name, options).await
}

async fn path_add_target(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let robot = params.require_str("robot")?;
    let path_name = params.require_str("pathName")?;
    let request = target_request(&params.nested("target")?, "tcp", "euler")?;
    add_target(&ctx.dispatcher, robot, path_name, request).await
}

async fn path_run(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let request = StartRequest {
        robot: params.require_str("robot")?,
        path: params.require_str("pathName")?,
        looped: params.bool("loop")?,
        order: Some(TargetOrder::Declaration),
    };
    run_path(&ctx.dispatcher, request).await
}
