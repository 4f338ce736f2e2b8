use serde_json::json;

use super::params::Params;
use super::response::Reply;
use super::router::{ActionCtx, Domain};
use crate::error::{BridgeError, BridgeResult};
use crate::scene::info::hierarchy;
use crate::scene::lifecycle::{roots_in, SceneRef};

pub(super) fn domain() -> Domain {
    Domain::new("scene", &["manage_scene"])
        .action("get_active", get_active)
        .action("get_build_scenes", get_build_scenes)
        .action("get_loaded_scenes", get_loaded_scenes)
        .action("load", load)
        .action("load_additive", load_additive)
        .action("set_active", set_active)
        .action("unload", unload)
        .action("get_hierarchy", get_hierarchy)
}

fn scene_ref(params: &Params) -> BridgeResult<SceneRef> {
    if let Some(name) = params.str("name").filter(|n| !n.is_empty()) {
        return Ok(SceneRef::Name(name));
    }
    match params.u64("buildIndex")? {
        Some(index) => usize::try_from(index)
            .map(SceneRef::BuildIndex)
            .map_err(|_| BridgeError::malformed("'buildIndex' is out of range.")),
        None => Err(BridgeError::missing("name")),
    }
}

async fn get_active(ctx: ActionCtx) -> BridgeResult<Reply> {
    let scene = ctx
        .dispatcher
        .stage(|stage| {
            stage
                .scenes
                .active(stage.graph.as_ref())
                .ok_or_else(|| BridgeError::not_found("No active scene."))
        })
        .await?;
    Ok(Reply::new(format!("Active scene is '{}'.", scene.name)).with_data(scene))
}

async fn get_build_scenes(ctx: ActionCtx) -> BridgeResult<Reply> {
    let scenes = ctx
        .dispatcher
        .stage(|stage| Ok(stage.scenes.build_scenes(stage.graph.as_ref())))
        .await?;
    Ok(Reply::new(format!("{} scene(s) in the build.", scenes.len())).with_data(scenes))
}

async fn get_loaded_scenes(ctx: ActionCtx) -> BridgeResult<Reply> {
    let scenes = ctx
        .dispatcher
        .stage(|stage| Ok(stage.scenes.loaded(stage.graph.as_ref())))
        .await?;
    Ok(Reply::new(format!("{} scene(s) loaded.", scenes.len())).with_data(scenes))
}

async fn load(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let additive = params.bool_or("additive", false)?;
    load_scene(ctx, params, additive).await
}

async fn load_additive(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    load_scene(ctx, params, true).await
}

async fn load_scene(ctx: ActionCtx, params: Params, additive: bool) -> BridgeResult<Reply> {
    let scene = scene_ref(&params)?;
    let make_active = params.bool_or("setActive", false)?;
    let info = ctx
        .dispatcher
        .stage(move |stage| {
            let info = stage.scenes.load(stage.graph.as_mut(), &scene, additive)?;
            if additive && make_active {
                return stage.scenes.set_active(stage.graph.as_ref(), &scene);
            }
            Ok(info)
        })
        .await?;
    Ok(Reply::new(format!("Scene '{}' loaded.", info.name)).with_data(info))
}

async fn set_active(ctx: ActionCtx) -> BridgeResult<Reply> {
    let scene = scene_ref(&ctx.params.payload()?)?;
    let info = ctx
        .dispatcher
        .stage(move |stage| stage.scenes.set_active(stage.graph.as_ref(), &scene))
        .await?;
    Ok(Reply::new(format!("Scene '{}' is now active.", info.name)).with_data(info))
}

async fn unload(ctx: ActionCtx) -> BridgeResult<Reply> {
    let scene = scene_ref(&ctx.params.payload()?)?;
    let info = ctx
        .dispatcher
        .stage(move |stage| stage.scenes.unload(stage.graph.as_mut(), &scene))
        .await?;
    Ok(Reply::new(format!("Scene '{}' unloaded.", info.name)).with_data(info))
}

async fn get_hierarchy(ctx: ActionCtx) -> BridgeResult<Reply> {
    let (scene, roots) = ctx
        .dispatcher
        .stage(|stage| {
            let graph = stage.graph.as_ref();
            let scene = stage
                .scenes
                .active_name()
                .ok_or_else(|| BridgeError::not_found("No active scene."))?;
            let roots: Vec<_> = roots_in(graph, &scene)
                .into_iter()
                .filter_map(|root| hierarchy(graph, root))
                .collect();
            Ok((scene, roots))
        })
        .await?;
    Ok(
        Reply::new(format!("Hierarchy of '{scene}' with {} root(s).", roots.len()))
            .with_data(json!({ "scene": scene, "roots": roots })),
    )
}
