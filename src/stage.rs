//! The scene owner's state: graph, solver, assets and scene bookkeeping,
//! held as one bevy resource so queued jobs get exclusive access.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use bevy::prelude::*;

use crate::assets::{AssetIndex, PrefabCatalog};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::motion::solver::{RadialSolver, Solver};
use crate::scene::components::ComponentRegistry;
use crate::scene::lifecycle::{SceneCatalog, SceneLifecycle};
use crate::scene::memory::MemoryScene;
use crate::scene::SceneGraph;

#[derive(Resource)]
pub struct Stage {
    pub graph: Box<dyn SceneGraph>,
    pub solver: Box<dyn Solver>,
    pub assets: Box<dyn AssetIndex>,
    pub scenes: Box<dyn SceneLifecycle>,
    pub registry: ComponentRegistry,
}

impl Stage {
    pub fn new(
        graph: Box<dyn SceneGraph>,
        solver: Box<dyn Solver>,
        assets: Box<dyn AssetIndex>,
        scenes: Box<dyn SceneLifecycle>,
    ) -> Self {
        Self {
            graph,
            solver,
            assets,
            scenes,
            registry: ComponentRegistry::builtin(),
        }
    }

    /// In-memory stage. The prefab catalog comes from the configured file,
    /// or the built-in catalog when none is set.
    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let assets = match &config.prefab_catalog {
            Some(path) => PrefabCatalog::from_file(path)?,
            None => PrefabCatalog::builtin(),
        };
        let first_scene = config
            .build_scenes
            .first()
            .cloned()
            .unwrap_or_else(|| "Main".to_string());
        Ok(Self::new(
            Box::new(MemoryScene::new(first_scene)),
            Box::new(RadialSolver::new(config.solver_reach)),
            Box::new(assets),
            Box::new(SceneCatalog::new(config.build_scenes.clone())),
        ))
    }

    pub fn in_memory_default() -> Self {
        Self::new(
            Box::<MemoryScene>::default(),
            Box::<RadialSolver>::default(),
            Box::new(PrefabCatalog::builtin()),
            Box::new(SceneCatalog::new(vec!["Main".to_string()])),
        )
    }
}

/// Runs `f` with the stage taken out of the world, so the job can still
/// reach other resources. The stage is put back even if `f` panics.
pub fn with_stage<T>(
    world: &mut World,
    f: impl FnOnce(&mut Stage, &mut World) -> BridgeResult<T>,
) -> BridgeResult<T> {
    let mut stage = world
        .remove_resource::<Stage>()
        .ok_or_else(|| BridgeError::collaborator("Scene stage is not available."))?;
    let result = catch_unwind(AssertUnwindSafe(|| f(&mut stage, world)));
    world.insert_resource(stage);
    match result {
        Ok(result) => result,
        Err(payload) => Err(BridgeError::collaborator(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Scene job panicked: {detail}")
}
