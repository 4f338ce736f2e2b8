use serde::Serialize;

use super::SceneGraph;
use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneRef {
    Name(String),
    BuildIndex(usize),
}

impl std::fmt::Display for SceneRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneRef::Name(name) => write!(f, "'{name}'"),
            SceneRef::BuildIndex(index) => write!(f, "build index {index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneInfo {
    pub name: String,
    pub path: String,
    pub build_index: Option<usize>,
    pub is_loaded: bool,
    pub is_active: bool,
    pub root_count: usize,
}

/// Scene load/unload management owned by the host.
pub trait SceneLifecycle: Send + Sync {
    fn active(&self, graph: &dyn SceneGraph) -> Option<SceneInfo>;

    fn loaded(&self, graph: &dyn SceneGraph) -> Vec<SceneInfo>;

    fn build_scenes(&self, graph: &dyn SceneGraph) -> Vec<SceneInfo>;

    /// Single loads replace every loaded scene; additive loads keep them.
    fn load(
        &mut self,
        graph: &mut dyn SceneGraph,
        scene: &SceneRef,
        additive: bool,
    ) -> BridgeResult<SceneInfo>;

    fn unload(&mut self, graph: &mut dyn SceneGraph, scene: &SceneRef) -> BridgeResult<SceneInfo>;

    fn set_active(&mut self, graph: &dyn SceneGraph, scene: &SceneRef) -> BridgeResult<SceneInfo>;

    fn active_name(&self) -> Option<String>;
}

/// Build-list backed scene bookkeeping for the in-memory graph. Scene
/// content lives in the graph; unloading a scene destroys its roots.
pub struct SceneCatalog {
    build: Vec<String>,
    loaded: Vec<String>,
    active: Option<String>,
}

impl SceneCatalog {
    /// The first build scene starts loaded and active.
    pub fn new(build: Vec<String>) -> Self {
        let first = build.first().cloned();
        Self {
            loaded: first.iter().cloned().collect(),
            active: first,
            build,
        }
    }

    fn resolve(&self, scene: &SceneRef) -> BridgeResult<String> {
        let found = match scene {
            SceneRef::Name(name) => self
                .build
                .iter()
                .chain(self.loaded.iter())
                .find(|s| s.eq_ignore_ascii_case(name) || scene_path(s).eq_ignore_ascii_case(name))
                .cloned(),
            SceneRef::BuildIndex(index) => self.build.get(*index).cloned(),
        };
        found.ok_or_else(|| BridgeError::not_found(format!("Scene {scene} not found.")))
    }

    fn info(&self, graph: &dyn SceneGraph, name: &str) -> SceneInfo {
        let is_loaded = self.loaded.iter().any(|s| s == name);
        SceneInfo {
            name: name.to_string(),
            path: scene_path(name),
            build_index: self.build.iter().position(|s| s == name),
            is_loaded,
            is_active: self.active.as_deref() == Some(name),
            root_count: if is_loaded {
                roots_in(graph, name).len()
            } else {
                0
            },
        }
    }
}

impl SceneLifecycle for SceneCatalog {
    fn active(&self, graph: &dyn SceneGraph) -> Option<SceneInfo> {
        self.active.as_deref().map(|name| self.info(graph, name))
    }

    fn loaded(&self, graph: &dyn SceneGraph) -> Vec<SceneInfo> {
        self.loaded.iter().map(|name| self.info(graph, name)).collect()
    }

    fn build_scenes(&self, graph: &dyn SceneGraph) -> Vec<SceneInfo> {
        self.build.iter().map(|name| self.info(graph, name)).collect()
    }

    fn load(
        &mut self,
        graph: &mut dyn SceneGraph,
        scene: &SceneRef,
        additive: bool,
    ) -> BridgeResult<SceneInfo> {
        let name = self.resolve(scene)?;
        if !additive {
            for other in std::mem::take(&mut self.loaded) {
                for root in roots_in(graph, &other) {
                    graph.destroy_node(root)?;
                }
            }
            self.active = Some(name.clone());
        }
        if !self.loaded.contains(&name) {
            self.loaded.push(name.clone());
        }
        if self.active.is_none() {
            self.active = Some(name.clone());
        }
        tracing::info!(scene = %name, additive, "scene loaded");
        Ok(self.info(graph, &name))
    }

    fn unload(&mut self, graph: &mut dyn SceneGraph, scene: &SceneRef) -> BridgeResult<SceneInfo> {
        let name = self.resolve(scene)?;
        if !self.loaded.contains(&name) {
            return Err(BridgeError::precondition(format!("Scene '{name}' is not loaded.")));
        }
        if self.loaded.len() == 1 {
            return Err(BridgeError::precondition(
                "Cannot unload the only loaded scene.",
            ));
        }
        for root in roots_in(graph, &name) {
            graph.destroy_node(root)?;
        }
        self.loaded.retain(|s| *s != name);
        if self.active.as_deref() == Some(name.as_str()) {
            self.active = self.loaded.first().cloned();
        }
        tracing::info!(scene = %name, "scene unloaded");
        Ok(self.info(graph, &name))
    }

    fn set_active(&mut self, graph: &dyn SceneGraph, scene: &SceneRef) -> BridgeResult<SceneInfo> {
        let name = self.resolve(scene)?;
        if !self.loaded.contains(&name) {
            return Err(BridgeError::precondition(format!(
                "Scene '{name}' must be loaded before it can be made active."
            )));
        }
        self.active = Some(name.clone());
        Ok(self.info(graph, &name))
    }

    fn active_name(&self) -> Option<String> {
        self.active.clone()
    }
}

fn scene_path(name: &str) -> String {
    format!("Scenes/{name}.scene")
}

pub fn roots_in(graph: &dyn SceneGraph, scene: &str) -> Vec<crate::scene::NodeId> {
    graph
        .roots()
        .into_iter()
        .filter(|id| graph.node(*id).is_some_and(|n| n.scene == scene))
        .collect()
}
