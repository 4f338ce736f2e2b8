pub mod client;
pub mod codec;
pub mod dispatcher;
pub mod params;
pub mod response;
pub mod router;
mod routes_assets;
mod routes_ik;
mod routes_nodes;
mod routes_paths;
mod routes_scene;
pub mod transport;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::{mpsc, Arc};

use bevy::app::AppExit;
use bevy::prelude::*;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::motion::run::{monitor_path_runs, step_solver, OwnerStatus, PathRuns};
use crate::stage::Stage;
use dispatcher::{drain_scene_jobs, scene_queue, SceneDispatcher};
use router::Router;
use transport::BridgeServer;

/// Installs the scene owner's side of the bridge and starts the network
/// side on its own thread.
pub struct BridgePlugin {
    pub config: BridgeConfig,
}

impl BridgePlugin {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

/// Where the bridge ended up listening.
#[derive(Resource, Debug, Clone, Copy)]
pub struct BridgeAddress(pub SocketAddr);

/// Producer handle for systems or tools that want to queue scene jobs
/// themselves.
#[derive(Resource, Clone)]
pub struct BridgeDispatcher(pub SceneDispatcher);

impl Plugin for BridgePlugin {
    fn build(&self, app: &mut App) {
        let (dispatcher, queue) = scene_queue();
        app.insert_resource(queue)
            .insert_resource(BridgeDispatcher(dispatcher.clone()))
            .init_resource::<PathRuns>()
            .init_resource::<OwnerStatus>()
            .add_systems(
                Update,
                (drain_scene_jobs, step_solver, monitor_path_runs).chain(),
            );

        if !app.world().contains_resource::<Stage>() {
            match Stage::from_config(&self.config) {
                Ok(stage) => {
                    app.insert_resource(stage);
                }
                Err(err) => {
                    tracing::error!(error = %err, "scene stage could not be built");
                    app.world_mut().send_event(AppExit::error());
                    return;
                }
            }
        }

        let router = Arc::new(Router::standard(dispatcher));
        match spawn_server(self.config.clone(), router) {
            Ok(addr) => {
                app.insert_resource(BridgeAddress(addr));
            }
            Err(err) => {
                tracing::error!(error = %err, "bridge failed to start");
                app.world_mut().send_event(AppExit::error());
            }
        }
    }
}

/// Starts the transport on a dedicated thread with its own tokio runtime
/// and waits until it is bound.
pub fn spawn_server(config: BridgeConfig, router: Arc<Router>) -> BridgeResult<SocketAddr> {
    let (ready_tx, ready_rx) = mpsc::channel::<BridgeResult<SocketAddr>>();
    std::thread::Builder::new()
        .name("scene-bridge-net".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = ready_tx.send(Err(err.into()));
                    return;
                }
            };
            runtime.block_on(async move {
                match BridgeServer::new(config, router).start().await {
                    Ok(handle) => {
                        let _ = ready_tx.send(Ok(handle.local_addr()));
                        handle.stopped().await;
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            });
        })?;
    ready_rx
        .recv()
        .unwrap_or_else(|_| Err(BridgeError::collaborator("Bridge thread exited before binding.")))
}
