use std::path::PathBuf;

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use clap::Parser;

use scene_bridge::config::BridgeConfig;
use scene_bridge::BridgePlugin;

#[derive(Parser, Debug)]
#[command(name = "scene-bridge", version, about = "JSON-over-TCP bridge into a scene graph")]
struct Args {
    /// Config file; defaults to $SCENE_BRIDGE_CONFIG or bridge.json.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// tracing filter, e.g. `info` or `scene_bridge=debug`.
    #[arg(long)]
    log_level: Option<String>,

    /// JSON prefab catalog served by the asset domain.
    #[arg(long)]
    catalog: Option<PathBuf>,
}

fn load_config(args: &Args) -> BridgeConfig {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = BridgeConfig::from_file(path);
            config.apply_env();
            config
        }
        None => BridgeConfig::load(),
    };
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if let Some(catalog) = &args.catalog {
        config.prefab_catalog = Some(catalog.clone());
    }
    config.sanitized()
}

fn log_filter(level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

fn main() -> AppExit {
    let args = Args::parse();
    let config = load_config(&args);
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&config.log_level))
        .init();
    tracing::info!(addr = %config.bind_addr(), tick_hz = config.tick_hz, "starting scene bridge");

    App::new()
        .add_plugins(
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(config.tick_interval())),
        )
        .add_plugins(BridgePlugin::new(config))
        .run()
}
