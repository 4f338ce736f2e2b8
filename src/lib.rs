//! Line-oriented JSON command bridge into a single-owner scene graph.
//!
//! Network tasks decode commands and route them to domain handlers; the
//! handlers queue closures onto the scene owner, a bevy app whose tick
//! drains the queue and drives path runs.

pub mod assets;
pub mod bridge;
pub mod config;
pub mod error;
pub mod motion;
pub mod scene;
pub mod stage;

pub use bridge::BridgePlugin;
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use stage::Stage;
