use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 6400;
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;
pub const MIN_BUFFER_SIZE: usize = 1024;
pub const CONFIG_ENV: &str = "SCENE_BRIDGE_CONFIG";
pub const MAX_TIMEOUT_SECS: f64 = 24.0 * 60.0 * 60.0;
pub const MAX_RETRY_DELAY_SECS: f64 = 60.0;
pub const TICK_HZ_RANGE: (f64, f64) = (1.0, 1000.0);

/// Bridge settings. Loaded from `bridge.json` (or `$SCENE_BRIDGE_CONFIG`),
/// then overridden by `SCENE_BRIDGE_*` env vars and finally by CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub buffer_size: usize,
    pub connection_timeout_secs: f64,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub log_level: String,
    pub prefab_catalog: Option<PathBuf>,
    pub build_scenes: Vec<String>,
    pub solver_reach: f32,
    pub tick_hz: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connection_timeout_secs: 15.0,
            max_retries: 3,
            retry_delay_secs: 1.0,
            log_level: "info".to_string(),
            prefab_catalog: None,
            build_scenes: vec!["Main".to_string()],
            solver_reach: 1.5,
            tick_hz: 60.0,
        }
    }
}

impl BridgeConfig {
    /// Reads the config file named by `$SCENE_BRIDGE_CONFIG` (default
    /// `bridge.json`) and applies env overrides.
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "bridge.json".to_string());
        let mut cfg = Self::from_file(Path::new(&path));
        cfg.apply_env();
        cfg.sanitized()
    }

    /// Missing files fall back to defaults silently; unparsable files are
    /// reported and also fall back.
    pub fn from_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<BridgeConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!(path = %path.display(), "loaded bridge config");
                    cfg
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse bridge config");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Env overrides, with the variable lookup injected so tests do not
    /// have to mutate the process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(host) = get("SCENE_BRIDGE_HOST") {
            self.host = host;
        }
        if let Some(port) = get("SCENE_BRIDGE_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(size) = get("SCENE_BRIDGE_BUFFER_SIZE").and_then(|v| v.parse().ok()) {
            self.buffer_size = size;
        }
        if let Some(secs) = get("SCENE_BRIDGE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.connection_timeout_secs = secs;
        }
        if let Some(level) = get("SCENE_BRIDGE_LOG") {
            self.log_level = level;
        }
    }

    pub fn sanitized(mut self) -> Self {
        self.buffer_size = self.buffer_size.max(MIN_BUFFER_SIZE);
        if !(self.connection_timeout_secs.is_finite() && self.connection_timeout_secs > 0.0) {
            self.connection_timeout_secs = Self::default().connection_timeout_secs;
        }
        self.connection_timeout_secs = self.connection_timeout_secs.min(MAX_TIMEOUT_SECS);
        self.max_retries = self.max_retries.max(1);
        if !(self.retry_delay_secs.is_finite() && self.retry_delay_secs >= 0.0) {
            self.retry_delay_secs = Self::default().retry_delay_secs;
        }
        self.retry_delay_secs = self.retry_delay_secs.min(MAX_RETRY_DELAY_SECS);
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            self.tick_hz = Self::default().tick_hz;
        }
        self.tick_hz = self.tick_hz.clamp(TICK_HZ_RANGE.0, TICK_HZ_RANGE.1);
        if !(self.solver_reach.is_finite() && self.solver_reach > 0.0) {
            self.solver_reach = Self::default().solver_reach;
        }
        if self.build_scenes.is_empty() {
            self.build_scenes = Self::default().build_scenes;
        }
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        secs_or(self.connection_timeout_secs, Self::default().connection_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        secs_or(self.retry_delay_secs, Self::default().retry_delay_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        secs_or(1.0 / self.tick_hz, 1.0 / Self::default().tick_hz)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        let host = if self.host.eq_ignore_ascii_case("localhost") {
            "127.0.0.1"
        } else {
            self.host.as_str()
        };
        format!("{host}:{}", self.port).parse().ok()
    }
}

/// Values that do not fit a `Duration` fall back to `default`.
fn secs_or(secs: f64, default: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_else(|_| Duration::from_secs_f64(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_the_well_known_port() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.port, 6400);
        assert_eq!(cfg.buffer_size, 32768);
        assert_eq!(cfg.connection_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.socket_addr(), Some("127.0.0.1:6400".parse().unwrap()));
    }

    #[test]
    fn file_values_fill_missing_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"port": 7100, "log_level": "debug"}}"#).expect("write config");
        let cfg = BridgeConfig::from_file(file.path());
        assert_eq!(cfg.port, 7100);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.build_scenes, vec!["Main".to_string()]);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "port = 7100").expect("write config");
        assert_eq!(BridgeConfig::from_file(file.path()), BridgeConfig::default());
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let vars: HashMap<&str, &str> = [
            ("SCENE_BRIDGE_PORT", "7200"),
            ("SCENE_BRIDGE_HOST", " localhost "),
            ("SCENE_BRIDGE_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let mut cfg = BridgeConfig {
            port: 7100,
            ..Default::default()
        };
        cfg.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(cfg.port, 7200);
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.connection_timeout_secs, 15.0);
        assert_eq!(cfg.socket_addr(), Some("127.0.0.1:7200".parse().unwrap()));
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let cfg = BridgeConfig {
            buffer_size: 16,
            connection_timeout_secs: -1.0,
            max_retries: 0,
            tick_hz: 0.0,
            build_scenes: vec![],
            ..Default::default()
        }
        .sanitized();
        assert_eq!(cfg.buffer_size, MIN_BUFFER_SIZE);
        assert_eq!(cfg.connection_timeout_secs, 15.0);
        assert_eq!(cfg.max_retries, 1);
        assert_eq!(cfg.tick_hz, 60.0);
        assert_eq!(cfg.build_scenes.len(), 1);
    }

    #[test]
    fn huge_durations_are_clamped_instead_of_panicking() {
        let cfg = BridgeConfig {
            connection_timeout_secs: 1e30,
            retry_delay_secs: 1e300,
            tick_hz: 1e-300,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(cfg.connection_timeout(), Duration::from_secs_f64(MAX_TIMEOUT_SECS));
        assert_eq!(cfg.retry_delay(), Duration::from_secs_f64(MAX_RETRY_DELAY_SECS));
        assert_eq!(cfg.tick_interval(), Duration::from_secs(1));

        let raw = BridgeConfig {
            connection_timeout_secs: 1e30,
            ..Default::default()
        };
        assert_eq!(raw.connection_timeout(), Duration::from_secs(15));
    }
}
