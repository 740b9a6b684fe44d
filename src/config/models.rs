//! Configuration data structures for Warren.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files.
//! They are serde-friendly and carry defaults equal to the protocol's
//! constants, so a minimal config is just a listen address.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the public HTTP listener binds to.
    pub listen_addr: String,
    pub tunnel: TunnelConfig,
    pub dispatch: DispatchConfig,
    pub recorder: RecorderConfig,
    pub inspector: InspectorConfig,
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            tunnel: TunnelConfig::default(),
            dispatch: DispatchConfig::default(),
            recorder: RecorderConfig::default(),
            inspector: InspectorConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Control-channel endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Path peers hit to establish the WebSocket control channel.
    pub control_path: String,
    /// Header carrying the peer's already-allocated hostname. Handshake
    /// authentication happens upstream of this process.
    pub hostname_header: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            control_path: "/_warren/control".to_string(),
            hostname_header: "x-warren-hostname".to_string(),
        }
    }
}

/// Dispatcher deadlines and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Deadline for a buffered dispatch awaiting its response frame.
    pub buffered_timeout_secs: u64,
    /// Deadline for a replayed exchange.
    pub replay_timeout_secs: u64,
    /// Largest request body the gateway will buffer into a frame.
    pub max_request_body_bytes: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            buffered_timeout_secs: 600,
            replay_timeout_secs: 30,
            max_request_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Capture persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Bounded work-queue depth between dispatches and the store writer.
    pub queue_capacity: usize,
    /// Rows older than this are pruned.
    pub retention_days: i64,
    /// How often the prune pass runs.
    pub prune_interval_secs: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            retention_days: 14,
            prune_interval_secs: 3600,
        }
    }
}

/// Inspector dashboard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// Path prefix the inspector answers on (Host-scoped).
    pub path_prefix: String,
    /// Rows returned when the request does not specify a limit.
    pub default_limit: usize,
    /// Hard cap on requested limits.
    pub max_limit: usize,
    /// Credentials seeded into the store at boot, hostname → password.
    pub credentials: HashMap<String, String>,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            path_prefix: "/_warren/inspector".to_string(),
            default_limit: 50,
            max_limit: 200,
            credentials: HashMap::new(),
        }
    }
}

/// Logging output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Emit JSON log lines (production) instead of pretty console output.
    pub json: bool,
    /// Default filter when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: true,
            filter: "info".to_string(),
        }
    }
}
