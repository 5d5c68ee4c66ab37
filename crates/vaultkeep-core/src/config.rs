use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 11278;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PUBLIC_DIR: &str = "./public";
pub const DEFAULT_RESTIC_BINARY: &str = "/usr/bin/restic";
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;
pub const SWEEP_INTERVAL_MS: u64 = 1_000; // liveness sweep cadence
pub const LIVENESS_TIMEOUT_MS: u64 = 2_000; // evict viewers silent for longer than this
pub const PING_INTERVAL_MS: u64 = 1_000; // server -> viewer ping cadence
pub const OUTBOUND_BUFFER: usize = 32; // per-viewer queued frames before a write counts as failed

/// Top-level daemon config (vaultkeep.toml + VAULTKEEP_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultkeepConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub restic: ResticConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory served at `/` (the bundled web UI).
    #[serde(default = "default_public_dir")]
    pub public_dir: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            public_dir: DEFAULT_PUBLIC_DIR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How many backup runs may execute at the same time.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
        }
    }
}

/// Liveness and buffering knobs for connected status viewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_liveness_timeout_ms")]
    pub liveness_timeout_ms: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: SWEEP_INTERVAL_MS,
            liveness_timeout_ms: LIVENESS_TIMEOUT_MS,
            ping_interval_ms: PING_INTERVAL_MS,
            outbound_buffer: OUTBOUND_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResticConfig {
    #[serde(default = "default_restic_binary")]
    pub binary: String,
}

impl Default for ResticConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_RESTIC_BINARY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Location of the JSON settings document edited from the UI.
    #[serde(default = "default_settings_path")]
    pub path: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_public_dir() -> String {
    DEFAULT_PUBLIC_DIR.to_string()
}
fn default_max_concurrent_runs() -> usize {
    DEFAULT_MAX_CONCURRENT_RUNS
}
fn default_sweep_interval_ms() -> u64 {
    SWEEP_INTERVAL_MS
}
fn default_liveness_timeout_ms() -> u64 {
    LIVENESS_TIMEOUT_MS
}
fn default_ping_interval_ms() -> u64 {
    PING_INTERVAL_MS
}
fn default_outbound_buffer() -> usize {
    OUTBOUND_BUFFER
}
fn default_restic_binary() -> String {
    DEFAULT_RESTIC_BINARY.to_string()
}
fn default_settings_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vaultkeep/settings.json", home)
}

impl VaultkeepConfig {
    /// Load config from a TOML file with VAULTKEEP_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.vaultkeep/vaultkeep.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: VaultkeepConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("VAULTKEEP_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vaultkeep/vaultkeep.toml", home)
}
