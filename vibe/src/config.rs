//! Configuration types and loading
//!
//! JSON config with a fallback chain: explicit path, project-local
//! `.vibe/config.json`, user `~/.vibe/config.json`, then defaults. API keys
//! never live here; providers read them from the environment.

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::RouterConfig;
use crate::primitives::DeterminismMode;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workspace root all runs operate on
    pub workspace: PathBuf,

    /// Provider router settings
    pub router: RouterSection,

    /// Context manager settings
    pub context: ContextSection,

    /// Autonomous loop settings
    pub r#loop: LoopSection,

    /// Storage layout
    pub storage: StorageSection,

    /// HTTP server settings
    pub server: ServerSection,

    /// Determinism mode: "off" | "record" | "replay"
    pub determinism: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            router: RouterSection::default(),
            context: ContextSection::default(),
            r#loop: LoopSection::default(),
            storage: StorageSection::default(),
            server: ServerSection::default(),
            determinism: "off".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with the fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local = PathBuf::from(".vibe").join("config.json");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("Failed to load config from {}: {}", local.display(), e),
            }
        }

        if let Some(user) = Self::user_config_path()
            && user.exists()
        {
            match Self::load_from_file(&user) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("Failed to load config from {}: {}", user.display(), e),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// `~/.vibe/config.json`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".vibe").join("config.json"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_json::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Persist to a path, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The `.vibe` state directory under the workspace
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(&self.storage.state_dir)
    }

    /// Router config derived from the router section
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            default_provider: self.router.default_provider.clone(),
            fallbacks: self.router.fallbacks.clone(),
            rate_max_requests: self.router.rate_max_requests,
            rate_window_ms: self.router.rate_window_ms,
            failure_threshold: self.router.failure_threshold,
            reset_timeout_ms: self.router.reset_timeout_ms,
            request_timeout_ms: self.router.request_timeout_ms,
            stream_timeout_ms: self.router.stream_timeout_ms,
        }
    }

    /// Determinism mode for new runs
    pub fn determinism_mode(&self) -> DeterminismMode {
        match self.determinism.as_str() {
            "record" => DeterminismMode::record(),
            "replay" => DeterminismMode::replay(),
            _ => DeterminismMode::Off,
        }
    }
}

/// Provider router section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    #[serde(rename = "default-provider")]
    pub default_provider: String,

    pub fallbacks: Vec<String>,

    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    #[serde(rename = "rate-max-requests")]
    pub rate_max_requests: usize,

    #[serde(rename = "rate-window-ms")]
    pub rate_window_ms: u64,

    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,

    #[serde(rename = "reset-timeout-ms")]
    pub reset_timeout_ms: u64,

    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    #[serde(rename = "stream-timeout-ms")]
    pub stream_timeout_ms: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        let defaults = RouterConfig::default();
        Self {
            default_provider: defaults.default_provider,
            fallbacks: defaults.fallbacks,
            max_tokens: 8192,
            rate_max_requests: defaults.rate_max_requests,
            rate_window_ms: defaults.rate_window_ms,
            failure_threshold: defaults.failure_threshold,
            reset_timeout_ms: defaults.reset_timeout_ms,
            request_timeout_ms: defaults.request_timeout_ms,
            stream_timeout_ms: defaults.stream_timeout_ms,
        }
    }
}

/// Context manager section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    #[serde(rename = "max-tokens")]
    pub max_tokens: usize,

    #[serde(rename = "prioritize-recent")]
    pub prioritize_recent: bool,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            prioritize_recent: true,
        }
    }
}

/// Autonomous loop section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSection {
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    #[serde(rename = "max-duration-ms")]
    pub max_duration_ms: u64,

    #[serde(rename = "rate-limit-per-hour")]
    pub rate_limit_per_hour: usize,

    #[serde(rename = "confidence-threshold")]
    pub confidence_threshold: f64,

    #[serde(rename = "stuck-threshold")]
    pub stuck_threshold: u32,

    #[serde(rename = "enable-circuit-breaker")]
    pub enable_circuit_breaker: bool,

    #[serde(rename = "max-retries")]
    pub max_retries: u32,
}

impl Default for LoopSection {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_duration_ms: 60 * 60 * 1000,
            rate_limit_per_hour: 100,
            confidence_threshold: 0.7,
            stuck_threshold: 3,
            enable_circuit_breaker: true,
            max_retries: 3,
        }
    }
}

/// Storage layout section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// State directory, relative to the workspace
    #[serde(rename = "state-dir")]
    pub state_dir: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            state_dir: ".vibe".to_string(),
        }
    }
}

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { port: 7171 }
    }
}

/// Initialise logging from the environment: `VIBE_LOG` (level filter),
/// `VIBE_LOG_FILE` (redirect to a file), `VIBE_LOG_JSON=1` (JSON lines).
pub fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("VIBE_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("VIBE_LOG_JSON").map(|v| v == "1" || v == "true").unwrap_or(false);

    match std::env::var("VIBE_LOG_FILE").ok() {
        Some(path) => {
            let file = std::sync::Arc::new(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .unwrap_or_else(|_| panic!("cannot open log file {path}")),
            );
            if json {
                tracing_subscriber::fmt().with_env_filter(filter).with_writer(file).json().init();
            } else {
                tracing_subscriber::fmt().with_env_filter(filter).with_writer(file).init();
            }
        }
        None => {
            if json {
                tracing_subscriber::fmt().with_env_filter(filter).json().init();
            } else {
                tracing_subscriber::fmt().with_env_filter(filter).init();
            }
        }
    }
}
