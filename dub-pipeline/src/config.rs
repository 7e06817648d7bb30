//! Configuration for dub-pipeline
//!
//! Loaded from `<config dir>/dubadub/dub-pipeline.toml` (or `--config`), then
//! overridden by environment variables and command-line arguments.
//!
//! ```toml
//! bind_address = "127.0.0.1"
//! port = 8000
//! output_root = "/var/lib/dubadub/sessions"
//!
//! [logging]
//! level = "info"
//!
//! [pipeline]
//! retention_seconds = 3600
//!
//! [pipeline.stage_retry]
//! base_delay_ms = 500
//! max_retries = 3
//!
//! [tools]
//! ffmpeg = "/usr/local/bin/ffmpeg"
//!
//! [credentials]
//! elevenlabs_api_key = "..."
//! ```

use dub_common::config::{self, LoggingConfig};
use dub_common::BackoffPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Module name used for the config file and default folders
pub const MODULE_NAME: &str = "dub-pipeline";

pub const ELEVENLABS_KEY_ENV: &str = "ELEVENLABS_API_KEY";
pub const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const OUTPUT_ROOT_ENV: &str = "DUB_OUTPUT_ROOT";

const DEFAULT_ELEVENLABS_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";

/// Top-level TOML config
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub bind_address: String,
    pub port: u16,
    pub output_root: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub pipeline: PipelineSection,
    pub tools: ToolPaths,
    pub credentials: Credentials,
    pub endpoints: Endpoints,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8000,
            output_root: None,
            logging: LoggingConfig::default(),
            pipeline: PipelineSection::default(),
            tools: ToolPaths::default(),
            credentials: Credentials::default(),
            endpoints: Endpoints::default(),
        }
    }
}

/// `[pipeline]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// How long terminal sessions stay queryable
    pub retention_seconds: u64,
    /// Stage-level retry policy
    pub stage_retry: BackoffPolicy,
    /// Per-request timeout for external HTTP services
    pub http_timeout_seconds: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            retention_seconds: 3600,
            stage_retry: BackoffPolicy::default(),
            http_timeout_seconds: 120,
        }
    }
}

impl PipelineSection {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

/// `[tools]` section: external executables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub yt_dlp: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            yt_dlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// `[credentials]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub elevenlabs_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

/// `[endpoints]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub elevenlabs_base_url: String,
    pub anthropic_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            elevenlabs_base_url: DEFAULT_ELEVENLABS_URL.to_string(),
            anthropic_base_url: DEFAULT_ANTHROPIC_URL.to_string(),
        }
    }
}

/// API keys after ENV → TOML resolution
///
/// A missing key is not a startup error: the stage that needs it fails with
/// an `auth` error when a job reaches it.
#[derive(Clone, Default)]
pub struct ResolvedCredentials {
    pub elevenlabs_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("elevenlabs_api_key", &self.elevenlabs_api_key.as_ref().map(|_| "***"))
            .field("anthropic_api_key", &self.anthropic_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl PipelineConfig {
    /// Load from an explicit path or the default location
    pub fn load(explicit: Option<&Path>) -> dub_common::Result<Self> {
        config::load_toml_or_default(explicit, MODULE_NAME)
    }

    /// Session output folder following CLI → ENV → TOML → default priority
    pub fn resolve_output_root(&self, cli_arg: Option<&Path>) -> PathBuf {
        config::resolve_folder(
            cli_arg,
            OUTPUT_ROOT_ENV,
            self.output_root.as_deref(),
            || config::default_data_folder("sessions"),
        )
    }

    pub fn resolve_credentials(&self) -> ResolvedCredentials {
        ResolvedCredentials {
            elevenlabs_api_key: config::resolve_secret(
                "ElevenLabs API key",
                ELEVENLABS_KEY_ENV,
                self.credentials.elevenlabs_api_key.as_deref(),
            ),
            anthropic_api_key: config::resolve_secret(
                "Anthropic API key",
                ANTHROPIC_KEY_ENV,
                self.credentials.anthropic_api_key.as_deref(),
            ),
        }
    }
}
