//! Configuration types for genbatch

use crate::error::{Error, Result};
use crate::types::Platform;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the remote API secret
pub const API_KEY_ENV: &str = "RUNWAYML_API_SECRET";

/// Remote service connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the generation API (default: "https://api.dev.runwayml.com/v1")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Value of the `X-Runway-Version` header (default: "2024-11-06")
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// API secret; falls back to the `RUNWAYML_API_SECRET` environment variable.
    /// Never serialized.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Timeout for a single create/status request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Timeout for establishing a connection (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            api_key: None,
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Parameters sent with every create-job request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model name (default: "gen4_turbo")
    #[serde(default = "default_model")]
    pub model: String,

    /// Output aspect ratio (default: "1280:720")
    #[serde(default = "default_ratio")]
    pub ratio: String,

    /// Clip length in seconds (default: 5)
    #[serde(default = "default_duration")]
    pub duration: u32,

    /// Fixed seed, if any
    #[serde(default)]
    pub seed: Option<u64>,

    /// Platform tag embedded in artifact names (default: ig)
    #[serde(default)]
    pub platform: Platform,

    /// Prompt used for inputs without one
    #[serde(default = "default_prompt")]
    pub default_prompt: String,

    /// Pause between successive submissions (default: 2 seconds)
    #[serde(default = "default_submit_delay", with = "duration_serde")]
    pub submit_delay: Duration,

    /// Maximum number of inputs submitted per run (None = all)
    #[serde(default)]
    pub max_jobs: Option<usize>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            ratio: default_ratio(),
            duration: default_duration(),
            seed: None,
            platform: Platform::default(),
            default_prompt: default_prompt(),
            submit_delay: default_submit_delay(),
            max_jobs: None,
        }
    }
}

/// Status polling behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Lower bound of the pause between passes (default: 8 seconds)
    #[serde(default = "default_min_interval", with = "duration_serde")]
    pub min_interval: Duration,

    /// Upper bound of the pause between passes (default: 10 seconds)
    #[serde(default = "default_max_interval", with = "duration_serde")]
    pub max_interval: Duration,

    /// Wall-clock budget for the whole polling session (default: 600 seconds)
    #[serde(default = "default_global_timeout", with = "duration_serde")]
    pub global_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval: default_min_interval(),
            max_interval: default_max_interval(),
            global_timeout: default_global_timeout(),
        }
    }
}

/// Artifact download behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory for artifacts, sidecars and reports (default: "./video_outputs")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum concurrent artifact transfers (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Timeout for a whole artifact transfer (default: 300 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Extension used when the artifact URL has none (default: "mp4")
    #[serde(default = "default_extension")]
    pub default_extension: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            request_timeout: default_download_timeout(),
            default_extension: default_extension(),
        }
    }
}

/// Where queue snapshots and reports live
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory for queue files and batch metadata (default: "./video_outputs")
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// `chrono` format of the report file key (default: "%Y%m%d", one report per day)
    #[serde(default = "default_report_key_format")]
    pub report_key_format: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            report_key_format: default_report_key_format(),
        }
    }
}

/// Retry configuration for submissions that never reached the service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the batch orchestrator
///
/// Organized into sub-configs:
/// - [`api`](ApiConfig): remote endpoint, credentials, request timeouts
/// - [`generation`](GenerationConfig): parameters of each create-job request
/// - [`polling`](PollConfig): jittered interval band and global timeout
/// - [`download`](DownloadConfig): artifact directory and transfer concurrency
/// - [`persistence`](PersistenceConfig): queue and report locations
/// - [`submit_retry`](RetryConfig): backoff for unreachable-service retries
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote endpoint and credentials
    #[serde(default)]
    pub api: ApiConfig,

    /// Create-job parameters
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Polling behavior
    #[serde(default)]
    pub polling: PollConfig,

    /// Download behavior
    #[serde(default)]
    pub download: DownloadConfig,

    /// Queue and report locations
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Submission retry policy
    #[serde(default)]
    pub submit_retry: RetryConfig,
}

impl Config {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {e}", path.display()),
            key: None,
        })?;
        serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {e}", path.display()),
            key: None,
        })
    }

    /// Reject settings that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.polling.min_interval > self.polling.max_interval {
            return Err(Error::config(
                "polling.min_interval",
                format!(
                    "min_interval ({}s) is greater than max_interval ({}s)",
                    self.polling.min_interval.as_secs(),
                    self.polling.max_interval.as_secs()
                ),
            ));
        }
        if self.polling.global_timeout.is_zero() {
            return Err(Error::config(
                "polling.global_timeout",
                "global timeout must be greater than zero",
            ));
        }
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::config(
                "download.max_concurrent_downloads",
                "must be at least 1",
            ));
        }
        if self.submit_retry.max_attempts == 0 {
            return Err(Error::config(
                "submit_retry.max_attempts",
                "must be at least 1",
            ));
        }
        if self.generation.max_jobs == Some(0) {
            return Err(Error::config("generation.max_jobs", "must be at least 1"));
        }
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(Error::config(
                "api.base_url",
                format!("'{}' is not a valid URL", self.api.base_url),
            ));
        }
        Ok(())
    }

    /// API secret from the config file or the environment
    pub fn api_key(&self) -> Result<String> {
        self.api
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::MissingCredentials(API_KEY_ENV.to_string()))
    }
}

fn default_base_url() -> String {
    "https://api.dev.runwayml.com/v1".to_string()
}

fn default_api_version() -> String {
    "2024-11-06".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_model() -> String {
    "gen4_turbo".to_string()
}

fn default_ratio() -> String {
    "1280:720".to_string()
}

fn default_duration() -> u32 {
    5
}

fn default_prompt() -> String {
    "Slow cinematic camera movement, subtle natural motion, high detail".to_string()
}

fn default_submit_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_min_interval() -> Duration {
    Duration::from_secs(8)
}

fn default_max_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_global_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./video_outputs")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_extension() -> String {
    "mp4".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./video_outputs")
}

fn default_report_key_format() -> String {
    "%Y%m%d".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
