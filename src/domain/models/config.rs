//! Configuration models with serde defaults for every field.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::quota::{Credential, DEFAULT_FINGERPRINT_LEN};

/// Main configuration structure for the challenge pilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Session state machine limits and timeouts
    #[serde(default)]
    pub session: SessionConfig,

    /// Model priority and credential rotation
    #[serde(default)]
    pub rotation: RotationConfig,

    /// Quota ledger storage
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Inference provider endpoint
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Network event classification
    #[serde(default)]
    pub interceptor: InterceptorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Loop iterations allowed before the session fails
    #[serde(default = "default_max_challenge_attempts")]
    pub max_challenge_attempts: u32,

    /// Surface resets allowed before the session fails
    #[serde(default = "default_max_resets")]
    pub max_resets: u32,

    /// Upper bound for a whole session, in seconds
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,

    /// Wait for a verdict or a new payload after submission, in seconds
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    /// Bound for one solve-strategy dispatch, in seconds
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    /// Wait for the first payload of a round, in seconds
    #[serde(default = "default_payload_wait_secs")]
    pub payload_wait_secs: u64,

    /// Bound for the ignore-list check, in seconds
    #[serde(default = "default_ignore_check_secs")]
    pub ignore_check_secs: u64,

    /// Pause after a reload before the checkbox is clicked again, in milliseconds
    #[serde(default = "default_reload_settle_ms")]
    pub reload_settle_ms: u64,

    /// Pause before retrying after a rejected verdict, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Retry after a failing verdict instead of failing the session
    #[serde(default = "default_retry_on_failure")]
    pub retry_on_failure: bool,

    /// Prompts that are refreshed instead of solved
    #[serde(default)]
    pub ignore_request_questions: Vec<String>,

    /// Directory for archived passing verdicts
    #[serde(default)]
    pub verdict_archive_dir: Option<PathBuf>,
}

const fn default_max_challenge_attempts() -> u32 {
    4
}

const fn default_max_resets() -> u32 {
    1
}

const fn default_execution_timeout_secs() -> u64 {
    180
}

const fn default_response_timeout_secs() -> u64 {
    45
}

const fn default_dispatch_timeout_secs() -> u64 {
    120
}

const fn default_payload_wait_secs() -> u64 {
    30
}

const fn default_ignore_check_secs() -> u64 {
    5
}

const fn default_reload_settle_ms() -> u64 {
    1000
}

const fn default_retry_delay_ms() -> u64 {
    1500
}

const fn default_retry_on_failure() -> bool {
    true
}

impl SessionConfig {
    /// Whole-session deadline.
    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// Wait for a verdict or a new payload after submission.
    pub const fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Deadline for one strategy dispatch.
    pub const fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    /// Wait for the first payload of a round.
    pub const fn payload_wait(&self) -> Duration {
        Duration::from_secs(self.payload_wait_secs)
    }

    /// Bound for the ignore-list check.
    pub const fn ignore_check_timeout(&self) -> Duration {
        Duration::from_secs(self.ignore_check_secs)
    }

    /// Pause after a reload before the checkbox is clicked again.
    pub const fn reload_settle(&self) -> Duration {
        Duration::from_millis(self.reload_settle_ms)
    }

    /// Pause before retrying after a rejected verdict.
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_challenge_attempts: default_max_challenge_attempts(),
            max_resets: default_max_resets(),
            execution_timeout_secs: default_execution_timeout_secs(),
            response_timeout_secs: default_response_timeout_secs(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            payload_wait_secs: default_payload_wait_secs(),
            ignore_check_secs: default_ignore_check_secs(),
            reload_settle_ms: default_reload_settle_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_on_failure: default_retry_on_failure(),
            ignore_request_questions: vec![],
            verdict_archive_dir: None,
        }
    }
}

/// Rotation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RotationConfig {
    /// Models in priority order, highest first
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Model moved to the front of the priority list
    #[serde(default)]
    pub preferred_model: Option<String>,

    /// Provider credentials
    #[serde(default)]
    pub credentials: Vec<Credential>,

    /// Passes over every (credential, model) pair within one inference call
    #[serde(default = "default_cycles")]
    pub cycles: u32,

    /// Pause between attempts inside one inference call, in milliseconds
    #[serde(default)]
    pub retry_wait_ms: u64,
}

fn default_models() -> Vec<String> {
    vec!["gemini-2.5-flash".to_string(), "gemini-2.5-flash-lite".to_string()]
}

const fn default_cycles() -> u32 {
    3
}

impl RotationConfig {
    /// Pause between attempts inside one inference call.
    pub const fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            preferred_model: None,
            credentials: vec![],
            cycles: default_cycles(),
            retry_wait_ms: 0,
        }
    }
}

/// Quota ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LedgerConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_ledger_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// UTC hour at which daily quotas reset (0-23)
    #[serde(default = "default_reset_hour_utc")]
    pub reset_hour_utc: u32,

    /// Hex characters kept from the credential digest (8-64)
    #[serde(default = "default_fingerprint_len")]
    pub fingerprint_len: usize,
}

fn default_ledger_path() -> String {
    ".pilot/quota.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_reset_hour_utc() -> u32 {
    8
}

const fn default_fingerprint_len() -> usize {
    DEFAULT_FINGERPRINT_LEN
}

impl LedgerConfig {
    /// Connection URL for the configured database path.
    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            max_connections: default_max_connections(),
            reset_hour_utc: default_reset_hour_utc(),
            fingerprint_len: default_fingerprint_len(),
        }
    }
}

/// OpenAI-compatible inference endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    /// Base URL, without the `/chat/completions` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    60
}

impl ProviderConfig {
    /// Per-request HTTP timeout.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            temperature: 0.0,
        }
    }
}

/// URL patterns used to classify intercepted network events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InterceptorConfig {
    /// Suffix of the bootstrap script URL
    #[serde(default = "default_bootstrap_suffix")]
    pub bootstrap_suffix: String,

    /// Substring of the payload endpoint URL
    #[serde(default = "default_payload_pattern")]
    pub payload_pattern: String,

    /// Substring of the verdict endpoint URL
    #[serde(default = "default_verdict_pattern")]
    pub verdict_pattern: String,
}

fn default_bootstrap_suffix() -> String {
    "/hsw.js".to_string()
}

fn default_payload_pattern() -> String {
    "/getcaptcha/".to_string()
}

fn default_verdict_pattern() -> String {
    "/checkcaptcha/".to_string()
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            bootstrap_suffix: default_bootstrap_suffix(),
            payload_pattern: default_payload_pattern(),
            verdict_pattern: default_verdict_pattern(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation of log files: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_retention_days() -> u32 {
    14
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            retention_days: default_retention_days(),
        }
    }
}
