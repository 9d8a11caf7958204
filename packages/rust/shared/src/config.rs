//! Application configuration for Lectio.
//!
//! User config lives at `~/.lectio/lectio.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LectioError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lectio.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lectio";

// ---------------------------------------------------------------------------
// Config structs (matching lectio.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Text-generation service settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Per-run spending ceiling and token pricing.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Retry and backoff tuning.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Liturgical calendar lookup.
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Curated prayer dataset.
    #[serde(default)]
    pub prayers: PrayersConfig,

    /// Catechism citation checks.
    #[serde(default)]
    pub citations: CitationsConfig,

    /// Where bundles are written.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Service base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Hard output cap for synopsis requests.
    #[serde(default = "default_synopsis_max_tokens")]
    pub synopsis_max_tokens: u32,

    /// Hard output cap for reflection requests.
    #[serde(default = "default_reflection_max_tokens")]
    pub reflection_max_tokens: u32,

    /// Output size assumed by the cost pre-flight for a synopsis.
    #[serde(default = "default_synopsis_expected_output")]
    pub synopsis_expected_output_tokens: u64,

    /// Output size assumed by the cost pre-flight for a reflection.
    #[serde(default = "default_reflection_expected_output")]
    pub reflection_expected_output_tokens: u64,

    /// Maximum synopsis requests in flight at once.
    #[serde(default = "default_synopsis_concurrency")]
    pub synopsis_concurrency: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            synopsis_max_tokens: default_synopsis_max_tokens(),
            reflection_max_tokens: default_reflection_max_tokens(),
            synopsis_expected_output_tokens: default_synopsis_expected_output(),
            reflection_expected_output_tokens: default_reflection_expected_output(),
            synopsis_concurrency: default_synopsis_concurrency(),
        }
    }
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn default_model() -> String {
    "claude-3-5-sonnet-20241022".into()
}
fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_synopsis_max_tokens() -> u32 {
    100
}
fn default_reflection_max_tokens() -> u32 {
    2000
}
fn default_synopsis_expected_output() -> u64 {
    60
}
fn default_reflection_expected_output() -> u64 {
    900
}
fn default_synopsis_concurrency() -> u32 {
    4
}

/// `[budget]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum spend for one day's content, in USD.
    #[serde(default = "default_ceiling")]
    pub ceiling_usd: f64,

    /// USD per million input tokens.
    #[serde(default = "default_input_rate")]
    pub input_cost_per_million: f64,

    /// USD per million output tokens.
    #[serde(default = "default_output_rate")]
    pub output_cost_per_million: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            ceiling_usd: default_ceiling(),
            input_cost_per_million: default_input_rate(),
            output_cost_per_million: default_output_rate(),
        }
    }
}

fn default_ceiling() -> f64 {
    0.04
}
fn default_input_rate() -> f64 {
    3.0
}
fn default_output_rate() -> f64 {
    15.0
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts for transport failures (connectivity, rate limits).
    #[serde(default = "default_attempts")]
    pub transport_max_attempts: u32,

    /// Total attempts for structurally invalid output.
    #[serde(default = "default_attempts")]
    pub validation_max_attempts: u32,

    /// Backoff base; attempt `n` waits `base × 2^(n-1)`.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Upper bound on a single backoff sleep.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transport_max_attempts: default_attempts(),
            validation_max_attempts: default_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    4_000
}

/// Where liturgical day information comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarSourceKind {
    /// Query a romcal-compatible HTTP endpoint.
    Http,
    /// Read a JSON file keyed by date.
    File,
    /// Skip the lookup; every day is an ordinary weekday.
    None,
}

/// `[calendar]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_calendar_source")]
    pub source: CalendarSourceKind,

    /// Base URL for the HTTP source; the date is appended as `/<YYYY-MM-DD>`.
    #[serde(default = "default_calendar_url")]
    pub base_url: String,

    /// JSON file for the file source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default = "default_calendar_timeout")]
    pub timeout_secs: u64,

    /// Saint biography file; the embedded directory is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saints_file: Option<String>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            source: default_calendar_source(),
            base_url: default_calendar_url(),
            file: None,
            timeout_secs: default_calendar_timeout(),
            saints_file: None,
        }
    }
}

fn default_calendar_source() -> CalendarSourceKind {
    CalendarSourceKind::Http
}
fn default_calendar_url() -> String {
    "http://localhost:3210/calendar".into()
}
fn default_calendar_timeout() -> u64 {
    10
}

/// `[prayers]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrayersConfig {
    /// Dataset file; the embedded dataset is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_path: Option<String>,
}

/// `[citations]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationsConfig {
    /// Probe the Vatican archive for each cited paragraph (advisory only).
    #[serde(default)]
    pub verify_remote: bool,

    #[serde(default = "default_citation_timeout")]
    pub timeout_secs: u64,
}

impl Default for CitationsConfig {
    fn default() -> Self {
        Self {
            verify_remote: false,
            timeout_secs: default_citation_timeout(),
        }
    }
}

fn default_citation_timeout() -> u64 {
    5
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "_site/bundles".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lectio/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LectioError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lectio/lectio.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LectioError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LectioError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LectioError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LectioError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LectioError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the generation API key from `var_name`; it must be set and non-empty.
pub fn validate_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(LectioError::config_with_hint(
            "text-generation API key not found",
            format!("set the {var_name} environment variable"),
        )),
    }
}

impl AppConfig {
    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(self.budget.ceiling_usd > 0.0) {
            return Err(LectioError::config_with_hint(
                format!("budget.ceiling_usd must be positive, got {}", self.budget.ceiling_usd),
                "set [budget] ceiling_usd to e.g. 0.04",
            ));
        }
        if self.budget.input_cost_per_million < 0.0 || self.budget.output_cost_per_million < 0.0 {
            return Err(LectioError::config("token rates cannot be negative"));
        }
        if self.retry.transport_max_attempts == 0 || self.retry.validation_max_attempts == 0 {
            return Err(LectioError::config("retry attempts must be at least 1"));
        }
        if self.generation.synopsis_concurrency == 0 {
            return Err(LectioError::config(
                "generation.synopsis_concurrency must be at least 1",
            ));
        }
        if self.calendar.source == CalendarSourceKind::File && self.calendar.file.is_none() {
            return Err(LectioError::config_with_hint(
                "calendar.source is \"file\" but calendar.file is not set",
                "point [calendar] file at a JSON calendar export",
            ));
        }
        Ok(())
    }
}
