//! Configuration management
//!
//! All settings are read once at process start and treated as immutable for
//! the process lifetime. Credential material never lives in the config file;
//! it is resolved from the environment or the OS keyring.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable checked before the keyring for the model API key
pub const API_KEY_ENV: &str = "LINGUA_COACH_API_KEY";

const SERVICE_NAME: &str = "lingua-coach";
const API_KEY_USERNAME: &str = "model-api-key";
const API_KEY_FILE: &str = "api_key.txt";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Remote tutor model settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Mastery tracker tuning
    #[serde(default)]
    pub mastery: MasteryConfig,
    /// Review scheduler tuning
    #[serde(default)]
    pub srs: SrsConfig,
    /// Storage settings
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Remote model settings. `enable_llm = false` or a missing credential selects
/// the deterministic stub client at start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_true")]
    pub enable_llm: bool,
    /// Log each raw model call (input, output, latency) at INFO
    #[serde(default)]
    pub log_model_calls: bool,
}

fn default_provider() -> String {
    "openrouter".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "meta-llama/llama-3.1-8b-instruct".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            enable_llm: default_true(),
            log_model_calls: false,
        }
    }
}

/// When findings become review items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecyclePolicy {
    /// Enqueue a review item for every persisted finding with skill keys
    #[default]
    Immediate,
    /// Leave findings unrecycled; an external caller converts them in batches
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryConfig {
    /// Proficiency decrease per error exposure
    #[serde(default = "default_error_step")]
    pub error_step: f64,
    /// Proficiency increase factor per success exposure (diminishing returns)
    #[serde(default = "default_success_step")]
    pub success_step: f64,
    /// Read-time decay never moves a proficiency below this floor
    #[serde(default = "default_decay_floor")]
    pub decay_floor: f64,
    /// Half-life of the read-time decay, in days
    #[serde(default = "default_decay_half_life_days")]
    pub decay_half_life_days: f64,
    /// Proficiency assigned on first exposure to a skill
    #[serde(default = "default_initial_proficiency")]
    pub initial_proficiency: f64,
    #[serde(default)]
    pub recycle_policy: RecyclePolicy,
}

fn default_error_step() -> f64 {
    0.15
}

fn default_success_step() -> f64 {
    0.20
}

fn default_decay_floor() -> f64 {
    0.2
}

fn default_decay_half_life_days() -> f64 {
    30.0
}

fn default_initial_proficiency() -> f64 {
    0.5
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            error_step: default_error_step(),
            success_step: default_success_step(),
            decay_floor: default_decay_floor(),
            decay_half_life_days: default_decay_half_life_days(),
            initial_proficiency: default_initial_proficiency(),
            recycle_policy: RecyclePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsConfig {
    /// Fixed learning-phase intervals, in days
    #[serde(default = "default_learning_steps")]
    pub learning_steps_days: Vec<f64>,
    /// Interval assigned when a card graduates to the review phase
    #[serde(default = "default_graduating_interval")]
    pub graduating_interval_days: f64,
    #[serde(default = "default_ease_start")]
    pub ease_start: f64,
    #[serde(default = "default_ease_min")]
    pub ease_min: f64,
    #[serde(default = "default_ease_max")]
    pub ease_max: f64,
    /// Default cap on `get_due` results
    #[serde(default = "default_due_limit")]
    pub due_limit: usize,
}

fn default_learning_steps() -> Vec<f64> {
    vec![1.0, 3.0]
}

fn default_graduating_interval() -> f64 {
    7.0
}

fn default_ease_start() -> f64 {
    2.5
}

fn default_ease_min() -> f64 {
    1.3
}

fn default_ease_max() -> f64 {
    3.0
}

fn default_due_limit() -> usize {
    20
}

impl Default for SrsConfig {
    fn default() -> Self {
        Self {
            learning_steps_days: default_learning_steps(),
            graduating_interval_days: default_graduating_interval(),
            ease_start: default_ease_start(),
            ease_min: default_ease_min(),
            ease_max: default_ease_max(),
            due_limit: default_due_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Resolve the database path, creating the data directory if needed
    pub fn resolve_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        Ok(data_dir()?.join("coach.db"))
    }
}

impl Config {
    /// Load configuration from file, writing defaults on first run
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent().context("Config path has no parent")?;

        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents).context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "lingua-coach", "lingua-coach")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "lingua-coach", "lingua-coach")
        .context("Failed to get project directories")?;
    let dir = base.data_dir().to_path_buf();
    std::fs::create_dir_all(&dir).context("Failed to create data directory")?;
    Ok(dir)
}

fn api_key_file_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "lingua-coach", "lingua-coach")
        .context("Failed to get project directories")?;
    let dir = base.config_dir();
    std::fs::create_dir_all(dir).context("Failed to create config directory")?;
    Ok(dir.join(API_KEY_FILE))
}

/// Resolve the model API key: environment first, then keyring, then the
/// file fallback. `None` means no credential is configured, which selects
/// stub mode at start-up.
pub fn get_api_key() -> Option<String> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        let key = key.trim().to_string();
        if !key.is_empty() {
            return Some(key);
        }
    }

    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        if let Ok(key) = entry.get_password() {
            return Some(key);
        }
    }

    let path = api_key_file_path().ok()?;
    let key = std::fs::read_to_string(path).ok()?;
    let key = key.trim().to_string();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Set the model API key - tries keyring first, falls back to a 0600 file
pub fn set_api_key(key: &str) -> Result<()> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        if entry.set_password(key).is_ok() {
            return Ok(());
        }
    }

    let path = api_key_file_path()?;
    std::fs::write(&path, key).context("Failed to write API key file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .context("Failed to set file permissions")?;
    }

    Ok(())
}

/// Delete the model API key from both keyring and file
pub fn delete_api_key() -> Result<()> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        let _ = entry.delete_credential();
    }

    let path = api_key_file_path()?;
    if path.exists() {
        std::fs::remove_file(&path).context("Failed to remove API key file")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.retry_attempts, 2);
        assert!(config.llm.enable_llm);
        assert_eq!(config.mastery.recycle_policy, RecyclePolicy::Immediate);
        assert_eq!(config.srs.learning_steps_days, vec![1.0, 3.0]);
        assert_eq!(config.srs.due_limit, 20);
    }

    #[test]
    fn test_recycle_policy_parses_lowercase() {
        let config: Config = toml::from_str("[mastery]\nrecycle_policy = \"manual\"\n").unwrap();
        assert_eq!(config.mastery.recycle_policy, RecyclePolicy::Manual);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.srs.graduating_interval_days, config.srs.graduating_interval_days);
        assert_eq!(parsed.llm.model, config.llm.model);
    }
}
