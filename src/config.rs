//! Configuration for lithium-watch.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (LITHIUM_WATCH_HOME, GEMINI_API_KEY, GEMINI_MODEL,
//!    SUPABASE_URL, SUPABASE_KEY, LITHIUM_WATCH_ADDR)
//! 2. Config file (.lithium-watch/config.yaml)
//! 3. Defaults (~/.lithium-watch)
//!
//! Config file discovery:
//! - Searches current directory and parents for .lithium-watch/config.yaml
//! - A relative `home` is resolved against the .lithium-watch/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::budget::ScanBudget;
use crate::core::pacing::PacingPolicy;
use crate::core::retry::RetryPolicy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".lithium-watch";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    /// Ledger directory (relative to .lithium-watch/)
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub budget: Option<ScanBudget>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupabaseConfig {
    pub url: Option<String>,
    pub key: Option<String>,
    pub table: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DedupConfig {
    /// Fuzzy window half-width in days
    pub window_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PacingConfig {
    /// Gap between consecutive oracle calls inside one scan
    pub half_delay_ms: Option<u64>,
    /// Gap between runner tasks
    pub task_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    pub base_url: Option<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Gemini connection settings
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            temperature: 0.1,
            max_output_tokens: 8192,
        }
    }
}

/// Supabase connection settings
#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub url: Option<String>,
    pub key: Option<String>,
    pub table: String,
}

impl Default for SupabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            table: "incidents".to_string(),
        }
    }
}

/// Telegram channel search settings
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub base_url: String,
    pub channels: Vec<String>,
    pub keywords: Vec<String>,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            base_url: "https://t.me".to_string(),
            channels: Vec::new(),
            keywords: vec![
                "שריפה אופניים חשמליים".to_string(),
                "סוללת ליתיום".to_string(),
                "קורקינט חשמלי שריפה".to_string(),
            ],
        }
    }
}

/// Resolved configuration with defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the state directory (run ledger)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub gemini: GeminiSettings,
    pub supabase: SupabaseSettings,
    /// Fuzzy duplicate window in days
    pub window_days: u32,
    /// Pacing between oracle calls inside a scan
    pub scan_pacing: PacingPolicy,
    /// Pacing between runner tasks
    pub task_pacing: PacingPolicy,
    pub retry: RetryPolicy,
    pub budget: ScanBudget,
    pub server_address: String,
    pub telegram: TelegramSettings,
}

pub const DEFAULT_WINDOW_DAYS: u32 = 3;
pub const DEFAULT_HALF_DELAY_MS: u64 = 1000;
pub const DEFAULT_TASK_DELAY_MS: u64 = 3000;
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:8080";

impl ResolvedConfig {
    /// Directory holding one sub-directory per runner invocation
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }

    pub fn request_timeout(&self) -> Duration {
        self.budget.request_timeout()
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse config YAML content
pub fn parse_config(content: &str) -> Result<ConfigFile> {
    serde_yaml::from_str(content).context("Invalid config YAML")
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge file settings, environment and defaults.
///
/// `env` is a lookup so tests don't depend on the process environment.
pub fn resolve<F>(
    file: ConfigFile,
    config_path: Option<PathBuf>,
    default_home: PathBuf,
    env: F,
) -> ResolvedConfig
where
    F: Fn(&str) -> Option<String>,
{
    let home = if let Some(env_home) = env("LITHIUM_WATCH_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(home), Some(path)) = (file.home.as_deref(), config_path.as_deref()) {
        let config_dir = path.parent().unwrap_or(Path::new("."));
        resolve_path(config_dir, home)
    } else {
        default_home
    };

    let gemini_defaults = GeminiSettings::default();
    let gemini = GeminiSettings {
        api_key: env("GEMINI_API_KEY").or(file.gemini.api_key),
        model: env("GEMINI_MODEL")
            .or(file.gemini.model)
            .unwrap_or(gemini_defaults.model),
        base_url: file.gemini.base_url.unwrap_or(gemini_defaults.base_url),
        temperature: file.gemini.temperature.unwrap_or(gemini_defaults.temperature),
        max_output_tokens: file
            .gemini
            .max_output_tokens
            .unwrap_or(gemini_defaults.max_output_tokens),
    };

    let supabase = SupabaseSettings {
        url: env("SUPABASE_URL").or(file.supabase.url),
        key: env("SUPABASE_KEY").or(file.supabase.key),
        table: file
            .supabase
            .table
            .unwrap_or_else(|| SupabaseSettings::default().table),
    };

    let telegram_defaults = TelegramSettings::default();
    let telegram = TelegramSettings {
        base_url: file.telegram.base_url.unwrap_or(telegram_defaults.base_url),
        channels: file.telegram.channels,
        keywords: if file.telegram.keywords.is_empty() {
            telegram_defaults.keywords
        } else {
            file.telegram.keywords
        },
    };

    ResolvedConfig {
        home,
        config_file: config_path,
        gemini,
        supabase,
        window_days: file.dedup.window_days.unwrap_or(DEFAULT_WINDOW_DAYS),
        scan_pacing: PacingPolicy::from_millis(
            file.pacing.half_delay_ms.unwrap_or(DEFAULT_HALF_DELAY_MS),
        ),
        task_pacing: PacingPolicy::from_millis(
            file.pacing.task_delay_ms.unwrap_or(DEFAULT_TASK_DELAY_MS),
        ),
        retry: file.retry.unwrap_or_default(),
        budget: file.budget.unwrap_or_default(),
        server_address: env("LITHIUM_WATCH_ADDR")
            .or(file.server.address)
            .unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string()),
        telegram,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let config_path = find_config_file();
    let file = match config_path {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    Ok(resolve(file, config_path, default_home, |key| {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Get the runs directory ($LITHIUM_WATCH_HOME/runs)
pub fn runs_dir() -> Result<PathBuf> {
    Ok(config()?.runs_dir())
}
