use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".wakareport";
const CONFIG_FILE: &str = "config.json";
const PROMPTS_FILE: &str = "prompts.txt";
pub const DEFAULT_MERGE_THRESHOLD_SECONDS: f64 = 300.0;
pub const DEFAULT_MIN_DURATION_MINUTES: f64 = 3.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub wakatime_api_key: Option<String>,
    pub wakatime_base_url: String,
    pub request_timeout_seconds: u64,
    pub merge_threshold_seconds: f64,
    pub min_duration_minutes: f64,
    pub stats_path: PathBuf,
    pub report_dir: PathBuf,
    pub summary_dir: PathBuf,
    pub prompts_path: PathBuf,
    pub ai_enabled: bool,
    pub ai_api_key: Option<String>,
    pub ai_api_base_url: String,
    pub ai_model: String,
    pub ai_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            wakatime_api_key: None,
            wakatime_base_url: "https://wakatime.com/api/v1".to_string(),
            request_timeout_seconds: 30,
            merge_threshold_seconds: DEFAULT_MERGE_THRESHOLD_SECONDS,
            min_duration_minutes: DEFAULT_MIN_DURATION_MINUTES,
            stats_path: root.join("stats").join("coding_stats.json"),
            report_dir: root.join("logs"),
            summary_dir: root.join("summaries"),
            prompts_path: root.join(PROMPTS_FILE),
            ai_enabled: true,
            ai_api_key: None,
            ai_api_base_url: "https://api.openai.com/v1".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_timeout_seconds: 60,
        }
    }
}

impl Config {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(default_root_dir())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    /// Fills API keys from the process environment. Called once while loading so
    /// the rest of the pipeline only ever sees the resolved struct.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = non_empty("WAKATIME_API_KEY") {
            self.wakatime_api_key = Some(key);
        }
        if let Some(key) = non_empty("WAKAREPORT_AI_API_KEY").or_else(|| non_empty("OPENAI_API_KEY"))
        {
            self.ai_api_key = Some(key);
        }

        self
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        let root = Self::root_dir()?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create root directory: {}", root.display()))?;

        if let Some(parent) = self.stats_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create stats directory: {}", parent.display())
            })?;
        }

        [&self.report_dir, &self.summary_dir]
            .into_iter()
            .try_for_each(|dir| {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))
            })?;

        if !self.prompts_path.exists() {
            fs::write(&self.prompts_path, include_str!("../assets/prompts.txt")).with_context(
                || {
                    format!(
                        "Failed to create default prompts file: {}",
                        self.prompts_path.display()
                    )
                },
            )?;
        }

        Ok(())
    }

    pub fn has_wakatime_key(&self) -> bool {
        self.wakatime_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "wakatime_api_key" => {
                self.wakatime_api_key = (!value.trim().is_empty()).then_some(value.to_string());
            }
            "wakatime_base_url" => {
                self.wakatime_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "request_timeout_seconds" => {
                self.request_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("request_timeout_seconds must be a number"))?
                    .max(1);
            }
            "merge_threshold_seconds" => {
                let parsed = value
                    .parse::<f64>()
                    .map_err(|_| anyhow!("merge_threshold_seconds must be a number"))?;
                if !parsed.is_finite() || parsed < 0.0 {
                    bail!("merge_threshold_seconds must be a non-negative number");
                }
                self.merge_threshold_seconds = parsed;
            }
            "min_duration_minutes" => {
                let parsed = value
                    .parse::<f64>()
                    .map_err(|_| anyhow!("min_duration_minutes must be a number"))?;
                if !parsed.is_finite() || parsed < 0.0 {
                    bail!("min_duration_minutes must be a non-negative number");
                }
                self.min_duration_minutes = parsed;
            }
            "stats_path" => {
                self.stats_path = expand_home(value);
            }
            "report_dir" => {
                self.report_dir = expand_home(value);
            }
            "summary_dir" => {
                self.summary_dir = expand_home(value);
            }
            "prompts_path" => {
                self.prompts_path = expand_home(value);
            }
            "ai_enabled" => {
                self.ai_enabled = value
                    .parse::<bool>()
                    .map_err(|_| anyhow!("ai_enabled must be true/false"))?;
            }
            "ai_api_key" => {
                self.ai_api_key = (!value.trim().is_empty()).then_some(value.to_string());
            }
            "ai_api_base_url" => {
                self.ai_api_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "ai_model" => {
                self.ai_model = value.trim().to_string();
            }
            "ai_timeout_seconds" => {
                self.ai_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("ai_timeout_seconds must be a number"))?
                    .max(5);
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: wakatime_api_key|wakatime.api_key, wakatime_base_url|wakatime.base_url, request_timeout_seconds|wakatime.timeout_seconds, merge_threshold_seconds|sessions.merge_threshold, min_duration_minutes|sessions.min_duration, stats_path|stats.path, report_dir|report.dir, summary_dir|summary.dir, prompts_path|prompts.path, ai_enabled|ai.enabled, ai_api_key|ai.api_key, ai_api_base_url|ai.base_url, ai_model|ai.model, ai_timeout_seconds|ai.timeout_seconds"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        let masked = |secret: &Option<String>| {
            secret
                .as_ref()
                .map(|_| "***set***".to_string())
                .unwrap_or_else(|| "not_set".to_string())
        };

        match normalize_config_key(key) {
            "wakatime_api_key" => Some(masked(&self.wakatime_api_key)),
            "wakatime_base_url" => Some(self.wakatime_base_url.clone()),
            "request_timeout_seconds" => Some(self.request_timeout_seconds.to_string()),
            "merge_threshold_seconds" => Some(self.merge_threshold_seconds.to_string()),
            "min_duration_minutes" => Some(self.min_duration_minutes.to_string()),
            "stats_path" => Some(self.stats_path.display().to_string()),
            "report_dir" => Some(self.report_dir.display().to_string()),
            "summary_dir" => Some(self.summary_dir.display().to_string()),
            "prompts_path" => Some(self.prompts_path.display().to_string()),
            "ai_enabled" => Some(self.ai_enabled.to_string()),
            "ai_api_key" => Some(masked(&self.ai_api_key)),
            "ai_api_base_url" => Some(self.ai_api_base_url.clone()),
            "ai_model" => Some(self.ai_model.clone()),
            "ai_timeout_seconds" => Some(self.ai_timeout_seconds.to_string()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "wakatime_api_key" | "wakatime.api_key" => "wakatime_api_key",
        "wakatime_base_url" | "wakatime.base_url" => "wakatime_base_url",
        "request_timeout_seconds" | "wakatime.timeout_seconds" => "request_timeout_seconds",
        "merge_threshold_seconds" | "sessions.merge_threshold" => "merge_threshold_seconds",
        "min_duration_minutes" | "sessions.min_duration" => "min_duration_minutes",
        "stats_path" | "stats.path" => "stats_path",
        "report_dir" | "report.dir" => "report_dir",
        "summary_dir" | "summary.dir" => "summary_dir",
        "prompts_path" | "prompts.path" => "prompts_path",
        "ai_enabled" | "ai.enabled" => "ai_enabled",
        "ai_api_key" | "ai.api_key" => "ai_api_key",
        "ai_api_base_url" | "ai.base_url" => "ai_api_base_url",
        "ai_model" | "ai.model" => "ai_model",
        "ai_timeout_seconds" | "ai.timeout_seconds" => "ai_timeout_seconds",
        _ => key,
    }
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}
