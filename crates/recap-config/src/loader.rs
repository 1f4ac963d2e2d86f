use std::path::{Path, PathBuf};

use recap_common::{Error, Result};
use tracing::{debug, info, warn};

use crate::model::AppConfig;

pub const DEFAULT_CONFIG_FILE: &str = "recap.yml";

/// Reads `AppConfig` from YAML, then layers `.env` and process environment
/// overrides on top.
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config file (defaults when absent), apply environment
    /// overrides, and validate.
    pub fn load(&self) -> Result<AppConfig> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => warn!("failed to read .env file: {e}"),
        }

        let mut config = self.load_file()?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        validate(&config)?;
        Ok(config)
    }

    fn load_file(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            info!(
                "no config file at {}, using defaults",
                self.path.display()
            );
            return Ok(AppConfig::default());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        parse_yaml(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", self.path.display())))
    }

    /// Write the default configuration to the loader's path.
    pub fn write_default(&self) -> Result<()> {
        if self.path.exists() {
            return Err(Error::Config(format!(
                "{} already exists",
                self.path.display()
            )));
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(&AppConfig::default())
            .map_err(|e| Error::Config(format!("failed to render default config: {e}")))?;
        std::fs::write(&self.path, yaml)?;
        info!("wrote default config to {}", self.path.display());
        Ok(())
    }
}

pub fn parse_yaml(raw: &str) -> Result<AppConfig> {
    if raw.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(raw).map_err(|e| Error::Config(format!("invalid yaml: {e}")))
}

/// Apply `RECAP_*` overrides from `lookup`.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup("RECAP_API_KEY") {
        config.llm.api_key = Some(key);
    }
    if let Some(url) = lookup("RECAP_BASE_URL").filter(|v| !v.trim().is_empty()) {
        config.llm.base_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(models) = lookup("RECAP_MODELS") {
        config.llm.models = split_models(&models);
    }
    if let Some(path) = lookup("RECAP_DB_PATH").filter(|v| !v.trim().is_empty()) {
        config.storage.db_path = PathBuf::from(path);
    }
    if let Some(port) = lookup("RECAP_PORT") {
        match port.trim().parse() {
            Ok(port) => config.gateway.port = port,
            Err(_) => warn!("ignoring invalid RECAP_PORT value '{port}'"),
        }
    }
}

/// Split a comma separated model list, dropping blanks and duplicates while
/// keeping the first occurrence's position.
pub fn split_models(raw: &str) -> Vec<String> {
    let mut models: Vec<String> = Vec::new();
    for model in raw.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        if !models.iter().any(|existing| existing == model) {
            models.push(model.to_string());
        }
    }
    models
}

pub fn validate(config: &AppConfig) -> Result<()> {
    let llm = &config.llm;
    if llm.api_key().is_some() && llm.models.is_empty() {
        return Err(Error::Config(
            "llm.models must list at least one model when an api key is set".into(),
        ));
    }
    if llm.max_attempts_per_model == 0 {
        return Err(Error::Config(
            "llm.max_attempts_per_model must be at least 1".into(),
        ));
    }
    if llm.timeout_secs == 0 {
        return Err(Error::Config("llm.timeout_secs must be positive".into()));
    }
    if config.summary.history_capacity == 0 {
        return Err(Error::Config(
            "summary.history_capacity must be at least 1".into(),
        ));
    }
    Ok(())
}
