use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "http://localhost:8800/api";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub timeout_secs: u64,
    pub log_level: String,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 30,
            log_level: "info".to_string(),
            data_dir: None,
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "jobquest-admin")
}

impl Settings {
    /// Defaults, then `config.toml` from the platform config directory, then
    /// `JOBQUEST_*` environment variables.
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("api_url", DEFAULT_API_URL)?
            .set_default("timeout_secs", 30)?
            .set_default("log_level", "info")?;

        if let Some(path) = Self::config_file() {
            builder = builder.add_source(File::from(path).required(false));
        }

        let settings: Settings = builder
            .add_source(Environment::with_prefix("JOBQUEST").try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    pub fn config_file() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Where the session store and log file live.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Host serving uploaded files: the API URL without its `/api` suffix.
    pub fn asset_base(&self) -> String {
        let trimmed = self.api_url.trim_end_matches('/');
        trimmed.strip_suffix("/api").unwrap_or(trimmed).to_string()
    }

    pub fn avatar_url(&self, avatar: Option<&str>) -> String {
        let file = avatar.filter(|a| !a.is_empty()).unwrap_or("avatar.avif");
        format!("{}/images/{}", self.asset_base(), file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_base_strips_api_suffix() {
        let settings = Settings::default();
        assert_eq!(settings.asset_base(), "http://localhost:8800");

        let settings = Settings {
            api_url: "https://jobs.example.vn/api/".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.asset_base(), "https://jobs.example.vn");

        let settings = Settings {
            api_url: "https://jobs.example.vn".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.asset_base(), "https://jobs.example.vn");
    }

    #[test]
    fn test_avatar_url_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.avatar_url(None), "http://localhost:8800/images/avatar.avif");
        assert_eq!(settings.avatar_url(Some("")), "http://localhost:8800/images/avatar.avif");
        assert_eq!(settings.avatar_url(Some("u1.png")), "http://localhost:8800/images/u1.png");
    }

    #[test]
    fn test_data_dir_override() {
        let settings = Settings {
            data_dir: Some(PathBuf::from("/tmp/jq")),
            ..Settings::default()
        };
        assert_eq!(settings.data_dir(), PathBuf::from("/tmp/jq"));
    }
}
