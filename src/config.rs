use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_host() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_digest_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}

fn default_quant_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_deals_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_resources_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}

fn default_vision_model() -> String {
    "gemini-2.0-flash".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
}

/// One model profile per operation; all overridable from config.toml.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    #[serde(default = "default_digest_model")]
    pub digest: String,
    #[serde(default = "default_quant_model")]
    pub quant: String,
    #[serde(default = "default_deals_model")]
    pub deals: String,
    #[serde(default = "default_resources_model")]
    pub resources: String,
    #[serde(default = "default_vision_model")]
    pub vision: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: default_host(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        ModelsConfig {
            digest: default_digest_model(),
            quant: default_quant_model(),
            deals: default_deals_model(),
            resources: default_resources_model(),
            vision: default_vision_model(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 1280,
            height: 800,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api: ApiConfig::default(),
            models: ModelsConfig::default(),
            window: WindowConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => eprintln!("Error parsing config.toml: {}. Using defaults.", e),
                },
                Err(e) => eprintln!("Error reading config.toml: {}. Using defaults.", e),
            }
        } else if let Some(parent) = config_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        Config::default()
    }

    pub fn get_config_path() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/quantdesk/config.toml")
        } else {
            PathBuf::from("config.toml")
        }
    }
}

/// The service credential is process-wide and read once at startup.
pub fn api_key() -> String {
    std::env::var("GEMINI_API_KEY").unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_distinct_models() {
        let models = ModelsConfig::default();
        let mut ids = vec![
            models.digest,
            models.quant,
            models.deals,
            models.resources,
            models.vision,
        ];
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [models]
            quant = "gemini-exp-override"

            [window]
            width = 1600
            height = 900
            "#,
        )
        .unwrap();

        assert_eq!(config.models.quant, "gemini-exp-override");
        assert_eq!(config.models.digest, default_digest_model());
        assert_eq!(config.api.host, default_host());
        assert_eq!(config.window.width, 1600);
    }
}
