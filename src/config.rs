use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::client::DEFAULT_API_URL;

const CONFIG_FILE: &str = "dashboard_config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub workspace_id: String,

    #[serde(default)]
    pub bot_id: String,

    #[serde(default)]
    pub settings: Settings,

    #[serde(skip)]
    pub config_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Integration whose conversations are shown.
    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default = "default_true")]
    pub hide_empty_conversations: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_message_poll_interval")]
    pub message_poll_interval_secs: u64,

    #[serde(default = "default_initial_load_attempts")]
    pub initial_load_attempts: usize,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    #[serde(default = "default_near_bottom_threshold")]
    pub near_bottom_threshold: f32,

    #[serde(default = "default_notice_secs")]
    pub notice_secs: u64,

    #[serde(default = "default_rate_limit_notice_secs")]
    pub rate_limit_notice_secs: u64,

    #[serde(default = "default_true")]
    pub show_timestamps: bool,

    #[serde(default = "default_viewport_rows")]
    pub viewport_rows: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            hide_empty_conversations: true,
            poll_interval_secs: default_poll_interval(),
            message_poll_interval_secs: default_message_poll_interval(),
            initial_load_attempts: default_initial_load_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            near_bottom_threshold: default_near_bottom_threshold(),
            notice_secs: default_notice_secs(),
            rate_limit_notice_secs: default_rate_limit_notice_secs(),
            show_timestamps: true,
            viewport_rows: default_viewport_rows(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_channel() -> String {
    "whatsapp".to_string()
}

fn default_poll_interval() -> u64 {
    15
}

fn default_message_poll_interval() -> u64 {
    20
}

fn default_initial_load_attempts() -> usize {
    5
}

fn default_retry_base_delay() -> u64 {
    250
}

fn default_retry_max_delay() -> u64 {
    4_000
}

fn default_near_bottom_threshold() -> f32 {
    50.0
}

fn default_notice_secs() -> u64 {
    3
}

fn default_rate_limit_notice_secs() -> u64 {
    30
}

fn default_viewport_rows() -> usize {
    20
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_dir = Self::get_config_dir();
        let config_path = config_dir.join(CONFIG_FILE);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let mut config = Self::parse(&content)?;
            config.config_dir = config_dir;
            config
        } else {
            Self::create_new(config_dir)?
        };

        config.apply_env();
        if !config.has_credentials() {
            anyhow::bail!(
                "Missing credentials: set token, workspace_id and bot_id in {:?}",
                config_path
            );
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(content)?;
        config.api_url = config.api_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = self.config_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(&self)?;
        fs::write(config_path, content)?;
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        !self.token.is_empty() && !self.workspace_id.is_empty() && !self.bot_id.is_empty()
    }

    /// Environment variables win over values stored on disk.
    fn apply_env(&mut self) {
        let overrides = [
            ("BOTPRESS_TOKEN", &mut self.token),
            ("BOTPRESS_WORKSPACE_ID", &mut self.workspace_id),
            ("BOTPRESS_BOT_ID", &mut self.bot_id),
        ];
        for (key, slot) in overrides {
            if let Ok(value) = std::env::var(key) {
                if !value.trim().is_empty() {
                    *slot = value.trim().to_string();
                }
            }
        }
    }

    fn create_new(config_dir: PathBuf) -> Result<Self> {
        use std::io::{self, Write};

        fs::create_dir_all(&config_dir)?;

        println!("=== Dashboard Setup ===");
        println!("Credentials are read from {:?}", config_dir.join(CONFIG_FILE));
        println!("Leave a field empty to provide it through the environment instead.");
        println!();

        let prompt = |label: &str| -> Result<String> {
            print!("{}: ", label);
            io::stdout().flush()?;
            let mut value = String::new();
            io::stdin().read_line(&mut value)?;
            Ok(value.trim().to_string())
        };

        let token = prompt("Personal access token")?;
        let workspace_id = prompt("Workspace ID")?;
        let bot_id = prompt("Bot ID")?;

        let config = Config {
            api_url: default_api_url(),
            token,
            workspace_id,
            bot_id,
            settings: Settings::default(),
            config_dir,
        };

        config.save()?;
        Ok(config)
    }

    fn get_config_dir() -> PathBuf {
        // First check current directory
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        if current_dir.join(CONFIG_FILE).exists() {
            return current_dir;
        }

        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_dir).join("botpress_dashboard_rs")
        } else if let Some(home) = dirs::home_dir() {
            home.join(".config").join("botpress_dashboard_rs")
        } else {
            PathBuf::from(".botpress_dashboard_rs")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_gets_defaults() {
        let config = Config::parse(
            r#"{"token": "t", "workspace_id": "w", "bot_id": "b", "api_url": "https://example.com/"}"#,
        )
        .unwrap();

        assert!(config.has_credentials());
        assert_eq!(config.api_url, "https://example.com");
        assert_eq!(config.settings.channel, "whatsapp");
        assert_eq!(config.settings.poll_interval_secs, 15);
        assert_eq!(config.settings.initial_load_attempts, 5);
        assert!(config.settings.hide_empty_conversations);
    }

    #[test]
    fn test_settings_override() {
        let config = Config::parse(
            r#"{"settings": {"channel": "telegram", "hide_empty_conversations": false, "poll_interval_secs": 30}}"#,
        )
        .unwrap();

        assert!(!config.has_credentials());
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.settings.channel, "telegram");
        assert!(!config.settings.hide_empty_conversations);
        assert_eq!(config.settings.poll_interval_secs, 30);
        assert_eq!(config.settings.message_poll_interval_secs, 20);
    }
}
