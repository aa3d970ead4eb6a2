//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::app::AppSettings;
use crate::application::errors::ConfigError;
use crate::domain::entities::UserId;

/// Token written into a fresh config file
pub const TOKEN_PLACEHOLDER: &str = "input here BotToken.";

/// Prefixes the bot answers to out of the box
pub const DEFAULT_PREFIXES: [&str; 5] = [
    "陽菜ちゃん、",
    "お願い陽菜ちゃん、",
    "はるなちゃん、",
    "おねがいはるなちゃん、",
    "!HB:",
];

/// Bot configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub token: String,
    pub prefixes: Vec<String>,
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

fn default_frame_interval() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SupervisorConfig {
    pub user_id: UserId,
    #[serde(default)]
    pub sub_supervisors: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub database: String,
    pub conversation_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("SaveData"),
            database: "club.db".to_string(),
            conversation_file: "kaiwa.json".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MessagesConfig {
    pub not_permitted: String,
    pub supervisor_name: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            not_permitted: "ごめんなさい、そのお願いは%SV_NAME%からしか聞けないの。".to_string(),
            supervisor_name: "お父さん".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdaptersConfig {
    pub console: Option<ConsoleConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleConfig {
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "haruna-bot".to_string(),
                token: TOKEN_PLACEHOLDER.to_string(),
                prefixes: DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect(),
                frame_interval_ms: default_frame_interval(),
                user_id: None,
            },
            supervisor: SupervisorConfig {
                user_id: 0,
                sub_supervisors: Vec::new(),
            },
            storage: StorageConfig::default(),
            messages: MessagesConfig::default(),
            adapters: AdaptersConfig {
                console: Some(ConsoleConfig { enabled: true }),
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), yaml)
            .map_err(|e| ConfigError::InvalidValue(format!("Failed to write config: {}", e)))
    }

    /// Defaults plus environment overrides
    pub fn load_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Apply `BOT_TOKEN`, `BOT_PREFIXES` and `BOT_SUPERVISOR_ID` when set
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var("BOT_TOKEN").ok(),
            std::env::var("BOT_PREFIXES").ok(),
            std::env::var("BOT_SUPERVISOR_ID").ok(),
        );
    }

    fn apply_overrides(&mut self, token: Option<String>, prefixes: Option<String>, supervisor: Option<String>) {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.bot.token = token;
        }

        if let Some(prefixes) = prefixes {
            let list: Vec<String> = prefixes
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            if !list.is_empty() {
                self.bot.prefixes = list;
            }
        }

        if let Some(id) = supervisor {
            match id.trim().parse() {
                Ok(id) => self.supervisor.user_id = id,
                Err(_) => tracing::warn!("Ignoring BOT_SUPERVISOR_ID, not a user id: {}", id),
            }
        }
    }

    /// A config whose token is still the placeholder has not been filled in
    pub fn is_set_up(&self) -> bool {
        let token = self.bot.token.trim();
        !token.is_empty() && token != TOKEN_PLACEHOLDER
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_set_up() {
            return Err(ConfigError::NotSetUp("bot.token".to_string()));
        }
        if self.bot.prefixes.iter().all(|p| p.is_empty()) {
            return Err(ConfigError::MissingField("bot.prefixes".to_string()));
        }
        if self.supervisor.user_id == 0 {
            return Err(ConfigError::MissingField("supervisor.user-id".to_string()));
        }
        Ok(())
    }

    pub fn app_settings(&self) -> AppSettings {
        AppSettings {
            token: self.bot.token.clone(),
            prefixes: self.bot.prefixes.clone(),
            frame_interval: Duration::from_millis(self.bot.frame_interval_ms),
            supervisor: self.supervisor.user_id,
            sub_supervisors: self.supervisor.sub_supervisors.clone(),
            supervisor_name: self.messages.supervisor_name.clone(),
            not_permitted: self.messages.not_permitted.clone(),
        }
    }

    pub fn console_enabled(&self) -> bool {
        self.adapters.console.as_ref().map(|c| c.enabled).unwrap_or(false)
    }
}
