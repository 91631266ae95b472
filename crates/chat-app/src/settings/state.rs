use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use murmur_llm::{
    CompletionConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE,
    EndpointConfig,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::chat::{ControllerOptions, DEFAULT_FOLLOW_THRESHOLD};

pub const SETTINGS_DIRECTORY_NAME: &str = "murmur";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "MURMUR_";
pub const DEFAULT_CHAR_DELAY_MS: u64 = 22;
pub const DEFAULT_REVEAL_LEAD_IN_MS: u64 = 500;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Read from the file or `MURMUR_API_KEY`; never written back out.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_char_delay_ms")]
    pub char_delay_ms: u64,
    #[serde(default = "default_reveal_lead_in_ms")]
    pub reveal_lead_in_ms: u64,
    #[serde(default = "default_follow_threshold")]
    pub follow_threshold: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            char_delay_ms: default_char_delay_ms(),
            reveal_lead_in_ms: default_reveal_lead_in_ms(),
            follow_threshold: default_follow_threshold(),
        }
    }
}

impl std::fmt::Debug for AppSettings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("temperature", &self.temperature)
            .field("char_delay_ms", &self.char_delay_ms)
            .field("reveal_lead_in_ms", &self.reveal_lead_in_ms)
            .field("follow_threshold", &self.follow_threshold)
            .finish()
    }
}

impl AppSettings {
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Returns None when no credential is configured.
    pub fn to_endpoint_config(&self) -> Option<EndpointConfig> {
        if !self.has_credential() {
            return None;
        }

        Some(EndpointConfig::new(&self.endpoint, &self.api_key))
    }

    /// Creates the sampling parameters sent with every request.
    pub fn to_completion_config(&self) -> CompletionConfig {
        CompletionConfig::new(&self.model)
            .with_system_prompt(&self.system_prompt)
            .with_temperature(self.temperature)
    }

    pub fn char_delay(&self) -> Duration {
        Duration::from_millis(self.char_delay_ms)
    }

    pub fn reveal_lead_in(&self) -> Duration {
        Duration::from_millis(self.reveal_lead_in_ms)
    }

    /// Creates the controller timing and scroll options.
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            reveal_lead_in: self.reveal_lead_in(),
            follow_threshold: self.follow_threshold,
        }
    }

    /// Trims text fields and replaces blank or out-of-range values with defaults.
    pub fn normalized(mut self) -> Self {
        self.endpoint = non_blank_or(self.endpoint, default_endpoint);
        self.api_key = self.api_key.trim().to_string();
        self.model = non_blank_or(self.model, default_model);
        self.system_prompt = non_blank_or(self.system_prompt, default_system_prompt);

        if !self.temperature.is_finite() || self.temperature < 0.0 {
            self.temperature = default_temperature();
        }
        if !self.follow_threshold.is_finite() || self.follow_threshold < 0.0 {
            self.follow_threshold = default_follow_threshold();
        }

        self
    }
}

pub struct SettingsStore {
    settings: AppSettings,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".murmur"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Loads settings from `config_path` and the environment, falling back to defaults
    /// when they cannot be extracted.
    pub fn new(config_path: PathBuf) -> Self {
        let settings = match Self::extract(&config_path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(path = ?config_path, %error, "failed to load settings; using defaults");
                AppSettings::default()
            }
        };

        Self {
            settings,
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    /// Like [`SettingsStore::new`], but reports extraction failures instead of hiding them.
    pub fn try_load(config_path: PathBuf) -> Result<Self, SettingsError> {
        let settings = Self::extract(&config_path)?;
        Ok(Self {
            settings,
            config_path,
        })
    }

    /// Returns the loaded settings.
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn extract(path: &Path) -> Result<AppSettings, SettingsError> {
        if !path.exists() {
            tracing::info!(?path, "settings file not found; using defaults and environment");
        }

        let settings = Figment::from(Serialized::defaults(AppSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract::<AppSettings>()
            .map_err(Box::new)
            .context(ExtractSnafu {
                stage: "extract-settings",
                path: path.to_path_buf(),
            })?;

        Ok(settings.normalized())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to extract settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        source: Box<figment::Error>,
    },
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_char_delay_ms() -> u64 {
    DEFAULT_CHAR_DELAY_MS
}

fn default_reveal_lead_in_ms() -> u64 {
    DEFAULT_REVEAL_LEAD_IN_MS
}

fn default_follow_threshold() -> f32 {
    DEFAULT_FOLLOW_THRESHOLD
}
