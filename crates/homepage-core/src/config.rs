use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{AppError, ConfigError};

/// Environment variable holding the music proxy base URL
pub const SONG_API_ENV: &str = "SONG_API";
pub const SONG_SERVER_ENV: &str = "SONG_SERVER";
pub const SONG_TYPE_ENV: &str = "SONG_TYPE";
pub const SONG_ID_ENV: &str = "SONG_ID";
pub const WEATHER_KEY_ENV: &str = "WEATHER_KEY";

/// Music servers the proxy is known to understand
const KNOWN_SERVERS: &[&str] = &["netease", "tencent", "kugou", "xiami", "baidu", "kuwo"];

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Music proxy settings
    #[serde(default)]
    pub music: MusicConfig,

    /// Weather provider settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Third-party provider base URLs
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    /// Shared HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    /// Base URL of the music proxy (e.g. a Meting deployment)
    pub api_url: Option<String>,

    /// Provider identifier passed through as `server`
    pub server: String,

    /// Content type passed through as `type`
    pub kind: String,

    /// Track or playlist identifier passed through as `id`
    pub id: Option<String>,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            server: "netease".to_string(),
            kind: "playlist".to_string(),
            id: None,
        }
    }
}

/// Which weather provider to query first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeatherProviderKind {
    Tencent,
    #[default]
    Amap,
    /// Keyless fallback API only
    Fallback,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub provider: WeatherProviderKind,

    /// API key for the Tencent or AMap provider
    pub key: Option<String>,
}

impl WeatherConfig {
    /// The key, if one is set and not blank
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Quote of the day
    pub hitokoto: String,

    /// Tencent location service (JSONP only)
    pub tencent_map: String,

    /// AMap REST API
    pub amap: String,

    /// Keyless weather API used as fallback
    pub other_weather: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            hitokoto: "https://v1.hitokoto.cn".to_string(),
            tencent_map: "https://apis.map.qq.com".to_string(),
            amap: "https://restapi.amap.com".to_string(),
            other_weather: "https://api.oioweb.cn/api/weather/GetWeather".to_string(),
        }
    }
}

impl EndpointsConfig {
    /// Point every provider at one base URL (mock servers, mirrors)
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            hitokoto: format!("{}/hitokoto", base),
            tencent_map: base.to_string(),
            amap: base.to_string(),
            other_weather: format!("{}/api/weather/GetWeather", base),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("homepage/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("homepage");

        Self {
            config_dir,
            music: MusicConfig::default(),
            weather: WeatherConfig::default(),
            endpoints: EndpointsConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing,
    /// then overlay environment variables.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from an explicit file, writing defaults if absent
    ///
    /// File access failures are [`AppError::Io`]; a file that is not valid
    /// TOML for this schema is [`ConfigError::ParseError`].
    pub fn load_from(path: &Path) -> std::result::Result<Self, AppError> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)?;

        toml::from_str(&contents).map_err(|e| {
            ConfigError::ParseError(format!("{}: {}", path.display(), e.message())).into()
        })
    }

    /// Load configuration and validate it
    ///
    /// Warnings are logged; errors fail the load.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Overlay values from the environment. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(SONG_API_ENV) {
            self.music.api_url = Some(url);
        }
        if let Some(server) = get(SONG_SERVER_ENV) {
            self.music.server = server;
        }
        if let Some(kind) = get(SONG_TYPE_ENV) {
            self.music.kind = kind;
        }
        if let Some(id) = get(SONG_ID_ENV) {
            self.music.id = Some(id);
        }
        if let Some(key) = get(WEATHER_KEY_ENV) {
            self.weather.key = Some(key);
        }
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        match &self.music.api_url {
            Some(url) => self.validate_url(url, "music.api_url", &mut result),
            None => result.add_warning(
                "music.api_url",
                format!("Music proxy not configured (set {})", SONG_API_ENV),
            ),
        }

        if !KNOWN_SERVERS.contains(&self.music.server.as_str()) {
            result.add_warning(
                "music.server",
                format!("Unknown music server: {}", self.music.server),
            );
        }

        if self.music.api_url.is_some() && self.music.id.is_none() {
            result.add_warning("music.id", "No playlist id configured");
        }

        if self.weather.provider != WeatherProviderKind::Fallback && self.weather.key().is_none() {
            result.add_warning(
                "weather.key",
                "No weather key configured - the fallback weather API will be used",
            );
        }

        self.validate_url(&self.endpoints.hitokoto, "endpoints.hitokoto", &mut result);
        self.validate_url(&self.endpoints.tencent_map, "endpoints.tencent_map", &mut result);
        self.validate_url(&self.endpoints.amap, "endpoints.amap", &mut result);
        self.validate_url(
            &self.endpoints.other_weather,
            "endpoints.other_weather",
            &mut result,
        );

        if self.http.user_agent.trim().is_empty() {
            result.add_error("http.user_agent", "User agent must not be empty");
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> std::result::Result<(), AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("homepage");

        Ok(config_dir.join("config.toml"))
    }
}
