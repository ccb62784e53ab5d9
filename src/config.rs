use crate::error::ConfigError;
use crate::scraper::extractor::LabelStrategy;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;

pub const ENV_DRIVER_PATH: &str = "CHROME_DRIVER_PATH";
pub const ENV_EMAIL: &str = "LINKEDIN_EMAIL";
pub const ENV_PASSWORD: &str = "LINKEDIN_PSWD";
pub const ENV_USERNAME: &str = "LINKEDIN_USERNAME";
pub const ENV_SETTINGS_PATH: &str = "SKILL_SCRAPER_CONFIG";

/// Account secrets and the driver binary, always taken from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub driver_path: PathBuf,
    pub email: String,
    password: String,
    pub username: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("driver_path", &self.driver_path)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(key))
        };

        Ok(Self {
            driver_path: PathBuf::from(require(ENV_DRIVER_PATH)?),
            email: require(ENV_EMAIL)?,
            password: require(ENV_PASSWORD)?,
            username: require(ENV_USERNAME)?,
        })
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Verbosity> for LevelFilter {
    fn from(level: Verbosity) -> Self {
        match level {
            Verbosity::Off => LevelFilter::OFF,
            Verbosity::Error => LevelFilter::ERROR,
            Verbosity::Warn => LevelFilter::WARN,
            Verbosity::Info => LevelFilter::INFO,
            Verbosity::Debug => LevelFilter::DEBUG,
            Verbosity::Trace => LevelFilter::TRACE,
        }
    }
}

/// Non-secret tuning knobs, optionally loaded from a JSON settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub headless: bool,
    pub driver_port: u16,
    pub max_scroll_attempts: u32,
    pub scroll_pause_ms: u64,
    pub show_more_pause_ms: u64,
    pub marker_timeout_secs: u64,
    pub page_settle_secs: u64,
    pub modal_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub label_strategies: Vec<LabelStrategy>,
    pub output_path: PathBuf,
    pub click_log_path: PathBuf,
    pub diagnostics_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub console_level: Verbosity,
    pub file_level: Verbosity,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            headless: false,
            driver_port: 9516,
            max_scroll_attempts: 10,
            scroll_pause_ms: 2000,
            show_more_pause_ms: 2000,
            marker_timeout_secs: 10,
            page_settle_secs: 10,
            modal_timeout_secs: 10,
            poll_interval_ms: 500,
            label_strategies: LabelStrategy::default_chain(),
            output_path: PathBuf::from("linkedin_skills_data.json"),
            click_log_path: PathBuf::from("click_log.txt"),
            diagnostics_dir: PathBuf::from("."),
            log_file: Some(PathBuf::from("app.log")),
            console_level: Verbosity::Info,
            file_level: Verbosity::Debug,
        }
    }
}

impl Settings {
    /// Reads `SKILL_SCRAPER_CONFIG` when set, otherwise the per-user settings
    /// file if it exists, otherwise defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(ENV_SETTINGS_PATH).map(PathBuf::from);
        Self::resolve(explicit, Self::default_settings_path())
    }

    /// An explicitly named file must be readable; the default location may be absent.
    fn resolve(explicit: Option<PathBuf>, default: Option<PathBuf>) -> Result<Self, ConfigError> {
        match (explicit, default) {
            (Some(path), _) => Self::load_from(&path),
            (None, Some(path)) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn default_settings_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "skill-scraper", "skill-scraper")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_scroll_attempts == 0 {
            errors.push("max_scroll_attempts must be at least 1".to_string());
        }

        if self.poll_interval_ms == 0 {
            errors.push("poll_interval_ms must be at least 1".to_string());
        }

        if self.label_strategies.is_empty() {
            errors.push("At least one label strategy must be configured".to_string());
        }

        if self.output_path.as_os_str().is_empty() {
            errors.push("output_path is required".to_string());
        }

        if self.click_log_path.as_os_str().is_empty() {
            errors.push("click_log_path is required".to_string());
        }

        errors
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn show_more_pause(&self) -> Duration {
        Duration::from_millis(self.show_more_pause_ms)
    }

    pub fn marker_timeout(&self) -> Duration {
        Duration::from_secs(self.marker_timeout_secs)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_secs(self.page_settle_secs)
    }

    pub fn modal_timeout(&self) -> Duration {
        Duration::from_secs(self.modal_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub settings: Settings,
}

impl AppConfig {
    /// Environment first: a missing variable aborts before the settings file is touched.
    pub fn load() -> Result<Self, ConfigError> {
        let credentials = Credentials::from_env()?;
        let settings = Settings::load()?;

        let errors = settings.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }

        Ok(Self { credentials, settings })
    }
}
