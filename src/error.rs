use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid settings: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: std::time::Duration },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Script execution failed: {0}")]
    Script(String),

    #[error(transparent)]
    Driver(#[from] thirtyfour::error::WebDriverError),
}

impl ScrapeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
