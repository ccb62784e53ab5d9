use anyhow::{ensure, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

pub const HEADER: &str = "XPath";

/// Plain-text trail of clicked elements, one absolute XPath per line.
pub struct ClickLogger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ClickLogger {
    /// Creates the file with its header line unless it already exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure!(!path.as_os_str().is_empty(), "Click log path should not be empty");

        if !path.exists() {
            fs::write(&path, format!("{}\n", HEADER))
                .with_context(|| format!("Failed to create click log {}", path.display()))?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn log_click(&self, xpath: &str) -> Result<()> {
        ensure!(!xpath.trim().is_empty(), "XPath should not be empty");

        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("click log lock poisoned"))?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open click log {}", self.path.display()))?;
        writeln!(file, "{}", xpath.trim())?;
        Ok(())
    }
}
