use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

const READINESS_TIMEOUT_SECS: u64 = 15;

/// Owns the chromedriver child process for the duration of a run.
pub struct ChromeDriverManager {
    driver_path: PathBuf,
    port: u16,
    process: Arc<Mutex<Option<Child>>>,
}

impl ChromeDriverManager {
    pub fn new(driver_path: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            driver_path: driver_path.into(),
            port,
            process: Arc::new(Mutex::new(None)),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn ensure_driver_available(&self) -> Result<()> {
        if !self.driver_path.is_file() {
            anyhow::bail!(
                "ChromeDriver not found at {}. Check CHROME_DRIVER_PATH.",
                self.driver_path.display()
            );
        }
        tracing::debug!(path = %self.driver_path.display(), "ChromeDriver found");
        Ok(())
    }

    pub async fn start_driver(&self) -> Result<()> {
        self.ensure_driver_available()?;

        let mut process_guard = self.process.lock().await;
        if process_guard.is_some() {
            tracing::info!(port = self.port, "ChromeDriver is already running");
            return Ok(());
        }

        tracing::info!(port = self.port, "Starting ChromeDriver...");
        let mut cmd = Command::new(&self.driver_path);
        cmd.arg(format!("--port={}", self.port))
            .kill_on_drop(true)
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd.spawn().with_context(|| {
            format!(
                "Failed to start ChromeDriver from {}. Make sure Chrome is installed.",
                self.driver_path.display()
            )
        })?;

        *process_guard = Some(child);
        drop(process_guard);

        tracing::debug!("Waiting for ChromeDriver to become ready...");
        if !self.wait_for_readiness(READINESS_TIMEOUT_SECS).await {
            self.stop_driver().await;
            anyhow::bail!(
                "ChromeDriver failed to become ready within {} seconds",
                READINESS_TIMEOUT_SECS
            );
        }

        tracing::info!(port = self.port, "ChromeDriver successfully started");
        Ok(())
    }

    pub async fn stop_driver(&self) {
        let mut process_guard = self.process.lock().await;
        if let Some(mut child) = process_guard.take() {
            // kill() also reaps the process without blocking the runtime
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to stop ChromeDriver");
                return;
            }
            tracing::info!("ChromeDriver stopped");
        }
    }

    #[cfg(test)]
    pub async fn is_running(&self) -> bool {
        let mut process_guard = self.process.lock().await;
        match process_guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn wait_for_readiness(&self, timeout_secs: u64) -> bool {
        let client = reqwest::Client::new();
        let url = format!("http://localhost:{}/status", self.port);
        let timeout = tokio::time::Duration::from_secs(timeout_secs);
        let start = tokio::time::Instant::now();

        while start.elapsed() < timeout {
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => return true,
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "ChromeDriver not ready yet");
                }
                Err(_) => {}
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
        }

        false
    }
}

impl Drop for ChromeDriverManager {
    fn drop(&mut self) {
        // Best effort cleanup
        if let Ok(mut process_guard) = self.process.try_lock() {
            if let Some(mut child) = process_guard.take() {
                let _ = child.start_kill();
            }
        }
    }
}
