use crate::scraper::page::Page;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Files written for one failure context.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub screenshot: Option<PathBuf>,
    pub page_source: Option<PathBuf>,
}

/// Writes `<context>.png` and `<context>.txt` snapshots of the live page.
pub struct Diagnostics {
    dir: PathBuf,
}

impl Diagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn screenshot_path(&self, context: &str) -> PathBuf {
        self.dir.join(format!("{}.png", file_stem(context)))
    }

    pub fn page_source_path(&self, context: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", file_stem(context)))
    }

    /// Best effort: each half is attempted even if the other fails.
    pub async fn capture<P: Page>(&self, page: &P, context: &str) -> Snapshot {
        let mut snapshot = Snapshot::default();

        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "Cannot create diagnostics directory");
            return snapshot;
        }

        match self.save_screenshot(page, context).await {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Screenshot saved");
                snapshot.screenshot = Some(path);
            }
            Err(e) => tracing::warn!(context, error = %e, "Screenshot capture failed"),
        }

        match self.save_page_source(page, context).await {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Page source saved");
                snapshot.page_source = Some(path);
            }
            Err(e) => tracing::warn!(context, error = %e, "Page source capture failed"),
        }

        snapshot
    }

    async fn save_screenshot<P: Page>(&self, page: &P, context: &str) -> Result<PathBuf> {
        let png = page.screenshot_png().await?;
        let path = self.screenshot_path(context);
        fs::write(&path, png).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    async fn save_page_source<P: Page>(&self, page: &P, context: &str) -> Result<PathBuf> {
        let source = page.page_source().await?;
        let path = self.page_source_path(context);
        fs::write(&path, source).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn file_stem(context: &str) -> String {
    let stem: String = context
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if stem.is_empty() {
        format!("snapshot_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
    } else {
        stem
    }
}
