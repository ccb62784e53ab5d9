use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use crate::models::SkillRecord;
use super::Exporter;

/// Writes records as a pretty-printed JSON array.
#[derive(Default)]
pub struct JsonExporter;

impl JsonExporter {
    pub fn new() -> Self {
        Self
    }
}

impl Exporter for JsonExporter {
    /// Writes to a sibling temp file first so a crash never leaves a truncated array.
    fn export(&self, records: &[SkillRecord], path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;

        let tmp_path = path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path)
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    DuplicateName,
}

/// Append-only JSON array of skill records on disk.
pub struct SkillStore {
    path: PathBuf,
    exporter: JsonExporter,
    names: HashSet<String>,
}

impl SkillStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exporter: JsonExporter::new(),
            names: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the output left by a previous run. Returns whether a file was removed.
    pub fn reset(&mut self) -> Result<bool> {
        self.names.clear();

        if !self.path.exists() {
            return Ok(false);
        }

        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to delete {}", self.path.display()))?;
        Ok(true)
    }

    pub fn load(&self) -> Result<Vec<SkillRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("{} is not a JSON array of skill records", self.path.display()))
    }

    /// Adds `record` to the end of the array. A name already written this run is skipped.
    pub fn append(&mut self, record: &SkillRecord) -> Result<AppendOutcome> {
        if self.names.contains(&record.name) {
            return Ok(AppendOutcome::DuplicateName);
        }

        let mut existing = self.load()?;
        existing.push(record.clone());
        self.exporter.export(&existing, &self.path)?;

        self.names.insert(record.name.clone());
        Ok(AppendOutcome::Appended)
    }
}
