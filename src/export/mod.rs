pub mod click_log;
pub mod json;

use anyhow::Result;
use crate::models::SkillRecord;
use std::path::Path;

pub trait Exporter {
    fn export(&self, records: &[SkillRecord], path: &Path) -> Result<()>;
}
