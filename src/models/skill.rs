use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A checked entry from a skill's edit dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedItem {
    pub item: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

#[cfg(test)]
impl AssociatedItem {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            section: None,
        }
    }

    pub fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRecord {
    pub name: String,
    pub associated_items: Vec<AssociatedItem>,
    pub extracted_at: DateTime<Local>,
}

impl SkillRecord {
    pub fn new(name: String, associated_items: Vec<AssociatedItem>) -> Self {
        Self {
            name,
            associated_items,
            extracted_at: Local::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_is_omitted_from_json_when_absent() {
        let record = SkillRecord::new(
            "Rust".to_string(),
            vec![
                AssociatedItem::new("Acme Corp"),
                AssociatedItem::new("Systems Programming").in_section("Education"),
            ],
        );

        let json = serde_json::to_value(&record).unwrap();
        let items = json["associated_items"].as_array().unwrap();

        assert_eq!(json["name"], "Rust");
        assert!(items[0].get("section").is_none());
        assert_eq!(items[1]["section"], "Education");
    }
}
