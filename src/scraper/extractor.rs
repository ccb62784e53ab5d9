use super::page::{ElementHandle, Locator, Page};
use super::{click_recorded, emit, LogLevel, SharedLogger};
use crate::error::ScrapeError;
use crate::export::click_log::ClickLogger;
use crate::models::{AssociatedItem, SkillRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

const ELEMENT_INFO_SCRIPT: &str = r#"
var el = arguments[0];
var rect = el.getBoundingClientRect();
return {
    tagName: el.tagName,
    id: el.id,
    className: String(el.className),
    textContent: (el.textContent || '').trim().substring(0, 50),
    isDisplayed: el.offsetParent !== null,
    location: { x: rect.left, y: rect.top },
    size: { width: rect.width, height: rect.height }
};
"#;

/// One way of recovering a skill's display label from its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStrategy {
    /// `aria-label` of the edit icon's svg.
    IconAriaLabel,
    /// `aria-label="Edit ..."` pulled out of the container's inner markup.
    MarkupPattern,
    /// Visible text of the skill topic anchor.
    AnchorText,
}

impl LabelStrategy {
    pub fn default_chain() -> Vec<Self> {
        vec![Self::IconAriaLabel, Self::MarkupPattern, Self::AnchorText]
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub strategies: Vec<LabelStrategy>,
    pub modal_timeout: Duration,
    pub poll_interval: Duration,
    pub icon: Locator,
    pub topic_anchor: Locator,
    pub edit_control: Locator,
    pub edit_control_via_ancestor: Locator,
    pub dialog: Locator,
    pub checkbox: Locator,
    pub checkbox_label: Locator,
    pub section_heading: Locator,
    pub dismiss: Locator,
}

impl ExtractorConfig {
    pub fn skills(strategies: Vec<LabelStrategy>, modal_timeout: Duration, poll_interval: Duration) -> Self {
        let edit_link = "a[contains(@id, 'navigation-add-edit-deeplink-edit-skills')]";

        Self {
            strategies,
            modal_timeout,
            poll_interval,
            icon: Locator::xpath(
                ".//div[contains(@class, 'pvs-navigation__icon')]/*[name()='svg'][@aria-label]",
            ),
            topic_anchor: Locator::css("a[data-field='skill_page_skill_topic'] span[aria-hidden='true']"),
            edit_control: Locator::xpath(format!(".//{}", edit_link)),
            edit_control_via_ancestor: Locator::xpath(format!(
                "./ancestor::*[.//{link}][1]//{link}",
                link = edit_link
            )),
            dialog: Locator::xpath("//div[@role='dialog']"),
            checkbox: Locator::xpath(".//input[@type='checkbox']"),
            checkbox_label: Locator::xpath("./following-sibling::label"),
            section_heading: Locator::xpath("./ancestor::ul[1]/preceding-sibling::h3[1]"),
            dismiss: Locator::xpath("//button[@aria-label='Dismiss']"),
        }
    }
}

fn edit_label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"aria-label="Edit ([^"]+)""#).expect("edit label pattern is a valid regex")
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Pulls the label out of the first `aria-label="Edit <label>"` in `markup`.
pub fn label_from_markup(markup: &str) -> Option<String> {
    edit_label_pattern()
        .captures(markup)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .filter(|label| !label.is_empty())
}

pub fn strip_edit_prefix(label: &str) -> &str {
    label.strip_prefix("Edit ").unwrap_or(label).trim()
}

pub struct SkillExtractor<'a, P: Page> {
    page: &'a P,
    config: &'a ExtractorConfig,
    logger: SharedLogger,
    clicks: Option<&'a ClickLogger>,
}

impl<'a, P: Page> SkillExtractor<'a, P> {
    pub fn new(page: &'a P, config: &'a ExtractorConfig, logger: SharedLogger) -> Self {
        Self {
            page,
            config,
            logger,
            clicks: None,
        }
    }

    pub fn with_click_log(mut self, clicks: &'a ClickLogger) -> Self {
        self.clicks = Some(clicks);
        self
    }

    async fn log(&self, message: String, level: LogLevel) {
        emit(&self.logger, message, level).await;
    }

    /// Builds a record for one skill container. `None` when no label could be
    /// recovered; a dialog failure still yields a record with no items.
    pub async fn extract(&self, element: &P::Element) -> Option<SkillRecord> {
        let Some(name) = self.recover_label(element).await else {
            self.log("Could not recover a label for skill container".to_string(), LogLevel::Warning).await;
            self.describe(element).await;
            return None;
        };

        self.log(format!("Processing skill: {}", name), LogLevel::Info).await;

        let items = match self.read_associated_items(element).await {
            Ok(items) => items,
            Err(e) => {
                self.log(format!("No associated items for '{}': {}", name, e), LogLevel::Warning).await;
                self.describe(element).await;
                Vec::new()
            }
        };

        self.log(
            format!("Processed {} associated items for {}", items.len(), name),
            LogLevel::Success,
        )
        .await;

        Some(SkillRecord::new(name, items))
    }

    /// Runs the strategy chain; the first non-empty label wins.
    pub async fn recover_label(&self, element: &P::Element) -> Option<String> {
        for strategy in &self.config.strategies {
            match self.try_strategy(*strategy, element).await {
                Ok(Some(label)) => {
                    self.log(format!("Label '{}' recovered via {:?}", label, strategy), LogLevel::Debug).await;
                    return Some(label);
                }
                Ok(None) => {
                    self.log(format!("{:?} found no label", strategy), LogLevel::Debug).await;
                }
                Err(e) => {
                    self.log(format!("{:?} failed: {}", strategy, e), LogLevel::Debug).await;
                }
            }
        }
        None
    }

    async fn try_strategy(
        &self,
        strategy: LabelStrategy,
        element: &P::Element,
    ) -> Result<Option<String>, ScrapeError> {
        let label = match strategy {
            LabelStrategy::IconAriaLabel => match element.find(&self.config.icon).await? {
                Some(icon) => icon
                    .attr("aria-label")
                    .await?
                    .map(|label| strip_edit_prefix(&label).to_string()),
                None => None,
            },
            LabelStrategy::MarkupPattern => label_from_markup(&element.inner_html().await?),
            LabelStrategy::AnchorText => match element.find(&self.config.topic_anchor).await? {
                Some(anchor) => anchor
                    .text()
                    .await?
                    .lines()
                    .next()
                    .map(|line| line.trim().to_string()),
                None => None,
            },
        };

        Ok(label.filter(|l| !l.is_empty()))
    }

    async fn find_edit_control(&self, element: &P::Element) -> Result<P::Element, ScrapeError> {
        if let Some(control) = element.find(&self.config.edit_control).await? {
            return Ok(control);
        }

        element
            .find(&self.config.edit_control_via_ancestor)
            .await?
            .ok_or_else(|| ScrapeError::ElementNotFound("edit control for skill".to_string()))
    }

    async fn read_associated_items(&self, element: &P::Element) -> Result<Vec<AssociatedItem>, ScrapeError> {
        let control = self.find_edit_control(element).await?;

        if let Err(e) = self.page.scroll_into_view(&control).await {
            self.log(format!("Couldn't scroll edit control into view: {}", e), LogLevel::Debug).await;
        }

        click_recorded(self.page, &control, self.clicks, &self.logger).await?;

        let dialog = self
            .page
            .wait_for(&self.config.dialog, self.config.modal_timeout, self.config.poll_interval)
            .await?;

        let items = self.read_checked(&dialog).await;
        self.dismiss().await;

        Ok(items)
    }

    /// Label text of every checked box in the dialog; unreadable boxes are skipped.
    async fn read_checked(&self, dialog: &P::Element) -> Vec<AssociatedItem> {
        let checkboxes = match dialog.find_all(&self.config.checkbox).await {
            Ok(boxes) => boxes,
            Err(e) => {
                self.log(format!("Could not list dialog checkboxes: {}", e), LogLevel::Warning).await;
                return Vec::new();
            }
        };

        let mut items = Vec::new();
        for checkbox in &checkboxes {
            match checkbox.is_selected().await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    self.log(format!("Checkbox state unreadable: {}", e), LogLevel::Debug).await;
                    continue;
                }
            }

            match self.checkbox_label(dialog, checkbox).await {
                Some(label) => {
                    let section = self.section_of(checkbox).await;
                    self.log(format!("Associated item: {}", label), LogLevel::Info).await;
                    items.push(AssociatedItem { item: label, section });
                }
                None => {
                    self.log("Checked box has no readable label".to_string(), LogLevel::Warning).await;
                }
            }
        }

        items
    }

    async fn checkbox_label(&self, dialog: &P::Element, checkbox: &P::Element) -> Option<String> {
        if let Ok(Some(label)) = checkbox.find(&self.config.checkbox_label).await {
            if let Ok(text) = label.text().await {
                let text = text.trim();
                if !text.is_empty() {
                    return Some(text.to_string());
                }
            }
        }

        let id = checkbox.attr("id").await.ok().flatten()?;
        let by_for = Locator::css(format!("label[for='{}']", id));
        let label = dialog.find(&by_for).await.ok().flatten()?;
        let text = label.text().await.ok()?;
        Some(text.trim().to_string()).filter(|t| !t.is_empty())
    }

    async fn section_of(&self, checkbox: &P::Element) -> Option<String> {
        let heading = checkbox.find(&self.config.section_heading).await.ok().flatten()?;
        let text = heading.text().await.ok()?;
        Some(text.trim().to_string()).filter(|t| !t.is_empty())
    }

    async fn dismiss(&self) {
        let button = match self
            .page
            .wait_for(&self.config.dismiss, self.config.modal_timeout, self.config.poll_interval)
            .await
        {
            Ok(button) => button,
            Err(e) => {
                self.log(format!("Dismiss button not found: {}", e), LogLevel::Error).await;
                return;
            }
        };

        if let Err(e) = click_recorded(self.page, &button, self.clicks, &self.logger).await {
            self.log(format!("Error closing modal: {}", e), LogLevel::Error).await;
            return;
        }

        match self
            .page
            .wait_until_gone(&self.config.dialog, self.config.modal_timeout, self.config.poll_interval)
            .await
        {
            Ok(()) => self.log("Modal closed successfully".to_string(), LogLevel::Debug).await,
            Err(e) => self.log(format!("Modal did not disappear: {}", e), LogLevel::Error).await,
        }
    }

    async fn describe(&self, element: &P::Element) {
        match self.page.execute(ELEMENT_INFO_SCRIPT, vec![element.clone()]).await {
            Ok(info) => self.log(format!("Element info: {}", info), LogLevel::Debug).await,
            Err(e) => self.log(format!("Error getting element info: {}", e), LogLevel::Debug).await,
        }
    }
}
