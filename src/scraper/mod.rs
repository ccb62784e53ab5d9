pub mod browser;
pub mod collector;
pub mod extractor;
pub mod page;

#[cfg(test)]
pub mod testing;

use crate::auth::LinkedInAuth;
use crate::chromedriver_manager::ChromeDriverManager;
use crate::config::AppConfig;
use crate::diagnostics::Diagnostics;
use crate::error::ScrapeError;
use crate::export::click_log::ClickLogger;
use crate::export::json::{AppendOutcome, SkillStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use collector::{Collector, CollectorConfig, DiscoverySink, StopReason};
use extractor::{ExtractorConfig, SkillExtractor};
use page::{ElementHandle, Locator, Page};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const BASE_URL: &str = "https://www.linkedin.com";

pub trait Logger: Send + Sync {
    fn log(&self, message: String, level: LogLevel);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
    Debug,
}

pub type SharedLogger = Arc<Mutex<Box<dyn Logger>>>;

/// Forwards engine messages to the `tracing` subscriber installed in `main`.
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, message: String, level: LogLevel) {
        match level {
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Success => tracing::info!(success = true, "{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
    }
}

impl TracingLogger {
    pub fn shared() -> SharedLogger {
        Arc::new(Mutex::new(Box::new(TracingLogger) as Box<dyn Logger>))
    }
}

pub(crate) async fn emit(logger: &SharedLogger, message: String, level: LogLevel) {
    let logger = logger.lock().await;
    logger.log(message, level);
}

/// Clicks `element`, falling back to a script click, and appends its
/// absolute XPath to the click log. The XPath is read before clicking since
/// the element may detach afterwards.
pub(crate) async fn click_recorded<P: Page>(
    page: &P,
    element: &P::Element,
    clicks: Option<&ClickLogger>,
    logger: &SharedLogger,
) -> Result<(), ScrapeError> {
    let xpath = match clicks {
        Some(_) => match page.absolute_xpath(element).await {
            Ok(xpath) => Some(xpath),
            Err(e) => {
                emit(logger, format!("Could not compute XPath of clicked element: {}", e), LogLevel::Debug).await;
                None
            }
        },
        None => None,
    };

    if let Err(e) = element.click().await {
        emit(logger, format!("Direct click failed ({}), trying script click", e), LogLevel::Debug).await;
        page.js_click(element).await?;
    }

    if let (Some(clicks), Some(xpath)) = (clicks, xpath) {
        if let Err(e) = clicks.log_click(&xpath) {
            emit(logger, format!("Failed to record click: {}", e), LogLevel::Warning).await;
        }
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub base_url: String,
    pub email: String,
    pub password: String,
    pub username: String,
    pub marker_timeout: Duration,
    pub page_settle: Duration,
    pub poll_interval: Duration,
    pub collector: CollectorConfig,
    pub extractor: ExtractorConfig,
    pub output_path: PathBuf,
    pub click_log_path: PathBuf,
    pub diagnostics_dir: PathBuf,
}

impl ScraperConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let settings = &config.settings;

        let mut collector = CollectorConfig::skills(settings.max_scroll_attempts);
        collector.scroll_pause = settings.scroll_pause();
        collector.show_more_pause = settings.show_more_pause();
        collector.poll_interval = settings.poll_interval();

        Self {
            base_url: BASE_URL.to_string(),
            email: config.credentials.email.clone(),
            password: config.credentials.password().to_string(),
            username: config.credentials.username.clone(),
            marker_timeout: settings.marker_timeout(),
            page_settle: settings.page_settle(),
            poll_interval: settings.poll_interval(),
            collector,
            extractor: ExtractorConfig::skills(
                settings.label_strategies.clone(),
                settings.modal_timeout(),
                settings.poll_interval(),
            ),
            output_path: settings.output_path.clone(),
            click_log_path: settings.click_log_path.clone(),
            diagnostics_dir: settings.diagnostics_dir.clone(),
        }
    }

    pub fn skills_url(&self) -> String {
        format!(
            "{}/in/{}/details/skills/",
            self.base_url.trim_end_matches('/'),
            self.username
        )
    }

    fn skills_page_marker() -> Locator {
        Locator::xpath("//div[contains(@class, 'scaffold-finite-scroll')]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub recorded: usize,
    pub duplicates: usize,
    pub unlabeled: usize,
    pub scroll_iterations: u32,
    pub stop_reason: StopReason,
}

/// Extracts each discovered container as soon as the collector reports it.
struct RecordingSink<'a, P: Page> {
    extractor: SkillExtractor<'a, P>,
    store: &'a mut SkillStore,
    logger: SharedLogger,
    recorded: usize,
    duplicates: usize,
    unlabeled: usize,
}

#[async_trait]
impl<'a, P: Page> DiscoverySink<P::Element> for RecordingSink<'a, P> {
    async fn on_discovered(&mut self, batch: Vec<P::Element>) {
        for element in &batch {
            let Some(record) = self.extractor.extract(element).await else {
                self.unlabeled += 1;
                continue;
            };

            match self.store.append(&record) {
                Ok(AppendOutcome::Appended) => {
                    self.recorded += 1;
                    emit(
                        &self.logger,
                        format!("Appended skill data for '{}' to {}", record.name, self.store.path().display()),
                        LogLevel::Info,
                    )
                    .await;
                }
                Ok(AppendOutcome::DuplicateName) => {
                    self.duplicates += 1;
                    emit(
                        &self.logger,
                        format!("Skill '{}' already recorded this run, skipping", record.name),
                        LogLevel::Warning,
                    )
                    .await;
                }
                Err(e) => {
                    emit(
                        &self.logger,
                        format!("Error appending skill data for '{}': {:#}", record.name, e),
                        LogLevel::Error,
                    )
                    .await;
                }
            }
        }
    }
}

pub struct ScraperEngine<P: Page> {
    page: P,
    config: ScraperConfig,
    logger: SharedLogger,
    diagnostics: Diagnostics,
    chromedriver_manager: Option<Arc<ChromeDriverManager>>,
}

impl ScraperEngine<browser::BrowserDriver> {
    /// Starts the driver process and opens a browser session on it.
    pub async fn connect(
        config: ScraperConfig,
        logger: SharedLogger,
        chromedriver_manager: Arc<ChromeDriverManager>,
        headless: bool,
    ) -> Result<Self> {
        chromedriver_manager
            .start_driver()
            .await
            .context("Failed to start ChromeDriver")?;

        let browser = match browser::BrowserDriver::new(chromedriver_manager.port(), headless).await {
            Ok(browser) => browser,
            Err(e) => {
                chromedriver_manager.stop_driver().await;
                return Err(e);
            }
        };

        let mut engine = Self::new(browser, config, logger);
        engine.chromedriver_manager = Some(chromedriver_manager);
        Ok(engine)
    }
}

impl<P: Page> ScraperEngine<P> {
    pub fn new(page: P, config: ScraperConfig, logger: SharedLogger) -> Self {
        let diagnostics = Diagnostics::new(config.diagnostics_dir.clone());
        Self {
            page,
            config,
            logger,
            diagnostics,
            chromedriver_manager: None,
        }
    }

    #[cfg(test)]
    pub fn page(&self) -> &P {
        &self.page
    }

    async fn log(&self, message: String, level: LogLevel) {
        emit(&self.logger, message, level).await;
    }

    /// Runs the whole extraction; on failure a `error_state` snapshot is taken
    /// before the error is returned.
    pub async fn run(&mut self) -> Result<RunSummary> {
        match self.run_extraction().await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                self.log(format!("An unexpected error occurred: {:#}", e), LogLevel::Error).await;
                self.diagnostics.capture(&self.page, "error_state").await;
                Err(e)
            }
        }
    }

    pub async fn run_extraction(&mut self) -> Result<RunSummary> {
        self.log("Starting skill extraction...".to_string(), LogLevel::Info).await;

        let mut store = SkillStore::new(self.config.output_path.clone());
        if store.reset()? {
            self.log(format!("Deleted existing {}", store.path().display()), LogLevel::Info).await;
        }
        let clicks = ClickLogger::open(self.config.click_log_path.clone())?;

        self.log("Step 1/4: Logging in...".to_string(), LogLevel::Info).await;
        LinkedInAuth::login(
            &self.page,
            &self.config.base_url,
            &self.config.email,
            &self.config.password,
            self.config.marker_timeout,
            self.config.poll_interval,
        )
        .await
        .context("Login failed")?;
        self.log("Successfully logged in".to_string(), LogLevel::Success).await;

        self.log("Step 2/4: Navigating to skills page...".to_string(), LogLevel::Info).await;
        self.go_to_skills_page().await?;
        self.diagnostics.capture(&self.page, "skills_page").await;

        self.log("Step 3/4: Collecting skills...".to_string(), LogLevel::Info).await;
        let extractor = SkillExtractor::new(&self.page, &self.config.extractor, self.logger.clone())
            .with_click_log(&clicks);
        let mut sink = RecordingSink {
            extractor,
            store: &mut store,
            logger: self.logger.clone(),
            recorded: 0,
            duplicates: 0,
            unlabeled: 0,
        };

        let collection = Collector::new(&self.page, &self.config.collector, self.logger.clone())
            .with_click_log(&clicks)
            .collect(&mut sink)
            .await?;

        let summary = RunSummary {
            discovered: collection.elements.len(),
            recorded: sink.recorded,
            duplicates: sink.duplicates,
            unlabeled: sink.unlabeled,
            scroll_iterations: collection.iterations,
            stop_reason: collection.stop_reason,
        };

        self.log("Step 4/4: Capturing final state...".to_string(), LogLevel::Info).await;
        self.diagnostics.capture(&self.page, "after_find_skills").await;

        self.log(
            format!(
                "Extraction finished: {} containers in {} scroll passes, {} records written to {}",
                summary.discovered,
                summary.scroll_iterations,
                summary.recorded,
                self.config.output_path.display()
            ),
            LogLevel::Success,
        )
        .await;

        Ok(summary)
    }

    /// A missing page marker is not fatal: the page is given a fixed time to settle instead.
    async fn go_to_skills_page(&self) -> Result<(), ScrapeError> {
        let url = self.config.skills_url();
        self.page.navigate(&url).await?;

        match self
            .page
            .wait_for(
                &ScraperConfig::skills_page_marker(),
                self.config.marker_timeout,
                self.config.poll_interval,
            )
            .await
        {
            Ok(_) => {
                self.log("Skills page loaded".to_string(), LogLevel::Success).await;
            }
            Err(e) if e.is_timeout() => {
                self.log("Page load timeout. Proceeding anyway.".to_string(), LogLevel::Warning).await;
                tokio::time::sleep(self.config.page_settle).await;
            }
            Err(e) => return Err(e),
        }

        let current = self.page.current_url().await.unwrap_or_default();
        self.log(format!("Current URL: {}", current), LogLevel::Debug).await;
        Ok(())
    }

    /// Quits the browser, then stops the driver process.
    pub async fn close(&self) -> Result<()> {
        let quit = self.page.quit().await;

        if let Some(manager) = &self.chromedriver_manager {
            manager.stop_driver().await;
        }

        quit.context("Failed to quit browser session")
    }
}
