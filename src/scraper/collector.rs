use super::page::{poll_until, ElementHandle, Locator, Page};
use super::{emit, LogLevel, SharedLogger};
use crate::error::ScrapeError;
use crate::export::click_log::ClickLogger;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Retry counter and last observed document height for one collection run.
#[derive(Debug, Clone)]
pub struct ScrollState {
    last_height: Option<i64>,
    attempts: u32,
    max_attempts: u32,
}

impl ScrollState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            last_height: None,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn record_batch(&mut self, new_elements: usize) {
        if new_elements > 0 {
            self.attempts = 0;
        } else {
            self.attempts += 1;
        }
    }

    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
    }

    /// Returns `true` when `height` equals the previously recorded height.
    pub fn record_height(&mut self, height: i64) -> bool {
        if self.last_height == Some(height) {
            return true;
        }
        self.last_height = Some(height);
        false
    }

    pub fn last_height(&self) -> Option<i64> {
        self.last_height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    RetriesExhausted,
    HeightStable,
}

#[derive(Debug)]
pub struct Collection<E> {
    pub elements: Vec<E>,
    pub iterations: u32,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Broad query for candidate elements.
    pub candidates: Locator,
    /// Substring the candidate's `id` attribute must contain.
    pub id_filter: String,
    pub show_more: Locator,
    pub max_attempts: u32,
    pub scroll_pause: Duration,
    pub show_more_pause: Duration,
    pub poll_interval: Duration,
}

impl CollectorConfig {
    pub fn skills(max_attempts: u32) -> Self {
        Self {
            candidates: Locator::xpath(
                "//li[starts-with(@id, 'profilePagedListComponent-') \
                 and contains(@id, '-SKILLS-VIEW-DETAILS-profileTabSection-')]",
            ),
            id_filter: "ALL-SKILLS".to_string(),
            show_more: Locator::xpath("//button[contains(normalize-space(.), 'Show more')]"),
            max_attempts,
            scroll_pause: Duration::from_secs(2),
            show_more_pause: Duration::from_secs(2),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Receives each batch of newly discovered elements while collection is in progress.
#[async_trait]
pub trait DiscoverySink<E: Send + Sync>: Send {
    async fn on_discovered(&mut self, batch: Vec<E>);
}

/// Sink that ignores batches; collection result alone is used.
#[cfg(test)]
pub struct Discard;

#[cfg(test)]
#[async_trait]
impl<E: Send + Sync + 'static> DiscoverySink<E> for Discard {
    async fn on_discovered(&mut self, _batch: Vec<E>) {}
}

pub struct Collector<'a, P: Page> {
    page: &'a P,
    config: &'a CollectorConfig,
    logger: SharedLogger,
    clicks: Option<&'a ClickLogger>,
}

impl<'a, P: Page> Collector<'a, P> {
    pub fn new(page: &'a P, config: &'a CollectorConfig, logger: SharedLogger) -> Self {
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

    /// Scrolls until retries run out or the page stops growing, handing each
    /// batch of unseen matching elements to `sink` as it is found.
    pub async fn collect<S>(&self, sink: &mut S) -> Result<Collection<P::Element>, ScrapeError>
    where
        S: DiscoverySink<P::Element> + ?Sized,
    {
        let mut state = ScrollState::new(self.config.max_attempts);
        let mut seen: HashSet<String> = HashSet::new();
        let mut elements = Vec::new();
        let mut iterations = 0;

        state.record_height(self.page.document_height().await?);

        let stop_reason = loop {
            if state.exhausted() {
                break StopReason::RetriesExhausted;
            }
            iterations += 1;

            let batch = self.discover(&mut seen).await?;
            let found = batch.len();
            state.record_batch(found);

            if found > 0 {
                elements.extend(batch.iter().cloned());
                self.log(
                    format!("Found {} new matching elements. Total: {}", found, elements.len()),
                    LogLevel::Info,
                )
                .await;
                sink.on_discovered(batch).await;
            } else {
                self.log(
                    format!(
                        "No new matching elements. Scroll attempt {}/{}",
                        state.attempts(),
                        self.config.max_attempts
                    ),
                    LogLevel::Debug,
                )
                .await;
            }

            self.page.scroll_to_bottom().await?;
            let height = self.wait_for_growth(state.last_height()).await?;
            if state.record_height(height) {
                self.log(format!("Page height settled at {}", height), LogLevel::Debug).await;
                break StopReason::HeightStable;
            }

            if self.click_show_more().await {
                state.reset_attempts();
            }
        };

        self.log(
            format!(
                "Collection finished after {} iterations ({:?}): {} unique elements",
                iterations,
                stop_reason,
                elements.len()
            ),
            LogLevel::Info,
        )
        .await;

        Ok(Collection {
            elements,
            iterations,
            stop_reason,
        })
    }

    async fn discover(&self, seen: &mut HashSet<String>) -> Result<Vec<P::Element>, ScrapeError> {
        let candidates = self.page.find_all(&self.config.candidates).await?;
        let mut fresh = Vec::new();

        for candidate in candidates {
            if seen.contains(&candidate.key()) {
                continue;
            }

            let id = match candidate.attr("id").await {
                Ok(id) => id.unwrap_or_default(),
                Err(e) => {
                    self.log(format!("Skipping unreadable candidate: {}", e), LogLevel::Debug).await;
                    continue;
                }
            };

            if id.contains(&self.config.id_filter) {
                seen.insert(candidate.key());
                fresh.push(candidate);
            }
        }

        Ok(fresh)
    }

    /// Polls the document height for up to the scroll pause, returning early
    /// once it differs from `previous`.
    async fn wait_for_growth(&self, previous: Option<i64>) -> Result<i64, ScrapeError> {
        let latest = AtomicI64::new(previous.unwrap_or_default());

        let grown = poll_until(self.config.scroll_pause, self.config.poll_interval, || async {
            let height = self.page.document_height().await?;
            latest.store(height, Ordering::Relaxed);
            Ok::<_, ScrapeError>((Some(height) != previous).then_some(height))
        })
        .await?;

        Ok(grown.unwrap_or_else(|| latest.load(Ordering::Relaxed)))
    }

    /// Clicks the "Show more" control when present; `true` when clicked.
    async fn click_show_more(&self) -> bool {
        let button = match self.page.find(&self.config.show_more).await {
            Ok(Some(button)) => button,
            _ => return false,
        };

        if !button.is_clickable().await.unwrap_or(false) {
            return false;
        }

        match super::click_recorded(self.page, &button, self.clicks, &self.logger).await {
            Ok(()) => {
                self.log("Clicked 'Show more' button".to_string(), LogLevel::Info).await;
                tokio::time::sleep(self.config.show_more_pause).await;
                true
            }
            Err(e) => {
                self.log(format!("Could not click 'Show more': {}", e), LogLevel::Warning).await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::{DomChange, FakeElement, FakePage, MemoryLogger};

    fn fast_config(max_attempts: u32) -> CollectorConfig {
        let mut config = CollectorConfig::skills(max_attempts);
        config.scroll_pause = Duration::ZERO;
        config.show_more_pause = Duration::ZERO;
        config.poll_interval = Duration::from_millis(1);
        config
    }

    fn skill(id: &str) -> FakeElement {
        FakeElement::with_id(&format!("profilePagedListComponent-ALL-SKILLS-{}", id))
    }

    #[derive(Default)]
    struct Recording(Vec<Vec<String>>);

    #[async_trait]
    impl DiscoverySink<FakeElement> for Recording {
        async fn on_discovered(&mut self, batch: Vec<FakeElement>) {
            self.0.push(batch.iter().map(|e| e.key()).collect());
        }
    }

    #[test]
    fn scroll_state_counts_empty_batches() {
        let mut state = ScrollState::new(2);
        state.record_batch(0);
        assert_eq!(state.attempts(), 1);
        state.record_batch(3);
        assert_eq!(state.attempts(), 0);
        state.record_batch(0);
        state.record_batch(0);
        assert!(state.exhausted());
    }

    #[test]
    fn scroll_state_detects_repeated_height() {
        let mut state = ScrollState::new(10);
        assert!(!state.record_height(1000));
        assert!(!state.record_height(1400));
        assert!(state.record_height(1400));
        assert_eq!(state.last_height(), Some(1400));
    }

    #[tokio::test]
    async fn stops_after_consecutive_empty_passes() {
        let config = fast_config(10);
        let page = FakePage::new().with_batches(
            &config.candidates,
            vec![vec![skill("A"), skill("B")], vec![], vec![skill("C")]],
        );
        let logger = MemoryLogger::default();
        let mut sink = Recording::default();

        let collection = Collector::new(&page, &config, logger.shared())
            .collect(&mut sink)
            .await
            .unwrap();

        let keys: Vec<String> = collection.elements.iter().map(|e| e.key()).collect();
        assert_eq!(
            keys,
            vec![
                "profilePagedListComponent-ALL-SKILLS-A",
                "profilePagedListComponent-ALL-SKILLS-B",
                "profilePagedListComponent-ALL-SKILLS-C",
            ]
        );
        assert_eq!(collection.iterations, 13);
        assert_eq!(collection.stop_reason, StopReason::RetriesExhausted);
        assert_eq!(sink.0.len(), 2);
        assert_eq!(sink.0[1], vec!["profilePagedListComponent-ALL-SKILLS-C".to_string()]);
    }

    #[tokio::test]
    async fn repeated_batch_counts_one_attempt_per_pass() {
        let config = fast_config(3);
        let a = skill("A");
        let page = FakePage::new().with_batches(&config.candidates, vec![vec![a.clone()]; 6]);
        let logger = MemoryLogger::default();

        let collection = Collector::new(&page, &config, logger.shared())
            .collect(&mut Discard)
            .await
            .unwrap();

        let attempts: Vec<String> = logger
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, m)| m.strip_prefix("No new matching elements. ").map(str::to_string))
            .collect();
        assert_eq!(
            attempts,
            vec!["Scroll attempt 1/3", "Scroll attempt 2/3", "Scroll attempt 3/3"]
        );
        assert_eq!(collection.iterations, 4);
        assert_eq!(collection.elements.len(), 1);
        assert_eq!(page.queries(), 4);
    }

    #[tokio::test]
    async fn already_seen_and_foreign_elements_are_ignored() {
        let config = fast_config(2);
        let a = skill("A");
        let page = FakePage::new().with_batches(
            &config.candidates,
            vec![
                vec![a.clone(), FakeElement::with_id("profilePagedListComponent-INDUSTRY-1")],
                vec![a.clone(), skill("B")],
                vec![a],
            ],
        );

        let collection = Collector::new(&page, &config, MemoryLogger::default().shared())
            .collect(&mut Discard)
            .await
            .unwrap();

        assert_eq!(collection.elements.len(), 2);
        assert_eq!(collection.elements[1].key(), "profilePagedListComponent-ALL-SKILLS-B");
    }

    #[tokio::test]
    async fn unchanged_height_ends_collection() {
        let config = fast_config(10);
        let page = FakePage::new()
            .with_batches(&config.candidates, vec![vec![skill("A")]])
            .with_heights(vec![1000, 1000]);

        let collection = Collector::new(&page, &config, MemoryLogger::default().shared())
            .collect(&mut Discard)
            .await
            .unwrap();

        assert_eq!(collection.stop_reason, StopReason::HeightStable);
        assert_eq!(collection.iterations, 1);
        assert_eq!(collection.elements.len(), 1);
    }

    #[tokio::test]
    async fn zero_attempts_never_queries() {
        let config = fast_config(0);
        let page = FakePage::new().with_batches(&config.candidates, vec![vec![skill("A")]]);

        let collection = Collector::new(&page, &config, MemoryLogger::default().shared())
            .collect(&mut Discard)
            .await
            .unwrap();

        assert!(collection.elements.is_empty());
        assert_eq!(collection.iterations, 0);
        assert_eq!(page.queries(), 0);
    }

    #[tokio::test]
    async fn show_more_click_resets_retries() {
        let dir = tempfile::tempdir().unwrap();
        let clicks = ClickLogger::open(dir.path().join("clicks.txt")).unwrap();
        let config = fast_config(2);
        let page = FakePage::new().with_batches(&config.candidates, Vec::new());

        let button = FakeElement::builder("show-more")
            .on_click(&page.dom, DomChange::Remove(config.show_more.clone()))
            .build();
        page.insert(&config.show_more, button.clone());

        let collection = Collector::new(&page, &config, MemoryLogger::default().shared())
            .with_click_log(&clicks)
            .collect(&mut Discard)
            .await
            .unwrap();

        assert_eq!(button.clicks(), 1);
        assert_eq!(collection.iterations, 3);
        assert_eq!(collection.stop_reason, StopReason::RetriesExhausted);

        let log = std::fs::read_to_string(clicks.path()).unwrap();
        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["XPath", "/html[1]/body[1]/show-more[1]"]);
    }

    #[tokio::test]
    async fn hidden_show_more_is_not_clicked() {
        let config = fast_config(1);
        let page = FakePage::new().with_batches(&config.candidates, Vec::new());
        let button = FakeElement::builder("show-more").hidden().build();
        page.insert(&config.show_more, button.clone());

        let collection = Collector::new(&page, &config, MemoryLogger::default().shared())
            .collect(&mut Discard)
            .await
            .unwrap();

        assert_eq!(button.clicks(), 0);
        assert_eq!(collection.iterations, 1);
    }
}
