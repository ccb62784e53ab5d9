//! The browser capability set the scraper is written against.
//!
//! `BrowserDriver` implements these traits over a live WebDriver session;
//! tests implement them over in-memory fakes.

use crate::error::ScrapeError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thirtyfour::By;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
    Id(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css `{}`", s),
            Self::XPath(s) => write!(f, "xpath `{}`", s),
            Self::Id(s) => write!(f, "id `{}`", s),
        }
    }
}

impl From<&Locator> for By {
    fn from(locator: &Locator) -> Self {
        match locator {
            Locator::Css(s) => By::Css(s.clone()),
            Locator::XPath(s) => By::XPath(s.clone()),
            Locator::Id(s) => By::Id(s.clone()),
        }
    }
}

#[async_trait]
pub trait ElementHandle: Clone + Send + Sync + Sized {
    /// Stable identity of the underlying DOM node for the lifetime of the page.
    fn key(&self) -> String;

    async fn attr(&self, name: &str) -> Result<Option<String>, ScrapeError>;

    async fn text(&self) -> Result<String, ScrapeError>;

    async fn inner_html(&self) -> Result<String, ScrapeError>;

    /// First descendant matching `locator`, `None` when there is none.
    async fn find(&self, locator: &Locator) -> Result<Option<Self>, ScrapeError>;

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Self>, ScrapeError>;

    async fn is_selected(&self) -> Result<bool, ScrapeError>;

    /// Displayed and enabled.
    async fn is_clickable(&self) -> Result<bool, ScrapeError>;

    async fn click(&self) -> Result<(), ScrapeError>;

    async fn send_keys(&self, text: &str) -> Result<(), ScrapeError>;
}

#[async_trait]
pub trait Page: Send + Sync {
    type Element: ElementHandle;

    async fn navigate(&self, url: &str) -> Result<(), ScrapeError>;

    async fn current_url(&self) -> Result<String, ScrapeError>;

    async fn find(&self, locator: &Locator) -> Result<Option<Self::Element>, ScrapeError>;

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Self::Element>, ScrapeError>;

    async fn execute(
        &self,
        script: &str,
        args: Vec<Self::Element>,
    ) -> Result<serde_json::Value, ScrapeError>;

    async fn scroll_to_bottom(&self) -> Result<(), ScrapeError>;

    async fn scroll_into_view(&self, element: &Self::Element) -> Result<(), ScrapeError>;

    async fn document_height(&self) -> Result<i64, ScrapeError>;

    /// Dispatches a click from page script, bypassing overlay interception.
    async fn js_click(&self, element: &Self::Element) -> Result<(), ScrapeError>;

    async fn absolute_xpath(&self, element: &Self::Element) -> Result<String, ScrapeError>;

    async fn screenshot_png(&self) -> Result<Vec<u8>, ScrapeError>;

    async fn page_source(&self) -> Result<String, ScrapeError>;

    /// Ends the session. The page must not be used afterwards.
    async fn quit(&self) -> Result<(), ScrapeError>;

    /// Polls for `locator` until it is present or `timeout` elapses.
    async fn wait_for(
        &self,
        locator: &Locator,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Self::Element, ScrapeError> {
        poll_until(timeout, interval, || self.find(locator))
            .await?
            .ok_or_else(|| ScrapeError::Timeout {
                what: locator.to_string(),
                timeout,
            })
    }

    /// Polls until nothing matches `locator` or `timeout` elapses.
    async fn wait_until_gone(
        &self,
        locator: &Locator,
        timeout: Duration,
        interval: Duration,
    ) -> Result<(), ScrapeError> {
        let gone = poll_until(timeout, interval, || async {
            Ok::<_, ScrapeError>(self.find(locator).await?.is_none().then_some(()))
        })
        .await?;

        gone.ok_or_else(|| ScrapeError::Timeout {
            what: format!("{} to disappear", locator),
            timeout,
        })
    }
}

/// Runs `probe` every `interval` until it yields a value or `timeout` elapses.
///
/// The probe always runs at least once, so a zero timeout is a single check.
pub async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<Option<T>, ScrapeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ScrapeError>>,
{
    let start = Instant::now();

    loop {
        if let Some(value) = probe().await? {
            return Ok(Some(value));
        }

        if start.elapsed() >= timeout {
            return Ok(None);
        }

        sleep(interval.min(timeout.saturating_sub(start.elapsed()))).await;
    }
}
