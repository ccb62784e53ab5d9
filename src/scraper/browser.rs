use super::page::{ElementHandle, Locator, Page};
use crate::error::ScrapeError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use thirtyfour::prelude::*;
use tokio::time::{sleep, Duration};

/// Walks from the element up to the document, recording each node's
/// 1-based position among preceding siblings with the same node name.
const ABSOLUTE_XPATH_SCRIPT: &str = r#"
var node = arguments[0];
var parts = [];
while (node && node.nodeType !== Node.DOCUMENT_NODE) {
    var name;
    switch (node.nodeType) {
        case Node.TEXT_NODE: name = 'text()'; break;
        case Node.ATTRIBUTE_NODE: name = '@' + node.nodeName; break;
        case Node.PROCESSING_INSTRUCTION_NODE: name = 'processing-instruction()'; break;
        case Node.COMMENT_NODE: name = 'comment()'; break;
        default: name = node.nodeName;
    }
    var step = '/' + name.toLowerCase();
    if (node.nodeType !== Node.ATTRIBUTE_NODE) {
        var position = 1;
        for (var sib = node.previousSibling; sib; sib = sib.previousSibling) {
            if (sib.nodeName === node.nodeName) { position++; }
        }
        step += '[' + position + ']';
    }
    parts.unshift(step);
    node = node.nodeType === Node.ATTRIBUTE_NODE ? node.ownerElement : node.parentNode;
}
return parts.length ? parts.join('') : '/';
"#;

#[derive(Clone)]
pub struct BrowserElement(WebElement);

impl BrowserElement {
    fn to_json(&self) -> Result<serde_json::Value, ScrapeError> {
        Ok(self.0.to_json()?)
    }
}

#[async_trait]
impl ElementHandle for BrowserElement {
    fn key(&self) -> String {
        self.0.element_id().to_string()
    }

    async fn attr(&self, name: &str) -> Result<Option<String>, ScrapeError> {
        Ok(self.0.attr(name).await?)
    }

    async fn text(&self) -> Result<String, ScrapeError> {
        Ok(self.0.text().await?)
    }

    async fn inner_html(&self) -> Result<String, ScrapeError> {
        Ok(self.0.inner_html().await?)
    }

    async fn find(&self, locator: &Locator) -> Result<Option<Self>, ScrapeError> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Self>, ScrapeError> {
        let elements = self.0.find_all(By::from(locator)).await?;
        Ok(elements.into_iter().map(BrowserElement).collect())
    }

    async fn is_selected(&self) -> Result<bool, ScrapeError> {
        Ok(self.0.is_selected().await?)
    }

    async fn is_clickable(&self) -> Result<bool, ScrapeError> {
        Ok(self.0.is_displayed().await? && self.0.is_enabled().await?)
    }

    async fn click(&self) -> Result<(), ScrapeError> {
        Ok(self.0.click().await?)
    }

    async fn send_keys(&self, text: &str) -> Result<(), ScrapeError> {
        self.0.clear().await?;
        self.0.send_keys(text).await?;
        Ok(())
    }
}

pub struct BrowserDriver {
    driver: WebDriver,
}

impl BrowserDriver {
    pub async fn new(port: u16, headless: bool) -> Result<Self> {
        tracing::debug!(port, headless, "Creating browser session");

        let mut caps = DesiredCapabilities::chrome();

        let mut chrome_args = vec![
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--window-size=1920,1080",
        ];

        if headless {
            chrome_args.push("--headless");
        }

        for arg in chrome_args {
            caps.add_arg(arg)?;
        }

        let server_url = format!("http://localhost:{}", port);

        let mut last_error = None;
        for attempt in 1..=3 {
            match WebDriver::new(&server_url, caps.clone()).await {
                Ok(driver) => {
                    tracing::debug!(attempt, "Connected to ChromeDriver");
                    return Ok(Self { driver });
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "ChromeDriver connection attempt failed");
                    last_error = Some(e);
                    if attempt < 3 {
                        sleep(Duration::from_millis(1000)).await;
                    }
                }
            }
        }

        match last_error {
            Some(e) => Err(e).with_context(|| {
                format!("Failed to connect to ChromeDriver on port {} after 3 attempts", port)
            }),
            None => Err(anyhow::anyhow!("Failed to connect to ChromeDriver on port {}", port)),
        }
    }
}

#[async_trait]
impl Page for BrowserDriver {
    type Element = BrowserElement;

    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ScrapeError> {
        Ok(self.driver.current_url().await?.to_string())
    }

    async fn find(&self, locator: &Locator) -> Result<Option<BrowserElement>, ScrapeError> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<BrowserElement>, ScrapeError> {
        let elements = self.driver.find_all(By::from(locator)).await?;
        Ok(elements.into_iter().map(BrowserElement).collect())
    }

    async fn execute(
        &self,
        script: &str,
        args: Vec<BrowserElement>,
    ) -> Result<serde_json::Value, ScrapeError> {
        let json_args = args
            .iter()
            .map(BrowserElement::to_json)
            .collect::<Result<Vec<_>, _>>()?;

        match self.driver.execute(script, json_args).await {
            Ok(ret) => Ok(ret.json().clone()),
            Err(e) => Err(ScrapeError::Script(e.to_string())),
        }
    }

    async fn scroll_to_bottom(&self) -> Result<(), ScrapeError> {
        self.execute("window.scrollTo(0, document.body.scrollHeight);", Vec::new())
            .await?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &BrowserElement) -> Result<(), ScrapeError> {
        self.execute(
            "arguments[0].scrollIntoView({ block: 'center', inline: 'nearest' });",
            vec![element.clone()],
        )
        .await?;
        Ok(())
    }

    async fn document_height(&self) -> Result<i64, ScrapeError> {
        let value = self
            .execute("return document.body.scrollHeight;", Vec::new())
            .await?;

        value
            .as_i64()
            .or_else(|| value.as_f64().map(|h| h as i64))
            .ok_or_else(|| ScrapeError::Script(format!("scrollHeight was not a number: {}", value)))
    }

    async fn js_click(&self, element: &BrowserElement) -> Result<(), ScrapeError> {
        self.execute("arguments[0].click();", vec![element.clone()])
            .await?;
        Ok(())
    }

    async fn absolute_xpath(&self, element: &BrowserElement) -> Result<String, ScrapeError> {
        let value = self
            .execute(ABSOLUTE_XPATH_SCRIPT, vec![element.clone()])
            .await?;

        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ScrapeError::Script("absolute XPath script returned no string".to_string()))
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, ScrapeError> {
        Ok(self.driver.screenshot_as_png().await?)
    }

    async fn page_source(&self) -> Result<String, ScrapeError> {
        Ok(self.driver.source().await?)
    }

    async fn quit(&self) -> Result<(), ScrapeError> {
        let driver = self.driver.clone();
        driver.quit().await?;
        Ok(())
    }
}
