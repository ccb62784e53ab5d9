//! In-memory stand-ins for the browser used by unit tests.

use super::page::{ElementHandle, Locator, Page};
use super::{LogLevel, Logger, SharedLogger};
use crate::error::ScrapeError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Page-level elements keyed by the locator that finds them.
pub type Dom = Arc<Mutex<HashMap<Locator, Vec<FakeElement>>>>;

#[derive(Clone)]
pub enum DomChange {
    Insert(Locator, FakeElement),
    Remove(Locator),
}

impl DomChange {
    fn apply(&self, dom: &Dom) {
        let mut dom = dom.lock().unwrap();
        match self {
            Self::Insert(locator, element) => dom.entry(locator.clone()).or_default().push(element.clone()),
            Self::Remove(locator) => {
                dom.remove(locator);
            }
        }
    }
}

#[derive(Default)]
struct Node {
    key: String,
    attrs: HashMap<String, String>,
    text: String,
    inner_html: String,
    children: HashMap<Locator, Vec<FakeElement>>,
    selected: bool,
    hidden: bool,
    fail_click: bool,
    on_click: Vec<(Dom, DomChange)>,
    clicks: AtomicUsize,
    typed: Mutex<String>,
}

#[derive(Clone)]
pub struct FakeElement(Arc<Node>);

impl std::fmt::Debug for FakeElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FakeElement").field(&self.0.key).finish()
    }
}

pub struct FakeElementBuilder(Node);

impl FakeElement {
    pub fn builder(key: &str) -> FakeElementBuilder {
        FakeElementBuilder(Node {
            key: key.to_string(),
            ..Node::default()
        })
    }

    /// Element whose `id` attribute equals its key.
    pub fn with_id(id: &str) -> Self {
        Self::builder(id).attr("id", id).build()
    }

    pub fn clicks(&self) -> usize {
        self.0.clicks.load(Ordering::SeqCst)
    }

    pub fn typed(&self) -> String {
        self.0.typed.lock().unwrap().clone()
    }

    fn fire_click(&self) {
        self.0.clicks.fetch_add(1, Ordering::SeqCst);
        for (dom, change) in &self.0.on_click {
            change.apply(dom);
        }
    }
}

impl FakeElementBuilder {
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.0.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.0.text = text.to_string();
        self
    }

    pub fn html(mut self, html: &str) -> Self {
        self.0.inner_html = html.to_string();
        self
    }

    pub fn child(mut self, locator: &Locator, child: FakeElement) -> Self {
        self.0.children.entry(locator.clone()).or_default().push(child);
        self
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.0.selected = selected;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.0.hidden = true;
        self
    }

    pub fn failing_click(mut self) -> Self {
        self.0.fail_click = true;
        self
    }

    pub fn on_click(mut self, dom: &Dom, change: DomChange) -> Self {
        self.0.on_click.push((dom.clone(), change));
        self
    }

    pub fn build(self) -> FakeElement {
        FakeElement(Arc::new(self.0))
    }
}

#[async_trait]
impl ElementHandle for FakeElement {
    fn key(&self) -> String {
        self.0.key.clone()
    }

    async fn attr(&self, name: &str) -> Result<Option<String>, ScrapeError> {
        Ok(self.0.attrs.get(name).cloned())
    }

    async fn text(&self) -> Result<String, ScrapeError> {
        Ok(self.0.text.clone())
    }

    async fn inner_html(&self) -> Result<String, ScrapeError> {
        Ok(self.0.inner_html.clone())
    }

    async fn find(&self, locator: &Locator) -> Result<Option<Self>, ScrapeError> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Self>, ScrapeError> {
        Ok(self.0.children.get(locator).cloned().unwrap_or_default())
    }

    async fn is_selected(&self) -> Result<bool, ScrapeError> {
        Ok(self.0.selected)
    }

    async fn is_clickable(&self) -> Result<bool, ScrapeError> {
        Ok(!self.0.hidden)
    }

    async fn click(&self) -> Result<(), ScrapeError> {
        if self.0.fail_click {
            return Err(ScrapeError::Script("element click intercepted".to_string()));
        }
        self.fire_click();
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<(), ScrapeError> {
        *self.0.typed.lock().unwrap() = text.to_string();
        Ok(())
    }
}

/// Fake page: a scripted sequence of discovery batches for one locator,
/// a scripted (or ever-growing) document height, and a mutable DOM for the rest.
pub struct FakePage {
    pub dom: Dom,
    batch_locator: Option<Locator>,
    batches: Mutex<VecDeque<Vec<FakeElement>>>,
    heights: Mutex<VecDeque<i64>>,
    next_height: AtomicI64,
    pub queries: AtomicUsize,
    pub scrolls: AtomicUsize,
    pub js_clicks: Mutex<Vec<String>>,
    pub visited: Mutex<Vec<String>>,
    pub quit_calls: AtomicUsize,
}

impl FakePage {
    pub const SCREENSHOT: &'static [u8] = b"\x89PNG fake";
    pub const SOURCE: &'static str = "<html><body>fake</body></html>";

    pub fn new() -> Self {
        Self {
            dom: Arc::new(Mutex::new(HashMap::new())),
            batch_locator: None,
            batches: Mutex::new(VecDeque::new()),
            heights: Mutex::new(VecDeque::new()),
            next_height: AtomicI64::new(1000),
            queries: AtomicUsize::new(0),
            scrolls: AtomicUsize::new(0),
            js_clicks: Mutex::new(Vec::new()),
            visited: Mutex::new(Vec::new()),
            quit_calls: AtomicUsize::new(0),
        }
    }

    /// `locator` yields the next batch per query, then nothing once they run out.
    pub fn with_batches(mut self, locator: &Locator, batches: Vec<Vec<FakeElement>>) -> Self {
        self.batch_locator = Some(locator.clone());
        self.batches = Mutex::new(batches.into());
        self
    }

    /// Scripted heights are served first; afterwards the height keeps growing.
    pub fn with_heights(self, heights: Vec<i64>) -> Self {
        *self.heights.lock().unwrap() = heights.into();
        self
    }

    pub fn insert(&self, locator: &Locator, element: FakeElement) {
        DomChange::Insert(locator.clone(), element).apply(&self.dom);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Page for FakePage {
    type Element = FakeElement;

    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        self.visited.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ScrapeError> {
        Ok(self.visited.lock().unwrap().last().cloned().unwrap_or_default())
    }

    async fn find(&self, locator: &Locator) -> Result<Option<FakeElement>, ScrapeError> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<FakeElement>, ScrapeError> {
        if self.batch_locator.as_ref() == Some(locator) {
            self.queries.fetch_add(1, Ordering::SeqCst);
            return Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default());
        }
        Ok(self.dom.lock().unwrap().get(locator).cloned().unwrap_or_default())
    }

    async fn execute(&self, _script: &str, _args: Vec<FakeElement>) -> Result<serde_json::Value, ScrapeError> {
        Ok(serde_json::Value::Null)
    }

    async fn scroll_to_bottom(&self) -> Result<(), ScrapeError> {
        self.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn scroll_into_view(&self, _element: &FakeElement) -> Result<(), ScrapeError> {
        Ok(())
    }

    async fn document_height(&self) -> Result<i64, ScrapeError> {
        if let Some(height) = self.heights.lock().unwrap().pop_front() {
            return Ok(height);
        }
        Ok(self.next_height.fetch_add(100, Ordering::SeqCst))
    }

    async fn js_click(&self, element: &FakeElement) -> Result<(), ScrapeError> {
        self.js_clicks.lock().unwrap().push(element.key());
        element.fire_click();
        Ok(())
    }

    async fn absolute_xpath(&self, element: &FakeElement) -> Result<String, ScrapeError> {
        Ok(format!("/html[1]/body[1]/{}[1]", element.key()))
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, ScrapeError> {
        Ok(Self::SCREENSHOT.to_vec())
    }

    async fn page_source(&self) -> Result<String, ScrapeError> {
        Ok(Self::SOURCE.to_string())
    }

    async fn quit(&self) -> Result<(), ScrapeError> {
        self.quit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Logger that keeps every message for assertions.
#[derive(Clone, Default)]
pub struct MemoryLogger {
    pub entries: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl MemoryLogger {
    pub fn shared(&self) -> SharedLogger {
        Arc::new(AsyncMutex::new(Box::new(self.clone()) as Box<dyn Logger>))
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().unwrap().iter().any(|(_, m)| m.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, message: String, level: LogLevel) {
        self.entries.lock().unwrap().push((level, message));
    }
}
