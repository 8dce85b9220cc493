//! Scripted in-memory browser for engine tests
//!
//! Pages are registered per URL. A URL may hold a queue of pages; each
//! navigation consumes the front one and the last one stays. A page can
//! carry a feed whose items are revealed a few at a time by scrolling.

use crate::browser::{
    ancestor_locator, Browser, BrowserError, BrowserLauncher, BrowserResult, ElementHandle,
    Locator,
};
use crate::crawler::markup;
use crate::proxy::CircuitRotator;
use crate::storage::Owner;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub text: String,
    pub attrs: HashMap<String, String>,
    pub children: HashMap<Locator, Vec<ElementHandle>>,
    pub screenshot: Vec<u8>,
}

impl FakeElement {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            screenshot: b"\x89PNG fake".to_vec(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn child(mut self, locator: Locator, element: ElementHandle) -> Self {
        self.children.entry(locator).or_default().push(element);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Feed {
    pub locator: Locator,
    pub items: Vec<ElementHandle>,
    pub per_scroll: usize,
}

#[derive(Debug, Clone)]
pub struct FakePage {
    pub source: String,
    pub roots: HashMap<Locator, Vec<ElementHandle>>,
    pub feed: Option<Feed>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self {
            source: "<html><body><main></main></body></html>".to_string(),
            roots: HashMap::new(),
            feed: None,
        }
    }
}

impl FakePage {
    pub fn root(mut self, locator: Locator, element: ElementHandle) -> Self {
        self.roots.entry(locator).or_default().push(element);
        self
    }

    /// A page showing one banner text
    pub fn banner(text: &str) -> Self {
        Self {
            source: format!("<html><body><div><span>{}</span></div></body></html>", text),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct WebState {
    pages: HashMap<String, VecDeque<FakePage>>,
    elements: HashMap<ElementHandle, FakeElement>,
    nav_failures: HashMap<String, usize>,
    navigations: Vec<String>,
    scrolls: usize,
    launches: usize,
    quits: usize,
    next_id: usize,
}

/// Shared scripted web that every fake browser reads from
#[derive(Clone, Default)]
pub struct FakeWeb {
    state: Arc<Mutex<WebState>>,
}

fn lock(state: &Mutex<WebState>) -> MutexGuard<'_, WebState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl FakeWeb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launcher(&self) -> Arc<FakeLauncher> {
        Arc::new(FakeLauncher { web: self.clone() })
    }

    pub fn element(&self, element: FakeElement) -> ElementHandle {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let handle = ElementHandle(format!("el-{}", state.next_id));
        state.elements.insert(handle.clone(), element);
        handle
    }

    pub fn set_page(&self, url: &str, page: FakePage) {
        self.set_pages(url, vec![page]);
    }

    pub fn set_pages(&self, url: &str, pages: Vec<FakePage>) {
        lock(&self.state)
            .pages
            .insert(url.to_string(), pages.into_iter().collect());
    }

    /// Makes the next `times` navigations to `url` fail at the transport level
    pub fn fail_navigation(&self, url: &str, times: usize) {
        lock(&self.state).nav_failures.insert(url.to_string(), times);
    }

    pub fn navigations(&self) -> Vec<String> {
        lock(&self.state).navigations.clone()
    }

    pub fn navigations_to(&self, url: &str) -> usize {
        lock(&self.state)
            .navigations
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    pub fn scrolls(&self) -> usize {
        lock(&self.state).scrolls
    }

    pub fn launches(&self) -> usize {
        lock(&self.state).launches
    }

    pub fn quits(&self) -> usize {
        lock(&self.state).quits
    }

    /// Search results page listing `ids` newest-first, `per_scroll` at a time
    pub fn search_page(&self, owner: &Owner, ids: &[&str], per_scroll: usize) -> FakePage {
        let items = ids
            .iter()
            .map(|id| {
                let link = self.element(
                    FakeElement::default().attr("href", format!("/{}/status/{}", owner, id)),
                );
                let time = self.element(FakeElement::default().child(markup::parent(), link));
                self.element(FakeElement::default().child(markup::item_time(), time))
            })
            .collect();

        FakePage {
            feed: Some(Feed {
                locator: markup::search_item(),
                items,
                per_scroll,
            }),
            ..FakePage::default()
        }
    }

    /// Search results page showing the "no results" notice for a query
    pub fn no_results_page(&self, query: &str) -> FakePage {
        let notice = self.element(FakeElement::with_text(format!("No results for \"{}\"", query)));
        FakePage::default().root(markup::no_results(query), notice)
    }

    /// Profile page, with a join caption when given
    pub fn profile_page(&self, joined: Option<&str>) -> FakePage {
        match joined {
            Some(caption) => {
                let span = self.element(FakeElement::with_text(caption));
                FakePage::default().root(markup::joined_caption(), span)
            }
            None => FakePage::default(),
        }
    }

    /// Single-item page with body text and optional reply text and date label
    pub fn status_page(
        &self,
        owner: &Owner,
        id: &str,
        text: &str,
        reply_text: Option<&str>,
        date_label: Option<&str>,
    ) -> FakePage {
        let body = self.element(FakeElement::with_text(text));
        let mut container =
            FakeElement::with_text(text).child(markup::item_text(), body);
        if let Some(reply) = reply_text {
            let reply = self.element(FakeElement::with_text(reply));
            container = container.child(markup::reply_text(), reply);
        }
        let container = self.element(container);

        let mut link = FakeElement::default()
            .attr("href", format!("/{}/status/{}", owner, id))
            .child(ancestor_locator(markup::CONTAINER_DEPTH), container);
        if let Some(label) = date_label {
            let label = self.element(FakeElement::with_text(label));
            link = link.child(markup::date_label(), label);
        }
        let link = self.element(link);

        FakePage::default().root(markup::permalink(owner, id), link)
    }
}

pub struct FakeLauncher {
    web: FakeWeb,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> BrowserResult<Box<dyn Browser>> {
        lock(&self.web.state).launches += 1;
        Ok(Box::new(FakeBrowser {
            web: self.web.clone(),
            current: Mutex::new(None),
        }))
    }
}

struct Current {
    page: FakePage,
    revealed: usize,
}

pub struct FakeBrowser {
    web: FakeWeb,
    current: Mutex<Option<Current>>,
}

impl FakeBrowser {
    fn with_current<T>(&self, f: impl FnOnce(&mut Current) -> T) -> BrowserResult<T> {
        let mut guard = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.as_mut().map(f).ok_or(BrowserError::NoSession)
    }

    fn element(&self, handle: &ElementHandle) -> BrowserResult<FakeElement> {
        lock(&self.web.state)
            .elements
            .get(handle)
            .cloned()
            .ok_or_else(|| BrowserError::Decode(format!("stale element {}", handle.0)))
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let page = {
            let mut state = lock(&self.web.state);
            state.navigations.push(url.to_string());

            if let Some(remaining) = state.nav_failures.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(BrowserError::Decode("connection refused".to_string()));
                }
            }

            match state.pages.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
                Some(queue) => queue.front().cloned().unwrap_or_default(),
                None => FakePage::default(),
            }
        };

        let revealed = page.feed.as_ref().map(|f| f.per_scroll).unwrap_or(0);
        let mut guard = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Current { page, revealed });
        Ok(())
    }

    async fn find_first(&self, locator: &Locator) -> BrowserResult<Option<ElementHandle>> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    async fn find_all(&self, locator: &Locator) -> BrowserResult<Vec<ElementHandle>> {
        self.with_current(|current| match &current.page.feed {
            Some(feed) if &feed.locator == locator => {
                let visible = current.revealed.min(feed.items.len());
                feed.items[..visible].to_vec()
            }
            _ => current.page.roots.get(locator).cloned().unwrap_or_default(),
        })
    }

    async fn find_first_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> BrowserResult<Option<ElementHandle>> {
        Ok(self
            .find_all_within(parent, locator)
            .await?
            .into_iter()
            .next())
    }

    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> BrowserResult<Vec<ElementHandle>> {
        Ok(self
            .element(parent)?
            .children
            .get(locator)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_script(&self, script: &str) -> BrowserResult<serde_json::Value> {
        if script.contains("scrollTo") {
            self.with_current(|current| {
                if let Some(feed) = &current.page.feed {
                    current.revealed += feed.per_scroll;
                }
            })?;
            lock(&self.web.state).scrolls += 1;
        }
        Ok(serde_json::Value::Null)
    }

    async fn text(&self, element: &ElementHandle) -> BrowserResult<String> {
        Ok(self.element(element)?.text)
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> BrowserResult<Option<String>> {
        Ok(self.element(element)?.attrs.get(name).cloned())
    }

    async fn screenshot(&self, element: &ElementHandle) -> BrowserResult<Vec<u8>> {
        Ok(self.element(element)?.screenshot)
    }

    async fn page_source(&self) -> BrowserResult<String> {
        self.with_current(|current| current.page.source.clone())
    }

    async fn quit(&self) -> BrowserResult<()> {
        lock(&self.web.state).quits += 1;
        Ok(())
    }
}

/// Circuit that only counts renewals
#[derive(Debug, Default)]
pub struct FakeCircuit {
    renewals: AtomicUsize,
}

impl FakeCircuit {
    pub fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CircuitRotator for FakeCircuit {
    async fn renew(&self) {
        self.renewals.fetch_add(1, Ordering::SeqCst);
    }
}
