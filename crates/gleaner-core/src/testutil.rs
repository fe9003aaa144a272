//! Scripted in-memory doubles for the driver, store, and reporter seams.
//!
//! `ScriptedDriver` plays back staged feed views instead of driving a real
//! rendering engine, so the loop, extractor, and sub-harvest can be tested
//! without a browser.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::RecordStore;
use crate::crawl::{CrawlEvent, CrawlReporter};
use crate::error::HarvestError;
use crate::record::Record;
use crate::session::{ContextId, PRIMARY_CONTEXT, Selectors, SessionDriver};

/// Blueprint for one rendered content unit.
#[derive(Debug, Clone)]
pub struct FakeUnit {
    pub occurred_at: Option<String>,
    pub author: Option<String>,
    pub body: Option<String>,
    pub metrics_label: Option<String>,
    pub engagement_href: Option<String>,
    pub stale_reads: u32,
}

impl FakeUnit {
    pub fn new(occurred_at: &str, author: &str, body: &str) -> Self {
        Self {
            occurred_at: Some(occurred_at.to_string()),
            author: Some(author.to_string()),
            body: Some(body.to_string()),
            metrics_label: None,
            engagement_href: None,
            stale_reads: 0,
        }
    }

    pub fn with_metrics(mut self, label: &str) -> Self {
        self.metrics_label = Some(label.to_string());
        self
    }

    pub fn with_engagement_href(mut self, href: &str) -> Self {
        self.engagement_href = Some(href.to_string());
        self
    }

    /// The unit's handle reports stale for the first `n` accesses.
    pub fn with_stale_reads(mut self, n: u32) -> Self {
        self.stale_reads = n;
        self
    }
}

/// One scripted response to a primary-feed fetch.
#[derive(Debug, Clone)]
pub enum FeedView {
    Units(Vec<FakeUnit>),
    Timeout,
}

#[derive(Debug)]
pub struct UnitState {
    spec: FakeUnit,
    stale_left: Mutex<u32>,
}

#[derive(Debug, Clone)]
pub enum FakeElement {
    Unit(Arc<UnitState>),
    Text(String),
    Timestamp(String),
    Metrics(String),
    Caret(Arc<UnitState>),
    MenuItem(String),
    Notice(String),
    Field(String),
    Button(String),
}

#[derive(Debug, Default)]
struct EngagementFeed {
    queue: VecDeque<Vec<String>>,
    last: Option<Vec<String>>,
}

/// Playback driver: staged views, staged engagement feeds, staged form
/// elements, and counters for every interaction the engine performs.
pub struct ScriptedDriver {
    selectors: Selectors,
    views: Mutex<VecDeque<FeedView>>,
    last_view: Mutex<Option<Vec<FakeUnit>>>,
    engagement_feeds: Mutex<HashMap<String, EngagementFeed>>,
    notices: Mutex<Vec<String>>,
    staged_fields: Mutex<Vec<String>>,
    staged_buttons: Mutex<Vec<String>>,
    typed: Mutex<Vec<(String, String)>>,
    clicked_buttons: Mutex<Vec<String>>,
    pending_menu_href: Mutex<Option<String>>,
    intercept_remaining: Mutex<u32>,
    retry_clicks: Mutex<u32>,
    js_clicks: Mutex<u32>,
    scrolls: Mutex<u32>,
    navigations: Mutex<Vec<String>>,
    current_url: Mutex<String>,
    contexts: Mutex<Vec<ContextId>>,
    active: Mutex<ContextId>,
    next_context: Mutex<ContextId>,
    opened_contexts: Mutex<u32>,
}

impl ScriptedDriver {
    pub fn new(selectors: Selectors) -> Self {
        Self {
            selectors,
            views: Mutex::new(VecDeque::new()),
            last_view: Mutex::new(None),
            engagement_feeds: Mutex::new(HashMap::new()),
            notices: Mutex::new(Vec::new()),
            staged_fields: Mutex::new(Vec::new()),
            staged_buttons: Mutex::new(Vec::new()),
            typed: Mutex::new(Vec::new()),
            clicked_buttons: Mutex::new(Vec::new()),
            pending_menu_href: Mutex::new(None),
            intercept_remaining: Mutex::new(0),
            retry_clicks: Mutex::new(0),
            js_clicks: Mutex::new(0),
            scrolls: Mutex::new(0),
            navigations: Mutex::new(Vec::new()),
            current_url: Mutex::new(String::new()),
            contexts: Mutex::new(vec![PRIMARY_CONTEXT]),
            active: Mutex::new(PRIMARY_CONTEXT),
            next_context: Mutex::new(PRIMARY_CONTEXT + 1),
            opened_contexts: Mutex::new(0),
        }
    }

    /// Queue one primary-feed fetch response. Once the queue is drained,
    /// the last `Units` view repeats with fresh element handles.
    pub fn stage_view(&self, view: FeedView) {
        self.views.lock().unwrap().push_back(view);
    }

    /// Queue sub-cycle views for the engagement feed at `href`. The last
    /// view repeats once the queue is drained.
    pub fn stage_engagement_feed(&self, href: &str, sub_views: Vec<Vec<String>>) {
        let mut feeds = self.engagement_feeds.lock().unwrap();
        let feed = feeds.entry(href.to_string()).or_default();
        feed.queue.extend(sub_views);
    }

    pub fn push_notice(&self, text: &str) {
        self.notices.lock().unwrap().push(text.to_string());
    }

    pub fn stage_field(&self, selector: &str) {
        self.staged_fields.lock().unwrap().push(selector.to_string());
    }

    pub fn stage_button(&self, label: &str) {
        self.staged_buttons.lock().unwrap().push(label.to_string());
    }

    /// Make the next `n` plain clicks fail as intercepted by an overlay.
    pub fn intercept_next_clicks(&self, n: u32) {
        *self.intercept_remaining.lock().unwrap() = n;
    }

    pub fn make_unit(&self, spec: FakeUnit) -> FakeElement {
        let stale = spec.stale_reads;
        FakeElement::Unit(Arc::new(UnitState {
            spec,
            stale_left: Mutex::new(stale),
        }))
    }

    pub fn retry_clicks(&self) -> u32 {
        *self.retry_clicks.lock().unwrap()
    }

    pub fn js_clicks(&self) -> u32 {
        *self.js_clicks.lock().unwrap()
    }

    pub fn scroll_count(&self) -> u32 {
        *self.scrolls.lock().unwrap()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn typed_values(&self) -> Vec<(String, String)> {
        self.typed.lock().unwrap().clone()
    }

    pub fn clicked_buttons(&self) -> Vec<String> {
        self.clicked_buttons.lock().unwrap().clone()
    }

    pub fn active_context(&self) -> ContextId {
        *self.active.lock().unwrap()
    }

    pub fn open_context_count(&self) -> u32 {
        *self.opened_contexts.lock().unwrap()
    }

    fn timeout_err(selector: &str, timeout: Duration) -> HarvestError {
        HarvestError::WaitTimeout {
            selector: selector.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    }

    fn build_units(&self, specs: &[FakeUnit]) -> Vec<FakeElement> {
        specs.iter().map(|s| self.make_unit(s.clone())).collect()
    }

    fn primary_fetch(&self, timeout: Duration) -> Result<Vec<FakeElement>, HarvestError> {
        let popped = self.views.lock().unwrap().pop_front();
        match popped {
            Some(FeedView::Units(specs)) => {
                *self.last_view.lock().unwrap() = Some(specs.clone());
                Ok(self.build_units(&specs))
            }
            Some(FeedView::Timeout) => {
                Err(Self::timeout_err(&self.selectors.content_unit, timeout))
            }
            None => match self.last_view.lock().unwrap().as_ref() {
                Some(specs) => Ok(self.build_units(specs)),
                None => Err(Self::timeout_err(&self.selectors.content_unit, timeout)),
            },
        }
    }

    fn engagement_fetch(&self, timeout: Duration) -> Result<Vec<FakeElement>, HarvestError> {
        let url = self.current_url.lock().unwrap().clone();
        let mut feeds = self.engagement_feeds.lock().unwrap();
        let Some(feed) = feeds.get_mut(&url) else {
            return Err(Self::timeout_err(&self.selectors.content_unit, timeout));
        };
        let texts = match feed.queue.pop_front() {
            Some(texts) => {
                feed.last = Some(texts.clone());
                texts
            }
            None => match &feed.last {
                Some(texts) => texts.clone(),
                None => {
                    return Err(Self::timeout_err(&self.selectors.content_unit, timeout));
                }
            },
        };
        Ok(texts
            .iter()
            .map(|t| self.make_unit(FakeUnit::new("2024-01-01T00:00:00Z", "sub", t)))
            .collect())
    }

    fn check_stale(&self, state: &UnitState) -> Result<(), HarvestError> {
        let mut left = state.stale_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(HarvestError::StaleElement);
        }
        Ok(())
    }
}

impl SessionDriver for ScriptedDriver {
    type Element = FakeElement;

    async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
        self.navigations.lock().unwrap().push(url.to_string());
        *self.current_url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn wait_for_one(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<FakeElement, HarvestError> {
        if selector == self.selectors.engagement_menu_item {
            return match self.pending_menu_href.lock().unwrap().clone() {
                Some(href) => Ok(FakeElement::MenuItem(href)),
                None => Err(Self::timeout_err(selector, timeout)),
            };
        }
        if self.staged_fields.lock().unwrap().iter().any(|f| f == selector) {
            return Ok(FakeElement::Field(selector.to_string()));
        }
        if selector == self.selectors.content_unit {
            // Peek without consuming: the loop's own fetch pops views.
            let views = self.views.lock().unwrap();
            let specs = match views.front() {
                Some(FeedView::Units(specs)) => Some(specs.clone()),
                _ => None,
            };
            drop(views);
            let specs = specs.or_else(|| self.last_view.lock().unwrap().clone());
            if let Some(specs) = specs
                && let Some(first) = specs.first()
            {
                return Ok(self.make_unit(first.clone()));
            }
        }
        Err(Self::timeout_err(selector, timeout))
    }

    async fn wait_for_all(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Vec<FakeElement>, HarvestError> {
        if selector != self.selectors.content_unit {
            return Err(Self::timeout_err(selector, timeout));
        }
        if self.active_context() == PRIMARY_CONTEXT {
            self.primary_fetch(timeout)
        } else {
            self.engagement_fetch(timeout)
        }
    }

    async fn find_by_text(
        &self,
        selector: &str,
        text: &str,
        timeout: Duration,
    ) -> Result<FakeElement, HarvestError> {
        if self.staged_buttons.lock().unwrap().iter().any(|b| b == text) {
            return Ok(FakeElement::Button(text.to_string()));
        }
        let notices = self.notices.lock().unwrap();
        if !notices.is_empty()
            && (notices.iter().any(|n| n == text) || text == self.selectors.retry_text)
        {
            return Ok(FakeElement::Notice(text.to_string()));
        }
        Err(Self::timeout_err(selector, timeout))
    }

    async fn find_in(
        &self,
        element: &FakeElement,
        selector: &str,
    ) -> Result<FakeElement, HarvestError> {
        let FakeElement::Unit(state) = element else {
            return Err(HarvestError::MissingElement(selector.to_string()));
        };
        self.check_stale(state)?;

        let sel = &self.selectors;
        let spec = &state.spec;
        let found = if selector == sel.timestamp {
            spec.occurred_at.clone().map(FakeElement::Timestamp)
        } else if selector == sel.author {
            spec.author.clone().map(FakeElement::Text)
        } else if selector == sel.body {
            spec.body.clone().map(FakeElement::Text)
        } else if selector == sel.metrics_group {
            spec.metrics_label.clone().map(FakeElement::Metrics)
        } else if selector == sel.engagement_caret {
            spec.engagement_href
                .as_ref()
                .map(|_| FakeElement::Caret(Arc::clone(state)))
        } else {
            None
        };
        found.ok_or_else(|| HarvestError::MissingElement(selector.to_string()))
    }

    async fn read_text(&self, element: &FakeElement) -> Result<String, HarvestError> {
        match element {
            FakeElement::Text(s) | FakeElement::Notice(s) | FakeElement::Button(s) => {
                Ok(s.clone())
            }
            _ => Ok(String::new()),
        }
    }

    async fn read_attribute(
        &self,
        element: &FakeElement,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        match element {
            FakeElement::Timestamp(ts) if name == self.selectors.timestamp_attr => {
                Ok(Some(ts.clone()))
            }
            FakeElement::Metrics(label) if name == self.selectors.metrics_attr => {
                Ok(Some(label.clone()))
            }
            FakeElement::MenuItem(href) if name == self.selectors.engagement_href_attr => {
                Ok(Some(href.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn click(&self, element: &FakeElement) -> Result<(), HarvestError> {
        {
            let mut remaining = self.intercept_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(HarvestError::InteractionBlocked(
                    "element obscured by overlay".to_string(),
                ));
            }
        }
        match element {
            FakeElement::Caret(state) => {
                *self.pending_menu_href.lock().unwrap() = state.spec.engagement_href.clone();
            }
            FakeElement::Notice(text) if *text == self.selectors.retry_text => {
                *self.retry_clicks.lock().unwrap() += 1;
                self.notices.lock().unwrap().clear();
            }
            FakeElement::Button(label) => {
                self.clicked_buttons.lock().unwrap().push(label.clone());
            }
            _ => {}
        }
        Ok(())
    }

    async fn click_js(&self, element: &FakeElement) -> Result<(), HarvestError> {
        *self.js_clicks.lock().unwrap() += 1;
        if let FakeElement::Caret(state) = element {
            *self.pending_menu_href.lock().unwrap() = state.spec.engagement_href.clone();
        }
        Ok(())
    }

    async fn type_text(&self, element: &FakeElement, text: &str) -> Result<(), HarvestError> {
        let target = match element {
            FakeElement::Field(sel) => sel.clone(),
            _ => String::new(),
        };
        self.typed.lock().unwrap().push((target, text.to_string()));
        Ok(())
    }

    async fn scroll_viewport(&self) -> Result<(), HarvestError> {
        *self.scrolls.lock().unwrap() += 1;
        Ok(())
    }

    async fn open_context(&self) -> Result<ContextId, HarvestError> {
        let mut next = self.next_context.lock().unwrap();
        let id = *next;
        *next += 1;
        self.contexts.lock().unwrap().push(id);
        *self.opened_contexts.lock().unwrap() += 1;
        Ok(id)
    }

    async fn switch_context(&self, id: ContextId) -> Result<(), HarvestError> {
        if !self.contexts.lock().unwrap().contains(&id) {
            return Err(HarvestError::Session(format!("unknown context {id}")));
        }
        *self.active.lock().unwrap() = id;
        Ok(())
    }

    async fn close_context(&self, id: ContextId) -> Result<(), HarvestError> {
        self.contexts.lock().unwrap().retain(|c| *c != id);
        Ok(())
    }

    async fn restore_primary_context(&self) -> Result<(), HarvestError> {
        self.contexts.lock().unwrap().retain(|c| *c == PRIMARY_CONTEXT);
        *self.active.lock().unwrap() = PRIMARY_CONTEXT;
        Ok(())
    }

    async fn page_notices(&self, _selector: &str) -> Result<Vec<String>, HarvestError> {
        Ok(self.notices.lock().unwrap().clone())
    }
}

/// In-memory record store that captures writes and serves a staged prior.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    prior: Mutex<Option<Vec<Record>>>,
    writes: Mutex<Vec<(PathBuf, Vec<Record>)>>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn with_prior(records: Vec<Record>) -> Self {
        let store = Self::default();
        *store.inner.prior.lock().unwrap() = Some(records);
        store
    }

    pub fn failing_writes() -> Self {
        let store = Self::default();
        *store.inner.fail_writes.lock().unwrap() = true;
        store
    }

    pub fn last_write(&self) -> Option<Vec<Record>> {
        self.inner
            .writes
            .lock()
            .unwrap()
            .last()
            .map(|(_, records)| records.clone())
    }

    pub fn write_count(&self) -> usize {
        self.inner.writes.lock().unwrap().len()
    }
}

impl RecordStore for MemoryStore {
    async fn load_prior(&self, path: &Path) -> Result<Vec<Record>, HarvestError> {
        self.inner
            .prior
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| HarvestError::Checkpoint(format!("no prior at {}", path.display())))
    }

    async fn write(&self, path: &Path, records: &[Record]) -> Result<(), HarvestError> {
        if *self.inner.fail_writes.lock().unwrap() {
            return Err(HarvestError::Checkpoint("write disabled".to_string()));
        }
        self.inner
            .writes
            .lock()
            .unwrap()
            .push((path.to_path_buf(), records.to_vec()));
        Ok(())
    }
}

/// Reporter that records event labels and can cancel a token when a
/// given cycle is observed.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<String>>,
    cancel_on_cycle: Option<(u64, CancellationToken)>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_on_cycle(cycle: u64, token: CancellationToken) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel_on_cycle: Some((cycle, token)),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn saw(&self, label: &str) -> bool {
        self.events.lock().unwrap().iter().any(|e| e == label)
    }
}

impl CrawlReporter for RecordingReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let label = match event {
            CrawlEvent::Started { .. } => "started",
            CrawlEvent::AuthAttempt { .. } => "auth_attempt",
            CrawlEvent::Authenticated => "authenticated",
            CrawlEvent::TargetLoaded => "target_loaded",
            CrawlEvent::Cycle { cycle, .. } => {
                if let Some((at, token)) = &self.cancel_on_cycle
                    && cycle >= *at
                {
                    token.cancel();
                }
                "cycle"
            }
            CrawlEvent::RecordAccepted { .. } => "record_accepted",
            CrawlEvent::DuplicateSkipped { .. } => "duplicate_skipped",
            CrawlEvent::StagnationTick { .. } => "stagnation_tick",
            CrawlEvent::Draining { .. } => "draining",
            CrawlEvent::CheckpointWritten { .. } => "checkpoint_written",
            CrawlEvent::CheckpointFailed { .. } => "checkpoint_failed",
            CrawlEvent::Finished { .. } => "finished",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}
