use std::future::Future;
use std::time::Duration;

use crate::error::HarvestError;

/// Identifier for one browsing context (tab). The context the run starts
/// in is always [`PRIMARY_CONTEXT`]; the engagement sub-harvest opens and
/// closes transient secondary contexts around it.
pub type ContextId = u64;

pub const PRIMARY_CONTEXT: ContextId = 0;

/// Capability surface over the rendering engine.
///
/// Pure capability provider — no harvesting logic lives here. All waits
/// are bounded; a wait that expires returns
/// [`HarvestError::WaitTimeout`], never blocks indefinitely. Element
/// handles may go stale when the page re-renders, surfaced as
/// [`HarvestError::StaleElement`].
pub trait SessionDriver: Send + Sync {
    type Element: Send + Sync;

    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Wait up to `timeout` for one element matching `selector`.
    fn wait_for_one(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Element, HarvestError>> + Send;

    /// Wait up to `timeout` for at least one element matching `selector`,
    /// returning all matches in rendered order.
    fn wait_for_all(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<Self::Element>, HarvestError>> + Send;

    /// Wait up to `timeout` for an element matching `selector` whose text
    /// equals `text` exactly (login buttons, retry affordances).
    fn find_by_text(
        &self,
        selector: &str,
        text: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Element, HarvestError>> + Send;

    /// Find a sub-element of `element` matching `selector`.
    fn find_in(
        &self,
        element: &Self::Element,
        selector: &str,
    ) -> impl Future<Output = Result<Self::Element, HarvestError>> + Send;

    fn read_text(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = Result<String, HarvestError>> + Send;

    fn read_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> impl Future<Output = Result<Option<String>, HarvestError>> + Send;

    fn click(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Programmatic activation fallback for when a plain click is
    /// obstructed by an overlay.
    fn click_js(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = Result<(), HarvestError>> + Send;

    fn type_text(
        &self,
        element: &Self::Element,
        text: &str,
    ) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Scroll the active context by one viewport height.
    fn scroll_viewport(&self) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Open a new browsing context and return its id (does not switch).
    fn open_context(&self) -> impl Future<Output = Result<ContextId, HarvestError>> + Send;

    fn switch_context(&self, id: ContextId)
    -> impl Future<Output = Result<(), HarvestError>> + Send;

    fn close_context(&self, id: ContextId)
    -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Close any secondary contexts and switch back to the primary one.
    /// Used on sub-harvest failure paths where context state is unknown.
    fn restore_primary_context(&self) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Texts of all notice-level elements matching `selector` in the
    /// active context, for the transient-state classifier.
    fn page_notices(
        &self,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<String>, HarvestError>> + Send;
}

/// CSS selectors and page phrases the harvester drives the target with.
/// These are configuration, not control flow — swap them to point the
/// engine at a differently rendered feed.
#[derive(Debug, Clone)]
pub struct Selectors {
    /// One rendered content unit in the feed.
    pub content_unit: String,
    /// Author display name, relative to a unit.
    pub author: String,
    /// Timestamp element, relative to a unit.
    pub timestamp: String,
    /// Attribute on the timestamp element carrying the ISO-8601 value.
    pub timestamp_attr: String,
    /// Body text, relative to a unit.
    pub body: String,
    /// Metrics block, relative to a unit.
    pub metrics_group: String,
    /// Attribute on the metrics block carrying the accessible label.
    pub metrics_attr: String,
    /// Per-unit affordance that opens the unit menu.
    pub engagement_caret: String,
    /// Menu item linking to the unit's related-content view.
    pub engagement_menu_item: String,
    /// Attribute on the menu item carrying the related-view URL.
    pub engagement_href_attr: String,
    /// Notice-level elements scanned by the transient classifier.
    pub notice: String,
    /// Notice text shown on a transient platform error.
    pub glitch_text: String,
    /// Label of the retry affordance shown with the glitch notice.
    pub retry_text: String,
    /// Notice text for an empty related-content view.
    pub empty_related_text: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            content_unit: r#"[data-testid="tweet"]"#.into(),
            author: r#"[data-testid="User-Name"] span span"#.into(),
            timestamp: "time".into(),
            timestamp_attr: "datetime".into(),
            body: r#"[data-testid="tweetText"]"#.into(),
            metrics_group: r#"[role="group"]"#.into(),
            metrics_attr: "aria-label".into(),
            engagement_caret: r#"[role="button"][data-testid="caret"]"#.into(),
            engagement_menu_item: r#"[role="menuitem"][data-testid="tweetEngagements"]"#.into(),
            engagement_href_attr: "href".into(),
            notice: "span".into(),
            glitch_text: "Something went wrong. Try reloading.".into(),
            retry_text: "Retry".into(),
            empty_related_text: "No Quotes yet".into(),
        }
    }
}

/// One independent login attempt against the target.
///
/// `Ok(true)` means logged in, `Ok(false)` means this attempt failed and a
/// fresh attempt (with full re-navigation) may follow. `Err` is fatal.
pub trait Authenticator<D: SessionDriver>: Send + Sync {
    fn attempt(&self, driver: &D) -> impl Future<Output = Result<bool, HarvestError>> + Send;
}

/// No-op authenticator for targets that need no login.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl<D: SessionDriver> Authenticator<D> for NoAuth {
    async fn attempt(&self, _driver: &D) -> Result<bool, HarvestError> {
        Ok(true)
    }
}
