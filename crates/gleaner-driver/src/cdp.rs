use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use tokio::time::Instant;

use gleaner_core::error::HarvestError;
use gleaner_core::session::{ContextId, PRIMARY_CONTEXT, SessionDriver};

/// How often bounded waits re-query the page.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Session driver backed by a Chromium process over the Chrome DevTools
/// Protocol.
///
/// One browser process serves the whole run. Each browsing context maps
/// to one tab; the tab the run starts in is the primary context, and the
/// engagement sub-harvest opens short-lived secondary tabs next to it.
pub struct CdpDriver {
    browser: Browser,
    pages: Mutex<HashMap<ContextId, Page>>,
    active: Mutex<ContextId>,
    next_context: Mutex<ContextId>,
}

impl CdpDriver {
    /// Launches Chromium and opens the primary tab.
    ///
    /// Requires a Chrome/Chromium binary reachable via `$CHROME_BIN`,
    /// well-known install paths, or chromiumoxide's own lookup.
    pub async fn launch(headless: bool) -> Result<Self, HarvestError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        // Snap-packaged Chromium exposes a wrapper that rejects standard
        // Chrome CLI flags. Prefer the real binary when we can find it.
        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        if headless {
            builder = builder.arg("--headless=new").arg("--disable-gpu");
        }
        let config = builder
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .build()
            .map_err(|e| HarvestError::Session(format!("browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::Session(format!("failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        let primary = browser
            .new_page("about:blank")
            .await
            .map_err(|e| HarvestError::Session(format!("failed to open primary tab: {e}")))?;

        let mut pages = HashMap::new();
        pages.insert(PRIMARY_CONTEXT, primary);
        Ok(Self {
            browser,
            pages: Mutex::new(pages),
            active: Mutex::new(PRIMARY_CONTEXT),
            next_context: Mutex::new(PRIMARY_CONTEXT + 1),
        })
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// On systems where Chromium is installed via snap, the wrapper at
    /// `/snap/bin/chromium` strips unknown CLI flags, breaking headless
    /// mode. Look for the real binary inside the snap first, then fall
    /// back to well-known system paths. `$CHROME_BIN` overrides both.
    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        let candidates: &[&str] = &[
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];
        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }

    fn active_page(&self) -> Result<Page, HarvestError> {
        let active = *self.active.lock().unwrap();
        self.pages
            .lock()
            .unwrap()
            .get(&active)
            .cloned()
            .ok_or_else(|| HarvestError::Session(format!("no page for context {active}")))
    }

    fn page_for(&self, id: ContextId) -> Result<Page, HarvestError> {
        self.pages
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| HarvestError::Session(format!("unknown context {id}")))
    }

    fn timeout_err(selector: &str, timeout: Duration) -> HarvestError {
        HarvestError::WaitTimeout {
            selector: selector.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    }
}

/// Detached handles surface as protocol errors whose messages mention
/// the vanished node. Everything matching is a stale handle to retry.
fn is_stale_message(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    msg.contains("could not find node")
        || msg.contains("no node")
        || msg.contains("detached")
        || msg.contains("node with given id")
}

fn find_err(selector: &str, e: CdpError) -> HarvestError {
    let msg = e.to_string();
    if is_stale_message(&msg) {
        HarvestError::StaleElement
    } else {
        HarvestError::MissingElement(selector.to_string())
    }
}

fn interaction_err(e: CdpError) -> HarvestError {
    let msg = e.to_string();
    if is_stale_message(&msg) {
        HarvestError::StaleElement
    } else if msg.to_ascii_lowercase().contains("not clickable")
        || msg.to_ascii_lowercase().contains("intercept")
    {
        HarvestError::InteractionBlocked(msg)
    } else {
        HarvestError::Session(msg)
    }
}

fn session_err(e: CdpError) -> HarvestError {
    let msg = e.to_string();
    if is_stale_message(&msg) {
        HarvestError::StaleElement
    } else {
        HarvestError::Session(msg)
    }
}

impl SessionDriver for CdpDriver {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
        let page = self.active_page()?;
        page.goto(url)
            .await
            .map_err(|e| HarvestError::Navigation(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn wait_for_one(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Element, HarvestError> {
        let page = self.active_page()?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(element) = page.find_element(selector).await {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(Self::timeout_err(selector, timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_all(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Vec<Element>, HarvestError> {
        let page = self.active_page()?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(elements) = page.find_elements(selector).await
                && !elements.is_empty()
            {
                return Ok(elements);
            }
            if Instant::now() >= deadline {
                return Err(Self::timeout_err(selector, timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn find_by_text(
        &self,
        selector: &str,
        text: &str,
        timeout: Duration,
    ) -> Result<Element, HarvestError> {
        let page = self.active_page()?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(elements) = page.find_elements(selector).await {
                for element in elements {
                    let content = element.inner_text().await.ok().flatten();
                    if content.as_deref().map(str::trim) == Some(text) {
                        return Ok(element);
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(Self::timeout_err(selector, timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn find_in(&self, element: &Element, selector: &str) -> Result<Element, HarvestError> {
        element
            .find_element(selector)
            .await
            .map_err(|e| find_err(selector, e))
    }

    async fn read_text(&self, element: &Element) -> Result<String, HarvestError> {
        Ok(element
            .inner_text()
            .await
            .map_err(session_err)?
            .unwrap_or_default())
    }

    async fn read_attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        element.attribute(name).await.map_err(session_err)
    }

    async fn click(&self, element: &Element) -> Result<(), HarvestError> {
        element.click().await.map_err(interaction_err)?;
        Ok(())
    }

    async fn click_js(&self, element: &Element) -> Result<(), HarvestError> {
        element
            .call_js_fn("function() { this.click(); }", false)
            .await
            .map_err(session_err)?;
        Ok(())
    }

    async fn type_text(&self, element: &Element, text: &str) -> Result<(), HarvestError> {
        element.click().await.map_err(interaction_err)?;
        element.type_str(text).await.map_err(session_err)?;
        Ok(())
    }

    async fn scroll_viewport(&self) -> Result<(), HarvestError> {
        let page = self.active_page()?;
        page.evaluate("window.scrollBy(0, window.innerHeight);")
            .await
            .map_err(session_err)?;
        Ok(())
    }

    async fn open_context(&self) -> Result<ContextId, HarvestError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(session_err)?;
        let id = {
            let mut next = self.next_context.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };
        self.pages.lock().unwrap().insert(id, page);
        Ok(id)
    }

    async fn switch_context(&self, id: ContextId) -> Result<(), HarvestError> {
        let page = self.page_for(id)?;
        page.bring_to_front().await.map_err(session_err)?;
        *self.active.lock().unwrap() = id;
        Ok(())
    }

    async fn close_context(&self, id: ContextId) -> Result<(), HarvestError> {
        if id == PRIMARY_CONTEXT {
            return Err(HarvestError::Session(
                "refusing to close the primary context".to_string(),
            ));
        }
        let page = self.pages.lock().unwrap().remove(&id);
        if let Some(page) = page {
            let _ = page.close().await;
        }
        Ok(())
    }

    async fn restore_primary_context(&self) -> Result<(), HarvestError> {
        let secondary: Vec<(ContextId, Page)> = {
            let mut pages = self.pages.lock().unwrap();
            let ids: Vec<ContextId> = pages
                .keys()
                .copied()
                .filter(|id| *id != PRIMARY_CONTEXT)
                .collect();
            ids.into_iter()
                .filter_map(|id| pages.remove(&id).map(|p| (id, p)))
                .collect()
        };
        for (id, page) in secondary {
            tracing::debug!(context = id, "Closing leftover secondary context");
            let _ = page.close().await;
        }
        self.switch_context(PRIMARY_CONTEXT).await
    }

    async fn page_notices(&self, selector: &str) -> Result<Vec<String>, HarvestError> {
        let page = self.active_page()?;
        let Ok(elements) = page.find_elements(selector).await else {
            return Ok(Vec::new());
        };
        let mut notices = Vec::new();
        for element in elements {
            if let Ok(Some(text)) = element.inner_text().await {
                let text = text.trim().to_string();
                if !text.is_empty() {
                    notices.push(text);
                }
            }
        }
        Ok(notices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_message_detection() {
        assert!(is_stale_message("Could not find node with given id"));
        assert!(is_stale_message("Node is detached from document"));
        assert!(!is_stale_message("ws connection closed"));
    }
}
