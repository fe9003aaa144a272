//! Transient page-state classification.
//!
//! When a bounded fetch wait expires, the page is scanned for known
//! recoverable states before concluding the run is stuck. Each variant
//! carries its own recovery procedure; anything unrecognized escalates as
//! unhandled and triggers the caller's checkpoint-and-abort path.

use std::time::Duration;

use crate::error::HarvestError;
use crate::session::{Selectors, SessionDriver};

/// A recognized recoverable page state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCondition {
    /// Transient platform error with a retry affordance.
    PlatformGlitch,
    /// The related-content view legitimately has nothing yet.
    NoRelatedContent,
}

impl PageCondition {
    fn of(notice: &str, selectors: &Selectors) -> Option<Self> {
        if notice == selectors.glitch_text {
            Some(PageCondition::PlatformGlitch)
        } else if notice == selectors.empty_related_text {
            Some(PageCondition::NoRelatedContent)
        } else {
            None
        }
    }
}

/// Outcome of a successful classification + recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The glitch was recovered in place; re-fetch on the next cycle.
    Resumed,
    /// Clean empty result — nothing to fetch here, not an error.
    CleanEmpty,
}

pub struct TransientClassifier<'a, D: SessionDriver> {
    driver: &'a D,
    selectors: &'a Selectors,
    /// Settle time before clicking the retry affordance.
    glitch_pause: Duration,
    /// Wait for the retry affordance to appear.
    retry_timeout: Duration,
}

impl<'a, D: SessionDriver> TransientClassifier<'a, D> {
    pub fn new(
        driver: &'a D,
        selectors: &'a Selectors,
        glitch_pause: Duration,
        retry_timeout: Duration,
    ) -> Self {
        Self {
            driver,
            selectors,
            glitch_pause,
            retry_timeout,
        }
    }

    /// Scan the page notices and run the matching recovery procedure.
    ///
    /// Returns `Err(Unhandled)` when no known state matches — the fetch
    /// failure was not one of ours to absorb.
    pub async fn classify_and_recover(&self) -> Result<Recovery, HarvestError> {
        let notices = self.driver.page_notices(&self.selectors.notice).await?;
        for notice in &notices {
            match PageCondition::of(notice, self.selectors) {
                Some(PageCondition::PlatformGlitch) => {
                    tracing::warn!(notice = %notice, "Transient platform error, retrying");
                    tokio::time::sleep(self.glitch_pause).await;
                    let retry = self
                        .driver
                        .find_by_text(
                            &self.selectors.notice,
                            &self.selectors.retry_text,
                            self.retry_timeout,
                        )
                        .await?;
                    self.driver.click(&retry).await?;
                    return Ok(Recovery::Resumed);
                }
                Some(PageCondition::NoRelatedContent) => {
                    tracing::debug!("No related content yet — clean empty result");
                    return Ok(Recovery::CleanEmpty);
                }
                None => {}
            }
        }
        Err(HarvestError::Unhandled(format!(
            "fetch timed out with no recognized page state ({} notices scanned)",
            notices.len()
        )))
    }
}
