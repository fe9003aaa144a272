use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::classify::{Recovery, TransientClassifier};
use crate::error::HarvestError;
use crate::record::normalize_text;
use crate::session::{PRIMARY_CONTEXT, Selectors, SessionDriver};

/// Bounds and pauses for one engagement sub-harvest.
#[derive(Debug, Clone)]
pub struct EngagementConfig {
    /// Attempts at opening the per-unit menu before giving up.
    pub click_retries: u32,
    /// Pause between obstructed-click attempts.
    pub retry_pause: Duration,
    /// Wait for the menu item to render after opening the menu.
    pub menu_timeout: Duration,
    /// Wait for sub-units to render per sub-cycle.
    pub fetch_timeout: Duration,
    /// Bounded number of fetch/scroll sub-cycles.
    pub sub_cycles: u32,
    /// Settle pause after each sub-scroll.
    pub scroll_pause: Duration,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            click_retries: 3,
            retry_pause: Duration::from_secs(1),
            menu_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(2),
            sub_cycles: 5,
            scroll_pause: Duration::from_millis(500),
        }
    }
}

/// Best-effort harvest of one unit's related-content texts.
///
/// Opens a secondary browsing context, runs a bounded sub-loop of
/// fetch/extract/scroll, and always returns focus to the primary context.
/// Engagement data never blocks the main loop: any failure yields an
/// empty sequence.
pub struct EngagementHarvester<'a, D: SessionDriver> {
    driver: &'a D,
    selectors: &'a Selectors,
    config: EngagementConfig,
    glitch_pause: Duration,
    cancel: CancellationToken,
}

impl<'a, D: SessionDriver> EngagementHarvester<'a, D> {
    pub fn new(
        driver: &'a D,
        selectors: &'a Selectors,
        config: EngagementConfig,
        glitch_pause: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            driver,
            selectors,
            config,
            glitch_pause,
            cancel,
        }
    }

    /// Collect related texts for `unit`. Never errors — a failed
    /// sub-harvest restores the primary context and returns an empty list.
    pub async fn harvest(&self, unit: &D::Element) -> Vec<String> {
        match self.try_harvest(unit).await {
            Ok(texts) => texts,
            Err(err) => {
                tracing::warn!(error = %err, "Engagement sub-harvest failed, continuing without");
                if let Err(restore_err) = self.driver.restore_primary_context().await {
                    tracing::warn!(error = %restore_err, "Failed to restore primary context");
                }
                Vec::new()
            }
        }
    }

    async fn try_harvest(&self, unit: &D::Element) -> Result<Vec<String>, HarvestError> {
        let sel = self.selectors;

        self.open_unit_menu(unit).await?;

        let menu_item = self
            .driver
            .wait_for_one(&sel.engagement_menu_item, self.config.menu_timeout)
            .await?;
        let href = self
            .driver
            .read_attribute(&menu_item, &sel.engagement_href_attr)
            .await?
            .ok_or_else(|| HarvestError::MissingElement(sel.engagement_menu_item.clone()))?;

        let context = self.driver.open_context().await?;
        self.driver.switch_context(context).await?;
        self.driver.navigate(&href).await?;

        let texts = self.collect_texts().await?;

        self.driver.close_context(context).await?;
        self.driver.switch_context(PRIMARY_CONTEXT).await?;
        Ok(texts)
    }

    /// Open the unit menu, falling back to programmatic activation when
    /// the click is intercepted by an overlay.
    async fn open_unit_menu(&self, unit: &D::Element) -> Result<(), HarvestError> {
        let sel = self.selectors;
        for attempt in 1..=self.config.click_retries {
            let caret = self.driver.find_in(unit, &sel.engagement_caret).await?;
            match self.driver.click(&caret).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_interaction_blocked() => {
                    match self.driver.click_js(&caret).await {
                        Ok(()) => return Ok(()),
                        Err(js_err) if attempt < self.config.click_retries => {
                            tracing::debug!(attempt, error = %js_err, "Menu click blocked, retrying");
                            tokio::time::sleep(self.config.retry_pause).await;
                        }
                        Err(js_err) => return Err(js_err),
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Err(HarvestError::InteractionBlocked(sel.engagement_caret.clone()))
    }

    async fn collect_texts(&self) -> Result<Vec<String>, HarvestError> {
        let sel = self.selectors;
        let classifier = TransientClassifier::new(
            self.driver,
            sel,
            self.glitch_pause,
            self.config.fetch_timeout,
        );

        let mut texts: Vec<String> = Vec::new();
        for _ in 0..self.config.sub_cycles {
            if self.cancel.is_cancelled() {
                break;
            }

            match self
                .driver
                .wait_for_all(&sel.content_unit, self.config.fetch_timeout)
                .await
            {
                Ok(sub_units) => {
                    for sub_unit in &sub_units {
                        // Per-sub-unit failures are skipped, not escalated.
                        let Ok(body) = self.driver.find_in(sub_unit, &sel.body).await else {
                            continue;
                        };
                        let Ok(raw) = self.driver.read_text(&body).await else {
                            continue;
                        };
                        if let Some(text) = normalize_text(&raw)
                            && !texts.contains(&text)
                        {
                            texts.push(text);
                        }
                    }
                }
                Err(err) if err.is_wait_timeout() => {
                    match classifier.classify_and_recover().await? {
                        Recovery::Resumed => continue,
                        Recovery::CleanEmpty => break,
                    }
                }
                Err(err) => return Err(err),
            }

            self.driver.scroll_viewport().await?;
            tokio::time::sleep(self.config.scroll_pause).await;
        }
        Ok(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PRIMARY_CONTEXT;
    use crate::testutil::{FakeUnit, ScriptedDriver};

    fn config() -> EngagementConfig {
        EngagementConfig {
            retry_pause: Duration::ZERO,
            menu_timeout: Duration::from_millis(50),
            fetch_timeout: Duration::from_millis(50),
            scroll_pause: Duration::ZERO,
            ..EngagementConfig::default()
        }
    }

    fn harvester<'a>(
        driver: &'a ScriptedDriver,
        selectors: &'a Selectors,
    ) -> EngagementHarvester<'a, ScriptedDriver> {
        EngagementHarvester::new(
            driver,
            selectors,
            config(),
            Duration::ZERO,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_collects_deduped_texts_and_restores_focus() {
        let selectors = Selectors::default();
        let driver = ScriptedDriver::new(selectors.clone());
        driver.stage_engagement_feed(
            "/unit/1/engagements",
            vec![
                vec!["great point".into(), "agreed".into()],
                vec!["agreed".into(), "counterpoint".into()],
            ],
        );
        let unit =
            driver.make_unit(full_unit_with_href("/unit/1/engagements"));

        let texts = harvester(&driver, &selectors).harvest(&unit).await;

        assert_eq!(texts, vec!["great point", "agreed", "counterpoint"]);
        assert_eq!(driver.active_context(), PRIMARY_CONTEXT);
        assert_eq!(driver.open_context_count(), 1);
    }

    #[tokio::test]
    async fn test_intercepted_click_falls_back_to_programmatic() {
        let selectors = Selectors::default();
        let driver = ScriptedDriver::new(selectors.clone());
        driver.intercept_next_clicks(1);
        driver.stage_engagement_feed("/unit/2/engagements", vec![vec!["hi".into()]]);
        let unit = driver.make_unit(full_unit_with_href("/unit/2/engagements"));

        let texts = harvester(&driver, &selectors).harvest(&unit).await;

        assert_eq!(texts, vec!["hi"]);
        assert_eq!(driver.js_clicks(), 1);
    }

    #[tokio::test]
    async fn test_unit_without_caret_yields_empty() {
        let selectors = Selectors::default();
        let driver = ScriptedDriver::new(selectors.clone());
        let unit = driver.make_unit(FakeUnit::new("2024-03-01T08:00:00Z", "alice", "hi"));

        let texts = harvester(&driver, &selectors).harvest(&unit).await;

        assert!(texts.is_empty());
        assert_eq!(driver.active_context(), PRIMARY_CONTEXT);
    }

    #[tokio::test]
    async fn test_empty_related_notice_is_clean_empty() {
        let selectors = Selectors::default();
        let driver = ScriptedDriver::new(selectors.clone());
        // No staged feed: the sub-fetch times out, but the page explains why.
        driver.push_notice(&selectors.empty_related_text);
        let unit = driver.make_unit(full_unit_with_href("/unit/3/engagements"));

        let texts = harvester(&driver, &selectors).harvest(&unit).await;

        assert!(texts.is_empty());
        assert_eq!(driver.active_context(), PRIMARY_CONTEXT);
        assert_eq!(driver.open_context_count(), 1);
    }

    #[tokio::test]
    async fn test_unhandled_substate_restores_primary_and_returns_empty() {
        let selectors = Selectors::default();
        let driver = ScriptedDriver::new(selectors.clone());
        driver.push_notice("Account suspended");
        let unit = driver.make_unit(full_unit_with_href("/unit/4/engagements"));

        let texts = harvester(&driver, &selectors).harvest(&unit).await;

        assert!(texts.is_empty());
        assert_eq!(driver.active_context(), PRIMARY_CONTEXT);
    }

    fn full_unit_with_href(href: &str) -> FakeUnit {
        FakeUnit::new("2024-03-01T08:00:00Z", "alice", "hello").with_engagement_href(href)
    }
}
