use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::HarvestError;
use crate::record::{Record, normalize_text, parse_metric_counts};
use crate::session::{Selectors, SessionDriver};

/// Extracts a normalized [`Record`] from one rendered content unit.
///
/// Returns `Ok(None)` when the unit is not extractable — the minimum
/// fields (timestamp, author, body) are unavailable, or the handle stayed
/// stale through every retry. Only genuine session/protocol errors are
/// returned as `Err`; a single malformed unit never aborts a cycle.
pub struct RecordExtractor<'a, D: SessionDriver> {
    driver: &'a D,
    selectors: &'a Selectors,
    stale_retries: u32,
    stale_pause: Duration,
}

impl<'a, D: SessionDriver> RecordExtractor<'a, D> {
    pub fn new(
        driver: &'a D,
        selectors: &'a Selectors,
        stale_retries: u32,
        stale_pause: Duration,
    ) -> Self {
        Self {
            driver,
            selectors,
            stale_retries,
            stale_pause,
        }
    }

    pub async fn extract(&self, unit: &D::Element) -> Result<Option<Record>, HarvestError> {
        for attempt in 1..=self.stale_retries {
            match self.try_extract(unit).await {
                Ok(record) => return Ok(record),
                Err(err) if err.is_stale() => {
                    if attempt < self.stale_retries {
                        tracing::debug!(attempt, "Stale unit handle, retrying extraction");
                        tokio::time::sleep(self.stale_pause).await;
                    } else {
                        tracing::debug!("Unit stayed stale through all retries, skipping");
                        return Ok(None);
                    }
                }
                Err(err) if err.is_unit_local() => return Ok(None),
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    async fn try_extract(&self, unit: &D::Element) -> Result<Option<Record>, HarvestError> {
        let sel = self.selectors;

        let Some(occurred_at) = self.read_timestamp(unit).await? else {
            return Ok(None);
        };
        let Some(author) = self.read_normalized(unit, &sel.author).await? else {
            return Ok(None);
        };
        let Some(body) = self.read_normalized(unit, &sel.body).await? else {
            return Ok(None);
        };

        let mut record = Record::new(occurred_at, author, body);
        record.metrics = self.read_metrics(unit).await?;
        Ok(Some(record))
    }

    async fn read_timestamp(
        &self,
        unit: &D::Element,
    ) -> Result<Option<DateTime<Utc>>, HarvestError> {
        let sel = self.selectors;
        let element = match self.driver.find_in(unit, &sel.timestamp).await {
            Ok(e) => e,
            Err(err) if err.is_stale() => return Err(err),
            Err(_) => return Ok(None),
        };
        let Some(raw) = self.driver.read_attribute(&element, &sel.timestamp_attr).await? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(parsed) => Ok(Some(parsed.with_timezone(&Utc))),
            Err(err) => {
                tracing::debug!(raw = %raw, error = %err, "Unparsable unit timestamp");
                Ok(None)
            }
        }
    }

    async fn read_normalized(
        &self,
        unit: &D::Element,
        selector: &str,
    ) -> Result<Option<String>, HarvestError> {
        let element = match self.driver.find_in(unit, selector).await {
            Ok(e) => e,
            Err(err) if err.is_stale() => return Err(err),
            Err(_) => return Ok(None),
        };
        let text = self.driver.read_text(&element).await?;
        Ok(normalize_text(&text))
    }

    /// A missing or malformed metrics block degrades to an empty map,
    /// never a unit-level failure.
    async fn read_metrics(
        &self,
        unit: &D::Element,
    ) -> Result<std::collections::BTreeMap<String, u64>, HarvestError> {
        let sel = self.selectors;
        let group = match self.driver.find_in(unit, &sel.metrics_group).await {
            Ok(e) => e,
            Err(err) if err.is_stale() => return Err(err),
            Err(_) => return Ok(Default::default()),
        };
        let label = self.driver.read_attribute(&group, &sel.metrics_attr).await?;
        Ok(label.map(|l| parse_metric_counts(&l)).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeUnit, ScriptedDriver};

    fn extractor_setup() -> (ScriptedDriver, Selectors) {
        let selectors = Selectors::default();
        (ScriptedDriver::new(selectors.clone()), selectors)
    }

    fn full_unit() -> FakeUnit {
        FakeUnit::new("2024-03-01T08:00:00Z", "alice", "hello world")
            .with_metrics("3 replies, 7 likes")
    }

    #[tokio::test]
    async fn test_extracts_full_record() {
        let (driver, selectors) = extractor_setup();
        let unit = driver.make_unit(full_unit());
        let extractor = RecordExtractor::new(&driver, &selectors, 3, Duration::ZERO);

        let record = extractor.extract(&unit).await.unwrap().unwrap();
        assert_eq!(record.author, "alice");
        assert_eq!(record.body, "hello world");
        assert_eq!(record.occurred_at, "2024-03-01T08:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap());
        assert_eq!(record.metrics.get("replies"), Some(&3));
        assert_eq!(record.metrics.get("likes"), Some(&7));
        assert!(record.engagement_texts.is_empty());
    }

    #[tokio::test]
    async fn test_body_is_normalized() {
        let (driver, selectors) = extractor_setup();
        let unit = driver.make_unit(FakeUnit::new(
            "2024-03-01T08:00:00Z",
            "alice",
            "  line one\nline two\r\n ",
        ));
        let extractor = RecordExtractor::new(&driver, &selectors, 3, Duration::ZERO);

        let record = extractor.extract(&unit).await.unwrap().unwrap();
        assert_eq!(record.body, "line oneline two");
    }

    #[tokio::test]
    async fn test_missing_metrics_degrades_to_empty_map() {
        let (driver, selectors) = extractor_setup();
        let unit = driver.make_unit(FakeUnit::new("2024-03-01T08:00:00Z", "alice", "hi"));
        let extractor = RecordExtractor::new(&driver, &selectors, 3, Duration::ZERO);

        let record = extractor.extract(&unit).await.unwrap().unwrap();
        assert!(record.metrics.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_metrics_degrades_to_empty_map() {
        let (driver, selectors) = extractor_setup();
        let unit = driver.make_unit(
            FakeUnit::new("2024-03-01T08:00:00Z", "alice", "hi").with_metrics("lots of likes"),
        );
        let extractor = RecordExtractor::new(&driver, &selectors, 3, Duration::ZERO);

        let record = extractor.extract(&unit).await.unwrap().unwrap();
        assert_eq!(record.author, "alice");
        assert!(record.metrics.is_empty());
    }

    #[tokio::test]
    async fn test_missing_minimum_field_yields_none() {
        let (driver, selectors) = extractor_setup();
        let mut spec = full_unit();
        spec.author = None;
        let unit = driver.make_unit(spec);
        let extractor = RecordExtractor::new(&driver, &selectors, 3, Duration::ZERO);

        assert!(extractor.extract(&unit).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_body_yields_none_not_retry() {
        let (driver, selectors) = extractor_setup();
        let unit = driver.make_unit(FakeUnit::new("2024-03-01T08:00:00Z", "alice", "  \n "));
        let extractor = RecordExtractor::new(&driver, &selectors, 3, Duration::ZERO);

        assert!(extractor.extract(&unit).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unparsable_timestamp_yields_none() {
        let (driver, selectors) = extractor_setup();
        let unit = driver.make_unit(FakeUnit::new("yesterday", "alice", "hi"));
        let extractor = RecordExtractor::new(&driver, &selectors, 3, Duration::ZERO);

        assert!(extractor.extract(&unit).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_unit_recovers_within_retry_budget() {
        let (driver, selectors) = extractor_setup();
        let unit = driver.make_unit(full_unit().with_stale_reads(2));
        let extractor = RecordExtractor::new(&driver, &selectors, 3, Duration::ZERO);

        let record = extractor.extract(&unit).await.unwrap().unwrap();
        assert_eq!(record.author, "alice");
    }

    #[tokio::test]
    async fn test_stale_unit_exhausting_retries_is_skipped() {
        let (driver, selectors) = extractor_setup();
        let unit = driver.make_unit(full_unit().with_stale_reads(10));
        let extractor = RecordExtractor::new(&driver, &selectors, 3, Duration::ZERO);

        assert!(extractor.extract(&unit).await.unwrap().is_none());
    }
}
