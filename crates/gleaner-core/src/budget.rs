use std::time::{Duration, Instant};

use crate::error::HarvestError;

/// Immutable time/stagnation budget for one run. The clock starts when
/// the budget is constructed.
#[derive(Debug, Clone)]
pub struct RunBudget {
    started_at: Instant,
    time_limit: Duration,
    stagnation_limit: u32,
}

impl RunBudget {
    /// Parse an `HH:MM:SS` budget string and start the clock.
    ///
    /// A malformed string is a configuration error: fatal, no retry.
    pub fn parse(time_limit: &str, stagnation_limit: u32) -> Result<Self, HarvestError> {
        Ok(Self::started(parse_time_limit(time_limit)?, stagnation_limit))
    }

    pub fn started(time_limit: Duration, stagnation_limit: u32) -> Self {
        Self {
            started_at: Instant::now(),
            time_limit,
            stagnation_limit,
        }
    }

    pub fn deadline_reached(&self) -> bool {
        self.started_at.elapsed() >= self.time_limit
    }

    pub fn remaining(&self) -> Duration {
        self.time_limit.saturating_sub(self.started_at.elapsed())
    }

    /// Consecutive zero-new-record cycles tolerated before aborting.
    pub fn stagnation_limit(&self) -> u32 {
        self.stagnation_limit
    }
}

/// Convert an `HH:MM:SS` string to a duration.
pub fn parse_time_limit(s: &str) -> Result<Duration, HarvestError> {
    let parts: Vec<&str> = s.split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return Err(HarvestError::Config(format!(
            "time budget '{s}' is not in HH:MM:SS format"
        )));
    };
    let parse = |part: &str, what: &str| {
        part.parse::<u64>().map_err(|_| {
            HarvestError::Config(format!("time budget '{s}' has a non-numeric {what} field"))
        })
    };
    let total = parse(hours, "hours")? * 3600 + parse(minutes, "minutes")? * 60 + parse(seconds, "seconds")?;
    Ok(Duration::from_secs(total))
}

/// Render a remaining duration as `HH:MM:SS` for progress reporting.
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
