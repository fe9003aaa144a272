use thiserror::Error;

/// Application-wide error types for gleaner.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Invalid run configuration (malformed time budget, bad target URL).
    /// Fatal before anything is attempted.
    #[error("configuration error: {0}")]
    Config(String),

    /// Login attempts exhausted.
    #[error("authentication failed after {attempts} attempts")]
    AuthenticationFailed { attempts: u32 },

    /// The target page never rendered a single content unit.
    #[error("target unreachable: {0}")]
    TargetUnreachable(String),

    /// A bounded wait for rendered elements expired.
    #[error("timed out after {timeout_secs}s waiting for '{selector}'")]
    WaitTimeout { selector: String, timeout_secs: u64 },

    /// An element handle was detached from the rendered tree (the page
    /// re-rendered underneath us).
    #[error("element detached from the rendered tree")]
    StaleElement,

    /// An expected sub-element is absent from a rendered unit.
    #[error("element not present: {0}")]
    MissingElement(String),

    /// A click was obstructed or intercepted by another element.
    #[error("interaction blocked on '{0}'")]
    InteractionBlocked(String),

    /// Navigation to a URL failed.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Browser session / protocol error.
    #[error("session error: {0}")]
    Session(String),

    /// Reading or writing a checkpoint file failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A page state no recovery procedure is registered for.
    #[error("unhandled page state: {0}")]
    Unhandled(String),
}

impl HarvestError {
    /// True if this is a bounded-wait expiry, the trigger for the
    /// transient-state classifier.
    pub fn is_wait_timeout(&self) -> bool {
        matches!(self, HarvestError::WaitTimeout { .. })
    }

    /// True if the element went stale and the read is worth retrying.
    pub fn is_stale(&self) -> bool {
        matches!(self, HarvestError::StaleElement)
    }

    /// True if a click was obstructed and a programmatic-activation
    /// fallback applies.
    pub fn is_interaction_blocked(&self) -> bool {
        matches!(self, HarvestError::InteractionBlocked(_))
    }

    /// True if the error is scoped to a single content unit and should
    /// skip that unit rather than abort the run.
    pub fn is_unit_local(&self) -> bool {
        matches!(
            self,
            HarvestError::StaleElement | HarvestError::MissingElement(_)
        )
    }
}
