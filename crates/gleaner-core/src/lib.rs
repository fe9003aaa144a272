pub mod budget;
pub mod checkpoint;
pub mod classify;
pub mod crawl;
pub mod engagement;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod record;
pub mod session;
pub mod testutil;

pub use budget::RunBudget;
pub use checkpoint::{JsonStore, RecordStore, load_prior_or_empty};
pub use crawl::{CrawlConfig, CrawlLoop, CrawlReporter, Outcome, RunReport, TracingReporter};
pub use engagement::EngagementConfig;
pub use error::HarvestError;
pub use ledger::Ledger;
pub use record::{Identity, Record};
pub use session::{Authenticator, NoAuth, Selectors, SessionDriver};
