mod abort;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use gleaner_core::error::HarvestError;
use gleaner_core::session::{Authenticator, SessionDriver};
use gleaner_core::{
    CrawlConfig, CrawlLoop, JsonStore, Ledger, RunBudget, TracingReporter, load_prior_or_empty,
};
use gleaner_driver::{CdpDriver, FormAuthenticator, LoginSelectors};

#[derive(Parser)]
#[command(name = "gleaner", version, about = "Time-boxed, resumable feed harvester")]
struct Cli {
    /// Feed URL to harvest
    #[arg(short, long)]
    target_url: String,

    /// Time budget as HH:MM:SS
    #[arg(long, default_value = "00:20:00")]
    time_limit: String,

    /// Consecutive no-new-record cycles before the run stops
    #[arg(long, default_value_t = 20)]
    stagnation_limit: u32,

    /// Checkpoint file from a previous run to resume from
    #[arg(long)]
    prior: Option<PathBuf>,

    /// Output path (defaults to a timestamped name in the working directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also harvest engagement texts for each new record
    #[arg(long, default_value_t = false)]
    engagements: bool,

    /// Run the browser with a visible window
    #[arg(long, default_value_t = false)]
    no_headless: bool,

    /// Login username (anonymous harvest when omitted)
    #[arg(long, env = "GLEANER_USERNAME")]
    username: Option<String>,

    /// Login password
    #[arg(long, env = "GLEANER_PASSWORD")]
    password: Option<String>,

    /// Override the login page URL
    #[arg(long)]
    login_url: Option<String>,
}

enum AuthChoice {
    Form(Box<FormAuthenticator>),
    Anonymous,
}

impl<D: SessionDriver> Authenticator<D> for AuthChoice {
    async fn attempt(&self, driver: &D) -> Result<bool, HarvestError> {
        match self {
            AuthChoice::Form(auth) => auth.attempt(driver).await,
            AuthChoice::Anonymous => Ok(true),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gleaner=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let target_url = url::Url::parse(&cli.target_url)
        .context("invalid --target-url")?
        .to_string();
    let budget = RunBudget::parse(&cli.time_limit, cli.stagnation_limit)
        .context("invalid --time-limit")?;

    let auth = match (&cli.username, &cli.password) {
        (Some(username), Some(password)) => {
            let mut selectors = LoginSelectors::default();
            if let Some(url) = &cli.login_url {
                selectors.login_url = url.clone();
            }
            AuthChoice::Form(Box::new(
                FormAuthenticator::new(username, password).with_selectors(selectors),
            ))
        }
        (None, None) => AuthChoice::Anonymous,
        _ => anyhow::bail!("--username and --password must be given together"),
    };

    let store = JsonStore;
    let seed = load_prior_or_empty(&store, cli.prior.as_deref()).await;
    let ledger = Ledger::seeded(seed);

    let mut config = CrawlConfig::new(target_url).with_engagements(cli.engagements);
    config.output_path = cli.output;

    let driver = CdpDriver::launch(!cli.no_headless)
        .await
        .context("failed to launch browser")?;

    let cancel = CancellationToken::new();
    abort::spawn_abort_listener(cancel.clone());

    let report = CrawlLoop::new(driver, auth, store, config, budget, ledger)
        .run(cancel, &TracingReporter)
        .await;

    if let Some(path) = &report.checkpoint {
        println!("{}", path.display());
    }
    if !report.outcome.is_orderly() {
        anyhow::bail!("run failed: {}", report.outcome);
    }
    Ok(())
}
