use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use cdc_core::{
    campus_client::{
        self, CampusClient, ClientConfig, FetchWindow, ScheduleSource, TrustAnchors,
    },
    ical::generator::Emitter,
    model::{normalize_all, CredentialPair},
    render::{render, FeedMetadata},
    scheduler::{CycleOutcome, RefreshScheduler, SchedulerConfig},
    store::Database,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Campus Dual timetables as iCalendar files")]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write the timetable of one student to a calendar file.
    Feed {
        /// the Campus Dual user id
        identifier: String,
        /// the Campus Dual hash
        secret: String,
        /// where to write the calendar
        #[arg(long, default_value = "calendar.ics")]
        output: PathBuf,
        #[command(flatten)]
        upstream: UpstreamArgs,
    },
    /// Run a single refresh of the baseline schedule.
    Refresh {
        /// the SQLite database, a file path or `:memory:`
        #[arg(long, env = "DATABASE_URL", default_value = "schedule.db")]
        database_url: String,
        /// the Campus Dual user id used for the baseline schedule
        #[arg(env = "USER_ID")]
        operator_id: String,
        /// the Campus Dual hash used for the baseline schedule
        #[arg(env = "USER_HASH", hide_env_values = true)]
        operator_hash: String,
        /// delete baseline events the upstream no longer lists
        #[arg(long)]
        prune_stale: bool,
        #[command(flatten)]
        upstream: UpstreamArgs,
    },
}

#[derive(Debug, Args)]
pub struct UpstreamArgs {
    /// the Campus Dual timetable endpoint
    #[arg(long, env = "UPSTREAM_URL", default_value = campus_client::URL)]
    pub upstream_url: String,
    /// PEM certificate chain to pin the upstream connection to
    #[arg(long, env = "UPSTREAM_CERT_CHAIN", default_value = campus_client::CERT_CHAIN)]
    pub cert_chain: PathBuf,
    /// trust the built-in roots instead of the pinned chain
    #[arg(long, env = "UPSTREAM_ALLOW_UNPINNED")]
    pub allow_unpinned: bool,
    /// seconds before an upstream request is given up
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
    /// start of the requested period, in seconds since the unix epoch
    #[arg(long, default_value_t = campus_client::WINDOW_START)]
    pub window_start: i64,
    /// end of the requested period, in seconds since the unix epoch
    #[arg(long, default_value_t = campus_client::WINDOW_END)]
    pub window_end: i64,
}

impl UpstreamArgs {
    fn trust_anchors(&self) -> TrustAnchors {
        if self.allow_unpinned {
            TrustAnchors::SystemRoots
        } else {
            TrustAnchors::Pinned(self.cert_chain.clone())
        }
    }
}

impl From<&UpstreamArgs> for ClientConfig {
    fn from(value: &UpstreamArgs) -> Self {
        ClientConfig {
            url: value.upstream_url.clone(),
            trust: value.trust_anchors(),
            timeout: Duration::from_secs(value.timeout_secs),
            window: FetchWindow {
                start: value.window_start,
                end: value.window_end,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    match Arguments::parse().command {
        Command::Feed {
            identifier,
            secret,
            output,
            upstream,
        } => feed(&identifier, &secret, output, &upstream).await,
        Command::Refresh {
            database_url,
            operator_id,
            operator_hash,
            prune_stale,
            upstream,
        } => {
            refresh(
                &database_url,
                CredentialPair::new(operator_id, operator_hash),
                prune_stale,
                &upstream,
            )
            .await
        }
    }
}

async fn feed(
    identifier: &str,
    secret: &str,
    output: PathBuf,
    upstream: &UpstreamArgs,
) -> Result<()> {
    let client = CampusClient::new(&ClientConfig::from(upstream))?;
    let records = client.fetch(identifier, secret).await?;
    if records.is_empty() {
        bail!("Campus Dual returned no events, check the user id and hash");
    }
    let events = normalize_all(records)?;
    let calendar = render(&events, &FeedMetadata::default(), "")?;
    std::fs::write(&output, calendar.generate())?;
    println!("wrote {} events to {}", events.len(), output.display());
    Ok(())
}

async fn refresh(
    database_url: &str,
    operator: CredentialPair,
    prune_stale: bool,
    upstream: &UpstreamArgs,
) -> Result<()> {
    let database = Database::open(database_url)?;
    let source: Arc<dyn ScheduleSource> =
        Arc::new(CampusClient::new(&ClientConfig::from(upstream))?);
    let scheduler = RefreshScheduler::new(
        source,
        database.events(),
        operator,
        SchedulerConfig {
            prune_stale,
            ..SchedulerConfig::default()
        },
    );
    match scheduler.run_cycle().await {
        CycleOutcome::Completed {
            fetched,
            inserted,
            removed,
        } => {
            println!("fetched {fetched} events, inserted {inserted}, removed {removed}");
            Ok(())
        }
        CycleOutcome::Skipped => bail!("another refresh is still running"),
        CycleOutcome::Failed(err) => Err(err.into()),
    }
}
