//! Command line and environment configuration of the server.

use std::{path::PathBuf, time::Duration};

use cdc_core::{
    campus_client::{self, ClientConfig, FetchWindow, TrustAnchors},
    model::CredentialPair,
    scheduler::SchedulerConfig,
};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(about = "Serves Campus Dual timetables as a subscribable iCalendar feed")]
pub struct Config {
    /// the port to listen on
    #[arg(long, env = "PORT", default_value_t = 3003)]
    pub port: u16,
    /// the SQLite database, a file path or `:memory:`
    #[arg(long, env = "DATABASE_URL", default_value = "schedule.db")]
    pub database_url: String,
    /// seconds between two refreshes of the baseline schedule
    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value_t = 600)]
    pub refresh_interval_secs: u64,
    /// the Campus Dual user id used for the baseline schedule
    #[arg(long, env = "USER_ID", requires = "operator_hash")]
    pub operator_id: Option<String>,
    /// the Campus Dual hash used for the baseline schedule
    #[arg(long, env = "USER_HASH", hide_env_values = true, requires = "operator_id")]
    pub operator_hash: Option<String>,
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
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout_secs: u64,
    /// start of the requested period, in seconds since the unix epoch
    #[arg(long, env = "WINDOW_START", default_value_t = campus_client::WINDOW_START)]
    pub window_start: i64,
    /// end of the requested period, in seconds since the unix epoch
    #[arg(long, env = "WINDOW_END", default_value_t = campus_client::WINDOW_END)]
    pub window_end: i64,
    /// delete baseline events the upstream no longer lists
    #[arg(long, env = "PRUNE_STALE")]
    pub prune_stale: bool,
}

impl Config {
    fn trust_anchors(&self) -> TrustAnchors {
        if self.allow_unpinned {
            TrustAnchors::SystemRoots
        } else {
            TrustAnchors::Pinned(self.cert_chain.clone())
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.upstream_url.clone(),
            trust: self.trust_anchors(),
            timeout: Duration::from_secs(self.upstream_timeout_secs),
            window: FetchWindow {
                start: self.window_start,
                end: self.window_end,
            },
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.refresh_interval_secs),
            prune_stale: self.prune_stale,
        }
    }

    /// The identity for the background refresh, if one is configured.
    pub fn operator(&self) -> Option<CredentialPair> {
        match (&self.operator_id, &self.operator_hash) {
            (Some(identifier), Some(secret)) => Some(CredentialPair::new(identifier, secret)),
            _ => None,
        }
    }
}
