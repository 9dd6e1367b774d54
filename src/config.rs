//! Configuration for cover-analytics
//!
//! CLI arguments and environment variables via clap. The parsed `Args` are
//! turned into plain structs (`FetchConfig`, `FoldOptions`) that are passed
//! explicitly to the client and the fold.

use std::net::SocketAddr;
use std::time::Duration;

use clap::builder::TypedValueParser;
use clap::{Parser, Subcommand, ValueEnum};

use crate::error::{AnalyticsError, Result};

/// Records requested per GraphQL page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// How same-timestamp events are ordered after the merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TieBreak {
    /// Stable sort over the concatenation created ++ lapsed ++ claims.
    #[default]
    FetchOrder,
    /// Lapses and claims at a timestamp are replayed before creations at it.
    RemovalsFirst,
}

/// Which subgraph entities the fetcher pages through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum EventSource {
    /// `policyCreatedEvents`, `policyLapsedEvents`, `premiumPaidEvents`.
    #[default]
    Typed,
    /// `genericEvents` filtered by `eventName`, parameters packed in `data`.
    Generic,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldOptions {
    pub tie_break: TieBreak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub endpoint: String,
    pub page_size: usize,
    pub source: EventSource,
    pub request_timeout: Duration,
}

impl FetchConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            page_size: DEFAULT_PAGE_SIZE,
            source: EventSource::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// cover-analytics - protocol-wide coverage analytics over a policy subgraph
#[derive(Parser, Debug, Clone)]
#[command(name = "cover-analytics")]
#[command(about = "Active-coverage analytics over an insurance protocol subgraph")]
pub struct Args {
    /// GraphQL endpoint of the insurance subgraph
    #[arg(long, env = "SUBGRAPH_URL", global = true)]
    pub subgraph_url: Option<String>,

    /// Records per page when paging subgraph collections
    #[arg(long, env = "PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE, global = true,
          value_parser = clap::value_parser!(u32).range(1..).map(|v| v as usize))]
    pub page_size: usize,

    /// Subgraph entities to read policy events from
    #[arg(long, env = "EVENT_SOURCE", value_enum, default_value_t = EventSource::Typed, global = true)]
    pub event_source: EventSource,

    /// Ordering of same-timestamp events during replay
    #[arg(long, env = "TIE_BREAK", value_enum, default_value_t = TieBreak::FetchOrder, global = true)]
    pub tie_break: TieBreak,

    /// Timeout for a single subgraph request, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30", global = true)]
    pub request_timeout_secs: u64,

    /// Address the HTTP server listens on
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:3001", global = true)]
    pub listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve GET /api/analytics over HTTP (default)
    Serve,
    /// Fetch once, print the report as JSON and exit
    Report {
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },
}

impl Args {
    /// Configured endpoint, falling back to the front-end's public variable.
    pub fn endpoint(&self) -> Option<String> {
        self.subgraph_url
            .clone()
            .or_else(|| std::env::var("NEXT_PUBLIC_SUBGRAPH_URL").ok())
            .filter(|url| !url.trim().is_empty())
    }

    /// Fetch settings, or `NotConfigured` when no endpoint is set.
    pub fn fetch_config(&self) -> Result<FetchConfig> {
        let endpoint = self.endpoint().ok_or(AnalyticsError::NotConfigured)?;
        Ok(FetchConfig {
            endpoint,
            page_size: self.page_size,
            source: self.event_source,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }

    pub fn fold_options(&self) -> FoldOptions {
        FoldOptions { tie_break: self.tie_break }
    }
}
