//! Protocol-wide coverage analytics for a decentralized insurance deployment.
//!
//! Pages policy events out of the protocol subgraph, replays them in time
//! order and reports active cover over time, released cover, premiums and
//! claim fees.

pub mod analysis;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod server;
pub mod subgraph;
pub mod types;

pub use config::Args;
pub use error::{AnalyticsError, Result};
pub use report::CoverageReport;
