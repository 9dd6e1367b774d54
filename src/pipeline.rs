use std::time::Instant;

use tracing::info;

use crate::analysis;
use crate::config::FoldOptions;
use crate::error::Result;
use crate::report::CoverageReport;
use crate::subgraph::{GraphQlTransport, SubgraphClient};

/// Fetch every collection, then fold. The fold only runs once all fetches
/// have succeeded.
pub async fn build_report<T: GraphQlTransport>(
    client: &SubgraphClient<T>,
    options: &FoldOptions,
) -> Result<CoverageReport> {
    let started = Instant::now();
    let batch = client.fetch_batch().await?;
    let report = analysis::analyse(&batch, options);
    info!(
        events = report.active_cover_history.len(),
        total_active_cover = %report.total_active_cover,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "coverage report built"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::config::{EventSource, TieBreak};
    use crate::error::AnalyticsError;

    struct FixedTransport;

    #[async_trait]
    impl GraphQlTransport for FixedTransport {
        async fn query(&self, query: &str) -> Result<Value> {
            Ok(if query.contains("policyCreatedEvents") {
                json!({ "policyCreatedEvents": [
                    { "policyId": "2", "poolId": "1", "user": "0xA", "coverage": "500", "timestamp": "5" }
                ]})
            } else if query.contains("policyLapsedEvents") {
                json!({ "policyLapsedEvents": [
                    { "policyId": "2", "timestamp": "6" },
                    { "policyId": "2", "timestamp": "7" }
                ]})
            } else {
                json!({})
            })
        }
    }

    struct DownTransport;

    #[async_trait]
    impl GraphQlTransport for DownTransport {
        async fn query(&self, _query: &str) -> Result<Value> {
            Err(AnalyticsError::GraphQl("indexer unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn report_from_fetched_events() {
        let client = SubgraphClient::new(FixedTransport, 1000, EventSource::Typed);
        let report = build_report(&client, &FoldOptions { tie_break: TieBreak::FetchOrder }).await.unwrap();
        assert_eq!(report.total_active_cover, num_bigint::BigInt::from(0));
        assert_eq!(report.lapsed_cover_history.len(), 1);
        assert_eq!(report.active_cover_history.len(), 3);
        assert_eq!(report.policy_holder_count, 1);
        assert_eq!(report.underwriter_count, 0);
    }

    #[tokio::test]
    async fn unavailable_store_yields_no_report() {
        let client = SubgraphClient::new(DownTransport, 1000, EventSource::Typed);
        let err = build_report(&client, &FoldOptions::default()).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::GraphQl(_)));
    }
}
