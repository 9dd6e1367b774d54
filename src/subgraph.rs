//! Subgraph client
//!
//! Pages the policy event collections out of a graph-node GraphQL endpoint.
//! Every collection is requested with `first`/`skip` until a short page comes
//! back; the five collections of a batch are fetched concurrently and any
//! failure aborts the batch.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{EventSource, FetchConfig};
use crate::error::{AnalyticsError, Result};
use crate::events::{ClaimRecord, EventBatch, PolicyCreated, PolicyLapsed, PremiumPaid, Underwriter};
use crate::types::{PolicyId, PoolId, Timestamp};

/// Sends one GraphQL query and returns its `data` object.
#[async_trait]
pub trait GraphQlTransport: Send + Sync {
    async fn query(&self, query: &str) -> Result<Value>;
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlErrorMessage>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

/// reqwest-backed transport posting `{"query": ...}` to the endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, endpoint: config.endpoint.clone() })
    }
}

#[async_trait]
impl GraphQlTransport for HttpTransport {
    async fn query(&self, query: &str) -> Result<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?
            .error_for_status()?;
        let body: GraphQlResponse = response.json().await?;

        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(AnalyticsError::GraphQl(messages.join("; ")));
        }
        Ok(body.data.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Deserialize)]
struct GenericEvent {
    timestamp: Timestamp,
    data: String,
}

/// Query text for one page of a collection.
#[derive(Debug, Clone, Copy)]
enum Collection {
    Typed { name: &'static str, fields: &'static str, ordered: bool },
    Generic { event_name: &'static str },
}

impl Collection {
    fn name(&self) -> &'static str {
        match *self {
            Collection::Typed { name, .. } => name,
            Collection::Generic { .. } => "genericEvents",
        }
    }

    fn page_query(&self, first: usize, skip: usize) -> String {
        match *self {
            Collection::Typed { name, fields, ordered: true } => format!(
                "{{ {name}(first: {first}, skip: {skip}, orderBy: timestamp, orderDirection: asc) {{ {fields} }} }}"
            ),
            Collection::Typed { name, fields, ordered: false } => {
                format!("{{ {name}(first: {first}, skip: {skip}) {{ {fields} }} }}")
            }
            Collection::Generic { event_name } => format!(
                "{{ genericEvents(first: {first}, skip: {skip}, orderBy: timestamp, orderDirection: asc, \
                 where: {{ eventName: \"{event_name}\" }}) {{ timestamp data }} }}"
            ),
        }
    }
}

const POLICY_CREATED: Collection = Collection::Typed {
    name: "policyCreatedEvents",
    fields: "policyId poolId user coverage timestamp",
    ordered: true,
};
const POLICY_LAPSED: Collection =
    Collection::Typed { name: "policyLapsedEvents", fields: "policyId timestamp", ordered: true };
const PREMIUM_PAID: Collection =
    Collection::Typed { name: "premiumPaidEvents", fields: "policyId amountPaid timestamp", ordered: true };
const CLAIMS: Collection = Collection::Typed {
    name: "claims",
    fields: "policyId coverage netPayoutToClaimant timestamp",
    ordered: true,
};
const UNDERWRITERS: Collection = Collection::Typed { name: "underwriters", fields: "id", ordered: false };

pub struct SubgraphClient<T> {
    transport: T,
    page_size: usize,
    source: EventSource,
}

impl SubgraphClient<HttpTransport> {
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(config)?, config.page_size, config.source))
    }
}

impl<T: GraphQlTransport> SubgraphClient<T> {
    pub fn new(transport: T, page_size: usize, source: EventSource) -> Self {
        Self { transport, page_size: page_size.max(1), source }
    }

    /// Fetch all five collections concurrently. The first error cancels the
    /// remaining fetches.
    pub async fn fetch_batch(&self) -> Result<EventBatch> {
        let (created, lapsed, claims, premiums, underwriters) = tokio::try_join!(
            self.policy_created(),
            self.policy_lapsed(),
            self.claims(),
            self.premiums(),
            self.underwriters(),
        )?;
        info!(
            created = created.len(),
            lapsed = lapsed.len(),
            claims = claims.len(),
            premiums = premiums.len(),
            underwriters = underwriters.len(),
            "fetched subgraph collections"
        );
        Ok(EventBatch { created, lapsed, premiums, claims, underwriters })
    }

    pub async fn policy_created(&self) -> Result<Vec<PolicyCreated>> {
        match self.source {
            EventSource::Typed => self.fetch_typed(POLICY_CREATED).await,
            EventSource::Generic => {
                self.fetch_generic("PolicyCreated", decode_policy_created).await
            }
        }
    }

    pub async fn policy_lapsed(&self) -> Result<Vec<PolicyLapsed>> {
        match self.source {
            EventSource::Typed => self.fetch_typed(POLICY_LAPSED).await,
            EventSource::Generic => self.fetch_generic("PolicyLapsed", decode_policy_lapsed).await,
        }
    }

    pub async fn premiums(&self) -> Result<Vec<PremiumPaid>> {
        match self.source {
            EventSource::Typed => self.fetch_typed(PREMIUM_PAID).await,
            EventSource::Generic => self.fetch_generic("PremiumPaid", decode_premium_paid).await,
        }
    }

    pub async fn claims(&self) -> Result<Vec<ClaimRecord>> {
        self.fetch_typed(CLAIMS).await
    }

    pub async fn underwriters(&self) -> Result<Vec<Underwriter>> {
        self.fetch_typed(UNDERWRITERS).await
    }

    async fn fetch_typed<R: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<R>> {
        let name = collection.name();
        self.paginate(collection)
            .await?
            .into_iter()
            .map(|raw| serde_json::from_value(raw).map_err(|e| decode_error(name, e)))
            .collect()
    }

    async fn fetch_generic<R>(
        &self,
        event_name: &'static str,
        decode: fn(Timestamp, &[&str]) -> std::result::Result<R, String>,
    ) -> Result<Vec<R>> {
        self.paginate(Collection::Generic { event_name })
            .await?
            .into_iter()
            .map(|raw| {
                let ev: GenericEvent =
                    serde_json::from_value(raw).map_err(|e| decode_error(event_name, e))?;
                let params: Vec<&str> = ev.data.split(',').map(str::trim).collect();
                decode(ev.timestamp, &params).map_err(|e| decode_error(event_name, e))
            })
            .collect()
    }

    /// Raw records of every page, concatenated in the order served.
    async fn paginate(&self, collection: Collection) -> Result<Vec<Value>> {
        let name = collection.name();
        let mut items: Vec<Value> = Vec::new();
        let mut skip = 0;
        loop {
            let mut data = self.transport.query(&collection.page_query(self.page_size, skip)).await?;
            let batch = match data.get_mut(name).map(Value::take) {
                Some(Value::Array(records)) => records,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    return Err(decode_error(name, format!("expected a list, got {other}")));
                }
            };
            let fetched = batch.len();
            items.extend(batch);
            debug!(collection = name, skip, fetched, "subgraph page");
            if fetched < self.page_size {
                break;
            }
            skip += self.page_size;
        }
        Ok(items)
    }
}

fn decode_error(collection: &str, reason: impl ToString) -> AnalyticsError {
    AnalyticsError::Decode { collection: collection.to_string(), reason: reason.to_string() }
}

fn param<'a>(params: &[&'a str], index: usize, field: &str) -> std::result::Result<&'a str, String> {
    params
        .get(index)
        .copied()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| format!("missing {field} in event data"))
}

fn number<T: std::str::FromStr>(params: &[&str], index: usize, field: &str) -> std::result::Result<T, String> {
    let raw = param(params, index, field)?;
    raw.parse().map_err(|_| format!("invalid {field} {raw:?}"))
}

/// `user,policyId,poolId,coverage[,premium]`
fn decode_policy_created(timestamp: Timestamp, params: &[&str]) -> std::result::Result<PolicyCreated, String> {
    Ok(PolicyCreated {
        user: param(params, 0, "user")?.to_string(),
        policy_id: PolicyId(number(params, 1, "policyId")?),
        pool_id: PoolId(number(params, 2, "poolId")?),
        coverage: number(params, 3, "coverage")?,
        timestamp,
    })
}

/// `policyId[,...]`
fn decode_policy_lapsed(timestamp: Timestamp, params: &[&str]) -> std::result::Result<PolicyLapsed, String> {
    Ok(PolicyLapsed { policy_id: PolicyId(number(params, 0, "policyId")?), timestamp })
}

/// `policyId,poolId,amountPaid[,...]`
fn decode_premium_paid(timestamp: Timestamp, params: &[&str]) -> std::result::Result<PremiumPaid, String> {
    Ok(PremiumPaid {
        policy_id: PolicyId(number(params, 0, "policyId")?),
        amount_paid: number(params, 2, "amountPaid")?,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    /// Serves each collection from memory, honouring `first`/`skip`.
    #[derive(Default)]
    struct MemoryTransport {
        collections: HashMap<&'static str, Vec<Value>>,
        fail_on: Option<&'static str>,
        queries: Mutex<Vec<String>>,
    }

    impl MemoryTransport {
        fn with(mut self, name: &'static str, records: Vec<Value>) -> Self {
            self.collections.insert(name, records);
            self
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    fn arg(query: &str, key: &str) -> usize {
        let start = query.find(key).unwrap() + key.len();
        query[start..].chars().take_while(|c| c.is_ascii_digit()).collect::<String>().parse().unwrap()
    }

    #[async_trait]
    impl GraphQlTransport for MemoryTransport {
        async fn query(&self, query: &str) -> Result<Value> {
            self.queries.lock().unwrap().push(query.to_string());
            let name = query.trim_start_matches('{').trim_start().split('(').next().unwrap().to_string();
            if self.fail_on == Some(name.as_str()) {
                return Err(AnalyticsError::GraphQl(format!("{name} unavailable")));
            }
            let (first, skip) = (arg(query, "first: "), arg(query, "skip: "));
            let records = match name.as_str() {
                "genericEvents" => {
                    let event_name = query.split("eventName: \"").nth(1).unwrap().split('"').next().unwrap();
                    self.collections.get(event_name).cloned().unwrap_or_default()
                }
                other => self.collections.get(other).cloned().unwrap_or_default(),
            };
            let page: Vec<Value> = records.into_iter().skip(skip).take(first).collect();
            let mut data = serde_json::Map::new();
            data.insert(name, Value::Array(page));
            Ok(Value::Object(data))
        }
    }

    fn lapse(policy: u64, t: u64) -> Value {
        json!({ "policyId": policy.to_string(), "timestamp": t.to_string() })
    }

    #[tokio::test]
    async fn pages_until_a_short_page() {
        let records: Vec<Value> = (0..5).map(|i| lapse(i, i)).collect();
        let transport = MemoryTransport::default().with("policyLapsedEvents", records);
        let client = SubgraphClient::new(transport, 2, EventSource::Typed);

        let lapsed = client.policy_lapsed().await.unwrap();
        assert_eq!(lapsed.len(), 5);
        assert_eq!(lapsed[4].policy_id, PolicyId(4));

        let queries = client.transport.queries();
        assert_eq!(queries.len(), 3);
        assert!(queries[2].contains("skip: 4"));
        assert!(queries[0].contains("orderBy: timestamp, orderDirection: asc"));
    }

    #[tokio::test]
    async fn full_last_page_costs_one_empty_request() {
        let records: Vec<Value> = (0..4).map(|i| lapse(i, i)).collect();
        let transport = MemoryTransport::default().with("policyLapsedEvents", records);
        let client = SubgraphClient::new(transport, 2, EventSource::Typed);

        assert_eq!(client.policy_lapsed().await.unwrap().len(), 4);
        assert_eq!(client.transport.queries().len(), 3);
    }

    #[tokio::test]
    async fn empty_collection_takes_one_request() {
        let client = SubgraphClient::new(MemoryTransport::default(), 1000, EventSource::Typed);
        assert!(client.underwriters().await.unwrap().is_empty());
        let queries = client.transport.queries();
        assert_eq!(queries, vec!["{ underwriters(first: 1000, skip: 0) { id } }".to_string()]);
    }

    #[tokio::test]
    async fn generic_events_decode_packed_parameters() {
        let transport = MemoryTransport::default()
            .with("PolicyCreated", vec![json!({ "timestamp": "10", "data": "0xAbC,1,3,1000,50" })])
            .with("PolicyLapsed", vec![json!({ "timestamp": "12", "data": "1" })])
            .with("PremiumPaid", vec![json!({ "timestamp": "11", "data": "1,3,50,5,45" })]);
        let client = SubgraphClient::new(transport, 1000, EventSource::Generic);

        let created = client.policy_created().await.unwrap();
        assert_eq!(
            created,
            vec![PolicyCreated {
                policy_id: PolicyId(1),
                pool_id: PoolId(3),
                user: "0xAbC".to_string(),
                coverage: 1000,
                timestamp: Timestamp(10),
            }]
        );
        assert_eq!(client.policy_lapsed().await.unwrap()[0].policy_id, PolicyId(1));
        assert_eq!(client.premiums().await.unwrap()[0].amount_paid, 50);
        assert!(client.transport.queries()[0].contains("eventName: \"PolicyCreated\""));
    }

    #[tokio::test]
    async fn malformed_generic_data_is_fatal() {
        let transport = MemoryTransport::default()
            .with("PolicyCreated", vec![json!({ "timestamp": "10", "data": "0xabc,1,3" })]);
        let client = SubgraphClient::new(transport, 1000, EventSource::Generic);

        let err = client.policy_created().await.unwrap_err();
        assert!(matches!(err, AnalyticsError::Decode { ref collection, .. } if collection == "PolicyCreated"));
        assert!(err.to_string().contains("missing coverage"));
    }

    #[tokio::test]
    async fn undecodable_typed_record_is_fatal() {
        let transport = MemoryTransport::default()
            .with("claims", vec![json!({ "policyId": "1", "netPayoutToClaimant": "lots", "timestamp": "1" })]);
        let client = SubgraphClient::new(transport, 1000, EventSource::Typed);
        assert!(matches!(client.claims().await, Err(AnalyticsError::Decode { .. })));
    }

    #[tokio::test]
    async fn fetch_batch_collects_every_collection() {
        let transport = MemoryTransport::default()
            .with(
                "policyCreatedEvents",
                vec![json!({ "policyId": "1", "poolId": "0", "user": "0xa", "coverage": "1000", "timestamp": "10" })],
            )
            .with("premiumPaidEvents", vec![json!({ "policyId": "1", "amountPaid": "50", "timestamp": "11" })])
            .with(
                "claims",
                vec![json!({ "policyId": "1", "coverage": "1000", "netPayoutToClaimant": "900", "timestamp": "20" })],
            )
            .with("underwriters", vec![json!({ "id": "0xU1" }), json!({ "id": "0xu1" })]);
        let client = SubgraphClient::new(transport, 1000, EventSource::Typed);

        let batch = client.fetch_batch().await.unwrap();
        assert_eq!(batch.created.len(), 1);
        assert!(batch.lapsed.is_empty());
        assert_eq!(batch.premiums[0].amount_paid, 50);
        assert_eq!(batch.claims[0].net_payout_to_claimant, 900);
        assert_eq!(batch.underwriters.len(), 2);
    }

    #[tokio::test]
    async fn one_failing_collection_fails_the_batch() {
        let transport = MemoryTransport { fail_on: Some("claims"), ..MemoryTransport::default() };
        let client = SubgraphClient::new(transport, 1000, EventSource::Typed);
        let err = client.fetch_batch().await.unwrap_err();
        assert_eq!(err.to_string(), "Subgraph returned errors: claims unavailable");
    }

    #[tokio::test]
    async fn null_collection_reads_as_empty() {
        struct NullTransport;

        #[async_trait]
        impl GraphQlTransport for NullTransport {
            async fn query(&self, _query: &str) -> Result<Value> {
                Ok(json!({ "claims": null }))
            }
        }

        let client = SubgraphClient::new(NullTransport, 1000, EventSource::Typed);
        assert!(client.claims().await.unwrap().is_empty());
    }

    #[test]
    fn page_size_is_at_least_one() {
        let client = SubgraphClient::new(MemoryTransport::default(), 0, EventSource::Typed);
        assert_eq!(client.page_size, 1);
    }
}
