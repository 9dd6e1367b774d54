/// Fatal errors of an analytics request. Any of these aborts the whole
/// computation; data anomalies inside the event log are never errors.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("SUBGRAPH_URL not configured")]
    NotConfigured,

    #[error("Subgraph request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Subgraph returned errors: {0}")]
    GraphQl(String),

    #[error("Could not decode {collection} record: {reason}")]
    Decode { collection: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
