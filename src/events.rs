use serde::{Deserialize, Serialize};

use crate::config::TieBreak;
use crate::types::{Amount, PolicyId, PoolId, Timestamp, decimal};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCreated {
    pub policy_id: PolicyId,
    pub pool_id: PoolId,
    pub user: String,
    #[serde(serialize_with = "decimal::serialize", deserialize_with = "decimal::deserialize_u128")]
    pub coverage: Amount,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyLapsed {
    pub policy_id: PolicyId,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumPaid {
    pub policy_id: PolicyId,
    #[serde(serialize_with = "decimal::serialize", deserialize_with = "decimal::deserialize_u128")]
    pub amount_paid: Amount,
    pub timestamp: Timestamp,
}

/// A processed claim as indexed by the subgraph. `coverage` is the subgraph's
/// own copy and is not consulted by the fold, which uses the coverage it saw
/// at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub policy_id: PolicyId,
    #[serde(
        default,
        serialize_with = "decimal::serialize_opt",
        deserialize_with = "decimal::deserialize_opt_u128"
    )]
    pub coverage: Option<Amount>,
    #[serde(serialize_with = "decimal::serialize", deserialize_with = "decimal::deserialize_u128")]
    pub net_payout_to_claimant: Amount,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Underwriter {
    pub id: String,
}

/// Everything one analytics request needs, one collection per query, each in
/// the order the store returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventBatch {
    pub created: Vec<PolicyCreated>,
    pub lapsed: Vec<PolicyLapsed>,
    pub premiums: Vec<PremiumPaid>,
    pub claims: Vec<ClaimRecord>,
    pub underwriters: Vec<Underwriter>,
}

/// The coverage-relevant part of an input event. Premiums never enter the
/// ordered stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverEvent {
    Created { policy_id: PolicyId, coverage: Amount },
    Lapsed { policy_id: PolicyId },
    Claim { policy_id: PolicyId, net_payout: Amount },
}

impl CoverEvent {
    pub fn policy_id(&self) -> PolicyId {
        match *self {
            CoverEvent::Created { policy_id, .. }
            | CoverEvent::Lapsed { policy_id }
            | CoverEvent::Claim { policy_id, .. } => policy_id,
        }
    }

    pub fn is_creation(&self) -> bool {
        matches!(self, CoverEvent::Created { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEvent {
    pub timestamp: Timestamp,
    pub event: CoverEvent,
}

impl From<&PolicyCreated> for LedgerEvent {
    fn from(ev: &PolicyCreated) -> Self {
        LedgerEvent {
            timestamp: ev.timestamp,
            event: CoverEvent::Created { policy_id: ev.policy_id, coverage: ev.coverage },
        }
    }
}

impl From<&PolicyLapsed> for LedgerEvent {
    fn from(ev: &PolicyLapsed) -> Self {
        LedgerEvent { timestamp: ev.timestamp, event: CoverEvent::Lapsed { policy_id: ev.policy_id } }
    }
}

impl From<&ClaimRecord> for LedgerEvent {
    fn from(ev: &ClaimRecord) -> Self {
        LedgerEvent {
            timestamp: ev.timestamp,
            event: CoverEvent::Claim {
                policy_id: ev.policy_id,
                net_payout: ev.net_payout_to_claimant,
            },
        }
    }
}

/// Concatenate created, lapsed and claim events (in that order) and sort them
/// by timestamp. The sort is stable: equal timestamps keep concatenation
/// order unless `tie_break` says otherwise.
pub fn merge_events(
    created: &[PolicyCreated],
    lapsed: &[PolicyLapsed],
    claims: &[ClaimRecord],
    tie_break: TieBreak,
) -> Vec<LedgerEvent> {
    let mut events: Vec<LedgerEvent> = Vec::with_capacity(created.len() + lapsed.len() + claims.len());
    events.extend(created.iter().map(LedgerEvent::from));
    events.extend(lapsed.iter().map(LedgerEvent::from));
    events.extend(claims.iter().map(LedgerEvent::from));

    match tie_break {
        TieBreak::FetchOrder => events.sort_by_key(|e| e.timestamp),
        // false < true, so removals sort ahead of creations within a timestamp.
        TieBreak::RemovalsFirst => events.sort_by_key(|e| (e.timestamp, e.event.is_creation())),
    }
    events
}
