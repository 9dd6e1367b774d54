use serde::Serialize;

use crate::types::{Amount, SignedTotal, Timestamp, Total, decimal};

/// Active cover immediately after the event at `timestamp` was replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveCoverPoint {
    pub timestamp: Timestamp,
    #[serde(serialize_with = "decimal::serialize")]
    pub active: SignedTotal,
}

/// Cover released by a lapse or a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LapsedCoverPoint {
    pub timestamp: Timestamp,
    #[serde(serialize_with = "decimal::serialize")]
    pub amount: Amount,
}

/// Response body of `GET /api/analytics`. Amounts are decimal strings;
/// timestamps and counts are plain JSON numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    #[serde(serialize_with = "decimal::serialize")]
    pub total_active_cover: SignedTotal,
    pub active_cover_history: Vec<ActiveCoverPoint>,
    #[serde(serialize_with = "decimal::serialize")]
    pub total_premiums_paid: Total,
    #[serde(serialize_with = "decimal::serialize")]
    pub total_claim_fees: Total,
    pub lapsed_cover_history: Vec<LapsedCoverPoint>,
    pub underwriter_count: usize,
    pub policy_holder_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(err: &impl std::fmt::Display) -> Self {
        Self { error: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyticsError;
    use num_bigint::{BigInt, BigUint};

    #[test]
    fn report_json_shape() {
        let report = CoverageReport {
            total_active_cover: BigInt::from(0),
            active_cover_history: vec![
                ActiveCoverPoint { timestamp: Timestamp(10), active: BigInt::from(1000) },
                ActiveCoverPoint { timestamp: Timestamp(20), active: BigInt::from(0) },
            ],
            total_premiums_paid: BigUint::from(50_u32),
            total_claim_fees: BigUint::from(100_u32),
            lapsed_cover_history: vec![LapsedCoverPoint { timestamp: Timestamp(20), amount: 1000 }],
            underwriter_count: 2,
            policy_holder_count: 1,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "totalActiveCover": "0",
                "activeCoverHistory": [
                    {"timestamp": 10, "active": "1000"},
                    {"timestamp": 20, "active": "0"}
                ],
                "totalPremiumsPaid": "50",
                "totalClaimFees": "100",
                "lapsedCoverHistory": [{"timestamp": 20, "amount": "1000"}],
                "underwriterCount": 2,
                "policyHolderCount": 1
            })
        );
    }

    #[test]
    fn amounts_beyond_f64_precision_stay_exact() {
        let report = CoverageReport {
            total_active_cover: BigInt::from(-5),
            total_premiums_paid: BigUint::from(u128::MAX) + BigUint::from(1_u32),
            ..CoverageReport::default()
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""totalPremiumsPaid":"340282366920938463463374607431768211456""#));
        assert!(json.contains(r#""totalActiveCover":"-5""#));
    }

    #[test]
    fn error_body_carries_message_verbatim() {
        let body = ErrorBody::new(&AnalyticsError::NotConfigured);
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"error":"SUBGRAPH_URL not configured"}"#);
    }
}
