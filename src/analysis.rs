use std::collections::{HashMap, HashSet};

use num_bigint::{BigInt, BigUint};
use tracing::debug;

use crate::{
    config::FoldOptions,
    events::{CoverEvent, EventBatch, LedgerEvent, PremiumPaid, merge_events},
    report::{ActiveCoverPoint, CoverageReport, LapsedCoverPoint},
    types::{Amount, PolicyId, SignedTotal, Timestamp, Total},
};

/// Result of replaying the ordered created/lapsed/claim stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageLedger {
    /// Sum of coverage of every policy currently known, after the last event.
    pub active: SignedTotal,
    /// One point per replayed event, no-ops included.
    pub active_cover_history: Vec<ActiveCoverPoint>,
    /// One point per policy removed by a lapse or a claim.
    pub lapsed_cover_history: Vec<LapsedCoverPoint>,
    /// Sum over paid claims of `max(0, coverage - net payout)`.
    pub total_claim_fees: Total,
    /// Lapses and claims for a policy that was not active at the time.
    pub ignored_removals: usize,
    /// Creations for a policy that was already active. Both increments stay in
    /// `active`; only the later coverage can be released.
    pub recreated_policies: usize,
}

impl CoverageLedger {
    /// Drop `policy_id` from the active set and return the coverage it held.
    fn release(
        &mut self,
        known: &mut HashMap<PolicyId, Amount>,
        policy_id: PolicyId,
        timestamp: Timestamp,
    ) -> Option<Amount> {
        let Some(coverage) = known.remove(&policy_id) else {
            self.ignored_removals += 1;
            return None;
        };
        self.active -= BigInt::from(coverage);
        self.lapsed_cover_history.push(LapsedCoverPoint { timestamp, amount: coverage });
        Some(coverage)
    }
}

/// Replay events in the given order.
///
/// A policy is active from its `Created` event until the first `Lapsed` or
/// `Claim` for it. Removals of a policy that is not active change nothing but
/// still record a history point, so the history has exactly one entry per
/// event.
pub fn replay_coverage(events: &[LedgerEvent]) -> CoverageLedger {
    let mut known: HashMap<PolicyId, Amount> = HashMap::new();
    let mut ledger = CoverageLedger {
        active_cover_history: Vec::with_capacity(events.len()),
        ..CoverageLedger::default()
    };

    for ev in events {
        let policy_id = ev.event.policy_id();
        match ev.event {
            CoverEvent::Created { coverage, .. } => {
                ledger.active += BigInt::from(coverage);
                if known.insert(policy_id, coverage).is_some() {
                    ledger.recreated_policies += 1;
                }
            }
            CoverEvent::Lapsed { .. } => {
                ledger.release(&mut known, policy_id, ev.timestamp);
            }
            CoverEvent::Claim { net_payout, .. } => {
                if let Some(coverage) = ledger.release(&mut known, policy_id, ev.timestamp) {
                    ledger.total_claim_fees += BigUint::from(coverage.saturating_sub(net_payout));
                }
            }
        }
        ledger
            .active_cover_history
            .push(ActiveCoverPoint { timestamp: ev.timestamp, active: ledger.active.clone() });
    }

    ledger
}

/// Sum of premiums paid, independent of event order.
pub fn total_premiums(premiums: &[PremiumPaid]) -> Total {
    premiums.iter().map(|p| BigUint::from(p.amount_paid)).sum()
}

/// Number of distinct addresses, compared case-insensitively.
pub fn distinct_addresses<'a>(addresses: impl IntoIterator<Item = &'a str>) -> usize {
    addresses
        .into_iter()
        .map(|a| a.to_lowercase())
        .collect::<HashSet<String>>()
        .len()
}

/// Merge and replay the created/lapsed/claim collections of a batch.
pub fn replay_batch(batch: &EventBatch, options: &FoldOptions) -> CoverageLedger {
    let events = merge_events(&batch.created, &batch.lapsed, &batch.claims, options.tie_break);
    let ledger = replay_coverage(&events);

    if ledger.ignored_removals > 0 || ledger.recreated_policies > 0 {
        debug!(
            ignored_removals = ledger.ignored_removals,
            recreated_policies = ledger.recreated_policies,
            "event log anomalies folded as no-ops"
        );
    }
    ledger
}

/// Combine a replayed ledger with the order-independent totals of its batch.
pub fn assemble(batch: &EventBatch, ledger: CoverageLedger) -> CoverageReport {
    CoverageReport {
        total_active_cover: ledger.active,
        active_cover_history: ledger.active_cover_history,
        total_premiums_paid: total_premiums(&batch.premiums),
        total_claim_fees: ledger.total_claim_fees,
        lapsed_cover_history: ledger.lapsed_cover_history,
        underwriter_count: distinct_addresses(batch.underwriters.iter().map(|u| u.id.as_str())),
        policy_holder_count: distinct_addresses(batch.created.iter().map(|c| c.user.as_str())),
    }
}

/// Build the full report from one batch of fetched collections.
pub fn analyse(batch: &EventBatch, options: &FoldOptions) -> CoverageReport {
    assemble(batch, replay_batch(batch, options))
}
