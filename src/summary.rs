//! Aggregation Engine
//!
//! Pure, deterministic functions computing `Summary` views over the
//! feedback and validation ledgers. Read-only and side-effect-free:
//! given the same stored records the same summary comes back.
//!
//! Feedback aggregation sums raw mantissas while tracking only the
//! maximum scale seen; contributing records with different scales are
//! not rescaled to a common base before summing. Callers that need an
//! exact decimal aggregate must supply uniformly-scaled records.

use crate::feedback::FeedbackLedger;
use crate::types::{AgentId, Principal, Summary};
use crate::validation::ValidationLedger;

/// Aggregate feedback for an agent over an explicit set of principals.
///
/// The engine has no way to enumerate "all contributors": an empty
/// principal set always yields the zero summary, however much feedback
/// exists. Callers wanting a global view supply the full known set.
///
/// A record contributes iff it is not revoked and each non-empty tag
/// filter matches the record's tag exactly.
pub fn summarize_feedback(
    store: &FeedbackLedger,
    agent: &AgentId,
    principals: &[Principal],
    tag1: &str,
    tag2: &str,
) -> Summary {
    let mut summary = Summary::ZERO;
    for principal in principals {
        for record in store.records(agent, principal) {
            if record.revoked {
                continue;
            }
            if !tag1.is_empty() && record.tag1 != tag1 {
                continue;
            }
            if !tag2.is_empty() && record.tag2 != tag2 {
                continue;
            }
            summary.accumulate(record.value.mantissa, record.value.scale);
        }
    }
    summary
}

/// Aggregate validation responses for an agent.
///
/// Unlike feedback, requests are tracked per-agent, so all of them are
/// visited. Still-pending requests are skipped. A responded request
/// contributes iff the validator set is empty or contains its validator,
/// and the tag filter (if non-empty) matches. Scores map
/// `Approved -> +1`, `Rejected -> -1`, `Inconclusive -> 0`; the scale of
/// a validation summary is always 0.
pub fn summarize_validations(
    store: &ValidationLedger,
    agent: &AgentId,
    validators: &[Principal],
    tag: &str,
) -> Summary {
    let mut summary = Summary::ZERO;
    for request in store.requests_for(agent) {
        if !request.response.is_terminal() {
            continue;
        }
        if !validators.is_empty() && !validators.contains(&request.validator) {
            continue;
        }
        if !tag.is_empty() && request.tag != tag {
            continue;
        }
        summary.accumulate(request.response.score(), 0);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::Score;
    use crate::validation::ValidationResponse;
    use proptest::prelude::*;

    fn agent(n: u8) -> AgentId {
        let mut id = [0u8; 32];
        id[31] = n;
        id
    }

    fn principal(n: u8) -> Principal {
        let mut p = [0u8; 20];
        p[19] = n;
        p
    }

    fn hash(n: u8) -> [u8; 32] {
        let mut h = [0u8; 32];
        h[0] = n;
        h
    }

    fn give(store: &FeedbackLedger, author: Principal, a: AgentId, mantissa: i128, scale: u8, tag1: &str) -> u64 {
        store.give_feedback(
            author,
            a,
            Score { mantissa, scale },
            tag1,
            "",
            "",
            vec![],
            vec![],
            0,
        )
    }

    #[test]
    fn empty_principal_set_always_zero() {
        let store = FeedbackLedger::new();
        let a = agent(1);
        give(&store, principal(1), a, 100, 2, "quality");
        give(&store, principal(2), a, 50, 0, "");

        assert_eq!(summarize_feedback(&store, &a, &[], "", ""), Summary::ZERO);
    }

    #[test]
    fn tag_filters_match_exactly() {
        let store = FeedbackLedger::new();
        let a = agent(1);
        let b = principal(1);
        give(&store, b, a, 100, 2, "quality");
        give(&store, b, a, 40, 1, "latency");

        let filtered = summarize_feedback(&store, &a, &[b], "quality", "");
        assert_eq!(filtered, Summary { count: 1, value: 100, scale: 2 });

        let unfiltered = summarize_feedback(&store, &a, &[b], "", "");
        assert_eq!(unfiltered, Summary { count: 2, value: 140, scale: 2 });
    }

    #[test]
    fn revoked_records_excluded_but_raw_count_keeps_them() {
        let store = FeedbackLedger::new();
        let a = agent(1);
        let b = principal(1);
        give(&store, b, a, 100, 2, "");
        let index = give(&store, b, a, 900, 2, "");
        store.revoke_feedback(b, a, index).unwrap();

        let summary = summarize_feedback(&store, &a, &[b], "", "");
        assert_eq!(summary, Summary { count: 1, value: 100, scale: 2 });
        assert_eq!(store.feedback_count(&a, &b), 2);
    }

    #[test]
    fn mixed_scales_sum_raw_mantissas_and_keep_max_scale() {
        // 1.00 (scale 2) + 5 (scale 0) comes out as (105, 2), not 6.00.
        let store = FeedbackLedger::new();
        let a = agent(1);
        let b = principal(1);
        give(&store, b, a, 100, 2, "");
        give(&store, b, a, 5, 0, "");

        let summary = summarize_feedback(&store, &a, &[b], "", "");
        assert_eq!(summary, Summary { count: 2, value: 105, scale: 2 });
    }

    #[test]
    fn validation_scores_map_to_plus_minus_zero() {
        let store = ValidationLedger::new();
        let a = agent(1);
        let v1 = principal(1);
        let v2 = principal(2);
        store.request_validation(principal(9), v1, a, "", hash(1), 0).unwrap();
        store.request_validation(principal(9), v2, a, "", hash(2), 0).unwrap();
        store.respond(v1, hash(1), ValidationResponse::Approved, "", "", 1).unwrap();
        store.respond(v2, hash(2), ValidationResponse::Approved, "", "", 2).unwrap();

        let summary = summarize_validations(&store, &a, &[], "");
        assert_eq!(summary, Summary { count: 2, value: 2, scale: 0 });
    }

    #[test]
    fn approved_and_rejected_cancel() {
        let store = ValidationLedger::new();
        let a = agent(1);
        let v1 = principal(1);
        let v2 = principal(2);
        store.request_validation(principal(9), v1, a, "", hash(1), 0).unwrap();
        store.request_validation(principal(9), v2, a, "", hash(2), 0).unwrap();
        store.respond(v1, hash(1), ValidationResponse::Approved, "", "", 1).unwrap();
        store.respond(v2, hash(2), ValidationResponse::Rejected, "", "", 2).unwrap();

        let summary = summarize_validations(&store, &a, &[], "");
        assert_eq!(summary, Summary { count: 2, value: 0, scale: 0 });
    }

    #[test]
    fn pending_requests_excluded_entirely() {
        let store = ValidationLedger::new();
        let a = agent(1);
        store.request_validation(principal(9), principal(1), a, "", hash(1), 0).unwrap();
        store.request_validation(principal(9), principal(2), a, "", hash(2), 0).unwrap();
        store
            .respond(principal(1), hash(1), ValidationResponse::Inconclusive, "", "", 1)
            .unwrap();

        let summary = summarize_validations(&store, &a, &[], "");
        assert_eq!(summary, Summary { count: 1, value: 0, scale: 0 });
    }

    #[test]
    fn validator_set_filters_when_non_empty() {
        let store = ValidationLedger::new();
        let a = agent(1);
        let v1 = principal(1);
        let v2 = principal(2);
        store.request_validation(principal(9), v1, a, "", hash(1), 0).unwrap();
        store.request_validation(principal(9), v2, a, "", hash(2), 0).unwrap();
        store.respond(v1, hash(1), ValidationResponse::Approved, "", "", 1).unwrap();
        store.respond(v2, hash(2), ValidationResponse::Rejected, "", "", 2).unwrap();

        let summary = summarize_validations(&store, &a, &[v1], "");
        assert_eq!(summary, Summary { count: 1, value: 1, scale: 0 });
    }

    proptest! {
        /// The feedback summary equals a straight fold over the records
        /// that survive the filters, independent of insertion pattern.
        #[test]
        fn summary_matches_manual_fold(
            mantissas in proptest::collection::vec(-1_000_000i128..1_000_000, 0..24),
            scales in proptest::collection::vec(0u8..6, 0..24),
            revoke_mask in proptest::collection::vec(any::<bool>(), 0..24),
        ) {
            let store = FeedbackLedger::new();
            let a = agent(1);
            let b = principal(1);
            let n = mantissas.len().min(scales.len()).min(revoke_mask.len());

            let mut expected = Summary::ZERO;
            for i in 0..n {
                let index = give(&store, b, a, mantissas[i], scales[i], "");
                if revoke_mask[i] {
                    store.revoke_feedback(b, a, index).unwrap();
                } else {
                    expected.accumulate(mantissas[i], scales[i]);
                }
            }

            prop_assert_eq!(summarize_feedback(&store, &a, &[b], "", ""), expected);
            // The empty-principal rule holds whatever was stored.
            prop_assert_eq!(summarize_feedback(&store, &a, &[], "", ""), Summary::ZERO);
        }
    }
}
