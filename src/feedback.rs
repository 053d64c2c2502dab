//! Feedback Ledger
//!
//! Append-only arena of feedback records, indexed by `(agent, author)`.
//! Records are addressed by their index within that log and are never
//! physically deleted; revocation flips a flag exactly once.

use crate::error::VerifyError;
use crate::types::{AgentId, Principal};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed-point score: raw mantissa plus a decimal scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub mantissa: i128,
    pub scale: u8,
}

/// One feedback entry left by an author about an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub author: Principal,
    pub value: Score,
    pub tag1: String,
    pub tag2: String,
    pub endpoint: String,
    pub content_refs: Vec<String>,
    pub response_refs: Vec<String>,
    pub timestamp: u64,
    pub revoked: bool,
}

#[derive(Default)]
struct FeedbackArena {
    /// (agent, author) -> append-only record log.
    logs: HashMap<(AgentId, Principal), Vec<FeedbackRecord>>,
    /// agent -> authors that have ever left feedback, in first-seen order.
    authors: HashMap<AgentId, Vec<Principal>>,
}

/// In-memory feedback store, single-writer many-reader.
#[derive(Default)]
pub struct FeedbackLedger {
    arena: RwLock<FeedbackArena>,
}

impl FeedbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a feedback record and return its index within the
    /// `(agent, author)` log.
    #[allow(clippy::too_many_arguments)]
    pub fn give_feedback(
        &self,
        author: Principal,
        agent: AgentId,
        value: Score,
        tag1: impl Into<String>,
        tag2: impl Into<String>,
        endpoint: impl Into<String>,
        content_refs: Vec<String>,
        response_refs: Vec<String>,
        timestamp: u64,
    ) -> u64 {
        let record = FeedbackRecord {
            author,
            value,
            tag1: tag1.into(),
            tag2: tag2.into(),
            endpoint: endpoint.into(),
            content_refs,
            response_refs,
            timestamp,
            revoked: false,
        };

        let mut arena = self.arena.write();
        let arena = &mut *arena;
        let seen = arena.authors.entry(agent).or_default();
        if !seen.contains(&author) {
            seen.push(author);
        }
        let log = arena.logs.entry((agent, author)).or_default();
        log.push(record);
        (log.len() - 1) as u64
    }

    /// Revoke a previously given record. Only the original author's log is
    /// addressable, and revocation is a one-shot transition.
    pub fn revoke_feedback(
        &self,
        author: Principal,
        agent: AgentId,
        index: u64,
    ) -> Result<(), VerifyError> {
        let mut arena = self.arena.write();
        let record = arena
            .logs
            .get_mut(&(agent, author))
            .and_then(|log| log.get_mut(index as usize))
            .ok_or(VerifyError::FeedbackNotFound)?;
        if record.revoked {
            return Err(VerifyError::FeedbackAlreadyRevoked);
        }
        record.revoked = true;
        Ok(())
    }

    /// Raw per-author record count, revoked records included. Diverges
    /// from summaries, which skip revoked records.
    pub fn feedback_count(&self, agent: &AgentId, author: &Principal) -> u64 {
        self.arena
            .read()
            .logs
            .get(&(*agent, *author))
            .map(|log| log.len() as u64)
            .unwrap_or(0)
    }

    /// Snapshot of one author's log for an agent.
    pub fn records(&self, agent: &AgentId, author: &Principal) -> Vec<FeedbackRecord> {
        self.arena
            .read()
            .logs
            .get(&(*agent, *author))
            .cloned()
            .unwrap_or_default()
    }

    /// One record by log index.
    pub fn record(&self, agent: &AgentId, author: &Principal, index: u64) -> Option<FeedbackRecord> {
        self.arena
            .read()
            .logs
            .get(&(*agent, *author))
            .and_then(|log| log.get(index as usize))
            .cloned()
    }

    /// Principals that have ever left feedback for the agent. Read-only
    /// helper; the aggregation engine never consults this implicitly.
    pub fn contributors(&self, agent: &AgentId) -> Vec<Principal> {
        self.arena
            .read()
            .authors
            .get(agent)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn records_append_in_order() {
        let ledger = FeedbackLedger::new();
        let a = agent(1);
        let author = principal(9);

        let first = ledger.give_feedback(
            author,
            a,
            Score { mantissa: 100, scale: 2 },
            "quality",
            "",
            "",
            vec![],
            vec![],
            1_000,
        );
        let second = ledger.give_feedback(
            author,
            a,
            Score { mantissa: -5, scale: 0 },
            "latency",
            "",
            "",
            vec![],
            vec![],
            1_001,
        );

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(ledger.feedback_count(&a, &author), 2);
        assert_eq!(ledger.record(&a, &author, 1).unwrap().tag1, "latency");
    }

    #[test]
    fn revoke_is_one_shot() {
        let ledger = FeedbackLedger::new();
        let a = agent(1);
        let author = principal(9);
        let index = ledger.give_feedback(
            author,
            a,
            Score { mantissa: 1, scale: 0 },
            "",
            "",
            "",
            vec![],
            vec![],
            0,
        );

        ledger.revoke_feedback(author, a, index).unwrap();
        assert_eq!(
            ledger.revoke_feedback(author, a, index),
            Err(VerifyError::FeedbackAlreadyRevoked)
        );
        // Revoked records stay in the raw count.
        assert_eq!(ledger.feedback_count(&a, &author), 1);
    }

    #[test]
    fn revoke_requires_existing_record() {
        let ledger = FeedbackLedger::new();
        assert_eq!(
            ledger.revoke_feedback(principal(1), agent(1), 0),
            Err(VerifyError::FeedbackNotFound)
        );
    }

    #[test]
    fn contributors_deduplicated_in_first_seen_order() {
        let ledger = FeedbackLedger::new();
        let a = agent(1);
        for author in [principal(3), principal(1), principal(3)] {
            ledger.give_feedback(
                author,
                a,
                Score { mantissa: 1, scale: 0 },
                "",
                "",
                "",
                vec![],
                vec![],
                0,
            );
        }
        assert_eq!(ledger.contributors(&a), vec![principal(3), principal(1)]);
    }
}
