//! Pull protocol: query issuer, responder and result store.
//!
//! One `Gateway` per ledger owns both directions of the protocol. The
//! issuing side derives a correlation id, records the query as pending
//! and hands the encoded message to the transport; the responding side
//! authenticates the counterparty, consults the identity ledger or the
//! aggregation engine and sends the result back; the result store
//! authenticates and caches whatever arrives.
//!
//! A query's lifecycle is `Issued -> Pending -> Resolved`. There is no
//! timeout, retry or expiry: an unanswered query stays pending forever
//! and the only remedy is a fresh query with a new correlation id. A
//! result for an already-resolved correlation id is accepted again and
//! overwrites the cache; see `handle_result`.

use crate::error::VerifyError;
use crate::feedback::FeedbackLedger;
use crate::identity::IdentityLookup;
use crate::summary::summarize_feedback;
use crate::trust::TrustTable;
use crate::types::{AgentId, ChainId, CorrelationId, Principal, ZERO_PRINCIPAL};
use crate::wire::{QueryMessage, ResultMessage};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outbound message-send primitive, implemented by the messaging layer.
///
/// Delivery is assumed at-least-once and unordered; the protocol never
/// relies on ordering, only on the authentication checks at the receiver.
pub trait MessageTransport: Send + Sync {
    fn send(
        &self,
        dest_chain: ChainId,
        dest: Principal,
        payload: Vec<u8>,
        budget: u64,
    ) -> Result<(), VerifyError>;
}

/// What a query asks for; doubles as the purpose tag folded into the
/// correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPurpose {
    Identity,
    Reputation,
}

impl QueryPurpose {
    fn tag(&self) -> u8 {
        match self {
            QueryPurpose::Identity => 1,
            QueryPurpose::Reputation => 3,
        }
    }
}

/// Decoded result cached under its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedResult {
    Identity {
        exists: bool,
        owner: Principal,
        uri: String,
        score: i128,
        feedback_count: u64,
    },
    Reputation {
        count: u64,
        value: i128,
    },
}

/// Notifications recorded by the gateway, drained by the embedder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    QueryIssued {
        correlation: CorrelationId,
        target_chain: ChainId,
        agent: AgentId,
        purpose: QueryPurpose,
    },
    QueryAnswered {
        correlation: CorrelationId,
        from_chain: ChainId,
    },
    ResultStored {
        correlation: CorrelationId,
        from_chain: ChainId,
    },
}

/// Seed hashed into a correlation id. Collision resistance within one
/// ledger's lifetime comes from hashing the full tuple.
#[derive(Serialize)]
struct QuerySeed {
    target_chain: ChainId,
    agent: AgentId,
    purpose: u8,
    block: u64,
    caller: Principal,
}

/// Result cache: arena of decoded results plus a correlation-id index.
/// Inserts overwrite unconditionally; there is no freshness or replay
/// check at this layer.
#[derive(Default)]
struct ResultCache {
    entries: Vec<CachedResult>,
    index: HashMap<CorrelationId, usize>,
}

impl ResultCache {
    fn insert(&mut self, correlation: CorrelationId, result: CachedResult) {
        match self.index.get(&correlation) {
            Some(&slot) => self.entries[slot] = result,
            None => {
                self.index.insert(correlation, self.entries.len());
                self.entries.push(result);
            }
        }
    }

    fn get(&self, correlation: &CorrelationId) -> Option<&CachedResult> {
        self.index.get(correlation).map(|&slot| &self.entries[slot])
    }
}

#[derive(Default)]
struct GatewayState {
    pending: HashMap<CorrelationId, Principal>,
    cache: ResultCache,
    events: Vec<GatewayEvent>,
}

/// Per-ledger endpoint of the pull protocol.
pub struct Gateway {
    /// Principal of the trusted transport allowed to invoke the inbound
    /// handlers.
    transport_principal: Principal,
    trust: Arc<TrustTable>,
    transport: Arc<dyn MessageTransport>,
    identity: Arc<dyn IdentityLookup>,
    feedback: Arc<FeedbackLedger>,
    state: RwLock<GatewayState>,
}

impl Gateway {
    pub fn new(
        transport_principal: Principal,
        trust: Arc<TrustTable>,
        transport: Arc<dyn MessageTransport>,
        identity: Arc<dyn IdentityLookup>,
        feedback: Arc<FeedbackLedger>,
    ) -> Self {
        Self {
            transport_principal,
            trust,
            transport,
            identity,
            feedback,
            state: RwLock::new(GatewayState::default()),
        }
    }

    pub fn trust(&self) -> &TrustTable {
        &self.trust
    }

    /// Issue an identity query against `target_chain`.
    pub fn issue_identity_query(
        &self,
        caller: Principal,
        target_chain: ChainId,
        agent: AgentId,
        block: u64,
    ) -> Result<CorrelationId, VerifyError> {
        let correlation =
            self.derive_correlation(target_chain, agent, QueryPurpose::Identity, block, caller);
        let message = QueryMessage::Identity { correlation, agent };
        self.dispatch_query(caller, target_chain, agent, QueryPurpose::Identity, correlation, message)
    }

    /// Issue a reputation query against `target_chain` with the given
    /// principal and tag filters.
    pub fn issue_reputation_query(
        &self,
        caller: Principal,
        target_chain: ChainId,
        agent: AgentId,
        principals: Vec<Principal>,
        tag1: impl Into<String>,
        tag2: impl Into<String>,
        block: u64,
    ) -> Result<CorrelationId, VerifyError> {
        let correlation =
            self.derive_correlation(target_chain, agent, QueryPurpose::Reputation, block, caller);
        let message = QueryMessage::Reputation {
            correlation,
            agent,
            principals,
            tag1: tag1.into(),
            tag2: tag2.into(),
        };
        self.dispatch_query(caller, target_chain, agent, QueryPurpose::Reputation, correlation, message)
    }

    /// Responder side: authenticate and answer an inbound query.
    pub fn handle_query(
        &self,
        caller: Principal,
        from_chain: ChainId,
        from_address: Principal,
        payload: &[u8],
    ) -> Result<(), VerifyError> {
        let counterparty = self.authenticate(caller, from_chain, from_address)?;
        let query = QueryMessage::decode(payload)?;
        let correlation = query.correlation();
        debug!(
            from_chain,
            correlation = %hex::encode(correlation),
            "handling inbound query"
        );

        let result = match query {
            QueryMessage::Identity { correlation, agent } => {
                if self.identity.agent_exists(&agent) {
                    // Identity responses carry the aggregation engine's
                    // empty-principal summary, which is always zero: the
                    // score fields of an identity result are placeholders,
                    // not a real reputation number.
                    let summary = summarize_feedback(&self.feedback, &agent, &[], "", "");
                    ResultMessage::Identity {
                        correlation,
                        exists: true,
                        owner: self.identity.owner_of(&agent).unwrap_or(ZERO_PRINCIPAL),
                        uri: self.identity.endpoint_of(&agent).unwrap_or_default(),
                        score: summary.value,
                        feedback_count: summary.count,
                    }
                } else {
                    ResultMessage::Identity {
                        correlation,
                        exists: false,
                        owner: ZERO_PRINCIPAL,
                        uri: String::new(),
                        score: 0,
                        feedback_count: 0,
                    }
                }
            }
            QueryMessage::Reputation {
                correlation,
                agent,
                principals,
                tag1,
                tag2,
            } => {
                let summary =
                    summarize_feedback(&self.feedback, &agent, &principals, &tag1, &tag2);
                ResultMessage::Reputation {
                    correlation,
                    count: summary.count,
                    value: summary.value,
                }
            }
        };

        self.transport.send(
            from_chain,
            counterparty,
            result.encode(),
            self.trust.response_budget(),
        )?;
        self.state.write().events.push(GatewayEvent::QueryAnswered {
            correlation,
            from_chain,
        });
        Ok(())
    }

    /// Result-store side: authenticate and cache an inbound result.
    ///
    /// The cache entry is overwritten unconditionally and the pending
    /// entry removed without checking it still existed: a duplicated or
    /// re-sent response is accepted both times. Consumers that care must
    /// track resolution themselves.
    pub fn handle_result(
        &self,
        caller: Principal,
        from_chain: ChainId,
        from_address: Principal,
        payload: &[u8],
    ) -> Result<(), VerifyError> {
        self.authenticate(caller, from_chain, from_address)?;
        let message = ResultMessage::decode(payload)?;
        let correlation = message.correlation();

        let result = match message {
            ResultMessage::Identity {
                exists,
                owner,
                uri,
                score,
                feedback_count,
                ..
            } => CachedResult::Identity {
                exists,
                owner,
                uri,
                score,
                feedback_count,
            },
            ResultMessage::Reputation { count, value, .. } => {
                CachedResult::Reputation { count, value }
            }
        };

        let mut state = self.state.write();
        state.cache.insert(correlation, result);
        state.pending.remove(&correlation);
        state.events.push(GatewayEvent::ResultStored {
            correlation,
            from_chain,
        });
        debug!(
            from_chain,
            correlation = %hex::encode(correlation),
            "result stored"
        );
        Ok(())
    }

    /// Cached result for a correlation id, if any response has arrived.
    pub fn result(&self, correlation: &CorrelationId) -> Option<CachedResult> {
        self.state.read().cache.get(correlation).cloned()
    }

    /// Whether a query is still awaiting its first response.
    pub fn is_pending(&self, correlation: &CorrelationId) -> bool {
        self.state.read().pending.contains_key(correlation)
    }

    /// Requester recorded for a pending query.
    pub fn pending_requester(&self, correlation: &CorrelationId) -> Option<Principal> {
        self.state.read().pending.get(correlation).copied()
    }

    /// Drain accumulated notifications in emission order.
    pub fn take_events(&self) -> Vec<GatewayEvent> {
        std::mem::take(&mut self.state.write().events)
    }

    fn derive_correlation(
        &self,
        target_chain: ChainId,
        agent: AgentId,
        purpose: QueryPurpose,
        block: u64,
        caller: Principal,
    ) -> CorrelationId {
        let seed = QuerySeed {
            target_chain,
            agent,
            purpose: purpose.tag(),
            block,
            caller,
        };
        let encoded = bincode::serialize(&seed).expect("seed serialization is infallible");
        *blake3::hash(&encoded).as_bytes()
    }

    /// Common tail of both issue paths: resolve the counterparty, send,
    /// and only then record the pending entry, so a failed send leaves
    /// no state behind.
    fn dispatch_query(
        &self,
        caller: Principal,
        target_chain: ChainId,
        agent: AgentId,
        purpose: QueryPurpose,
        correlation: CorrelationId,
        message: QueryMessage,
    ) -> Result<CorrelationId, VerifyError> {
        let counterparty = self
            .trust
            .counterparty(target_chain)
            .ok_or(VerifyError::UnknownChain(target_chain))?;

        self.transport.send(
            target_chain,
            counterparty,
            message.encode(),
            self.trust.response_budget(),
        )?;

        let mut state = self.state.write();
        state.pending.insert(correlation, caller);
        state.events.push(GatewayEvent::QueryIssued {
            correlation,
            target_chain,
            agent,
            purpose,
        });
        debug!(
            target_chain,
            correlation = %hex::encode(correlation),
            "query issued"
        );
        Ok(correlation)
    }

    fn authenticate(
        &self,
        caller: Principal,
        from_chain: ChainId,
        from_address: Principal,
    ) -> Result<Principal, VerifyError> {
        if caller != self.transport_principal {
            return Err(VerifyError::OnlyTransport);
        }
        let counterparty = self
            .trust
            .counterparty(from_chain)
            .ok_or(VerifyError::UnknownChain(from_chain))?;
        if from_address != counterparty {
            warn!(
                from_chain,
                sender = %hex::encode(from_address),
                "rejected message from unauthorized counterparty"
            );
            return Err(VerifyError::UnauthorizedCounterparty {
                chain: from_chain,
                sender: from_address,
            });
        }
        Ok(counterparty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AgentDirectory;

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

    /// Captures outbound messages for inspection.
    #[derive(Default)]
    struct CapturingTransport {
        sent: RwLock<Vec<(ChainId, Principal, Vec<u8>, u64)>>,
    }

    impl MessageTransport for CapturingTransport {
        fn send(
            &self,
            dest_chain: ChainId,
            dest: Principal,
            payload: Vec<u8>,
            budget: u64,
        ) -> Result<(), VerifyError> {
            self.sent.write().push((dest_chain, dest, payload, budget));
            Ok(())
        }
    }

    fn gateway() -> (Arc<CapturingTransport>, Arc<AgentDirectory>, Gateway) {
        let admin = principal(1);
        let trust = Arc::new(TrustTable::new(admin));
        trust.set_counterparty(admin, 7, principal(70)).unwrap();
        let transport = Arc::new(CapturingTransport::default());
        let identity = Arc::new(AgentDirectory::new());
        let gateway = Gateway::new(
            principal(50),
            trust,
            transport.clone(),
            identity.clone(),
            Arc::new(FeedbackLedger::new()),
        );
        (transport, identity, gateway)
    }

    #[test]
    fn unknown_chain_leaves_no_pending_entry() {
        let (transport, _, gateway) = gateway();
        let result = gateway.issue_identity_query(principal(9), 99, agent(1), 5);

        assert_eq!(result, Err(VerifyError::UnknownChain(99)));
        assert!(transport.sent.read().is_empty());
        assert!(gateway.take_events().is_empty());
    }

    #[test]
    fn issued_query_is_pending_until_result() {
        let (transport, _, gateway) = gateway();
        let correlation = gateway
            .issue_identity_query(principal(9), 7, agent(1), 5)
            .unwrap();

        assert!(gateway.is_pending(&correlation));
        assert_eq!(gateway.pending_requester(&correlation), Some(principal(9)));
        assert_eq!(transport.sent.read().len(), 1);
        assert_eq!(transport.sent.read()[0].0, 7);
        assert_eq!(transport.sent.read()[0].1, principal(70));
    }

    #[test]
    fn same_seed_same_correlation_different_block_differs() {
        let (_, _, gateway) = gateway();
        let first = gateway
            .issue_identity_query(principal(9), 7, agent(1), 5)
            .unwrap();
        let second = gateway
            .issue_identity_query(principal(9), 7, agent(1), 5)
            .unwrap();
        let third = gateway
            .issue_identity_query(principal(9), 7, agent(1), 6)
            .unwrap();

        assert_eq!(first, second);
        assert_ne!(first, third);
    }

    #[test]
    fn handlers_reject_non_transport_callers() {
        let (_, _, gateway) = gateway();
        let payload = QueryMessage::Identity {
            correlation: [0u8; 32],
            agent: agent(1),
        }
        .encode();

        assert_eq!(
            gateway.handle_query(principal(2), 7, principal(70), &payload),
            Err(VerifyError::OnlyTransport)
        );
    }

    #[test]
    fn handlers_reject_unauthorized_counterparties() {
        let (_, _, gateway) = gateway();
        let payload = QueryMessage::Identity {
            correlation: [0u8; 32],
            agent: agent(1),
        }
        .encode();

        assert_eq!(
            gateway.handle_query(principal(50), 7, principal(71), &payload),
            Err(VerifyError::UnauthorizedCounterparty {
                chain: 7,
                sender: principal(71),
            })
        );
    }

    #[test]
    fn result_overwrites_cache_on_replay() {
        let (_, _, gateway) = gateway();
        let correlation = gateway
            .issue_identity_query(principal(9), 7, agent(1), 5)
            .unwrap();

        let first = ResultMessage::Reputation {
            correlation,
            count: 1,
            value: 10,
        };
        let second = ResultMessage::Reputation {
            correlation,
            count: 2,
            value: 20,
        };

        gateway
            .handle_result(principal(50), 7, principal(70), &first.encode())
            .unwrap();
        assert!(!gateway.is_pending(&correlation));

        // Replay after resolution: accepted again, overwrites.
        gateway
            .handle_result(principal(50), 7, principal(70), &second.encode())
            .unwrap();
        assert_eq!(
            gateway.result(&correlation),
            Some(CachedResult::Reputation { count: 2, value: 20 })
        );
    }
}
