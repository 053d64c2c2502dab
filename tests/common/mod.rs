//! Shared harness for cross-ledger integration tests.
//!
//! Builds little two-ledger worlds connected by a loopback transport
//! that queues outbound messages for explicit, test-driven delivery:
//! nothing moves between ledgers unless the test says so, which is
//! exactly the at-least-once, unordered model the protocol assumes.

#![allow(dead_code)]

use parley::feedback::FeedbackLedger;
use parley::identity::AgentDirectory;
use parley::pull::{Gateway, MessageTransport};
use parley::push::ProofSigner;
use parley::trust::TrustTable;
use parley::types::{AgentId, ArtifactId, ChainId, Principal};
use parley::validation::ValidationLedger;
use parley::VerifyError;
use std::sync::{Arc, Mutex};

pub fn agent(n: u8) -> AgentId {
    let mut id = [0u8; 32];
    id[31] = n;
    id
}

pub fn principal(n: u8) -> Principal {
    let mut p = [0u8; 20];
    p[19] = n;
    p
}

/// One message sitting in a ledger's outbound queue.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub dest_chain: ChainId,
    pub dest: Principal,
    pub payload: Vec<u8>,
    pub budget: u64,
}

/// Transport that queues messages instead of delivering them.
#[derive(Default)]
pub struct LoopbackTransport {
    queue: Mutex<Vec<QueuedMessage>>,
}

impl LoopbackTransport {
    pub fn drain(&self) -> Vec<QueuedMessage> {
        std::mem::take(&mut self.queue.lock().unwrap())
    }
}

impl MessageTransport for LoopbackTransport {
    fn send(
        &self,
        dest_chain: ChainId,
        dest: Principal,
        payload: Vec<u8>,
        budget: u64,
    ) -> Result<(), VerifyError> {
        self.queue.lock().unwrap().push(QueuedMessage {
            dest_chain,
            dest,
            payload,
            budget,
        });
        Ok(())
    }
}

/// Signing service stand-in: hands out sequential artifact ids and keeps
/// every signed payload for the test to wrap into an artifact.
#[derive(Default)]
pub struct RecordingSigner {
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl RecordingSigner {
    pub fn last_payload(&self) -> Vec<u8> {
        self.payloads
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no payload was signed")
    }
}

impl ProofSigner for RecordingSigner {
    fn sign(&self, payload: &[u8]) -> Result<ArtifactId, VerifyError> {
        let mut payloads = self.payloads.lock().unwrap();
        payloads.push(payload.to_vec());
        let mut id = [0u8; 32];
        id[31] = payloads.len() as u8;
        Ok(id)
    }
}

/// A self-contained ledger: stores, trust table and pull gateway.
pub struct TestLedger {
    pub chain: ChainId,
    /// On-chain address of this ledger's gateway, as counterparties see it.
    pub address: Principal,
    pub admin: Principal,
    pub transport_principal: Principal,
    pub trust: Arc<TrustTable>,
    pub transport: Arc<LoopbackTransport>,
    pub identity: Arc<AgentDirectory>,
    pub feedback: Arc<FeedbackLedger>,
    pub validations: Arc<ValidationLedger>,
    pub gateway: Gateway,
}

impl TestLedger {
    /// `seed` spaces the ledger's principals apart so two ledgers never
    /// share an address.
    pub fn new(chain: ChainId, seed: u8) -> Self {
        let admin = principal(seed);
        let address = principal(seed + 1);
        let transport_principal = principal(seed + 2);
        let trust = Arc::new(TrustTable::new(admin));
        let transport = Arc::new(LoopbackTransport::default());
        let identity = Arc::new(AgentDirectory::new());
        let feedback = Arc::new(FeedbackLedger::new());
        let validations = Arc::new(ValidationLedger::new());
        let gateway = Gateway::new(
            transport_principal,
            trust.clone(),
            transport.clone(),
            identity.clone(),
            feedback.clone(),
        );
        Self {
            chain,
            address,
            admin,
            transport_principal,
            trust,
            transport,
            identity,
            feedback,
            validations,
            gateway,
        }
    }

    /// Trust `peer` as the counterparty for its chain.
    pub fn trust_peer(&self, peer: &TestLedger) {
        self.trust
            .set_counterparty(self.admin, peer.chain, peer.address)
            .unwrap();
    }
}

/// Two mutually-trusting ledgers.
pub fn two_ledgers() -> (TestLedger, TestLedger) {
    let a = TestLedger::new(1, 10);
    let b = TestLedger::new(2, 20);
    a.trust_peer(&b);
    b.trust_peer(&a);
    (a, b)
}

/// Deliver everything queued on `from` as inbound queries on `to`.
pub fn deliver_queries(from: &TestLedger, to: &TestLedger) {
    for message in from.transport.drain() {
        assert_eq!(message.dest_chain, to.chain, "misrouted message");
        to.gateway
            .handle_query(to.transport_principal, from.chain, from.address, &message.payload)
            .unwrap();
    }
}

/// Deliver everything queued on `from` as inbound results on `to`.
pub fn deliver_results(from: &TestLedger, to: &TestLedger) {
    for message in from.transport.drain() {
        assert_eq!(message.dest_chain, to.chain, "misrouted message");
        to.gateway
            .handle_result(to.transport_principal, from.chain, from.address, &message.payload)
            .unwrap();
    }
}
