//! Push protocol: signed proof emission and verification.
//!
//! The emitter packages a current fact about an agent into a versioned,
//! typed payload and hands it to an external signing service; the
//! artifact travels off-ledger. The verifier receives an artifact whose
//! signature was already checked by the execution environment, validates
//! schema, type and origin, and caches the decoded fact.
//!
//! The proof cache is a plain key-value store with last-write-wins
//! semantics: any proof that passes verification replaces the cached
//! entry, even one carrying an older timestamp. Consumers apply their
//! own freshness policy through `proof_age`.

use crate::error::VerifyError;
use crate::feedback::FeedbackLedger;
use crate::identity::IdentityLookup;
use crate::summary::summarize_feedback;
use crate::types::{AgentId, ArtifactId, ChainId, Principal, RequestHash, ZERO_PRINCIPAL};
use crate::validation::{ValidationLedger, ValidationResponse};
use crate::wire::{Reader, Writer};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Schema version stamped into every payload.
pub const PROOF_SCHEMA_VERSION: u8 = 1;

/// Discriminates what fact a proof asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofKind {
    Identity,
    Reputation,
    Validation,
}

impl ProofKind {
    pub fn as_u8(&self) -> u8 {
        match self {
            ProofKind::Identity => 1,
            ProofKind::Reputation => 2,
            ProofKind::Validation => 3,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ProofKind::Identity),
            2 => Some(ProofKind::Reputation),
            3 => Some(ProofKind::Validation),
            _ => None,
        }
    }
}

/// Decoded proof payload.
///
/// Wire shape, byte-exact: `schema_version:u8, proof_type:u8, agent:32B,
/// <type fields>, timestamp:u64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofPayload {
    Identity {
        agent: AgentId,
        owner: Principal,
        endpoint: String,
        timestamp: u64,
    },
    Reputation {
        agent: AgentId,
        count: u64,
        value: i128,
        timestamp: u64,
    },
    Validation {
        agent: AgentId,
        validator: Principal,
        response: ValidationResponse,
        tag: String,
        timestamp: u64,
    },
}

impl ProofPayload {
    pub fn kind(&self) -> ProofKind {
        match self {
            ProofPayload::Identity { .. } => ProofKind::Identity,
            ProofPayload::Reputation { .. } => ProofKind::Reputation,
            ProofPayload::Validation { .. } => ProofKind::Validation,
        }
    }

    pub fn agent(&self) -> AgentId {
        match self {
            ProofPayload::Identity { agent, .. } => *agent,
            ProofPayload::Reputation { agent, .. } => *agent,
            ProofPayload::Validation { agent, .. } => *agent,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            ProofPayload::Identity { timestamp, .. } => *timestamp,
            ProofPayload::Reputation { timestamp, .. } => *timestamp,
            ProofPayload::Validation { timestamp, .. } => *timestamp,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u8(PROOF_SCHEMA_VERSION);
        w.put_u8(self.kind().as_u8());
        match self {
            ProofPayload::Identity {
                agent,
                owner,
                endpoint,
                timestamp,
            } => {
                w.put_bytes(agent);
                w.put_bytes(owner);
                w.put_str(endpoint);
                w.put_u64(*timestamp);
            }
            ProofPayload::Reputation {
                agent,
                count,
                value,
                timestamp,
            } => {
                w.put_bytes(agent);
                w.put_u64(*count);
                w.put_i128(*value);
                w.put_u64(*timestamp);
            }
            ProofPayload::Validation {
                agent,
                validator,
                response,
                tag,
                timestamp,
            } => {
                w.put_bytes(agent);
                w.put_bytes(validator);
                w.put_u8(response.as_u8());
                w.put_str(tag);
                w.put_u64(*timestamp);
            }
        }
        w.finish()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, VerifyError> {
        let mut r = Reader::new(payload);
        let version = r.take_u8("schemaVersion")?;
        if version != PROOF_SCHEMA_VERSION {
            return Err(VerifyError::UnexpectedSchema {
                expected: PROOF_SCHEMA_VERSION,
                found: version,
            });
        }
        let kind = ProofKind::from_u8(r.take_u8("proofType")?).ok_or_else(|| {
            VerifyError::MalformedMessage("unknown proof type tag".to_string())
        })?;
        let decoded = match kind {
            ProofKind::Identity => ProofPayload::Identity {
                agent: r.take_array32("agentId")?,
                owner: r.take_principal("owner")?,
                endpoint: r.take_str("endpoint")?,
                timestamp: r.take_u64("timestamp")?,
            },
            ProofKind::Reputation => ProofPayload::Reputation {
                agent: r.take_array32("agentId")?,
                count: r.take_u64("count")?,
                value: r.take_i128()?,
                timestamp: r.take_u64("timestamp")?,
            },
            ProofKind::Validation => ProofPayload::Validation {
                agent: r.take_array32("agentId")?,
                validator: r.take_principal("validator")?,
                response: ValidationResponse::from_u8(r.take_u8("response")?).ok_or_else(
                    || VerifyError::MalformedMessage("unknown response tag".to_string()),
                )?,
                tag: r.take_str("tag")?,
                timestamp: r.take_u64("timestamp")?,
            },
        };
        r.expect_end()?;
        Ok(decoded)
    }
}

/// External signing service: takes the encoded payload, returns the id
/// of the signed artifact it produced.
pub trait ProofSigner: Send + Sync {
    fn sign(&self, payload: &[u8]) -> Result<ArtifactId, VerifyError>;
}

/// An artifact as handed over by the environment's proof-extraction
/// primitive. `valid_signature` reflects the signature check the
/// environment already performed; the verifier never re-checks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArtifact {
    pub source_chain: ChainId,
    pub origin_sender: Principal,
    pub payload: Vec<u8>,
    pub valid_signature: bool,
}

/// Notifications recorded by the emitter and verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofEvent {
    ProofEmitted {
        artifact: ArtifactId,
        agent: AgentId,
        kind: ProofKind,
    },
    IdentityProofVerified {
        agent: AgentId,
    },
    ReputationProofVerified {
        agent: AgentId,
        count: u64,
        value: i128,
    },
    ValidationProofVerified {
        agent: AgentId,
        validator: Principal,
        response: ValidationResponse,
    },
}

/// Builds proof payloads from the local ledgers and hands them to the
/// signing service.
pub struct ProofEmitter {
    identity: Arc<dyn IdentityLookup>,
    feedback: Arc<FeedbackLedger>,
    validations: Arc<ValidationLedger>,
    signer: Arc<dyn ProofSigner>,
    events: RwLock<Vec<ProofEvent>>,
}

impl ProofEmitter {
    pub fn new(
        identity: Arc<dyn IdentityLookup>,
        feedback: Arc<FeedbackLedger>,
        validations: Arc<ValidationLedger>,
        signer: Arc<dyn ProofSigner>,
    ) -> Self {
        Self {
            identity,
            feedback,
            validations,
            signer,
            events: RwLock::new(Vec::new()),
        }
    }

    /// Emit an identity proof for a registered agent.
    pub fn emit_identity_proof(
        &self,
        agent: AgentId,
        now: u64,
    ) -> Result<ArtifactId, VerifyError> {
        if !self.identity.agent_exists(&agent) {
            return Err(VerifyError::AgentNotFound);
        }
        let payload = ProofPayload::Identity {
            agent,
            owner: self.identity.owner_of(&agent).unwrap_or(ZERO_PRINCIPAL),
            endpoint: self.identity.endpoint_of(&agent).unwrap_or_default(),
            timestamp: now,
        };
        self.sign_and_record(payload)
    }

    /// Emit a reputation proof for an agent.
    ///
    /// The payload is built from the aggregation engine's empty-principal
    /// summary, which is always zero: what gets attested is the absence
    /// of an enumerable global view, not an actual aggregate.
    pub fn emit_reputation_proof(
        &self,
        agent: AgentId,
        now: u64,
    ) -> Result<ArtifactId, VerifyError> {
        let summary = summarize_feedback(&self.feedback, &agent, &[], "", "");
        let payload = ProofPayload::Reputation {
            agent,
            count: summary.count,
            value: summary.value,
            timestamp: now,
        };
        self.sign_and_record(payload)
    }

    /// Emit a validation proof for one specific request.
    pub fn emit_validation_proof(
        &self,
        agent: AgentId,
        request_hash: RequestHash,
        now: u64,
    ) -> Result<ArtifactId, VerifyError> {
        let request = self
            .validations
            .request(&request_hash)
            .filter(|r| r.agent == agent)
            .ok_or(VerifyError::RequestNotFound)?;
        let payload = ProofPayload::Validation {
            agent,
            validator: request.validator,
            response: request.response,
            tag: request.tag,
            timestamp: now,
        };
        self.sign_and_record(payload)
    }

    pub fn take_events(&self) -> Vec<ProofEvent> {
        std::mem::take(&mut self.events.write())
    }

    fn sign_and_record(&self, payload: ProofPayload) -> Result<ArtifactId, VerifyError> {
        let agent = payload.agent();
        let kind = payload.kind();
        let artifact = self.signer.sign(&payload.encode())?;
        self.events.write().push(ProofEvent::ProofEmitted {
            artifact,
            agent,
            kind,
        });
        debug!(agent = %hex::encode(agent), kind = kind.as_u8(), "proof emitted");
        Ok(artifact)
    }
}

/// The single authoritative origin this verifier accepts proofs from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOrigin {
    pub chain: ChainId,
    pub emitter: Principal,
}

/// Cached identity fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProofEntry {
    pub owner: Principal,
    pub endpoint: String,
    pub proven_at: u64,
    pub verified: bool,
}

/// Cached reputation fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationProofEntry {
    pub count: u64,
    pub value: i128,
    pub proven_at: u64,
    pub verified: bool,
}

/// Cached validation fact for one `(agent, validator)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationProofEntry {
    pub response: ValidationResponse,
    pub tag: String,
    pub proven_at: u64,
    pub verified: bool,
}

#[derive(Default)]
struct VerifierState {
    identity: HashMap<AgentId, IdentityProofEntry>,
    reputation: HashMap<AgentId, ReputationProofEntry>,
    validation: HashMap<(AgentId, Principal), ValidationProofEntry>,
    events: Vec<ProofEvent>,
}

/// Validates extracted artifacts and caches the decoded facts.
pub struct ProofVerifier {
    origin: ProofOrigin,
    state: RwLock<VerifierState>,
}

impl ProofVerifier {
    pub fn new(origin: ProofOrigin) -> Self {
        Self {
            origin,
            state: RwLock::new(VerifierState::default()),
        }
    }

    pub fn origin(&self) -> ProofOrigin {
        self.origin
    }

    /// Verify and cache an identity proof; returns the proven agent id.
    pub fn verify_identity_proof(
        &self,
        artifact: &ExtractedArtifact,
    ) -> Result<AgentId, VerifyError> {
        let payload = self.check(artifact, ProofKind::Identity)?;
        let ProofPayload::Identity {
            agent,
            owner,
            endpoint,
            timestamp,
        } = payload
        else {
            unreachable!("kind checked above");
        };

        let mut state = self.state.write();
        state.identity.insert(
            agent,
            IdentityProofEntry {
                owner,
                endpoint,
                proven_at: timestamp,
                verified: true,
            },
        );
        state.events.push(ProofEvent::IdentityProofVerified { agent });
        Ok(agent)
    }

    /// Verify and cache a reputation proof; returns the proven agent id.
    pub fn verify_reputation_proof(
        &self,
        artifact: &ExtractedArtifact,
    ) -> Result<AgentId, VerifyError> {
        let payload = self.check(artifact, ProofKind::Reputation)?;
        let ProofPayload::Reputation {
            agent,
            count,
            value,
            timestamp,
        } = payload
        else {
            unreachable!("kind checked above");
        };

        let mut state = self.state.write();
        state.reputation.insert(
            agent,
            ReputationProofEntry {
                count,
                value,
                proven_at: timestamp,
                verified: true,
            },
        );
        state
            .events
            .push(ProofEvent::ReputationProofVerified { agent, count, value });
        Ok(agent)
    }

    /// Verify and cache a validation proof; returns the proven agent id.
    pub fn verify_validation_proof(
        &self,
        artifact: &ExtractedArtifact,
    ) -> Result<AgentId, VerifyError> {
        let payload = self.check(artifact, ProofKind::Validation)?;
        let ProofPayload::Validation {
            agent,
            validator,
            response,
            tag,
            timestamp,
        } = payload
        else {
            unreachable!("kind checked above");
        };

        let mut state = self.state.write();
        state.validation.insert(
            (agent, validator),
            ValidationProofEntry {
                response,
                tag,
                proven_at: timestamp,
                verified: true,
            },
        );
        state.events.push(ProofEvent::ValidationProofVerified {
            agent,
            validator,
            response,
        });
        Ok(agent)
    }

    pub fn identity(&self, agent: &AgentId) -> Option<IdentityProofEntry> {
        self.state.read().identity.get(agent).cloned()
    }

    pub fn reputation(&self, agent: &AgentId) -> Option<ReputationProofEntry> {
        self.state.read().reputation.get(agent).cloned()
    }

    pub fn validation(
        &self,
        agent: &AgentId,
        validator: &Principal,
    ) -> Option<ValidationProofEntry> {
        self.state
            .read()
            .validation
            .get(&(*agent, *validator))
            .cloned()
    }

    /// Whether a verified identity proof is cached for the agent.
    pub fn is_verified(&self, agent: &AgentId) -> bool {
        self.state
            .read()
            .identity
            .get(agent)
            .map(|entry| entry.verified)
            .unwrap_or(false)
    }

    /// Age of the cached identity proof relative to `now`.
    pub fn proof_age(&self, agent: &AgentId, now: u64) -> Option<u64> {
        self.state
            .read()
            .identity
            .get(agent)
            .map(|entry| now.saturating_sub(entry.proven_at))
    }

    /// Whether a verified reputation proof meets the given minimum score.
    pub fn meets_reputation_threshold(&self, agent: &AgentId, min_score: i128) -> bool {
        self.state
            .read()
            .reputation
            .get(agent)
            .map(|entry| entry.verified && entry.value >= min_score)
            .unwrap_or(false)
    }

    pub fn take_events(&self) -> Vec<ProofEvent> {
        std::mem::take(&mut self.state.write().events)
    }

    /// Common verification ladder: signature flag, decode (schema
    /// mismatch surfaces as its own error), proof type, then origin.
    fn check(
        &self,
        artifact: &ExtractedArtifact,
        expected: ProofKind,
    ) -> Result<ProofPayload, VerifyError> {
        if !artifact.valid_signature {
            return Err(VerifyError::InvalidOrUnsignedProof);
        }
        let payload = ProofPayload::decode(&artifact.payload).map_err(|e| match e {
            VerifyError::UnexpectedSchema { .. } => e,
            _ => VerifyError::InvalidOrUnsignedProof,
        })?;
        if payload.kind() != expected {
            return Err(VerifyError::UnexpectedProofType {
                expected: expected.as_u8(),
                found: payload.kind().as_u8(),
            });
        }
        if artifact.source_chain != self.origin.chain {
            return Err(VerifyError::WrongSourceChain {
                expected: self.origin.chain,
                found: artifact.source_chain,
            });
        }
        if artifact.origin_sender != self.origin.emitter {
            return Err(VerifyError::WrongOriginSender(artifact.origin_sender));
        }
        Ok(payload)
    }
}
