//! Error taxonomy for the verification protocols.
//!
//! Every error aborts the whole operation with no partial state change;
//! nothing is retried internally. Retry is the responsibility of whatever
//! drives the transport or resubmits a proof.

use crate::types::{ChainId, Principal};
use thiserror::Error;

/// Structured error identifying the exact violated precondition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The target chain has no trust-table entry.
    #[error("no trusted counterparty configured for chain {0}")]
    UnknownChain(ChainId),

    /// The claimed sender does not match the trust-table entry for its chain.
    #[error("counterparty {} is not authorized for chain {}", hex::encode(.sender), .chain)]
    UnauthorizedCounterparty { chain: ChainId, sender: Principal },

    /// Inbound handlers may only be invoked by the trusted transport.
    #[error("caller is not the trusted message transport")]
    OnlyTransport,

    /// No validation request recorded under the given hash.
    #[error("validation request not found")]
    RequestNotFound,

    /// A validation request with this hash already exists.
    #[error("validation request already exists")]
    RequestAlreadyExists,

    /// The validation request already carries a terminal response.
    #[error("validation request already responded")]
    RequestAlreadyResponded,

    /// Only the designated validator may respond to a request.
    #[error("caller is not the designated validator")]
    NotDesignatedValidator,

    /// The identity collaborator reports the agent does not exist.
    #[error("agent not found")]
    AgentNotFound,

    /// The artifact's signature was not validated, or its payload does not decode.
    #[error("proof is invalid or unsigned")]
    InvalidOrUnsignedProof,

    /// The payload's schema version does not match this verifier.
    #[error("unexpected proof schema version {found} (expected {expected})")]
    UnexpectedSchema { expected: u8, found: u8 },

    /// The decoded proof type does not match the entry point called.
    #[error("unexpected proof type {found} (expected {expected})")]
    UnexpectedProofType { expected: u8, found: u8 },

    /// The artifact's claimed source chain is not the authoritative one.
    #[error("proof originates from chain {found}, expected {expected}")]
    WrongSourceChain { expected: ChainId, found: ChainId },

    /// The artifact's origin sender is not the authoritative emitter.
    #[error("proof origin sender {} is not the authoritative emitter", hex::encode(.0))]
    WrongOriginSender(Principal),

    /// Shared configuration is writable only by the administrator.
    #[error("caller is not the administrator")]
    NotAdministrator,

    /// No feedback record at the given index for that author and agent.
    #[error("feedback record not found")]
    FeedbackNotFound,

    /// The feedback record was already revoked; revocation happens once.
    #[error("feedback record already revoked")]
    FeedbackAlreadyRevoked,

    /// A response must be terminal; `Pending` is not a valid response value.
    #[error("validation response must be a terminal value")]
    InvalidResponse,

    /// A wire message failed to decode.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Configuration could not be loaded or decoded.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The outbound message transport reported a failure.
    #[error("transport error: {0}")]
    Transport(String),
}
