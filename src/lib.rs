//! Parley: Cross-Ledger Agent Verification
//!
//! Lets independently-operated ledgers exchange verifiable facts about
//! registered autonomous agents without replicating each other's state.
//! A ledger is authoritative for the agents registered on it; everyone
//! else either round-trips a query to it (pull protocol) or accepts a
//! signed, self-contained proof it previously published (push protocol).

pub mod config;
pub mod error;
pub mod feedback;
pub mod identity;
pub mod logging;
pub mod pull;
pub mod push;
pub mod summary;
pub mod trust;
pub mod types;
pub mod validation;
pub mod wire;

pub use error::VerifyError;
pub use types::{AgentId, ArtifactId, ChainId, CorrelationId, Principal, RequestHash, Summary};
