//! Core types for the cross-ledger verification protocol.

use serde::{Deserialize, Serialize};

/// AgentId: 256-bit identifier of a registered agent, carried verbatim on the wire
pub type AgentId = [u8; 32];

/// Principal: address-like identifier for an author, validator, owner or requester
pub type Principal = [u8; 20];

/// ChainId: identifier of an independent ledger
pub type ChainId = u64;

/// CorrelationId: derived hash uniquely identifying one in-flight cross-chain query
pub type CorrelationId = [u8; 32];

/// RequestHash: caller-supplied unique key of a validation request
pub type RequestHash = [u8; 32];

/// ArtifactId: identifier returned by the external signing service for an emitted proof
pub type ArtifactId = [u8; 32];

/// The all-zero principal, used where a result carries "no owner".
pub const ZERO_PRINCIPAL: Principal = [0u8; 20];

/// Aggregated view over a filtered record set.
///
/// Ephemeral: recomputed on every query, never persisted. `value` is the
/// sum of raw mantissas and `scale` the maximum scale seen among the
/// contributing records; the pair is not rescaled to a common base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub count: u64,
    pub value: i128,
    pub scale: u8,
}

impl Summary {
    /// The empty aggregate: no records contributed.
    pub const ZERO: Summary = Summary {
        count: 0,
        value: 0,
        scale: 0,
    };

    /// Fold one record's score into the aggregate.
    pub fn accumulate(&mut self, mantissa: i128, scale: u8) {
        self.count += 1;
        self.value += mantissa;
        self.scale = self.scale.max(scale);
    }
}
