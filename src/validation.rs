//! Validation Ledger
//!
//! Validation requests keyed by a caller-supplied unique hash, with a
//! per-agent index for enumeration. A request is created once and its
//! response transitions exactly once, from `Pending` to a terminal value,
//! only by the designated validator.

use crate::error::VerifyError;
use crate::types::{AgentId, Principal, RequestHash};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response state of a validation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationResponse {
    Pending,
    Approved,
    Rejected,
    Inconclusive,
}

impl ValidationResponse {
    /// Score contribution when aggregated: `Approved -> +1`,
    /// `Rejected -> -1`, `Inconclusive -> 0`.
    pub fn score(&self) -> i128 {
        match self {
            ValidationResponse::Approved => 1,
            ValidationResponse::Rejected => -1,
            ValidationResponse::Pending | ValidationResponse::Inconclusive => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ValidationResponse::Pending)
    }

    /// Wire tag for proof payloads.
    pub fn as_u8(&self) -> u8 {
        match self {
            ValidationResponse::Pending => 0,
            ValidationResponse::Approved => 1,
            ValidationResponse::Rejected => 2,
            ValidationResponse::Inconclusive => 3,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ValidationResponse::Pending),
            1 => Some(ValidationResponse::Approved),
            2 => Some(ValidationResponse::Rejected),
            3 => Some(ValidationResponse::Inconclusive),
            _ => None,
        }
    }
}

/// One validation request and, once responded, its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub requester: Principal,
    pub validator: Principal,
    pub agent: AgentId,
    pub request_ref: String,
    pub request_hash: RequestHash,
    pub response: ValidationResponse,
    pub response_ref: String,
    pub tag: String,
    pub timestamp: u64,
}

#[derive(Default)]
struct ValidationIndex {
    requests: HashMap<RequestHash, ValidationRequest>,
    by_agent: HashMap<AgentId, Vec<RequestHash>>,
}

/// In-memory validation request store, single-writer many-reader.
#[derive(Default)]
pub struct ValidationLedger {
    index: RwLock<ValidationIndex>,
}

impl ValidationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request. Duplicate hashes fail; the hash is the key.
    pub fn request_validation(
        &self,
        requester: Principal,
        validator: Principal,
        agent: AgentId,
        request_ref: impl Into<String>,
        request_hash: RequestHash,
        timestamp: u64,
    ) -> Result<(), VerifyError> {
        let mut index = self.index.write();
        if index.requests.contains_key(&request_hash) {
            return Err(VerifyError::RequestAlreadyExists);
        }
        index.requests.insert(
            request_hash,
            ValidationRequest {
                requester,
                validator,
                agent,
                request_ref: request_ref.into(),
                request_hash,
                response: ValidationResponse::Pending,
                response_ref: String::new(),
                tag: String::new(),
                timestamp,
            },
        );
        index.by_agent.entry(agent).or_default().push(request_hash);
        Ok(())
    }

    /// Record the validator's terminal response. Exactly-once: a second
    /// response for the same hash fails, whatever the caller.
    pub fn respond(
        &self,
        caller: Principal,
        request_hash: RequestHash,
        response: ValidationResponse,
        response_ref: impl Into<String>,
        tag: impl Into<String>,
        timestamp: u64,
    ) -> Result<(), VerifyError> {
        if !response.is_terminal() {
            return Err(VerifyError::InvalidResponse);
        }

        let mut index = self.index.write();
        let request = index
            .requests
            .get_mut(&request_hash)
            .ok_or(VerifyError::RequestNotFound)?;
        if request.validator != caller {
            return Err(VerifyError::NotDesignatedValidator);
        }
        if request.response.is_terminal() {
            return Err(VerifyError::RequestAlreadyResponded);
        }

        request.response = response;
        request.response_ref = response_ref.into();
        request.tag = tag.into();
        request.timestamp = timestamp;
        Ok(())
    }

    /// Full request by hash.
    pub fn request(&self, request_hash: &RequestHash) -> Option<ValidationRequest> {
        self.index.read().requests.get(request_hash).cloned()
    }

    /// Response state by hash (the `getValidationStatus` collaborator surface).
    pub fn status(&self, request_hash: &RequestHash) -> Option<ValidationResponse> {
        self.index
            .read()
            .requests
            .get(request_hash)
            .map(|r| r.response)
    }

    /// All requests recorded against an agent, in creation order.
    pub fn requests_for(&self, agent: &AgentId) -> Vec<ValidationRequest> {
        let index = self.index.read();
        index
            .by_agent
            .get(agent)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|h| index.requests.get(h).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}
