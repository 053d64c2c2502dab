//! Trust Table
//!
//! Administrator-maintained mapping of chain id to counterparty address,
//! consulted by both directions of the pull protocol: who may query this
//! ledger, and whose responses this ledger accepts. Also carries the
//! resource budget attached to outbound response messages.
//!
//! Single-writer, many-reader: mutations are gated on an explicit
//! administrator check rather than any access-control inheritance.

use crate::error::VerifyError;
use crate::types::{ChainId, Principal};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

/// Default resource budget allotted to outbound response messages.
pub const DEFAULT_RESPONSE_BUDGET: u64 = 500_000;

struct TrustState {
    entries: HashMap<ChainId, Principal>,
    response_budget: u64,
}

/// Per-ledger table of trusted counterparties.
pub struct TrustTable {
    administrator: Principal,
    state: RwLock<TrustState>,
}

impl TrustTable {
    pub fn new(administrator: Principal) -> Self {
        Self {
            administrator,
            state: RwLock::new(TrustState {
                entries: HashMap::new(),
                response_budget: DEFAULT_RESPONSE_BUDGET,
            }),
        }
    }

    pub fn administrator(&self) -> Principal {
        self.administrator
    }

    /// Set or replace the trusted counterparty for a chain.
    pub fn set_counterparty(
        &self,
        caller: Principal,
        chain: ChainId,
        counterparty: Principal,
    ) -> Result<(), VerifyError> {
        self.ensure_administrator(caller)?;
        self.state.write().entries.insert(chain, counterparty);
        info!(
            chain,
            counterparty = %hex::encode(counterparty),
            "trusted counterparty set"
        );
        Ok(())
    }

    /// Set the resource budget attached to outbound response messages.
    pub fn set_response_budget(&self, caller: Principal, budget: u64) -> Result<(), VerifyError> {
        self.ensure_administrator(caller)?;
        self.state.write().response_budget = budget;
        info!(budget, "response budget set");
        Ok(())
    }

    pub fn counterparty(&self, chain: ChainId) -> Option<Principal> {
        self.state.read().entries.get(&chain).copied()
    }

    pub fn response_budget(&self) -> u64 {
        self.state.read().response_budget
    }

    fn ensure_administrator(&self, caller: Principal) -> Result<(), VerifyError> {
        if caller != self.administrator {
            return Err(VerifyError::NotAdministrator);
        }
        Ok(())
    }
}
