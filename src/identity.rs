//! Agent identity collaborator.
//!
//! The agent-identity ledger itself (ownership, metadata, registration
//! rules) is external to this subsystem; the protocols consume it through
//! the `IdentityLookup` port. `AgentDirectory` is the in-memory
//! implementation used by single-process deployments and tests.

use crate::types::{AgentId, Principal};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Read-only identity surface consumed by the responder and emitter.
pub trait IdentityLookup: Send + Sync {
    fn agent_exists(&self, agent: &AgentId) -> bool;
    fn owner_of(&self, agent: &AgentId) -> Option<Principal>;
    fn endpoint_of(&self, agent: &AgentId) -> Option<String>;
}

/// Identity facts held for one registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub owner: Principal,
    pub endpoint: String,
}

/// In-memory agent directory.
#[derive(Default)]
pub struct AgentDirectory {
    agents: RwLock<HashMap<AgentId, AgentProfile>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent or overwrite its profile.
    pub fn register(&self, agent: AgentId, owner: Principal, endpoint: impl Into<String>) {
        self.agents.write().insert(
            agent,
            AgentProfile {
                owner,
                endpoint: endpoint.into(),
            },
        );
    }

    pub fn profile(&self, agent: &AgentId) -> Option<AgentProfile> {
        self.agents.read().get(agent).cloned()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

impl IdentityLookup for AgentDirectory {
    fn agent_exists(&self, agent: &AgentId) -> bool {
        self.agents.read().contains_key(agent)
    }

    fn owner_of(&self, agent: &AgentId) -> Option<Principal> {
        self.agents.read().get(agent).map(|p| p.owner)
    }

    fn endpoint_of(&self, agent: &AgentId) -> Option<String> {
        self.agents.read().get(agent).map(|p| p.endpoint.clone())
    }
}
