//! Ledger configuration.
//!
//! Layered loading: built-in defaults, then an optional TOML file, then
//! a `PARLEY_*` environment overlay with `__` separating nested keys.
//! Principals appear in files as hex strings (with or without a `0x`
//! prefix) and are decoded on demand.

use crate::error::VerifyError;
use crate::logging::LoggingConfig;
use crate::push::ProofOrigin;
use crate::trust::{TrustTable, DEFAULT_RESPONSE_BUDGET};
use crate::types::{ChainId, Principal};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One trusted counterparty seeded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub chain_id: ChainId,
    /// Hex-encoded 20-byte counterparty address.
    pub counterparty: String,
}

/// Authoritative origin accepted by the push verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofOriginConfig {
    pub chain_id: ChainId,
    /// Hex-encoded 20-byte emitter address.
    pub emitter: String,
}

/// Full per-ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// This ledger's chain id.
    pub chain_id: ChainId,
    /// Hex-encoded administrator principal (trust-table writer).
    pub administrator: String,
    /// Hex-encoded principal of the trusted message transport.
    pub transport: String,
    /// Resource budget attached to outbound response messages.
    #[serde(default = "default_response_budget")]
    pub response_budget: u64,
    /// Trusted counterparties, one per remote chain.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    /// Authoritative proof origin, when this ledger verifies pushed proofs.
    #[serde(default)]
    pub proof_origin: Option<ProofOriginConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_response_budget() -> u64 {
    DEFAULT_RESPONSE_BUDGET
}

impl LedgerConfig {
    /// Load from an optional TOML file plus the PARLEY_* environment
    /// overlay.
    pub fn load(path: Option<&Path>) -> Result<Self, VerifyError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }
        builder = builder.add_source(
            Environment::with_prefix("PARLEY")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| VerifyError::ConfigError(e.to_string()))
    }

    /// Parse directly from a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, VerifyError> {
        toml::from_str(raw).map_err(|e| VerifyError::ConfigError(e.to_string()))
    }

    pub fn administrator(&self) -> Result<Principal, VerifyError> {
        parse_principal(&self.administrator)
    }

    pub fn transport(&self) -> Result<Principal, VerifyError> {
        parse_principal(&self.transport)
    }

    /// Build the trust table this configuration describes.
    pub fn build_trust_table(&self) -> Result<TrustTable, VerifyError> {
        let administrator = self.administrator()?;
        let table = TrustTable::new(administrator);
        for peer in &self.peers {
            table.set_counterparty(administrator, peer.chain_id, parse_principal(&peer.counterparty)?)?;
        }
        table.set_response_budget(administrator, self.response_budget)?;
        Ok(table)
    }

    /// The configured authoritative proof origin, if any.
    pub fn proof_origin(&self) -> Result<Option<ProofOrigin>, VerifyError> {
        self.proof_origin
            .as_ref()
            .map(|origin| {
                Ok(ProofOrigin {
                    chain: origin.chain_id,
                    emitter: parse_principal(&origin.emitter)?,
                })
            })
            .transpose()
    }
}

/// Decode a hex principal, tolerating a 0x prefix.
pub fn parse_principal(raw: &str) -> Result<Principal, VerifyError> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(stripped)
        .map_err(|e| VerifyError::ConfigError(format!("invalid principal '{raw}': {e}")))?;
    bytes.as_slice().try_into().map_err(|_| {
        VerifyError::ConfigError(format!(
            "invalid principal '{raw}': expected 20 bytes, got {}",
            bytes.len()
        ))
    })
}
