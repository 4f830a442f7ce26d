//! Scan configuration and runtime settings.
//!
//! Scan targets and spender candidates live in one [`ScanConfig`] keyed by
//! network identifier and validated once at load. Runtime settings come from
//! the environment (see [`AppConfig::from_env`]).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::address::deserialize_address;
use crate::approval::TokenStandard;
use crate::constants::{
    DEFAULT_NETWORK, HARDHAT_CHAIN_ID, MAX_CONCURRENT_PROBES, MAX_TOKEN_DECIMALS,
    PROBE_TIMEOUT_SECS, RECEIPT_TIMEOUT_SECS, RPC_URL,
};
use crate::GuardError;

/// A contract to probe, with the standard it is expected to implement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanTarget {
    pub standard: TokenStandard,
    #[serde(deserialize_with = "deserialize_address")]
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Static ERC-20 symbol; skips the `symbol()` lookup when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Static ERC-20 decimals; skips the `decimals()` lookup when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

impl ScanTarget {
    pub fn new(standard: TokenStandard, address: Address) -> Self {
        Self {
            standard,
            address,
            label: None,
            symbol: None,
            decimals: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_token_metadata(mut self, symbol: impl Into<String>, decimals: u8) -> Self {
        self.symbol = Some(symbol.into());
        self.decimals = Some(decimals);
        self
    }
}

/// An address probed as a potential approved spender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpenderCandidate {
    #[serde(deserialize_with = "deserialize_address")]
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SpenderCandidate {
    pub fn new(address: Address) -> Self {
        Self { address, label: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Probe coordinates for a single network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    pub targets: Vec<ScanTarget>,
    pub spenders: Vec<SpenderCandidate>,
}

impl NetworkConfig {
    fn validate(&self, id: &str) -> Result<(), GuardError> {
        if self.targets.is_empty() {
            return Err(GuardError::ConfigError(format!("network {id}: no scan targets")));
        }
        if self.spenders.is_empty() {
            return Err(GuardError::ConfigError(format!(
                "network {id}: no spender candidates"
            )));
        }

        let mut seen_targets = HashSet::new();
        for target in &self.targets {
            if target.address == Address::ZERO {
                return Err(GuardError::ConfigError(format!(
                    "network {id}: zero address in scan targets"
                )));
            }
            if !seen_targets.insert(target.address) {
                return Err(GuardError::ConfigError(format!(
                    "network {id}: duplicate scan target {}",
                    target.address
                )));
            }
            if target.decimals.is_some_and(|d| d > MAX_TOKEN_DECIMALS) {
                return Err(GuardError::ConfigError(format!(
                    "network {id}: decimals for {} exceed {MAX_TOKEN_DECIMALS}",
                    target.address
                )));
            }
            if target.standard != TokenStandard::Erc20
                && (target.symbol.is_some() || target.decimals.is_some())
            {
                return Err(GuardError::ConfigError(format!(
                    "network {id}: symbol/decimals only apply to ERC20 targets ({})",
                    target.address
                )));
            }
        }

        let mut seen_spenders = HashSet::new();
        for spender in &self.spenders {
            if spender.address == Address::ZERO {
                return Err(GuardError::ConfigError(format!(
                    "network {id}: zero address in spender candidates"
                )));
            }
            if !seen_spenders.insert(spender.address) {
                return Err(GuardError::ConfigError(format!(
                    "network {id}: duplicate spender {}",
                    spender.address
                )));
            }
        }
        Ok(())
    }
}

/// All known networks and their probe coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl ScanConfig {
    /// Parse and validate a JSON scan configuration.
    pub fn from_json(json: &str) -> Result<Self, GuardError> {
        let config: ScanConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON scan configuration file.
    pub fn load(path: &Path) -> Result<Self, GuardError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            GuardError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), GuardError> {
        if self.networks.is_empty() {
            return Err(GuardError::ConfigError("no networks configured".to_string()));
        }
        for (id, network) in &self.networks {
            network.validate(id)?;
        }
        Ok(())
    }

    pub fn network(&self, id: &str) -> Result<&NetworkConfig, GuardError> {
        self.networks.get(id).ok_or_else(|| {
            GuardError::ConfigError(format!(
                "unknown network {id:?} (known: {})",
                self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Default deployment addresses of the fixture contracts on a fresh local
    /// Hardhat node, probed against Hardhat accounts #1 and #2.
    pub fn builtin() -> Self {
        let hardhat = NetworkConfig {
            chain_id: HARDHAT_CHAIN_ID,
            rpc_url: Some(RPC_URL.to_string()),
            targets: vec![
                ScanTarget::new(
                    TokenStandard::Erc20,
                    address!("0x5FbDB2315678afecb367f032d93F642f64180aa3"),
                )
                .with_label("Test Token"),
                ScanTarget::new(
                    TokenStandard::Erc721,
                    address!("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"),
                )
                .with_label("Test NFT"),
                ScanTarget::new(
                    TokenStandard::Erc1155,
                    address!("0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0"),
                )
                .with_label("Test Multi Token"),
            ],
            spenders: vec![
                SpenderCandidate::new(address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8"))
                    .with_label("Hardhat #1"),
                SpenderCandidate::new(address!("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC"))
                    .with_label("Hardhat #2"),
            ],
        };

        let mut networks = BTreeMap::new();
        networks.insert(DEFAULT_NETWORK.to_string(), hardhat);
        Self { networks }
    }
}

/// Tuning knobs for the discovery and revocation engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub probe_timeout: Duration,
    pub max_concurrent_probes: usize,
    pub receipt_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
            max_concurrent_probes: MAX_CONCURRENT_PROBES,
            receipt_timeout: Duration::from_secs(RECEIPT_TIMEOUT_SECS),
        }
    }
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rpc_url: Option<String>,
    pub network: String,
    pub scan_config_path: Option<PathBuf>,
    pub owner: Option<String>,
    pub private_key: Option<String>,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Read `RPC_URL`, `NETWORK`, `SCAN_CONFIG`, `OWNER_ADDRESS`, `PRIVATE_KEY`,
    /// `PROBE_TIMEOUT_SECS`, `MAX_CONCURRENT_PROBES` and `RECEIPT_TIMEOUT_SECS`.
    /// Unparseable or zero numbers fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = EngineConfig::default();

        let probe_timeout = non_empty("PROBE_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.probe_timeout);

        let max_concurrent_probes = non_empty("MAX_CONCURRENT_PROBES")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_concurrent_probes);

        let receipt_timeout = non_empty("RECEIPT_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.receipt_timeout);

        Self {
            rpc_url: non_empty("RPC_URL"),
            network: non_empty("NETWORK").unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
            scan_config_path: non_empty("SCAN_CONFIG").map(PathBuf::from),
            owner: non_empty("OWNER_ADDRESS"),
            private_key: non_empty("PRIVATE_KEY"),
            engine: EngineConfig {
                probe_timeout,
                max_concurrent_probes,
                receipt_timeout,
            },
        }
    }

    /// Load the scan configuration file, or the built-in one when unset.
    pub fn scan_config(&self) -> Result<ScanConfig, GuardError> {
        match &self.scan_config_path {
            Some(path) => ScanConfig::load(path),
            None => Ok(ScanConfig::builtin()),
        }
    }

    /// RPC URL: `RPC_URL`, else the network's configured URL, else the local default.
    pub fn resolve_rpc_url(&self, network: &NetworkConfig) -> String {
        self.rpc_url
            .clone()
            .or_else(|| network.rpc_url.clone())
            .unwrap_or_else(|| RPC_URL.to_string())
    }
}
