//! Token approval discovery and batch revocation for EVM accounts.
//!
//! Finds the ERC-20 allowances, ERC-721 approvals and ERC-1155 operator
//! approvals an account has granted, keeps them in a deduplicated store, and
//! revokes a selection of them one standard at a time.
//!
//! # Components
//!
//! - **Discovery** ([`ApprovalDiscovery`]) probes a fixed list of token
//!   contracts against a fixed list of spender candidates
//! - **Store** ([`ApprovalStore`]) holds the canonical approval list, one
//!   record per identity key
//! - **Revocation** ([`BatchRevoker`]) submits revoke transactions and
//!   verifies each one on chain
//! - **Session** ([`ApprovalSession`]) ties the three together for one owner
//!
//! # Quick example
//!
//! ```no_run
//! use alloy::providers::ProviderBuilder;
//! use approval_guard::{AlloyChain, ApprovalDiscovery, ApprovalSession, ScanConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), approval_guard::GuardError> {
//! let config = ScanConfig::builtin();
//! let network = config.network("hardhat")?;
//! let provider = ProviderBuilder::new().connect_http("http://127.0.0.1:8545".parse().unwrap());
//! let chain = AlloyChain::new(provider);
//!
//! let mut session = ApprovalSession::new(
//!     &chain,
//!     ApprovalDiscovery::from_network(network),
//!     "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
//! )?;
//! let report = session.refresh().await?;
//! for record in &report.records {
//!     println!("{} -> {}: {}", record.asset_label, record.spender, record.value_at_risk);
//! }
//! # Ok(())
//! # }
//! ```

// Core types
pub mod abi;
pub mod address;
pub mod approval;
pub mod constants;
pub mod error;

// Configuration and chain access
pub mod chain;
pub mod config;

// Engines
pub mod discovery;
pub mod metadata;
pub mod revocation;
pub mod selection;
pub mod session;
pub mod store;
pub mod token;

// In-memory chain for tests
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use approval::{ApprovalKey, ApprovalRecord, TokenStandard};
pub use chain::{AlloyChain, ChainReader, ChainReceipt, ChainWriter};
pub use config::{AppConfig, EngineConfig, NetworkConfig, ScanConfig, ScanTarget, SpenderCandidate};
pub use constants::*;
pub use discovery::{ApprovalDiscovery, ScanReport};
pub use error::GuardError;
pub use revocation::{BatchRevoker, RevocationOutcome, RevocationReport, RevocationStatus};
pub use selection::Selection;
pub use session::ApprovalSession;
pub use store::{ApprovalStore, ScanTicket};

pub type Result<T> = std::result::Result<T, GuardError>;
