/// Chain ID of a local Hardhat node.
pub const HARDHAT_CHAIN_ID: u64 = 31337;

/// Network key used when no `NETWORK` is configured.
pub const DEFAULT_NETWORK: &str = "hardhat";

/// Default JSON-RPC endpoint (local Hardhat node).
pub const RPC_URL: &str = "http://127.0.0.1:8545";

/// A read probe slower than this counts as a failed probe.
pub const PROBE_TIMEOUT_SECS: u64 = 10;

/// Upper bound on discovery reads in flight at once.
pub const MAX_CONCURRENT_PROBES: usize = 8;

/// Receipt wait before giving up and reporting the transaction as pending.
pub const RECEIPT_TIMEOUT_SECS: u64 = 120;

/// Decimals assumed for an ERC-20 whose `decimals()` cannot be read.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Largest decimals value that still fits a U256 power of ten.
pub const MAX_TOKEN_DECIMALS: u8 = 77;

/// Value-at-risk label for an unlimited ERC-20 allowance.
pub const UNLIMITED_LABEL: &str = "Unlimited";

/// Value-at-risk label for an ERC-721 operator approval.
pub const ALL_NFTS_LABEL: &str = "All NFTs";

/// Value-at-risk label for an ERC-1155 operator approval.
pub const ALL_ITEMS_LABEL: &str = "All Items";
