//! Best-effort label enrichment.
//!
//! Runs strictly after approvals have been determined. Lookup failures leave
//! the fallback label (truncated contract address) in place.

use std::collections::HashMap;
use std::time::Duration;

use alloy::primitives::Address;

use crate::approval::{ApprovalRecord, TokenStandard};
use crate::chain::ChainReader;
use crate::config::{ScanTarget, SpenderCandidate};
use crate::constants::DEFAULT_TOKEN_DECIMALS;
use crate::token;
use crate::GuardError;

/// Resolved display metadata for one contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMetadata {
    pub label: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

async fn lookup<T, F>(timeout: Duration, fut: F) -> Option<T>
where
    F: std::future::Future<Output = Result<T, GuardError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "metadata lookup failed");
            None
        }
        Err(_) => {
            tracing::debug!("metadata lookup timed out");
            None
        }
    }
}

/// Resolve metadata for `contract`, preferring static values from `target`.
pub async fn resolve<R: ChainReader>(
    reader: &R,
    standard: TokenStandard,
    contract: Address,
    target: Option<&ScanTarget>,
    timeout: Duration,
) -> TokenMetadata {
    let mut meta = TokenMetadata {
        label: target.and_then(|t| t.label.clone()),
        symbol: target.and_then(|t| t.symbol.clone()),
        decimals: target.and_then(|t| t.decimals),
    };

    match standard {
        TokenStandard::Erc20 => {
            if meta.symbol.is_none() {
                meta.symbol = lookup(timeout, token::symbol(reader, contract))
                    .await
                    .filter(|s| !s.trim().is_empty());
            }
            if meta.decimals.is_none() {
                meta.decimals = Some(
                    lookup(timeout, token::decimals(reader, contract))
                        .await
                        .unwrap_or(DEFAULT_TOKEN_DECIMALS),
                );
            }
        }
        TokenStandard::Erc721 | TokenStandard::Erc1155 => {
            if meta.label.is_none() {
                meta.label = lookup(timeout, token::name(reader, contract))
                    .await
                    .filter(|s| !s.trim().is_empty());
            }
        }
    }

    meta
}

/// Fill in asset and spender labels on freshly discovered records.
///
/// Each contract is resolved once per call.
pub async fn enrich<R: ChainReader>(
    reader: &R,
    records: &mut [ApprovalRecord],
    targets: &[ScanTarget],
    spenders: &[SpenderCandidate],
    timeout: Duration,
) {
    let mut cache: HashMap<Address, TokenMetadata> = HashMap::new();

    for record in records.iter_mut() {
        if !cache.contains_key(&record.contract) {
            let target = targets.iter().rev().find(|t| t.address == record.contract);
            let meta = resolve(reader, record.standard, record.contract, target, timeout).await;
            cache.insert(record.contract, meta);
        }
        if let Some(meta) = cache.get(&record.contract) {
            apply(record, meta);
        }

        if record.spender_label.is_none() {
            record.spender_label = spenders
                .iter()
                .find(|s| s.address == record.spender)
                .and_then(|s| s.label.clone());
        }
    }
}

/// Apply resolved metadata to a record. A static label wins over the symbol.
pub fn apply(record: &mut ApprovalRecord, meta: &TokenMetadata) {
    if record.standard == TokenStandard::Erc20 {
        record.set_token_metadata(meta.symbol.clone(), meta.decimals);
    }
    if let Some(label) = &meta.label {
        record.set_asset_label(label.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;
    use alloy::primitives::{address, U256};

    const TOKEN: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");
    const NFT: Address = address!("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512");
    const SPENDER: Address = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    const OWNER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    fn timeout() -> Duration {
        Duration::from_secs(1)
    }

    #[tokio::test]
    async fn test_erc20_lookup() {
        let chain = MockChain::new(OWNER);
        chain.deploy_erc20(TOKEN, "USDC", 6);

        let mut records = vec![ApprovalRecord::erc20(TOKEN, SPENDER, U256::from(1000u64))];
        let spenders = vec![SpenderCandidate::new(SPENDER).with_label("Router")];
        enrich(&chain, &mut records, &[], &spenders, timeout()).await;

        assert_eq!(records[0].asset_label, "USDC");
        assert_eq!(records[0].value_at_risk, "0.001 USDC");
        assert_eq!(records[0].spender_label.as_deref(), Some("Router"));
    }

    #[tokio::test]
    async fn test_static_metadata_skips_lookup() {
        let chain = MockChain::new(OWNER);
        chain.deploy_erc20(TOKEN, "ONCHAIN", 18);
        chain.fail_reads_from(TOKEN);

        let target = ScanTarget::new(TokenStandard::Erc20, TOKEN).with_token_metadata("USDC", 6);
        let meta = resolve(&chain, TokenStandard::Erc20, TOKEN, Some(&target), timeout()).await;
        assert_eq!(meta.symbol.as_deref(), Some("USDC"));
        assert_eq!(meta.decimals, Some(6));
    }

    #[tokio::test]
    async fn test_failed_lookup_falls_back() {
        let chain = MockChain::new(OWNER);
        chain.deploy_erc721(NFT, "Punks");
        chain.fail_reads_from(NFT);

        let mut records = vec![ApprovalRecord::erc721_operator(NFT, SPENDER)];
        enrich(&chain, &mut records, &[], &[], timeout()).await;

        assert_eq!(records[0].asset_label, "0xe7f1...0512");
        assert_eq!(records[0].value_at_risk, "All NFTs");
        assert!(records[0].spender_label.is_none());
    }

    #[tokio::test]
    async fn test_erc20_unknown_decimals_default() {
        let chain = MockChain::new(OWNER);
        chain.fail_reads_from(TOKEN);

        let meta = resolve(&chain, TokenStandard::Erc20, TOKEN, None, timeout()).await;
        assert_eq!(meta.symbol, None);
        assert_eq!(meta.decimals, Some(DEFAULT_TOKEN_DECIMALS));
    }

    #[tokio::test]
    async fn test_nft_name_lookup() {
        let chain = MockChain::new(OWNER);
        chain.deploy_erc721(NFT, "Punks");

        let mut records = vec![ApprovalRecord::erc721_operator(NFT, SPENDER)];
        enrich(&chain, &mut records, &[], &[], timeout()).await;
        assert_eq!(records[0].asset_label, "Punks");
    }
}
