//! Approval discovery: probe every (target, spender) pair for the owner.
//!
//! - ERC-20: `allowance(owner, spender) > 0`
//! - ERC-721: `isApprovedForAll(owner, spender)` (operator-wide only; per-token
//!   approvals are checked on demand with [`ApprovalDiscovery::probe_token`])
//! - ERC-1155: `isApprovedForAll(owner, spender)`
//!
//! Individual probe failures are logged and excluded. Only an unreachable
//! provider aborts a scan.

use std::time::Duration;

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::address::parse_account;
use crate::approval::{ApprovalKey, ApprovalRecord, TokenStandard};
use crate::chain::ChainReader;
use crate::config::{EngineConfig, NetworkConfig, ScanTarget, SpenderCandidate};
use crate::metadata;
use crate::store::ApprovalStore;
use crate::token;
use crate::GuardError;

/// Summary of one discovery scan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub owner: Address,
    pub records: Vec<ApprovalRecord>,
    pub probes: usize,
    pub failed_probes: usize,
    pub scanned_at: DateTime<Utc>,
}

/// Discovery engine over a fixed list of scan targets and spender candidates.
#[derive(Debug, Clone)]
pub struct ApprovalDiscovery {
    targets: Vec<ScanTarget>,
    spenders: Vec<SpenderCandidate>,
    probe_timeout: Duration,
    max_concurrent: usize,
}

impl ApprovalDiscovery {
    pub fn new(targets: Vec<ScanTarget>, spenders: Vec<SpenderCandidate>) -> Self {
        let engine = EngineConfig::default();
        Self {
            targets,
            spenders,
            probe_timeout: engine.probe_timeout,
            max_concurrent: engine.max_concurrent_probes,
        }
    }

    pub fn from_network(network: &NetworkConfig) -> Self {
        Self::new(network.targets.clone(), network.spenders.clone())
    }

    pub fn with_engine_config(mut self, engine: &EngineConfig) -> Self {
        self.probe_timeout = engine.probe_timeout;
        self.max_concurrent = engine.max_concurrent_probes.max(1);
        self
    }

    pub fn targets(&self) -> &[ScanTarget] {
        &self.targets
    }

    pub fn spenders(&self) -> &[SpenderCandidate] {
        &self.spenders
    }

    /// Scan all configured targets for approvals granted by `owner`.
    pub async fn scan<R: ChainReader>(
        &self,
        reader: &R,
        owner: &str,
    ) -> Result<ScanReport, GuardError> {
        self.scan_with(reader, owner, &[]).await
    }

    /// Scan the configured targets plus `extra` targets (e.g. supplied by an
    /// indexing service). When the same pair is probed twice the last
    /// observation wins.
    pub async fn scan_with<R: ChainReader>(
        &self,
        reader: &R,
        owner: &str,
        extra: &[ScanTarget],
    ) -> Result<ScanReport, GuardError> {
        let owner = parse_account(owner)?;
        ensure_reachable(reader).await?;

        let targets: Vec<&ScanTarget> = self.targets.iter().chain(extra.iter()).collect();
        let pairs: Vec<(usize, &ScanTarget, &SpenderCandidate)> = targets
            .iter()
            .flat_map(|target| self.spenders.iter().map(move |spender| (*target, spender)))
            .enumerate()
            .map(|(seq, (target, spender))| (seq, target, spender))
            .collect();
        let probes = pairs.len();

        let mut results: Vec<(usize, Result<Option<ApprovalRecord>, GuardError>)> =
            stream::iter(pairs)
                .map(|(seq, target, spender)| async move {
                    (seq, self.probe_pair(reader, owner, target, spender.address).await)
                })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;
        // Restore probe order so "last observed wins" is deterministic
        results.sort_by_key(|(seq, _)| *seq);

        let mut failed_probes = 0;
        let mut found = ApprovalStore::new();
        for (_, result) in results {
            match result {
                Ok(Some(record)) => found.upsert(record),
                Ok(None) => {}
                Err(e) => {
                    failed_probes += 1;
                    tracing::debug!(owner = %owner, error = %e, "probe failed, treated as no approval");
                }
            }
        }

        let all_targets: Vec<ScanTarget> = targets.into_iter().cloned().collect();
        let mut records = found.into_records();
        metadata::enrich(reader, &mut records, &all_targets, &self.spenders, self.probe_timeout)
            .await;

        tracing::info!(
            owner = %owner,
            probes,
            failed_probes,
            approvals = records.len(),
            "approval scan complete"
        );

        Ok(ScanReport {
            owner,
            records,
            probes,
            failed_probes,
            scanned_at: Utc::now(),
        })
    }

    /// Check a single ERC-721 token for a per-token approval.
    ///
    /// Returns `Ok(None)` when `owner` does not hold the token, nothing is
    /// approved, or the probe fails.
    pub async fn probe_token<R: ChainReader>(
        &self,
        reader: &R,
        owner: &str,
        contract: &str,
        token_id: U256,
    ) -> Result<Option<ApprovalRecord>, GuardError> {
        let owner = parse_account(owner)?;
        let contract = parse_account(contract)?;
        ensure_reachable(reader).await?;

        let approved = match self
            .timed(token::owned_token_approval(reader, contract, owner, token_id))
            .await
        {
            Ok(Some(approved)) => approved,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(contract = %contract, token_id = %token_id, error = %e, "token probe failed");
                return Ok(None);
            }
        };

        let mut records = vec![ApprovalRecord::erc721_token(contract, approved, token_id)];
        metadata::enrich(reader, &mut records, &self.targets, &self.spenders, self.probe_timeout)
            .await;
        Ok(records.pop())
    }

    /// Re-read a single identity key. `Err(ProbeFailed)` when the read fails,
    /// so callers can tell "revoked" apart from "unknown".
    pub async fn probe_key<R: ChainReader>(
        &self,
        reader: &R,
        owner: Address,
        key: &ApprovalKey,
    ) -> Result<Option<ApprovalRecord>, GuardError> {
        let Some(record) = self.timed(token::current_state(reader, owner, key)).await? else {
            return Ok(None);
        };
        let mut records = vec![record];
        metadata::enrich(reader, &mut records, &self.targets, &self.spenders, self.probe_timeout)
            .await;
        Ok(records.pop())
    }

    async fn probe_pair<R: ChainReader>(
        &self,
        reader: &R,
        owner: Address,
        target: &ScanTarget,
        spender: Address,
    ) -> Result<Option<ApprovalRecord>, GuardError> {
        let contract = target.address;
        match target.standard {
            TokenStandard::Erc20 => {
                let amount = self
                    .timed(token::allowance(reader, contract, owner, spender))
                    .await?;
                Ok((!amount.is_zero()).then(|| ApprovalRecord::erc20(contract, spender, amount)))
            }
            TokenStandard::Erc721 => {
                let approved = self
                    .timed(token::is_approved_for_all(
                        reader,
                        TokenStandard::Erc721,
                        contract,
                        owner,
                        spender,
                    ))
                    .await?;
                Ok(approved.then(|| ApprovalRecord::erc721_operator(contract, spender)))
            }
            TokenStandard::Erc1155 => {
                let approved = self
                    .timed(token::is_approved_for_all(
                        reader,
                        TokenStandard::Erc1155,
                        contract,
                        owner,
                        spender,
                    ))
                    .await?;
                Ok(approved.then(|| ApprovalRecord::erc1155_operator(contract, spender)))
            }
        }
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, GuardError>
    where
        F: std::future::Future<Output = Result<T, GuardError>>,
    {
        tokio::time::timeout(self.probe_timeout, fut)
            .await
            .map_err(|_| {
                GuardError::ProbeFailed(format!("timed out after {:?}", self.probe_timeout))
            })?
    }
}

async fn ensure_reachable<R: ChainReader>(reader: &R) -> Result<u64, GuardError> {
    reader.block_number().await.map_err(|e| match e {
        GuardError::ProviderUnavailable(msg) => GuardError::ProviderUnavailable(msg),
        other => GuardError::ProviderUnavailable(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;
    use alloy::primitives::address;

    const OWNER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    const TOKEN: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");
    const NFT: Address = address!("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512");
    const MULTI: Address = address!("0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0");
    const ROUTER: Address = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    const MARKET: Address = address!("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");
    const THIRD: Address = address!("0x90F79bf6EB2c4f870365E785982E1f101E93b906");

    fn owner() -> String {
        OWNER.to_string()
    }

    fn discovery() -> ApprovalDiscovery {
        ApprovalDiscovery::new(
            vec![
                ScanTarget::new(TokenStandard::Erc20, TOKEN),
                ScanTarget::new(TokenStandard::Erc721, NFT),
                ScanTarget::new(TokenStandard::Erc1155, MULTI),
            ],
            vec![
                SpenderCandidate::new(ROUTER).with_label("Router"),
                SpenderCandidate::new(MARKET).with_label("Market"),
            ],
        )
    }

    fn chain() -> MockChain {
        let chain = MockChain::new(OWNER);
        chain.deploy_erc20(TOKEN, "USDC", 6);
        chain.deploy_erc721(NFT, "Punks");
        chain.deploy_erc1155(MULTI);
        chain
    }

    #[tokio::test]
    async fn test_scan_finds_all_standards() {
        let chain = chain();
        chain.set_allowance(TOKEN, OWNER, ROUTER, U256::from(1000u64));
        chain.set_operator(NFT, OWNER, MARKET, true);
        chain.set_operator(MULTI, OWNER, ROUTER, true);

        let report = discovery().scan(&chain, &owner()).await.unwrap();
        assert_eq!(report.probes, 6);
        assert_eq!(report.failed_probes, 0);
        assert_eq!(report.records.len(), 3);

        let erc20 = report
            .records
            .iter()
            .find(|r| r.standard == TokenStandard::Erc20)
            .unwrap();
        assert_eq!(erc20.amount, Some(U256::from(1000u64)));
        assert!(!erc20.is_unlimited);
        assert_eq!(erc20.value_at_risk, "0.001 USDC");
        assert_eq!(erc20.spender_label.as_deref(), Some("Router"));

        let nft = report
            .records
            .iter()
            .find(|r| r.standard == TokenStandard::Erc721)
            .unwrap();
        assert_eq!(nft.spender, MARKET);
        assert_eq!(nft.token_id, None);
        assert_eq!(nft.value_at_risk, "All NFTs");

        let multi = report
            .records
            .iter()
            .find(|r| r.standard == TokenStandard::Erc1155)
            .unwrap();
        assert_eq!(multi.value_at_risk, "All Items");
    }

    #[tokio::test]
    async fn test_unlimited_allowance() {
        let chain = chain();
        chain.set_allowance(TOKEN, OWNER, ROUTER, U256::MAX);

        let report = discovery().scan(&chain, &owner()).await.unwrap();
        assert_eq!(report.records.len(), 1);
        assert!(report.records[0].is_unlimited);
        assert_eq!(report.records[0].value_at_risk, "Unlimited");
    }

    #[tokio::test]
    async fn test_failed_probes_are_excluded() {
        let chain = chain();
        chain.set_allowance(TOKEN, OWNER, ROUTER, U256::from(5u64));
        chain.set_operator(NFT, OWNER, ROUTER, true);
        chain.fail_reads_from(NFT);

        let report = discovery().scan(&chain, &owner()).await.unwrap();
        assert_eq!(report.failed_probes, 2);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].standard, TokenStandard::Erc20);
    }

    #[tokio::test]
    async fn test_non_conforming_contract_is_probe_failure() {
        let chain = chain();
        // An address with no code returns empty data
        let eoa = address!("0x90F79bf6EB2c4f870365E785982E1f101E93b906");
        let discovery = ApprovalDiscovery::new(
            vec![ScanTarget::new(TokenStandard::Erc20, eoa)],
            vec![SpenderCandidate::new(ROUTER)],
        );

        let report = discovery.scan(&chain, &owner()).await.unwrap();
        assert_eq!(report.failed_probes, 1);
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_owner_rejected_before_network() {
        let chain = chain();
        chain.go_offline();

        let err = discovery().scan(&chain, "not-an-address").await.unwrap_err();
        assert!(matches!(err, GuardError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_offline_provider_aborts_scan() {
        let chain = chain();
        chain.go_offline();

        let err = discovery().scan(&chain, &owner()).await.unwrap_err();
        assert!(matches!(err, GuardError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_slow_probe_times_out() {
        let chain = chain();
        chain.set_allowance(TOKEN, OWNER, ROUTER, U256::from(5u64));
        chain.set_read_delay(Duration::from_millis(200));

        let engine = EngineConfig {
            probe_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let report = discovery()
            .with_engine_config(&engine)
            .scan(&chain, &owner())
            .await
            .unwrap();
        assert_eq!(report.failed_probes, 6);
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn test_extra_targets_last_observation_wins() {
        let chain = chain();
        chain.set_allowance(TOKEN, OWNER, ROUTER, U256::from(7u64));

        let extra = vec![ScanTarget::new(TokenStandard::Erc20, TOKEN).with_label("Indexed USDC")];
        let report = discovery().scan_with(&chain, &owner(), &extra).await.unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].asset_label, "Indexed USDC");
    }

    #[tokio::test]
    async fn test_probe_token() {
        let chain = chain();
        let id = U256::from(5u64);
        chain.mint_erc721(NFT, id, OWNER);
        chain.set_token_approval(NFT, id, MARKET);

        let found = discovery()
            .probe_token(&chain, &owner(), &NFT.to_string(), id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.spender, MARKET);
        assert_eq!(found.token_id, Some(id));
        assert_eq!(found.value_at_risk, "Token #5");

        let missing = discovery()
            .probe_token(&chain, &owner(), &NFT.to_string(), U256::from(6u64))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_probe_token_ignores_tokens_held_by_others() {
        let chain = chain();
        let id = U256::from(9u64);
        chain.mint_erc721(NFT, id, THIRD);
        chain.set_token_approval(NFT, id, MARKET);

        let found = discovery()
            .probe_token(&chain, &owner(), &NFT.to_string(), id)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_probe_key_drops_token_transferred_away() {
        let chain = chain();
        let id = U256::from(3u64);
        chain.mint_erc721(NFT, id, OWNER);
        chain.set_token_approval(NFT, id, MARKET);
        let key = ApprovalRecord::erc721_token(NFT, MARKET, id).key();
        assert!(discovery().probe_key(&chain, OWNER, &key).await.unwrap().is_some());

        // The new holder approves the same spender
        chain.transfer_erc721(NFT, id, THIRD);
        chain.set_token_approval(NFT, id, MARKET);
        assert!(discovery().probe_key(&chain, OWNER, &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_probe_key_reports_failure() {
        let chain = chain();
        chain.set_allowance(TOKEN, OWNER, ROUTER, U256::from(5u64));
        let key = ApprovalRecord::erc20(TOKEN, ROUTER, U256::from(5u64)).key();

        let live = discovery().probe_key(&chain, OWNER, &key).await.unwrap();
        assert_eq!(live.unwrap().amount, Some(U256::from(5u64)));

        chain.fail_reads_from(TOKEN);
        let err = discovery().probe_key(&chain, OWNER, &key).await.unwrap_err();
        assert!(matches!(err, GuardError::ProbeFailed(_)));
    }
}
