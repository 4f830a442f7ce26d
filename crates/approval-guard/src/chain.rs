//! Chain read/write capability consumed by the discovery and revocation engines.
//!
//! [`AlloyChain`] implements both traits over a JSON-RPC provider. Tests use
//! `MockChain` from the `testing` module (`testing` feature).

use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{PendingTransactionBuilder, Provider};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};

use crate::constants::RECEIPT_TIMEOUT_SECS;
use crate::GuardError;

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReceipt {
    pub transaction_hash: TxHash,
    pub success: bool,
    pub gas_used: u64,
}

/// Read-only contract access.
pub trait ChainReader: Send + Sync {
    /// Execute a read-only call (`eth_call`) and return the raw return data.
    fn call(
        &self,
        to: Address,
        data: Bytes,
    ) -> impl std::future::Future<Output = Result<Bytes, GuardError>> + Send;

    /// Latest block number. Used as the reachability check for the provider.
    fn block_number(&self) -> impl std::future::Future<Output = Result<u64, GuardError>> + Send;
}

/// Transaction submission from a single signer.
///
/// Implementations are not expected to manage nonces across concurrent
/// submissions; callers submit one transaction at a time.
pub trait ChainWriter: ChainReader {
    /// Address transactions are sent from.
    fn signer_address(&self) -> Result<Address, GuardError>;

    /// Sign and broadcast a transaction calling `to` with `data`.
    fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
    ) -> impl std::future::Future<Output = Result<TxHash, GuardError>> + Send;

    /// Wait for a receipt. `Ok(None)` means the caller stopped waiting and
    /// the transaction state is unknown.
    fn wait_for_receipt(
        &self,
        hash: TxHash,
    ) -> impl std::future::Future<Output = Result<Option<ChainReceipt>, GuardError>> + Send;
}

/// [`ChainReader`] and [`ChainWriter`] over an alloy provider.
///
/// For writes the provider must carry a wallet filler
/// (`ProviderBuilder::new().wallet(..)`) and the signer address must be set
/// with [`AlloyChain::with_signer`].
pub struct AlloyChain<P> {
    provider: P,
    signer: Option<Address>,
    receipt_timeout: Duration,
}

impl<P> AlloyChain<P> {
    /// Read-only chain access.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            signer: None,
            receipt_timeout: Duration::from_secs(RECEIPT_TIMEOUT_SECS),
        }
    }

    /// Enable writes from `signer` (must match the provider's wallet).
    pub fn with_signer(mut self, signer: Address) -> Self {
        self.signer = Some(signer);
        self
    }

    /// How long to wait for a receipt before reporting the transaction as pending.
    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> ChainReader for AlloyChain<P>
where
    P: Provider + Send + Sync,
{
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, GuardError> {
        let tx = TransactionRequest::default().with_to(to).with_input(data);
        self.provider
            .call(tx)
            .await
            .map_err(|e| GuardError::ChainError(format!("eth_call to {to} failed: {e}")))
    }

    async fn block_number(&self) -> Result<u64, GuardError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| GuardError::ProviderUnavailable(format!("block number failed: {e}")))
    }
}

impl<P> ChainWriter for AlloyChain<P>
where
    P: Provider + Send + Sync,
{
    fn signer_address(&self) -> Result<Address, GuardError> {
        self.signer
            .ok_or_else(|| GuardError::ConfigError("no signer configured for writes".to_string()))
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<TxHash, GuardError> {
        let from = self.signer_address()?;
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(data);
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| GuardError::ChainError(format!("send to {to} failed: {e}")))?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<Option<ChainReceipt>, GuardError> {
        let pending = PendingTransactionBuilder::new(self.provider.root().clone(), hash);
        receipt_within(hash, self.receipt_timeout, pending.get_receipt()).await
    }
}

/// Bound a receipt wait by `timeout`. Elapsing maps to `Ok(None)`.
async fn receipt_within<F, E>(
    hash: TxHash,
    timeout: Duration,
    receipt: F,
) -> Result<Option<ChainReceipt>, GuardError>
where
    F: std::future::Future<Output = Result<TransactionReceipt, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(timeout, receipt).await {
        Ok(Ok(receipt)) => Ok(Some(ChainReceipt {
            transaction_hash: receipt.transaction_hash,
            success: receipt.status(),
            gas_used: receipt.gas_used,
        })),
        Ok(Err(e)) => Err(GuardError::ChainError(format!("receipt for {hash} failed: {e}"))),
        Err(_) => {
            tracing::warn!(
                tx = %hash,
                timeout = ?timeout,
                "stopped waiting for receipt, transaction state unknown"
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::providers::ProviderBuilder;

    fn unreachable_chain() -> AlloyChain<impl Provider> {
        let provider = ProviderBuilder::new().connect_http("http://localhost:1".parse().unwrap());
        AlloyChain::new(provider)
    }

    #[tokio::test]
    async fn test_unreachable_node_is_provider_unavailable() {
        let chain = unreachable_chain();
        let err = chain.block_number().await.unwrap_err();
        assert!(matches!(err, GuardError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_receipt_wait_elapses_to_none() {
        let never = std::future::pending::<Result<TransactionReceipt, String>>();
        let receipt = receipt_within(TxHash::ZERO, Duration::from_millis(20), never)
            .await
            .unwrap();
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn test_receipt_error_is_chain_error() {
        let failed = std::future::ready(Err::<TransactionReceipt, _>("connection reset"));
        let err = receipt_within(TxHash::ZERO, Duration::from_secs(1), failed)
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::ChainError(msg) if msg.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_receipt_wait_against_unreachable_node_is_bounded() {
        let chain = unreachable_chain().with_receipt_timeout(Duration::from_millis(500));
        let started = std::time::Instant::now();
        let result = chain.wait_for_receipt(TxHash::ZERO).await;
        assert!(matches!(result, Ok(None) | Err(GuardError::ChainError(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_read_only_chain_has_no_signer() {
        let chain = unreachable_chain();
        assert!(matches!(chain.signer_address(), Err(GuardError::ConfigError(_))));
        let err = chain
            .send_transaction(Address::ZERO, Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::ConfigError(_)));
    }
}
