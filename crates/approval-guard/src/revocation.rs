//! Batch revocation engine.
//!
//! Revocations run strictly one at a time: each transaction is awaited to
//! confirmation before the next is submitted, since the signer's nonce is
//! shared. A failed item is recorded and the batch continues.

use std::collections::HashSet;

use alloy::primitives::Address;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::approval::{ApprovalKey, ApprovalRecord, TokenStandard};
use crate::chain::ChainWriter;
use crate::token;
use crate::GuardError;

/// Final state of one revocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RevocationStatus {
    /// Transaction confirmed and the approval reads back as cleared.
    Revoked,
    /// Already cleared on chain; no transaction was sent.
    AlreadyRevoked,
    /// Rejected, reverted, or the approval still reads back as active.
    Failed,
    /// Broadcast, but confirmation was not observed in time.
    Pending,
}

/// Per-record result of a revocation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationOutcome {
    pub key: ApprovalKey,
    pub status: RevocationStatus,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Transaction hash, when one was submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
}

impl RevocationOutcome {
    fn done(key: ApprovalKey, status: RevocationStatus, transaction: Option<String>) -> Self {
        Self {
            key,
            status,
            succeeded: true,
            error: None,
            transaction,
        }
    }

    fn failed(
        key: ApprovalKey,
        status: RevocationStatus,
        error: GuardError,
        transaction: Option<String>,
    ) -> Self {
        Self {
            key,
            status,
            succeeded: false,
            error: Some(error.to_string()),
            transaction,
        }
    }
}

/// Outcomes of one single-standard batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard: Option<TokenStandard>,
    pub outcomes: Vec<RevocationOutcome>,
}

impl RevocationReport {
    pub fn outcome(&self, key: &ApprovalKey) -> Option<&RevocationOutcome> {
        self.outcomes.iter().find(|o| o.key == *key)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &RevocationOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &RevocationOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.succeeded)
    }

    /// Report for a batch that never started: every record failed with `error`
    /// and no transaction was sent.
    pub fn aborted(standard: TokenStandard, records: &[ApprovalRecord], error: &GuardError) -> Self {
        let mut seen = HashSet::new();
        let outcomes = records
            .iter()
            .map(ApprovalRecord::key)
            .filter(|key| seen.insert(key.clone()))
            .map(|key| RevocationOutcome {
                key,
                status: RevocationStatus::Failed,
                succeeded: false,
                error: Some(format!("batch not started: {error}")),
                transaction: None,
            })
            .collect();
        Self {
            standard: Some(standard),
            outcomes,
        }
    }
}

/// Executes revoke transactions for a single-standard list of approvals.
#[derive(Debug, Default)]
pub struct BatchRevoker {
    /// Held for the duration of a batch; a second concurrent batch is refused.
    in_flight: Mutex<()>,
}

impl BatchRevoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke every record in `records`, which must share one standard.
    ///
    /// Per-item failures are reported in the returned [`RevocationReport`].
    /// Fails as a whole only for a mixed-standard batch, a batch already in
    /// progress, a missing signer, or an unreachable provider.
    pub async fn revoke_batch<W: ChainWriter>(
        &self,
        writer: &W,
        records: &[ApprovalRecord],
    ) -> Result<RevocationReport, GuardError> {
        let _batch = self
            .in_flight
            .try_lock()
            .map_err(|_| GuardError::BatchInProgress)?;

        let Some(first) = records.first() else {
            return Ok(RevocationReport::default());
        };
        let standard = first.standard;
        if let Some(other) = records.iter().find(|r| r.standard != standard) {
            return Err(GuardError::MixedStandards(format!(
                "batch started with {standard} but contains {}",
                other.standard
            )));
        }

        let owner = writer.signer_address()?;
        writer.block_number().await.map_err(|e| match e {
            GuardError::ProviderUnavailable(msg) => GuardError::ProviderUnavailable(msg),
            other => GuardError::ProviderUnavailable(other.to_string()),
        })?;

        tracing::info!(
            standard = %standard,
            count = records.len(),
            owner = %owner,
            "starting revocation batch"
        );

        let mut seen = HashSet::new();
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let key = record.key();
            if !seen.insert(key.clone()) {
                continue;
            }
            let outcome = self.revoke_one(writer, owner, key).await;
            match &outcome.error {
                None => tracing::info!(
                    key = %outcome.key,
                    status = ?outcome.status,
                    tx = outcome.transaction.as_deref().unwrap_or("-"),
                    "approval revoked"
                ),
                Some(error) => tracing::warn!(
                    key = %outcome.key,
                    status = ?outcome.status,
                    error = %error,
                    "revocation failed, continuing batch"
                ),
            }
            outcomes.push(outcome);
        }

        Ok(RevocationReport {
            standard: Some(standard),
            outcomes,
        })
    }

    async fn revoke_one<W: ChainWriter>(
        &self,
        writer: &W,
        owner: Address,
        key: ApprovalKey,
    ) -> RevocationOutcome {
        match token::is_revoked(writer, owner, &key).await {
            Ok(true) => {
                return RevocationOutcome::done(key, RevocationStatus::AlreadyRevoked, None);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "pre-check failed, submitting anyway");
            }
        }

        let hash = match writer
            .send_transaction(key.contract, token::revoke_calldata(&key))
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                let error = GuardError::RevocationFailed(format!("submission failed: {e}"));
                return RevocationOutcome::failed(key, RevocationStatus::Failed, error, None);
            }
        };
        let transaction = Some(hash.to_string());

        match writer.wait_for_receipt(hash).await {
            Ok(Some(receipt)) if receipt.success => {}
            Ok(Some(_)) => {
                let error = GuardError::RevocationFailed("transaction reverted".to_string());
                return RevocationOutcome::failed(key, RevocationStatus::Failed, error, transaction);
            }
            Ok(None) => {
                let error = GuardError::RevocationFailed(
                    "confirmation not observed, transaction pending".to_string(),
                );
                return RevocationOutcome::failed(
                    key,
                    RevocationStatus::Pending,
                    error,
                    transaction,
                );
            }
            Err(e) => {
                let error = GuardError::RevocationFailed(format!("receipt unavailable: {e}"));
                return RevocationOutcome::failed(key, RevocationStatus::Pending, error, transaction);
            }
        }

        match token::is_revoked(writer, owner, &key).await {
            Ok(true) => RevocationOutcome::done(key, RevocationStatus::Revoked, transaction),
            Ok(false) => {
                let error = GuardError::RevocationFailed(
                    "confirmed, but approval still reads back as active".to_string(),
                );
                RevocationOutcome::failed(key, RevocationStatus::Failed, error, transaction)
            }
            Err(e) => {
                let error = GuardError::RevocationFailed(format!("post-check read failed: {e}"));
                RevocationOutcome::failed(key, RevocationStatus::Failed, error, transaction)
            }
        }
    }
}
