//! Per-owner coordinator over discovery, the store, selection and revocation.

use alloy::primitives::{Address, U256};

use crate::address::parse_account;
use crate::approval::{ApprovalKey, ApprovalRecord};
use crate::chain::{ChainReader, ChainWriter};
use crate::discovery::{ApprovalDiscovery, ScanReport};
use crate::revocation::{BatchRevoker, RevocationReport};
use crate::selection::{partition_by_standard, Selection};
use crate::store::{ApprovalStore, ScanTicket};
use crate::GuardError;

/// Holds the approval list and selection for one owner account.
///
/// The store is only ever mutated through the session, so a scan result and
/// a revocation batch can never be applied out of order without the store
/// noticing (see [`ApprovalStore::apply_scan`]).
pub struct ApprovalSession<'a, C> {
    chain: &'a C,
    owner: Address,
    discovery: ApprovalDiscovery,
    revoker: BatchRevoker,
    store: ApprovalStore,
    selection: Selection,
}

impl<'a, C: ChainReader> ApprovalSession<'a, C> {
    pub fn new(chain: &'a C, discovery: ApprovalDiscovery, owner: &str) -> Result<Self, GuardError> {
        Ok(Self {
            chain,
            owner: parse_account(owner)?,
            discovery,
            revoker: BatchRevoker::new(),
            store: ApprovalStore::new(),
            selection: Selection::new(),
        })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn chain(&self) -> &'a C {
        self.chain
    }

    pub fn discovery(&self) -> &ApprovalDiscovery {
        &self.discovery
    }

    pub fn store(&self) -> &ApprovalStore {
        &self.store
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn records(&self) -> &[ApprovalRecord] {
        self.store.records()
    }

    /// Switch to another owner account, discarding all known approvals.
    pub fn set_owner(&mut self, owner: &str) -> Result<(), GuardError> {
        self.owner = parse_account(owner)?;
        self.store.set_all(Vec::new());
        self.selection.clear();
        Ok(())
    }

    /// Run a full discovery scan and replace the approval list with its result.
    pub async fn refresh(&mut self) -> Result<ScanReport, GuardError> {
        let ticket = self.begin_scan();
        let report = self
            .discovery
            .scan(self.chain, &self.owner.to_string())
            .await?;
        self.apply_scan(ticket, report.records.clone()).await;
        Ok(report)
    }

    /// Mark the start of a scan whose result is applied later with
    /// [`ApprovalSession::apply_scan`].
    pub fn begin_scan(&self) -> ScanTicket {
        self.store.begin_scan()
    }

    /// Apply a scan started at `ticket`.
    ///
    /// Records revoked after the ticket was issued are re-read from the chain
    /// and only kept if still active. Selected keys that disappeared are
    /// dropped from the selection.
    pub async fn apply_scan(&mut self, ticket: ScanTicket, records: Vec<ApprovalRecord>) {
        let withheld = self.store.apply_scan(ticket, records);
        for record in withheld {
            let key = record.key();
            match self.discovery.probe_key(self.chain, self.owner, &key).await {
                Ok(Some(live)) => {
                    tracing::info!(key = %key, "approval re-granted after revocation");
                    self.store.upsert(live);
                }
                Ok(None) => tracing::debug!(key = %key, "revoked approval confirmed gone"),
                Err(e) => tracing::warn!(
                    key = %key,
                    error = %e,
                    "re-validation failed, keeping approval out of the list"
                ),
            }
        }

        let dropped = self.selection.retain_present(&self.store);
        if dropped > 0 {
            tracing::debug!(dropped, "selection pruned after scan");
        }
    }

    /// Check one ERC-721 token for a per-token approval and record it if found.
    pub async fn probe_token(
        &mut self,
        contract: &str,
        token_id: U256,
    ) -> Result<Option<ApprovalRecord>, GuardError> {
        let found = self
            .discovery
            .probe_token(self.chain, &self.owner.to_string(), contract, token_id)
            .await?;
        if let Some(record) = &found {
            self.store.upsert(record.clone());
        }
        Ok(found)
    }

    pub fn select(&mut self, key: ApprovalKey) -> bool {
        self.selection.select(&self.store, key)
    }

    pub fn deselect(&mut self, key: &ApprovalKey) -> bool {
        self.selection.deselect(key)
    }

    pub fn select_all(&mut self) {
        self.selection.select_all(&self.store);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }
}

impl<C: ChainWriter> ApprovalSession<'_, C> {
    /// Revoke the selected approvals.
    pub async fn revoke_selected(&mut self) -> Result<Vec<RevocationReport>, GuardError> {
        self.selection.retain_present(&self.store);
        let records = self.selection.resolve(&self.store);
        self.revoke(records).await
    }

    /// Revoke every known approval.
    pub async fn revoke_all(&mut self) -> Result<Vec<RevocationReport>, GuardError> {
        let records = self.store.snapshot();
        self.revoke(records).await
    }

    /// Revoke `records`, one batch per token standard.
    ///
    /// Revoked keys leave both the store and the selection as soon as their
    /// batch completes. Failed and pending keys stay selected for a retry.
    ///
    /// Fails as a whole only when the first batch cannot start. If a later
    /// batch cannot start, it and every batch after it are reported as failed
    /// alongside the outcomes already applied.
    pub async fn revoke(
        &mut self,
        records: Vec<ApprovalRecord>,
    ) -> Result<Vec<RevocationReport>, GuardError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let signer = self.chain.signer_address()?;
        if signer != self.owner {
            return Err(GuardError::ConfigError(format!(
                "signer {signer} does not own the approvals of {}",
                self.owner
            )));
        }

        let mut reports = Vec::new();
        let mut batches = partition_by_standard(records).into_iter();
        while let Some((standard, batch)) = batches.next() {
            let report = match self.revoker.revoke_batch(self.chain, &batch).await {
                Ok(report) => report,
                Err(e) if reports.is_empty() => return Err(e),
                Err(e) => {
                    // Earlier batches already changed the store; keep their outcomes
                    tracing::warn!(
                        standard = %standard,
                        error = %e,
                        "revocation stopped, remaining batches not attempted"
                    );
                    reports.push(RevocationReport::aborted(standard, &batch, &e));
                    reports.extend(
                        batches
                            .by_ref()
                            .map(|(standard, batch)| RevocationReport::aborted(standard, &batch, &e)),
                    );
                    break;
                }
            };
            for outcome in report.succeeded() {
                self.store.remove_by_key(&outcome.key);
                self.selection.deselect(&outcome.key);
            }
            tracing::info!(
                standard = %standard,
                revoked = report.succeeded().count(),
                failed = report.failed().count(),
                remaining = self.store.len(),
                "revocation batch applied"
            );
            reports.push(report);
        }
        Ok(reports)
    }
}
