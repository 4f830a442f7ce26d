use std::collections::HashMap;

use crate::approval::{ApprovalKey, ApprovalRecord};
use crate::GuardError;

/// Snapshot of the store revision taken when a discovery scan starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTicket {
    revision: u64,
}

/// Canonical, deduplicated list of known approvals.
///
/// No two records share an [`ApprovalKey`], and no record with a zero or
/// false approval state is ever held. Revocations removed with
/// [`ApprovalStore::remove_by_key`] are remembered so that a scan started
/// before the revocation cannot silently reintroduce them.
#[derive(Debug, Default)]
pub struct ApprovalStore {
    records: Vec<ApprovalRecord>,
    revision: u64,
    /// Key -> revision at which it was removed by a confirmed revocation.
    revoked: HashMap<ApprovalKey, u64>,
}

impl ApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ApprovalRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ApprovalRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, key: &ApprovalKey) -> Option<&ApprovalRecord> {
        self.position(key).map(|i| &self.records[i])
    }

    pub fn contains(&self, key: &ApprovalKey) -> bool {
        self.position(key).is_some()
    }

    fn position(&self, key: &ApprovalKey) -> Option<usize> {
        self.records.iter().position(|r| r.key() == *key)
    }

    /// Replace the whole list. Duplicate keys collapse to the last occurrence
    /// (kept at the first occurrence's position); inactive records are dropped.
    pub fn set_all(&mut self, records: Vec<ApprovalRecord>) {
        self.records.clear();
        self.revoked.clear();
        for record in records {
            self.upsert(record);
        }
        self.revision += 1;
    }

    /// Replace in place when the key exists, otherwise append. An inactive
    /// record removes the existing entry instead.
    pub fn upsert(&mut self, record: ApprovalRecord) {
        let key = record.key();
        match (self.position(&key), record.is_active()) {
            (Some(i), true) => self.records[i] = record,
            (None, true) => self.records.push(record),
            (Some(i), false) => {
                self.records.remove(i);
            }
            (None, false) => {
                tracing::debug!(key = %key, "ignoring inactive approval record");
                return;
            }
        }
        self.revision += 1;
    }

    /// Drop the record for `key` after a confirmed revocation.
    pub fn remove_by_key(&mut self, key: &ApprovalKey) -> Option<ApprovalRecord> {
        self.revision += 1;
        self.revoked.insert(key.clone(), self.revision);
        self.position(key).map(|i| self.records.remove(i))
    }

    /// Mark the start of a discovery scan whose result will be applied with
    /// [`ApprovalStore::apply_scan`].
    pub fn begin_scan(&self) -> ScanTicket {
        ScanTicket {
            revision: self.revision,
        }
    }

    /// Overwrite with the result of a scan started at `ticket`.
    ///
    /// Records whose key was revoked after the ticket was issued are withheld
    /// and returned; they must be re-validated against the chain before being
    /// trusted again.
    pub fn apply_scan(
        &mut self,
        ticket: ScanTicket,
        records: Vec<ApprovalRecord>,
    ) -> Vec<ApprovalRecord> {
        let (withheld, fresh): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| {
            self.revoked
                .get(&r.key())
                .is_some_and(|revoked_at| *revoked_at > ticket.revision)
        });

        let pending: HashMap<ApprovalKey, u64> = self
            .revoked
            .drain()
            .filter(|(_, revoked_at)| *revoked_at > ticket.revision)
            .collect();

        self.set_all(fresh);
        self.revoked = pending;

        if !withheld.is_empty() {
            tracing::info!(
                withheld = withheld.len(),
                "scan predates revocations, re-validation required"
            );
        }
        withheld
    }

    /// Copy of the current contents for inspection.
    pub fn snapshot(&self) -> Vec<ApprovalRecord> {
        self.records.clone()
    }

    /// Pretty JSON dump of the current contents.
    pub fn to_debug_json(&self) -> Result<String, GuardError> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::TokenStandard;
    use alloy::primitives::{address, Address, U256};

    const TOKEN: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");
    const NFT: Address = address!("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512");
    const ROUTER: Address = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    const MARKET: Address = address!("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

    fn allowance(spender: Address, amount: u64) -> ApprovalRecord {
        ApprovalRecord::erc20(TOKEN, spender, U256::from(amount))
    }

    fn assert_unique(store: &ApprovalStore) {
        let mut keys: Vec<_> = store.records().iter().map(|r| r.key()).collect();
        let before = keys.len();
        keys.sort_by_key(|k| k.to_string());
        keys.dedup();
        assert_eq!(keys.len(), before, "duplicate keys in store");
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut store = ApprovalStore::new();
        store.upsert(allowance(ROUTER, 1));
        store.upsert(ApprovalRecord::erc721_operator(NFT, ROUTER));
        store.upsert(allowance(ROUTER, 99));

        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].amount, Some(U256::from(99u64)));
        assert_eq!(store.records()[1].standard, TokenStandard::Erc721);
    }

    #[test]
    fn test_upsert_sequences_keep_keys_unique() {
        let mut store = ApprovalStore::new();
        let spenders = [ROUTER, MARKET];
        for i in 0..50u64 {
            let spender = spenders[(i % 2) as usize];
            match i % 5 {
                0 => store.upsert(allowance(spender, i + 1)),
                1 => store.upsert(ApprovalRecord::erc721_operator(NFT, spender)),
                2 => store.upsert(ApprovalRecord::erc721_token(NFT, spender, U256::from(i % 3))),
                3 => store.upsert(ApprovalRecord::erc1155_operator(NFT, spender)),
                _ => store.upsert(allowance(spender, 0)),
            }
            assert_unique(&store);
        }
    }

    #[test]
    fn test_inactive_record_never_stored() {
        let mut store = ApprovalStore::new();
        store.upsert(allowance(ROUTER, 0));
        assert!(store.is_empty());

        store.upsert(allowance(ROUTER, 10));
        store.upsert(allowance(ROUTER, 0));
        assert!(store.is_empty());

        store.set_all(vec![allowance(ROUTER, 0), allowance(MARKET, 3)]);
        assert_eq!(store.len(), 1);
        assert!(store.records().iter().all(ApprovalRecord::is_active));
    }

    #[test]
    fn test_set_all_overwrites_and_dedupes() {
        let mut store = ApprovalStore::new();
        store.upsert(allowance(ROUTER, 1));
        store.set_all(vec![allowance(MARKET, 1), allowance(MARKET, 2)]);

        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].spender, MARKET);
        assert_eq!(store.records()[0].amount, Some(U256::from(2u64)));
    }

    #[test]
    fn test_remove_by_key() {
        let mut store = ApprovalStore::new();
        let record = allowance(ROUTER, 5);
        store.upsert(record.clone());

        let removed = store.remove_by_key(&record.key()).unwrap();
        assert_eq!(removed, record);
        assert!(store.is_empty());
        assert!(store.remove_by_key(&record.key()).is_none());
    }

    #[test]
    fn test_token_and_operator_removed_independently() {
        let mut store = ApprovalStore::new();
        let operator = ApprovalRecord::erc721_operator(NFT, ROUTER);
        let token = ApprovalRecord::erc721_token(NFT, ROUTER, U256::from(5u64));
        store.upsert(operator.clone());
        store.upsert(token.clone());

        store.remove_by_key(&operator.key());
        assert!(store.contains(&token.key()));
        assert!(!store.contains(&operator.key()));
    }

    #[test]
    fn test_stale_scan_withholds_revoked_key() {
        let mut store = ApprovalStore::new();
        let revoked = allowance(ROUTER, 5);
        let other = allowance(MARKET, 7);
        store.set_all(vec![revoked.clone(), other.clone()]);

        let ticket = store.begin_scan();
        store.remove_by_key(&revoked.key());

        // The scan observed the chain before the revocation confirmed
        let withheld = store.apply_scan(ticket, vec![revoked.clone(), other.clone()]);
        assert_eq!(withheld, vec![revoked.clone()]);
        assert!(!store.contains(&revoked.key()));
        assert!(store.contains(&other.key()));

        // A scan started after the revocation is trusted
        let ticket = store.begin_scan();
        let withheld = store.apply_scan(ticket, vec![revoked.clone()]);
        assert!(withheld.is_empty());
        assert!(store.contains(&revoked.key()));
    }

    #[test]
    fn test_scan_before_revocation_ticket_not_affected() {
        let mut store = ApprovalStore::new();
        let record = allowance(ROUTER, 5);
        store.upsert(record.clone());
        store.remove_by_key(&record.key());

        let ticket = store.begin_scan();
        let withheld = store.apply_scan(ticket, vec![record.clone()]);
        assert!(withheld.is_empty());
        assert!(store.contains(&record.key()));
    }

    #[test]
    fn test_debug_json() {
        let mut store = ApprovalStore::new();
        store.upsert(allowance(ROUTER, 1000));
        let json: serde_json::Value = serde_json::from_str(&store.to_debug_json().unwrap()).unwrap();
        assert_eq!(json[0]["amount"], "1000");
        assert_eq!(store.snapshot().len(), 1);
    }
}
