use std::collections::{BTreeMap, HashSet};

use crate::approval::{ApprovalKey, ApprovalRecord, TokenStandard};
use crate::store::ApprovalStore;
use crate::GuardError;

/// Transient set of approvals picked for revocation.
///
/// Holds identity keys only. Keys that no longer exist in the store are
/// stale and dropped silently.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    keys: HashSet<ApprovalKey>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `key` if the store holds it. Returns whether it is now selected.
    pub fn select(&mut self, store: &ApprovalStore, key: ApprovalKey) -> bool {
        if !store.contains(&key) {
            let stale = GuardError::StaleSelection(key.to_string());
            tracing::debug!(error = %stale, "ignoring selection of unknown approval");
            return false;
        }
        self.keys.insert(key);
        true
    }

    pub fn deselect(&mut self, key: &ApprovalKey) -> bool {
        self.keys.remove(key)
    }

    pub fn select_all(&mut self, store: &ApprovalStore) {
        self.keys = store.records().iter().map(ApprovalRecord::key).collect();
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn contains(&self, key: &ApprovalKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drop keys the store no longer holds. Returns how many were dropped.
    pub fn retain_present(&mut self, store: &ApprovalStore) -> usize {
        let before = self.keys.len();
        self.keys.retain(|key| {
            let present = store.contains(key);
            if !present {
                let stale = GuardError::StaleSelection(key.to_string());
                tracing::debug!(error = %stale, "dropping stale selection");
            }
            present
        });
        before - self.keys.len()
    }

    /// Selected records in store order, skipping stale keys.
    pub fn resolve(&self, store: &ApprovalStore) -> Vec<ApprovalRecord> {
        store
            .records()
            .iter()
            .filter(|r| self.keys.contains(&r.key()))
            .cloned()
            .collect()
    }
}

/// Split a mixed list into per-standard sublists, preserving order within
/// each sublist. Sublists come out in ERC20, ERC721, ERC1155 order.
pub fn partition_by_standard(
    records: Vec<ApprovalRecord>,
) -> Vec<(TokenStandard, Vec<ApprovalRecord>)> {
    let mut groups: BTreeMap<TokenStandard, Vec<ApprovalRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.standard).or_default().push(record);
    }
    groups.into_iter().collect()
}
