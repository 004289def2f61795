// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, lock-serialized transaction index.
//!
//! The index file is a JSON document guarded by a `.lock` sibling. Every
//! mutation runs the same sequence: acquire lock → read → modify → write
//! to `*.tmp` → fsync → rename → release lock. The document is
//! append-mostly: completed transactions are never mutated except to mark
//! `rolled_back` with a back-reference.

use crate::atomic::{load_json, save_json, StoreError};
use crate::lock::FileLock;
use nos_core::{SnapshotId, Transaction, TxId, TxResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current index document major version.
const INDEX_DOC_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexDoc {
    version: u32,
    #[serde(default)]
    transactions: Vec<Transaction>,
}

impl Default for IndexDoc {
    fn default() -> Self {
        Self {
            version: INDEX_DOC_VERSION,
            transactions: Vec::new(),
        }
    }
}

/// Handle to the transaction index file (`index.json` + `index.json.lock`).
#[derive(Debug, Clone)]
pub struct TxIndex {
    path: PathBuf,
}

impl TxIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index.json".to_string());
        name.push_str(".lock");
        self.path.with_file_name(name)
    }

    fn load_doc(&self) -> Result<IndexDoc, StoreError> {
        let doc: Option<IndexDoc> = load_json(&self.path)?;
        match doc {
            // The version integer bumps on breaking change; anything newer
            // than we understand must not be rewritten by this daemon.
            Some(doc) if doc.version > INDEX_DOC_VERSION => Err(StoreError::NewerVersion {
                path: self.path.clone(),
                found: doc.version,
                supported: INDEX_DOC_VERSION,
            }),
            Some(doc) => Ok(doc),
            None => Ok(IndexDoc::default()),
        }
    }

    /// Run a mutation under the exclusive index lock.
    fn with_locked_doc<T>(
        &self,
        f: impl FnOnce(&mut IndexDoc) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _lock = FileLock::acquire(&self.lock_path())?;
        let mut doc = self.load_doc()?;
        let out = f(&mut doc)?;
        save_json(&self.path, &doc)?;
        Ok(out)
    }

    /// Append a new pending transaction.
    pub fn begin(&self, tx: Transaction) -> Result<(), StoreError> {
        self.with_locked_doc(|doc| {
            doc.transactions.push(tx);
            Ok(())
        })
    }

    /// Mark a pending transaction committed.
    pub fn commit(&self, tx_id: &TxId) -> Result<(), StoreError> {
        self.set_result(tx_id, TxResult::Committed, "commit", None)
    }

    /// Mark a pending transaction failed with a reason.
    pub fn fail(&self, tx_id: &TxId, reason: impl Into<String>) -> Result<(), StoreError> {
        let reason = reason.into();
        self.with_locked_doc(|doc| {
            let tx = find_mut(doc, tx_id)?;
            if tx.result != TxResult::Pending {
                return Err(tx_state_error(tx, "fail"));
            }
            tx.result = TxResult::Failed;
            tx.reason = Some(reason);
            Ok(())
        })
    }

    /// Mark a committed (or failed) transaction rolled back, with a
    /// back-reference to the transaction that performed the rollback.
    pub fn mark_rolled_back(&self, tx_id: &TxId, by: &TxId) -> Result<(), StoreError> {
        self.set_result(tx_id, TxResult::RolledBack, "roll back", Some(by.clone()))
    }

    fn set_result(
        &self,
        tx_id: &TxId,
        result: TxResult,
        action: &'static str,
        by: Option<TxId>,
    ) -> Result<(), StoreError> {
        self.with_locked_doc(|doc| {
            let tx = find_mut(doc, tx_id)?;
            let valid = match result {
                TxResult::Committed => tx.result == TxResult::Pending,
                TxResult::RolledBack => {
                    matches!(tx.result, TxResult::Committed | TxResult::Failed)
                }
                _ => false,
            };
            if !valid {
                return Err(tx_state_error(tx, action));
            }
            tx.result = result;
            tx.rolled_back_by = by;
            Ok(())
        })
    }

    /// All transactions, oldest first.
    pub fn list(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.load_doc()?.transactions)
    }

    pub fn get(&self, tx_id: &TxId) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .load_doc()?
            .transactions
            .into_iter()
            .find(|t| &t.tx_id == tx_id))
    }

    /// Snapshot ids pinned by non-committed (pending) transactions.
    ///
    /// Prune must never delete these: a pending transaction may still
    /// need its snapshots for rollback.
    pub fn pinned_snapshots(&self) -> Result<Vec<SnapshotId>, StoreError> {
        let doc = self.load_doc()?;
        let mut pinned = Vec::new();
        for tx in doc.transactions.iter().filter(|t| t.pins_snapshots()) {
            for target in &tx.targets {
                if let Some(snapshot) = &target.snapshot {
                    pinned.push(snapshot.id.clone());
                }
            }
        }
        Ok(pinned)
    }
}

fn find_mut<'a>(doc: &'a mut IndexDoc, tx_id: &TxId) -> Result<&'a mut Transaction, StoreError> {
    doc.transactions
        .iter_mut()
        .find(|t| &t.tx_id == tx_id)
        .ok_or_else(|| StoreError::TxNotFound(tx_id.to_string()))
}

fn tx_state_error(tx: &Transaction, action: &'static str) -> StoreError {
    StoreError::TxState {
        tx_id: tx.tx_id.to_string(),
        state: format!("{:?}", tx.result).to_lowercase(),
        action,
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
