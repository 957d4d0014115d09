use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::common::types::{TableOid, TxnId};
use crate::storage::table::TableError;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionState, WriteOp,
};

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} is aborted")]
    TransactionAborted(TxnId),

    #[error("Table {0} not found")]
    TableNotFound(TableOid),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

/// Id-keyed map of live transactions.
///
/// Shared between the transaction manager and the lock manager so the
/// deadlock detector can resolve victim ids without the two managers
/// owning each other.
pub struct TransactionRegistry {
    transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, txn: Arc<Transaction>) {
        self.transactions.lock().insert(txn.id(), txn);
    }

    pub fn remove(&self, txn_id: TxnId) {
        self.transactions.lock().remove(&txn_id);
    }

    pub fn get(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.transactions.lock().get(&txn_id).cloned()
    }

    pub fn active_ids(&self) -> Vec<TxnId> {
        self.transactions.lock().keys().copied().collect()
    }
}

/// Creates and finalizes transactions.
///
/// Commit applies deferred deletes; abort walks both write sets in
/// reverse and undoes every heap and index mutation. Both paths release
/// all locks and drop the transaction from the registry.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    registry: Arc<TransactionRegistry>,
    lock_manager: Arc<LockManager>,
    catalog: Arc<Catalog>,
}

impl TransactionManager {
    pub fn new(
        registry: Arc<TransactionRegistry>,
        lock_manager: Arc<LockManager>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            registry,
            lock_manager,
            catalog,
        }
    }

    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.registry.insert(txn.clone());
        txn
    }

    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Aborted {
            return Err(TransactionError::TransactionAborted(txn.id()));
        }

        let (table_writes, _index_writes) = txn.take_write_sets();

        // Delete marks become permanent only now.
        for record in &table_writes {
            if record.op == WriteOp::Delete {
                let table_info = self
                    .catalog
                    .get_table(record.table_oid)
                    .ok_or(TransactionError::TableNotFound(record.table_oid))?;
                table_info.table.apply_delete(record.rid, txn)?;
            }
        }

        txn.set_state(TransactionState::Committed);
        self.lock_manager.release_all(txn);
        self.registry.remove(txn.id());
        Ok(())
    }

    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        let (table_writes, index_writes) = txn.take_write_sets();

        for record in table_writes.iter().rev() {
            let table_info = self
                .catalog
                .get_table(record.table_oid)
                .ok_or(TransactionError::TableNotFound(record.table_oid))?;
            match record.op {
                WriteOp::Insert => table_info.table.apply_delete(record.rid, txn)?,
                WriteOp::Delete => table_info.table.rollback_delete(record.rid, txn)?,
                WriteOp::Update => {
                    if let Some(old_tuple) = &record.old_tuple {
                        table_info.table.update_tuple(record.rid, old_tuple, txn)?;
                    }
                }
            }
        }

        for record in index_writes.iter().rev() {
            let Some(index_info) = self.catalog.get_index(record.index_oid) else {
                continue;
            };
            let key = record.tuple.project(&index_info.key_attrs);
            match record.op {
                WriteOp::Insert => index_info.index.delete_entry(&key, record.rid),
                WriteOp::Delete => index_info.index.insert_entry(key, record.rid),
                WriteOp::Update => {
                    index_info.index.delete_entry(&key, record.rid);
                    if let Some(old_tuple) = &record.old_tuple {
                        index_info
                            .index
                            .insert_entry(old_tuple.project(&index_info.key_attrs), record.rid);
                    }
                }
            }
        }

        txn.set_state(TransactionState::Aborted);
        self.lock_manager.release_all(txn);
        self.registry.remove(txn.id());
        Ok(())
    }
}
