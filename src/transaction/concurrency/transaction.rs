use std::collections::HashSet;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{IndexOid, Rid, TableOid, TxnId};
use crate::storage::table::Tuple;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Two-phase-locking transaction states.
///
/// `Growing → Shrinking` on the first unlock under repeatable read or
/// stricter; terminal states are `Committed` and `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Kind of mutation recorded in a write set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Update,
    Delete,
}

/// One heap mutation, recorded so abort can reverse it.
#[derive(Debug, Clone)]
pub struct TableWriteRecord {
    pub rid: Rid,
    pub table_oid: TableOid,
    pub op: WriteOp,
    /// Pre-image, present for updates
    pub old_tuple: Option<Tuple>,
}

/// One secondary-index mutation, recorded so abort can reverse it.
#[derive(Debug, Clone)]
pub struct IndexWriteRecord {
    pub rid: Rid,
    pub table_oid: TableOid,
    pub index_oid: IndexOid,
    pub op: WriteOp,
    /// The tuple whose derived key was written
    pub tuple: Tuple,
    /// Pre-image, present for updates
    pub old_tuple: Option<Tuple>,
}

/// An active transaction.
///
/// Owned by one client thread; the only field other threads touch is
/// `state`, which the deadlock detector may flip to `Aborted`.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: RwLock<TransactionState>,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
    table_write_set: Mutex<Vec<TableWriteRecord>>,
    index_write_set: Mutex<Vec<IndexWriteRecord>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: RwLock::new(TransactionState::Growing),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
            table_write_set: Mutex::new(Vec::new()),
            index_write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.write() = state;
    }

    pub fn is_shared_locked(&self, rid: Rid) -> bool {
        self.shared_lock_set.lock().contains(&rid)
    }

    pub fn is_exclusive_locked(&self, rid: Rid) -> bool {
        self.exclusive_lock_set.lock().contains(&rid)
    }

    pub fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub fn remove_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().remove(&rid);
    }

    pub fn remove_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().remove(&rid);
    }

    /// Snapshot of every RID this transaction holds or requested.
    pub fn locked_rids(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = self.shared_lock_set.lock().iter().copied().collect();
        rids.extend(self.exclusive_lock_set.lock().iter().copied());
        rids
    }

    pub fn clear_lock_sets(&self) {
        self.shared_lock_set.lock().clear();
        self.exclusive_lock_set.lock().clear();
    }

    pub fn append_table_write(&self, record: TableWriteRecord) {
        self.table_write_set.lock().push(record);
    }

    pub fn append_index_write(&self, record: IndexWriteRecord) {
        self.index_write_set.lock().push(record);
    }

    pub fn table_write_count(&self) -> usize {
        self.table_write_set.lock().len()
    }

    pub fn index_write_count(&self) -> usize {
        self.index_write_set.lock().len()
    }

    /// Drain both write sets for commit/abort processing.
    pub fn take_write_sets(&self) -> (Vec<TableWriteRecord>, Vec<IndexWriteRecord>) {
        (
            std::mem::take(&mut *self.table_write_set.lock()),
            std::mem::take(&mut *self.index_write_set.lock()),
        )
    }
}
