mod lock_manager;
mod transaction;
mod transaction_manager;

pub use lock_manager::{LockError, LockManager, LockMode, DEFAULT_DETECTION_INTERVAL};
pub use transaction::{
    IndexWriteRecord, IsolationLevel, TableWriteRecord, Transaction, TransactionState, WriteOp,
};
pub use transaction_manager::{TransactionError, TransactionManager, TransactionRegistry};
