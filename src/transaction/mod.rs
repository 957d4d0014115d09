pub mod concurrency;

pub use concurrency::{
    IsolationLevel, LockError, LockManager, Transaction, TransactionError, TransactionManager,
    TransactionRegistry, TransactionState,
};
