#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tempfile::NamedTempFile;

use basaltdb::catalog::{Catalog, Column, DataType, Schema};
use basaltdb::storage::buffer::BufferPoolManager;
use basaltdb::transaction::{LockManager, TransactionManager, TransactionRegistry};

pub fn create_test_buffer_pool(
    pool_size: usize,
) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let temp_file = NamedTempFile::new()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, temp_file.path())?);
    Ok((buffer_pool, temp_file))
}

/// A fully wired engine core for executor and transaction tests.
pub struct TestDb {
    pub buffer_pool: Arc<BufferPoolManager>,
    pub catalog: Arc<Catalog>,
    pub registry: Arc<TransactionRegistry>,
    pub lock_manager: Arc<LockManager>,
    pub transaction_manager: Arc<TransactionManager>,
    _temp_file: NamedTempFile,
}

pub fn create_test_db(pool_size: usize) -> Result<TestDb> {
    create_test_db_with_detection(pool_size, Some(Duration::from_millis(10)))
}

pub fn create_test_db_with_detection(
    pool_size: usize,
    detection_interval: Option<Duration>,
) -> Result<TestDb> {
    let temp_file = NamedTempFile::new()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, temp_file.path())?);
    let catalog = Arc::new(Catalog::new(buffer_pool.clone()));
    let registry = Arc::new(TransactionRegistry::new());
    let lock_manager = LockManager::with_detection(registry.clone(), detection_interval);
    let transaction_manager = Arc::new(TransactionManager::new(
        registry.clone(),
        lock_manager.clone(),
        catalog.clone(),
    ));

    Ok(TestDb {
        buffer_pool,
        catalog,
        registry,
        lock_manager,
        transaction_manager,
        _temp_file: temp_file,
    })
}

/// id INTEGER, name TEXT, balance INTEGER
pub fn accounts_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", DataType::Integer),
        Column::new("name", DataType::Text),
        Column::new("balance", DataType::Integer),
    ])
}
