use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use thiserror::Error;

use crate::catalog::schema::Schema;
use crate::common::types::{IndexOid, TableOid};
use crate::index::BTreeIndex;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::table::{TableError, TableHeap};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} already exists")]
    IndexExists(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

/// Metadata for one table
pub struct TableInfo {
    pub name: String,
    pub oid: TableOid,
    pub schema: Schema,
    pub table: Arc<TableHeap>,
}

/// Metadata for one secondary index
pub struct IndexInfo {
    pub name: String,
    pub oid: IndexOid,
    pub table_name: String,
    /// Positions of the indexed columns in the table schema
    pub key_attrs: Vec<usize>,
    pub index: Arc<BTreeIndex>,
}

/// In-memory catalog of tables and their secondary indexes, keyed by oid
/// with name indirection maps.
pub struct Catalog {
    buffer_pool: Arc<BufferPoolManager>,
    tables: RwLock<HashMap<TableOid, Arc<TableInfo>>>,
    table_names: RwLock<HashMap<String, TableOid>>,
    indexes: RwLock<HashMap<IndexOid, Arc<IndexInfo>>>,
    table_indexes: RwLock<HashMap<String, Vec<IndexOid>>>,
    next_oid: AtomicU32,
}

impl Catalog {
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            tables: RwLock::new(HashMap::new()),
            table_names: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            table_indexes: RwLock::new(HashMap::new()),
            next_oid: AtomicU32::new(0),
        }
    }

    pub fn create_table(
        &self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<Arc<TableInfo>, CatalogError> {
        let name = name.into();
        if self.table_names.read().contains_key(&name) {
            return Err(CatalogError::TableExists(name));
        }

        let oid = self.next_oid.fetch_add(1, Ordering::SeqCst);
        let table = Arc::new(TableHeap::new(self.buffer_pool.clone())?);
        let info = Arc::new(TableInfo {
            name: name.clone(),
            oid,
            schema,
            table,
        });

        self.tables.write().insert(oid, info.clone());
        self.table_names.write().insert(name.clone(), oid);
        self.table_indexes.write().entry(name).or_default();

        Ok(info)
    }

    pub fn get_table(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.tables.read().get(&oid).cloned()
    }

    pub fn get_table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let oid = *self.table_names.read().get(name)?;
        self.get_table(oid)
    }

    /// Create a secondary index over `key_attrs` and backfill it from the
    /// table's current contents.
    pub fn create_index(
        &self,
        name: impl Into<String>,
        table_name: &str,
        key_attrs: Vec<usize>,
    ) -> Result<Arc<IndexInfo>, CatalogError> {
        let name = name.into();
        let table_info = self
            .get_table_by_name(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;

        if self
            .indexes
            .read()
            .values()
            .any(|info| info.name == name)
        {
            return Err(CatalogError::IndexExists(name));
        }

        let oid = self.next_oid.fetch_add(1, Ordering::SeqCst);
        let index = Arc::new(BTreeIndex::new());
        for entry in table_info.table.iter() {
            let (rid, tuple) = entry?;
            index.insert_entry(tuple.project(&key_attrs), rid);
        }

        let info = Arc::new(IndexInfo {
            name,
            oid,
            table_name: table_name.to_string(),
            key_attrs,
            index,
        });

        self.indexes.write().insert(oid, info.clone());
        self.table_indexes
            .write()
            .entry(table_name.to_string())
            .or_default()
            .push(oid);

        Ok(info)
    }

    pub fn get_index(&self, oid: IndexOid) -> Option<Arc<IndexInfo>> {
        self.indexes.read().get(&oid).cloned()
    }

    /// All indexes declared on `table_name`, in creation order.
    pub fn get_table_indexes(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        let indexes = self.indexes.read();
        self.table_indexes
            .read()
            .get(table_name)
            .map(|oids| {
                oids.iter()
                    .filter_map(|oid| indexes.get(oid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}
