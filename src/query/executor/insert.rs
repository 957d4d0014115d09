use std::sync::Arc;

use crate::catalog::{IndexInfo, Schema, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::{
    build_executor, ExecutionError, ExecutionResult, Executor, ExecutorContext,
};
use crate::query::plan::{InsertPlan, InsertSource};
use crate::storage::table::{Tuple, Value};
use crate::transaction::concurrency::{IndexWriteRecord, TableWriteRecord, WriteOp};

/// Inserts rows from an inline value list or a child operator.
///
/// Every new RID is exclusively locked before the executor yields it; a
/// fresh insert cannot conflict, but two-phase locking still wants the
/// lock held until commit.
pub struct InsertExecutor {
    context: ExecutorContext,
    table_info: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    values: Vec<Vec<Value>>,
    cursor: usize,
    child: Option<Box<dyn Executor>>,
}

impl InsertExecutor {
    pub fn new(plan: InsertPlan, context: ExecutorContext) -> ExecutionResult<Self> {
        let table_info = context
            .catalog
            .get_table(plan.table_oid)
            .ok_or(ExecutionError::TableNotFound(plan.table_oid))?;

        let (values, child) = match plan.source {
            InsertSource::Values(values) => (values, None),
            InsertSource::Child(child_plan) => {
                (Vec::new(), Some(build_executor(&child_plan, &context)?))
            }
        };

        Ok(Self {
            context,
            table_info,
            indexes: Vec::new(),
            values,
            cursor: 0,
            child,
        })
    }

    fn next_source_tuple(&mut self) -> ExecutionResult<Option<Tuple>> {
        if let Some(child) = self.child.as_mut() {
            return Ok(child.next()?.map(|(tuple, _)| tuple));
        }
        if self.cursor >= self.values.len() {
            return Ok(None);
        }
        let row = self.values[self.cursor].clone();
        self.cursor += 1;

        let expected = self.table_info.schema.len();
        if row.len() != expected {
            return Err(ExecutionError::ArityMismatch {
                got: row.len(),
                expected,
            });
        }
        Ok(Some(Tuple::new(row)))
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        if let Some(child) = self.child.as_mut() {
            child.init()?;
        }
        self.indexes = self.context.catalog.get_table_indexes(&self.table_info.name);
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        let Some(tuple) = self.next_source_tuple()? else {
            return Ok(None);
        };

        let txn = &self.context.transaction;
        let rid = self.table_info.table.insert_tuple(&tuple, txn)?;
        self.context.lock_manager.lock_exclusive(txn, rid)?;

        txn.append_table_write(TableWriteRecord {
            rid,
            table_oid: self.table_info.oid,
            op: WriteOp::Insert,
            old_tuple: None,
        });

        for index_info in &self.indexes {
            index_info
                .index
                .insert_entry(tuple.project(&index_info.key_attrs), rid);
            txn.append_index_write(IndexWriteRecord {
                rid,
                table_oid: self.table_info.oid,
                index_oid: index_info.oid,
                op: WriteOp::Insert,
                tuple: tuple.clone(),
                old_tuple: None,
            });
        }

        Ok(Some((tuple, rid)))
    }

    fn output_schema(&self) -> &Schema {
        &self.table_info.schema
    }
}
