use std::sync::Arc;

use crate::catalog::{IndexInfo, Schema, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::{
    build_executor, ExecutionError, ExecutionResult, Executor, ExecutorContext,
};
use crate::query::plan::DeletePlan;
use crate::storage::table::Tuple;
use crate::transaction::concurrency::{IndexWriteRecord, TableWriteRecord, WriteOp};

/// Delete-marks the rows its child produces; the marks become permanent
/// at commit and are rolled back on abort.
pub struct DeleteExecutor {
    context: ExecutorContext,
    table_info: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    child: Box<dyn Executor>,
}

impl DeleteExecutor {
    pub fn new(plan: DeletePlan, context: ExecutorContext) -> ExecutionResult<Self> {
        let table_info = context
            .catalog
            .get_table(plan.table_oid)
            .ok_or(ExecutionError::TableNotFound(plan.table_oid))?;
        let child = build_executor(&plan.child, &context)?;

        Ok(Self {
            context,
            table_info,
            indexes: Vec::new(),
            child,
        })
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.child.init()?;
        self.indexes = self.context.catalog.get_table_indexes(&self.table_info.name);
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        let Some((_, rid)) = self.child.next()? else {
            return Ok(None);
        };

        let txn = &self.context.transaction;
        let old_tuple = self.table_info.table.get_tuple(rid, txn)?;

        if txn.is_shared_locked(rid) {
            self.context.lock_manager.lock_upgrade(txn, rid)?;
        } else if !txn.is_exclusive_locked(rid) {
            self.context.lock_manager.lock_exclusive(txn, rid)?;
        }

        self.table_info.table.mark_delete(rid, txn)?;

        txn.append_table_write(TableWriteRecord {
            rid,
            table_oid: self.table_info.oid,
            op: WriteOp::Delete,
            old_tuple: None,
        });

        for index_info in &self.indexes {
            index_info
                .index
                .delete_entry(&old_tuple.project(&index_info.key_attrs), rid);
            txn.append_index_write(IndexWriteRecord {
                rid,
                table_oid: self.table_info.oid,
                index_oid: index_info.oid,
                op: WriteOp::Delete,
                tuple: old_tuple.clone(),
                old_tuple: None,
            });
        }

        Ok(Some((old_tuple, rid)))
    }

    fn output_schema(&self) -> &Schema {
        &self.table_info.schema
    }
}
