use std::sync::Arc;

use crate::catalog::{Schema, TableInfo};
use crate::query::executor::{ExecutionError, ExecutionResult, Executor, ExecutorContext};
use crate::query::plan::SeqScanPlan;
use crate::storage::table::{TableIterator, Tuple};
use crate::common::types::Rid;
use crate::transaction::concurrency::IsolationLevel;

/// Full-table scan in page-chain order.
///
/// Takes a shared lock per record under read committed and above; read
/// committed drops the lock again as soon as the row has been read.
pub struct SeqScanExecutor {
    context: ExecutorContext,
    table_info: Arc<TableInfo>,
    iterator: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(plan: SeqScanPlan, context: ExecutorContext) -> ExecutionResult<Self> {
        let table_info = context
            .catalog
            .get_table(plan.table_oid)
            .ok_or(ExecutionError::TableNotFound(plan.table_oid))?;
        Ok(Self {
            context,
            table_info,
            iterator: None,
        })
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.iterator = Some(self.table_info.table.iter());
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        let Some(iterator) = self.iterator.as_mut() else {
            return Ok(None);
        };

        let Some(entry) = iterator.next() else {
            return Ok(None);
        };
        let (rid, tuple) = entry?;

        let txn = &self.context.transaction;
        let isolation = txn.isolation_level();
        if isolation == IsolationLevel::ReadUncommitted
            || txn.is_shared_locked(rid)
            || txn.is_exclusive_locked(rid)
        {
            return Ok(Some((tuple, rid)));
        }

        self.context.lock_manager.lock_shared(txn, rid)?;
        let tuple = self.table_info.table.get_tuple(rid, txn)?;
        if isolation == IsolationLevel::ReadCommitted {
            self.context.lock_manager.unlock(txn, rid)?;
        }

        Ok(Some((tuple, rid)))
    }

    fn output_schema(&self) -> &Schema {
        &self.table_info.schema
    }
}
