use std::sync::Arc;

use crate::catalog::{IndexInfo, Schema, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::{
    build_executor, ExecutionError, ExecutionResult, Executor, ExecutorContext,
};
use crate::query::plan::{UpdateInfo, UpdateOp, UpdatePlan};
use crate::storage::table::{Tuple, Value};
use crate::transaction::concurrency::{IndexWriteRecord, TableWriteRecord, WriteOp};

/// Applies per-column update instructions to the rows its child produces.
///
/// Lock order per record: a held shared lock is upgraded, a held
/// exclusive lock is reused, otherwise an exclusive lock is acquired.
pub struct UpdateExecutor {
    context: ExecutorContext,
    table_info: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    update_attrs: std::collections::HashMap<usize, UpdateInfo>,
    child: Box<dyn Executor>,
}

impl UpdateExecutor {
    pub fn new(plan: UpdatePlan, context: ExecutorContext) -> ExecutionResult<Self> {
        let table_info = context
            .catalog
            .get_table(plan.table_oid)
            .ok_or(ExecutionError::TableNotFound(plan.table_oid))?;
        let child = build_executor(&plan.child, &context)?;

        Ok(Self {
            context,
            table_info,
            indexes: Vec::new(),
            update_attrs: plan.update_attrs,
            child,
        })
    }

    fn apply_update(&self, tuple: &Tuple) -> ExecutionResult<Tuple> {
        let mut values = tuple.values().to_vec();
        for (&position, info) in &self.update_attrs {
            let target = values
                .get_mut(position)
                .ok_or(ExecutionError::ColumnOutOfRange(position))?;
            match info.op {
                UpdateOp::Set => *target = info.value.clone(),
                UpdateOp::Add => match (&*target, &info.value) {
                    (Value::Integer(old), Value::Integer(delta)) => {
                        *target = Value::Integer(old + delta);
                    }
                    _ => return Err(ExecutionError::NotAnInteger(position)),
                },
            }
        }
        Ok(Tuple::new(values))
    }
}

impl Executor for UpdateExecutor {
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
        let new_tuple = self.apply_update(&old_tuple)?;

        if txn.is_shared_locked(rid) {
            self.context.lock_manager.lock_upgrade(txn, rid)?;
        } else if !txn.is_exclusive_locked(rid) {
            self.context.lock_manager.lock_exclusive(txn, rid)?;
        }

        self.table_info.table.update_tuple(rid, &new_tuple, txn)?;

        txn.append_table_write(TableWriteRecord {
            rid,
            table_oid: self.table_info.oid,
            op: WriteOp::Update,
            old_tuple: Some(old_tuple.clone()),
        });

        for index_info in &self.indexes {
            index_info
                .index
                .delete_entry(&old_tuple.project(&index_info.key_attrs), rid);
            index_info
                .index
                .insert_entry(new_tuple.project(&index_info.key_attrs), rid);
            txn.append_index_write(IndexWriteRecord {
                rid,
                table_oid: self.table_info.oid,
                index_oid: index_info.oid,
                op: WriteOp::Update,
                tuple: new_tuple.clone(),
                old_tuple: Some(old_tuple.clone()),
            });
        }

        Ok(Some((new_tuple, rid)))
    }

    fn output_schema(&self) -> &Schema {
        &self.table_info.schema
    }
}
