// Query Executors
//
// Iterator-based execution model for the data-modifying runtime. Each
// executor pulls one row at a time from its child, cooperating with the
// lock manager before touching the heap.

mod delete;
mod insert;
mod seq_scan;
mod update;

use std::sync::Arc;
use thiserror::Error;

use crate::catalog::{Catalog, Schema};
use crate::common::types::{Rid, TableOid};
use crate::storage::table::{TableError, Tuple};
use crate::transaction::concurrency::{LockError, LockManager, Transaction};

pub use delete::DeleteExecutor;
pub use insert::InsertExecutor;
pub use seq_scan::SeqScanExecutor;
pub use update::UpdateExecutor;

use crate::query::plan::PlanNode;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Table {0} not found")]
    TableNotFound(TableOid),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Row arity {got} does not match schema arity {expected}")]
    ArityMismatch { got: usize, expected: usize },

    #[error("Update target column {0} is not an integer")]
    NotAnInteger(usize),

    #[error("Update targets column {0} outside the schema")]
    ColumnOutOfRange(usize),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Everything an executor needs from its surroundings.
#[derive(Clone)]
pub struct ExecutorContext {
    pub transaction: Arc<Transaction>,
    pub catalog: Arc<Catalog>,
    pub lock_manager: Arc<LockManager>,
}

impl ExecutorContext {
    pub fn new(
        transaction: Arc<Transaction>,
        catalog: Arc<Catalog>,
        lock_manager: Arc<LockManager>,
    ) -> Self {
        Self {
            transaction,
            catalog,
            lock_manager,
        }
    }
}

/// The iterator-model operator interface: `init` once, then `next` until
/// it yields `None`.
pub trait Executor {
    fn init(&mut self) -> ExecutionResult<()>;

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>>;

    fn output_schema(&self) -> &Schema;
}

/// Dispatch a plan node to its executor, building children recursively.
pub fn build_executor(
    plan: &PlanNode,
    context: &ExecutorContext,
) -> ExecutionResult<Box<dyn Executor>> {
    match plan {
        PlanNode::SeqScan(plan) => Ok(Box::new(SeqScanExecutor::new(plan.clone(), context.clone())?)),
        PlanNode::Insert(plan) => Ok(Box::new(InsertExecutor::new(plan.clone(), context.clone())?)),
        PlanNode::Update(plan) => Ok(Box::new(UpdateExecutor::new(plan.clone(), context.clone())?)),
        PlanNode::Delete(plan) => Ok(Box::new(DeleteExecutor::new(plan.clone(), context.clone())?)),
    }
}

/// Run an executor to exhaustion and collect its output rows.
pub fn execute_to_vec(executor: &mut dyn Executor) -> ExecutionResult<Vec<(Tuple, Rid)>> {
    executor.init()?;
    let mut rows = Vec::new();
    while let Some(row) = executor.next()? {
        rows.push(row);
    }
    Ok(rows)
}
