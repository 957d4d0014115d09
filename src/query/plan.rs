// Query plan nodes
//
// The runtime dispatches over this small closed set of operators; there
// is no planner in front of it.

use std::collections::HashMap;

use crate::common::types::TableOid;
use crate::storage::table::Value;

/// How an update changes one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    /// Replace the column with the given value
    Set,
    /// Add the given integer to the column
    Add,
}

/// Per-column update instruction
#[derive(Debug, Clone)]
pub struct UpdateInfo {
    pub op: UpdateOp,
    pub value: Value,
}

impl UpdateInfo {
    pub fn set(value: Value) -> Self {
        Self {
            op: UpdateOp::Set,
            value,
        }
    }

    pub fn add(delta: i64) -> Self {
        Self {
            op: UpdateOp::Add,
            value: Value::Integer(delta),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeqScanPlan {
    pub table_oid: TableOid,
}

/// Where an insert gets its rows from
#[derive(Debug, Clone)]
pub enum InsertSource {
    /// Inline literal rows
    Values(Vec<Vec<Value>>),
    /// A child operator producing rows
    Child(Box<PlanNode>),
}

#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub table_oid: TableOid,
    pub source: InsertSource,
}

#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
    /// Column position → update instruction
    pub update_attrs: HashMap<usize, UpdateInfo>,
}

#[derive(Debug, Clone)]
pub struct DeletePlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub enum PlanNode {
    SeqScan(SeqScanPlan),
    Insert(InsertPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
}
