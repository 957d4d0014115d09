use std::collections::HashMap;
use anyhow::Result;

use basaltdb::catalog::TableInfo;
use basaltdb::query::executor::{build_executor, execute_to_vec, ExecutorContext};
use basaltdb::query::plan::{
    DeletePlan, InsertPlan, InsertSource, PlanNode, SeqScanPlan, UpdateInfo, UpdatePlan,
};
use basaltdb::storage::table::Value;
use basaltdb::transaction::concurrency::IsolationLevel;

mod common;
use common::{accounts_schema, create_test_db, TestDb};

fn sample_rows() -> Vec<Vec<Value>> {
    vec![
        vec![
            Value::Integer(1),
            Value::Text("alice".to_string()),
            Value::Integer(100),
        ],
        vec![
            Value::Integer(2),
            Value::Text("bob".to_string()),
            Value::Integer(200),
        ],
        vec![
            Value::Integer(3),
            Value::Text("carol".to_string()),
            Value::Integer(300),
        ],
    ]
}

/// Create the accounts table with an index on the balance column and
/// insert the sample rows in one committed transaction.
fn seed_accounts(db: &TestDb) -> Result<std::sync::Arc<TableInfo>> {
    let table_info = db.catalog.create_table("accounts", accounts_schema())?;
    db.catalog
        .create_index("accounts_balance_idx", "accounts", vec![2])?;

    let txn = db.transaction_manager.begin(IsolationLevel::RepeatableRead);
    let context = ExecutorContext::new(txn.clone(), db.catalog.clone(), db.lock_manager.clone());
    let plan = PlanNode::Insert(InsertPlan {
        table_oid: table_info.oid,
        source: InsertSource::Values(sample_rows()),
    });
    let mut executor = build_executor(&plan, &context)?;
    let inserted = execute_to_vec(executor.as_mut())?;
    assert_eq!(inserted.len(), 3);
    db.transaction_manager.commit(&txn)?;

    Ok(table_info)
}

fn scan_all(db: &TestDb, table_oid: u32) -> Result<Vec<Vec<Value>>> {
    let txn = db.transaction_manager.begin(IsolationLevel::RepeatableRead);
    let context = ExecutorContext::new(txn.clone(), db.catalog.clone(), db.lock_manager.clone());
    let plan = PlanNode::SeqScan(SeqScanPlan { table_oid });
    let mut executor = build_executor(&plan, &context)?;
    let rows = execute_to_vec(executor.as_mut())?;
    db.transaction_manager.commit(&txn)?;
    Ok(rows
        .into_iter()
        .map(|(tuple, _)| tuple.values().to_vec())
        .collect())
}

#[test]
fn test_insert_locks_rows_and_maintains_index() -> Result<()> {
    let db = create_test_db(50)?;
    let table_info = db.catalog.create_table("accounts", accounts_schema())?;
    let index_info = db
        .catalog
        .create_index("accounts_balance_idx", "accounts", vec![2])?;

    let txn = db.transaction_manager.begin(IsolationLevel::RepeatableRead);
    let context = ExecutorContext::new(txn.clone(), db.catalog.clone(), db.lock_manager.clone());
    let plan = PlanNode::Insert(InsertPlan {
        table_oid: table_info.oid,
        source: InsertSource::Values(sample_rows()),
    });
    let mut executor = build_executor(&plan, &context)?;
    let inserted = execute_to_vec(executor.as_mut())?;

    assert_eq!(inserted.len(), 3);
    for (_, rid) in &inserted {
        assert!(txn.is_exclusive_locked(*rid));
    }
    assert_eq!(txn.table_write_count(), 3);
    assert_eq!(txn.index_write_count(), 3);

    let rid_bob = inserted[1].1;
    assert_eq!(index_info.index.scan_key(&[Value::Integer(200)]), vec![rid_bob]);

    db.transaction_manager.commit(&txn)?;
    assert!(!txn.is_exclusive_locked(rid_bob));

    assert_eq!(scan_all(&db, table_info.oid)?, sample_rows());
    Ok(())
}

#[test]
fn test_update_applies_set_and_add() -> Result<()> {
    let db = create_test_db(50)?;
    let table_info = seed_accounts(&db)?;
    let index_info = db.catalog.get_table_indexes("accounts")[0].clone();

    let txn = db.transaction_manager.begin(IsolationLevel::RepeatableRead);
    let context = ExecutorContext::new(txn.clone(), db.catalog.clone(), db.lock_manager.clone());

    // balance += 50, name = "updated"
    let mut update_attrs = HashMap::new();
    update_attrs.insert(2, UpdateInfo::add(50));
    update_attrs.insert(1, UpdateInfo::set(Value::Text("updated".to_string())));

    let plan = PlanNode::Update(UpdatePlan {
        table_oid: table_info.oid,
        child: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: table_info.oid,
        })),
        update_attrs,
    });
    let mut executor = build_executor(&plan, &context)?;
    let updated = execute_to_vec(executor.as_mut())?;

    assert_eq!(updated.len(), 3);
    // The scan child took shared locks; the update upgraded them
    for (_, rid) in &updated {
        assert!(txn.is_exclusive_locked(*rid));
        assert!(!txn.is_shared_locked(*rid));
    }

    // Index moved each row from its old balance key to the new one
    assert!(index_info.index.scan_key(&[Value::Integer(100)]).is_empty());
    assert_eq!(index_info.index.scan_key(&[Value::Integer(150)]).len(), 1);

    db.transaction_manager.commit(&txn)?;

    let rows = scan_all(&db, table_info.oid)?;
    assert_eq!(
        rows,
        vec![
            vec![
                Value::Integer(1),
                Value::Text("updated".to_string()),
                Value::Integer(150),
            ],
            vec![
                Value::Integer(2),
                Value::Text("updated".to_string()),
                Value::Integer(250),
            ],
            vec![
                Value::Integer(3),
                Value::Text("updated".to_string()),
                Value::Integer(350),
            ],
        ]
    );
    Ok(())
}

#[test]
fn test_insert_rollback_removes_rows_and_index_entries() -> Result<()> {
    let db = create_test_db(50)?;
    let table_info = seed_accounts(&db)?;
    let index_info = db.catalog.get_table_indexes("accounts")[0].clone();
    assert_eq!(index_info.index.len(), 3);

    let txn = db.transaction_manager.begin(IsolationLevel::RepeatableRead);
    let context = ExecutorContext::new(txn.clone(), db.catalog.clone(), db.lock_manager.clone());
    let plan = PlanNode::Insert(InsertPlan {
        table_oid: table_info.oid,
        source: InsertSource::Values(vec![vec![
            Value::Integer(4),
            Value::Text("dave".to_string()),
            Value::Integer(400),
        ]]),
    });
    let mut executor = build_executor(&plan, &context)?;
    execute_to_vec(executor.as_mut())?;
    assert_eq!(index_info.index.len(), 4);

    db.transaction_manager.abort(&txn)?;

    assert_eq!(index_info.index.len(), 3);
    assert!(index_info.index.scan_key(&[Value::Integer(400)]).is_empty());
    assert_eq!(scan_all(&db, table_info.oid)?, sample_rows());
    Ok(())
}

#[test]
fn test_update_rollback_restores_old_values() -> Result<()> {
    let db = create_test_db(50)?;
    let table_info = seed_accounts(&db)?;
    let index_info = db.catalog.get_table_indexes("accounts")[0].clone();

    let txn = db.transaction_manager.begin(IsolationLevel::RepeatableRead);
    let context = ExecutorContext::new(txn.clone(), db.catalog.clone(), db.lock_manager.clone());
    let mut update_attrs = HashMap::new();
    update_attrs.insert(2, UpdateInfo::add(1000));
    let plan = PlanNode::Update(UpdatePlan {
        table_oid: table_info.oid,
        child: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: table_info.oid,
        })),
        update_attrs,
    });
    let mut executor = build_executor(&plan, &context)?;
    let updated = execute_to_vec(executor.as_mut())?;
    assert_eq!(updated.len(), 3);
    assert_eq!(index_info.index.scan_key(&[Value::Integer(1100)]).len(), 1);

    db.transaction_manager.abort(&txn)?;

    assert_eq!(scan_all(&db, table_info.oid)?, sample_rows());
    assert!(index_info.index.scan_key(&[Value::Integer(1100)]).is_empty());
    assert_eq!(index_info.index.scan_key(&[Value::Integer(100)]).len(), 1);
    Ok(())
}

#[test]
fn test_delete_commit_and_rollback() -> Result<()> {
    let db = create_test_db(50)?;
    let table_info = seed_accounts(&db)?;
    let index_info = db.catalog.get_table_indexes("accounts")[0].clone();

    let delete_plan = PlanNode::Delete(DeletePlan {
        table_oid: table_info.oid,
        child: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: table_info.oid,
        })),
    });

    // Delete everything, then abort: rows and index entries come back
    let txn = db.transaction_manager.begin(IsolationLevel::RepeatableRead);
    let context = ExecutorContext::new(txn.clone(), db.catalog.clone(), db.lock_manager.clone());
    let mut executor = build_executor(&delete_plan, &context)?;
    let deleted = execute_to_vec(executor.as_mut())?;
    assert_eq!(deleted.len(), 3);
    assert!(index_info.index.is_empty());

    db.transaction_manager.abort(&txn)?;
    assert_eq!(scan_all(&db, table_info.oid)?, sample_rows());
    assert_eq!(index_info.index.len(), 3);

    // Delete everything again, commit this time: rows are gone for good
    let txn = db.transaction_manager.begin(IsolationLevel::RepeatableRead);
    let context = ExecutorContext::new(txn.clone(), db.catalog.clone(), db.lock_manager.clone());
    let mut executor = build_executor(&delete_plan, &context)?;
    let deleted = execute_to_vec(executor.as_mut())?;
    assert_eq!(deleted.len(), 3);

    db.transaction_manager.commit(&txn)?;
    assert!(scan_all(&db, table_info.oid)?.is_empty());
    assert!(index_info.index.is_empty());
    Ok(())
}

#[test]
fn test_insert_from_child_copies_between_tables() -> Result<()> {
    let db = create_test_db(50)?;
    let source_info = seed_accounts(&db)?;
    let target_info = db.catalog.create_table("accounts_archive", accounts_schema())?;

    let txn = db.transaction_manager.begin(IsolationLevel::RepeatableRead);
    let context = ExecutorContext::new(txn.clone(), db.catalog.clone(), db.lock_manager.clone());
    let plan = PlanNode::Insert(InsertPlan {
        table_oid: target_info.oid,
        source: InsertSource::Child(Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: source_info.oid,
        }))),
    });
    let mut executor = build_executor(&plan, &context)?;
    let copied = execute_to_vec(executor.as_mut())?;
    assert_eq!(copied.len(), 3);
    db.transaction_manager.commit(&txn)?;

    assert_eq!(scan_all(&db, target_info.oid)?, sample_rows());
    Ok(())
}

#[test]
fn test_read_uncommitted_scan_takes_no_locks() -> Result<()> {
    let db = create_test_db(50)?;
    let table_info = seed_accounts(&db)?;

    let txn = db.transaction_manager.begin(IsolationLevel::ReadUncommitted);
    let context = ExecutorContext::new(txn.clone(), db.catalog.clone(), db.lock_manager.clone());
    let plan = PlanNode::SeqScan(SeqScanPlan {
        table_oid: table_info.oid,
    });
    let mut executor = build_executor(&plan, &context)?;
    let rows = execute_to_vec(executor.as_mut())?;

    assert_eq!(rows.len(), 3);
    assert!(txn.locked_rids().is_empty());
    db.transaction_manager.commit(&txn)?;
    Ok(())
}
