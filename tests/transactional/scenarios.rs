//! Scenarios A, B and C: read, failing transfer, nested calls, failing exec.

use crate::common::*;
use txscope::BoxError;

// ============================================================================
// Scenario A: immutable read, failing mutable transfer
// ============================================================================

#[test]
fn immutable_read_never_begins() {
    let (accounts, catalog) = accounts();

    let balance = accounts.invoke("read_balance", |a| a.read_balance()).unwrap();
    assert_eq!(balance, 0);

    let journal = catalog.factory("accounts").unwrap();
    assert_eq!(journal.journal().begins(), 0);
    assert_eq!(journal.journal().commits(), 0);
    assert_eq!(journal.journal().rollbacks(), 0);
    assert_eq!(journal.journal().closes(), 1);
}

#[test]
fn failing_transfer_rolls_back_with_original_error() {
    let (accounts, catalog) = accounts();

    let err = accounts.invoke("transfer", |a| a.transfer(-5)).unwrap_err();
    assert!(matches!(
        err.method_error(),
        Some(AccountsError::NegativeAmount(-5))
    ));
    assert!(err.suppressed().is_empty());

    let journal = catalog.factory("accounts").unwrap();
    assert_eq!(journal.journal().begins(), 1);
    assert_eq!(journal.journal().rollbacks(), 1);
    assert_eq!(journal.journal().commits(), 0);
    assert_eq!(journal.journal().closes(), 1);
}

#[test]
fn successful_transfer_commits() {
    let (accounts, catalog) = accounts();

    assert_eq!(accounts.invoke("transfer", |a| a.transfer(12)).unwrap(), 12);
    assert_eq!(accounts.invoke("read_balance", |a| a.read_balance()).unwrap(), 12);

    let factory = catalog.factory("accounts").unwrap();
    assert_eq!(factory.value("balance"), Some(12));
    assert_eq!(factory.journal().commits(), 1);
}

// ============================================================================
// Scenario B: transfer calls audit on the same thread
// ============================================================================

#[test]
fn nested_audit_joins_transfer() {
    let (accounts, catalog) = accounts();

    let balance = accounts
        .invoke("transfer", |a| {
            let balance = a.transfer(7)?;
            accounts
                .invoke("audit", |a| {
                    let txn = a.session().transaction().unwrap();
                    assert_eq!(txn.nesting_level(), 1);
                    a.audit(1)
                })
                .map_err(|e| e.into_inner().unwrap_or_else(AccountsError::Transaction))?;

            // audit's close only released its level
            let txn = a.session().transaction().unwrap();
            assert_eq!(txn.nesting_level(), 0);
            assert!(!txn.is_closed());
            Ok::<_, AccountsError>(balance)
        })
        .unwrap();
    assert_eq!(balance, 7);

    let factory = catalog.factory("accounts").unwrap();
    assert_eq!(factory.journal().begins(), 1);
    assert_eq!(factory.journal().commits(), 1);
    assert_eq!(factory.journal().closes(), 1);
    assert_eq!(factory.value("audit"), Some(1));
    assert_eq!(factory.value("balance"), Some(7));
}

#[test]
fn nested_close_reports_still_held() {
    let (manager, catalog) = manager("accounts");

    let transfer = manager.create_transaction(Some("accounts")).unwrap();
    let audit = manager.create_transaction(Some("accounts")).unwrap();

    audit.commit().unwrap();
    assert!(!audit.close().unwrap());
    transfer.commit().unwrap();
    assert!(transfer.close().unwrap());

    let journal = catalog.factory("accounts").unwrap();
    assert_eq!(journal.journal().begins(), 1);
    assert_eq!(journal.journal().commits(), 1);
}

#[test]
fn failing_nested_audit_rolls_back_whole_transfer() {
    let (accounts, catalog) = accounts();

    let err = accounts
        .invoke("transfer", |a| {
            a.transfer(3)?;
            accounts
                .invoke("audit", |_| Err::<(), _>(AccountsError::NegativeAmount(-1)))
                .map_err(|e| e.into_inner().unwrap_or_else(AccountsError::Transaction))
        })
        .unwrap_err();
    assert!(matches!(
        err.method_error(),
        Some(AccountsError::NegativeAmount(-1))
    ));

    let factory = catalog.factory("accounts").unwrap();
    assert_eq!(factory.value("balance"), None);
    assert_eq!(factory.journal().rollbacks(), 1);
    assert_eq!(factory.journal().commits(), 0);
}

// ============================================================================
// Scenario C: exec with a failing working unit
// ============================================================================

#[test]
fn failing_exec_rolls_back_and_wraps_cause() {
    let (manager, catalog) = manager("accounts");

    let err = manager
        .exec(
            Some("reporting"),
            |txn: &Txn, (key, value): (&str, i64)| -> Result<(), BoxError> {
                txn.resource_manager()?.put(key, value)?;
                Err("report generation failed".into())
            },
            ("summary", 1),
        )
        .unwrap_err();

    assert!(err.is_working_unit());
    assert_eq!(
        std::error::Error::source(&err).unwrap().to_string(),
        "report generation failed"
    );

    let factory = catalog.factory("reporting").unwrap();
    assert_eq!(factory.journal().rollbacks(), 1);
    assert_eq!(factory.journal().commits(), 0);
    assert_eq!(factory.journal().closes(), 1);
    assert_eq!(factory.value("summary"), None);
    assert!(manager.current_transaction().is_none());
}

#[test]
fn exec_inside_intercepted_call_joins_it() {
    let (manager, catalog) = manager("accounts");
    let factory = txscope::TransactionalFactory::new(manager.clone());
    let accounts = factory.new_instance_with(Accounts::new, accounts_policy());

    accounts
        .invoke("transfer", |_| {
            manager.exec_default(
                |txn: &Txn, (): ()| -> Result<(), BoxError> {
                    txn.resource_manager()?.put("balance", 1)
                },
                (),
            )
        })
        .unwrap();

    let factory = catalog.factory("accounts").unwrap();
    assert_eq!(factory.journal().begins(), 1);
    assert_eq!(factory.journal().commits(), 1);
    assert_eq!(factory.journal().closes(), 1);
    assert_eq!(factory.value("balance"), Some(1));
    assert!(manager.current_transaction().is_none());
}

#[test]
fn exec_inside_working_unit_joins_it() {
    let (manager, catalog) = manager("accounts");

    manager
        .exec_default(
            |txn: &Txn, (): ()| -> Result<(), BoxError> {
                txn.resource_manager()?.put("outer", 1)?;
                manager.exec_default(
                    |inner: &Txn, (): ()| -> Result<(), BoxError> {
                        assert_eq!(inner.nesting_level(), 1);
                        inner.resource_manager()?.put("inner", 2)
                    },
                    (),
                )?;
                Ok(())
            },
            (),
        )
        .unwrap();

    let factory = catalog.factory("accounts").unwrap();
    assert_eq!(factory.journal().begins(), 1);
    assert_eq!(factory.journal().commits(), 1);
    assert_eq!(factory.journal().rollbacks(), 0);
    assert_eq!(factory.journal().closes(), 1);
    assert_eq!(factory.value("outer"), Some(1));
    assert_eq!(factory.value("inner"), Some(2));
    assert!(manager.current_transaction().is_none());
}

#[test]
fn failing_nested_exec_rolls_back_outermost() {
    let (manager, catalog) = manager("accounts");

    let err = manager
        .exec_default(
            |txn: &Txn, (): ()| -> Result<(), BoxError> {
                txn.resource_manager()?.put("outer", 1)?;
                manager.exec_default(
                    |_: &Txn, (): ()| -> Result<(), BoxError> { Err("inner failed".into()) },
                    (),
                )?;
                Ok(())
            },
            (),
        )
        .unwrap_err();

    assert!(err.is_working_unit());
    let factory = catalog.factory("accounts").unwrap();
    assert_eq!(factory.journal().rollbacks(), 1);
    assert_eq!(factory.journal().commits(), 0);
    assert_eq!(factory.journal().closes(), 1);
    assert_eq!(factory.value("outer"), None);
}
