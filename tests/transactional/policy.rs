//! Policy resolution observed through the resource manager.

use crate::common::*;
use txscope::memory::{MemoryCatalog, MemoryFactory};
use txscope::{Marker, PolicyBuilder, TransactionManager, TransactionalFactory};

fn factory() -> (TransactionalFactory<MemoryFactory>, MemoryCatalog) {
    let (manager, catalog) = manager("accounts");
    (TransactionalFactory::new(manager), catalog)
}

#[test]
fn immutable_method_on_mutable_type_issues_no_commit() {
    let (factory, catalog) = factory();
    let policy = PolicyBuilder::new()
        .method("transfer", Marker::Immutable)
        .build();
    let accounts = factory.new_instance_with(Accounts::new, policy);

    accounts.invoke("transfer", |a| a.transfer(4)).unwrap();

    let journal = catalog.factory("accounts").unwrap();
    assert_eq!(journal.journal().begins(), 0);
    assert_eq!(journal.journal().commits(), 0);
}

#[test]
fn mutable_method_on_immutable_type_commits_and_rolls_back() {
    let (factory, catalog) = factory();
    let policy = PolicyBuilder::new()
        .immutable_type()
        .method("transfer", Marker::Mutable)
        .build();
    let accounts = factory.new_instance_with(Accounts::new, policy);

    accounts.invoke("transfer", |a| a.transfer(4)).unwrap();
    accounts.invoke("transfer", |a| a.transfer(-1)).unwrap_err();
    accounts.invoke("read_balance", |a| a.read_balance()).unwrap();

    let journal = catalog.factory("accounts").unwrap();
    assert_eq!(journal.journal().begins(), 2);
    assert_eq!(journal.journal().commits(), 1);
    assert_eq!(journal.journal().rollbacks(), 1);
    assert_eq!(journal.journal().closes(), 3);
    assert_eq!(journal.value("balance"), Some(4));
}

#[test]
fn immutable_capability_makes_type_read_only() {
    let (factory, catalog) = factory();
    let policy = PolicyBuilder::new()
        .capability("Audited", None)
        .capability("Reporting", Some(Marker::Immutable))
        .capability_method("transfer", Marker::Mutable)
        .build();
    let accounts = factory.new_instance_with(Accounts::new, policy);

    accounts.invoke("audit", |a| a.audit(1)).unwrap();
    accounts.invoke("transfer", |a| a.transfer(2)).unwrap();

    let journal = catalog.factory("accounts").unwrap();
    assert_eq!(journal.journal().begins(), 1);
    assert_eq!(journal.journal().commits(), 1);
}

#[test]
fn read_only_outer_call_keeps_nested_mutable_call_read_only() {
    let (factory, catalog) = factory();
    let reader = factory.new_instance_with(Accounts::new, accounts_policy());
    let writer = factory.new_instance_with(Accounts::new, accounts_policy());

    reader
        .invoke("read_balance", |r| {
            writer
                .invoke("transfer", |w| w.transfer(1))
                .map_err(|e| e.into_inner().unwrap_or_else(AccountsError::Transaction))?;
            r.read_balance()
        })
        .unwrap();

    let journal = catalog.factory("accounts").unwrap();
    assert_eq!(journal.journal().begins(), 0);
    assert_eq!(journal.journal().commits(), 0);
    assert_eq!(journal.journal().closes(), 1);
}

#[test]
fn separate_managers_do_not_nest() {
    let (first, catalog) = factory();
    let second = TransactionalFactory::new(
        TransactionManager::<MemoryFactory>::new("accounts", catalog.clone()).unwrap(),
    );
    let outer = first.new_instance_with(Accounts::new, accounts_policy());
    let inner = second.new_instance_with(Accounts::new, accounts_policy());

    outer
        .invoke("audit", |o| {
            inner
                .invoke("audit", |i| i.audit(1))
                .map_err(|e| e.into_inner().unwrap_or_else(AccountsError::Transaction))?;
            o.audit(1)
        })
        .unwrap();

    let journal = catalog.factory("accounts").unwrap();
    assert_eq!(journal.journal().begins(), 2);
    assert_eq!(journal.journal().commits(), 2);
}
