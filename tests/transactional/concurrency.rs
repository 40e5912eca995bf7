//! Many threads against one manager.

use crate::common::*;
use std::sync::{Arc, Barrier};
use std::thread;
use txscope::memory::{MemoryCatalog, MemoryFactory};
use txscope::{BoxError, FactoryProvider, TransactionManager};

/// Catalog that yields before building, widening the race window.
struct SlowCatalog {
    catalog: MemoryCatalog,
}

impl FactoryProvider<MemoryFactory> for SlowCatalog {
    fn create_factory(&self, pool: &str) -> Result<MemoryFactory, BoxError> {
        thread::yield_now();
        self.catalog.create_factory(pool)
    }
}

#[test]
fn racing_first_access_builds_one_factory() {
    init_tracing();
    const THREADS: usize = 8;
    let catalog = MemoryCatalog::new();
    let barrier = Arc::new(Barrier::new(THREADS));
    let manager = TransactionManager::<MemoryFactory>::new(
        "accounts",
        SlowCatalog {
            catalog: catalog.clone(),
        },
    )
    .unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let manager = manager.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager
                    .exec(
                        Some("P"),
                        |txn: &Txn, (): ()| -> Result<(), BoxError> {
                            txn.resource_manager()?.put("touched", 1)
                        },
                        (),
                    )
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(catalog.builds("P"), 1);
    assert_eq!(manager.factory_count(), 1);
    let journal = catalog.factory("P").unwrap();
    assert_eq!(journal.journal().begins(), THREADS);
    assert_eq!(journal.journal().commits(), THREADS);
}

#[test]
fn distinct_pools_on_distinct_threads() {
    let (manager, catalog) = manager("accounts");
    let pools = ["accounts", "reporting", "archive", "reporting"];
    let barrier = Arc::new(Barrier::new(pools.len()));

    let handles: Vec<_> = pools
        .iter()
        .map(|&pool| {
            let manager = manager.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let txn = manager.create_transaction(Some(pool)).unwrap();
                // every thread holds its own transaction at the same time
                barrier.wait();
                let seen = (txn.pool().to_string(), txn.nesting_level());
                txn.commit().unwrap();
                assert!(manager.current_transaction().is_none());
                seen
            })
        })
        .collect();

    for (handle, pool) in handles.into_iter().zip(pools) {
        assert_eq!(handle.join().unwrap(), (pool.to_string(), 0));
    }
    assert_eq!(catalog.builds("reporting"), 1);
    assert_eq!(catalog.factory("reporting").unwrap().journal().commits(), 2);
    assert_eq!(manager.factory_count(), 3);
}

#[test]
fn intercepted_service_shared_between_threads() {
    let (accounts, catalog) = accounts();
    let accounts = Arc::new(accounts);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let accounts = Arc::clone(&accounts);
            thread::spawn(move || {
                for _ in 0..10 {
                    accounts.invoke("audit", |a| a.audit(1)).unwrap();
                }
                assert!(!accounts.session().is_active());
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let journal = catalog.factory("accounts").unwrap();
    assert_eq!(journal.journal().begins(), 40);
    assert_eq!(journal.journal().commits(), 40);
    assert_eq!(journal.journal().closes(), 40);
}
