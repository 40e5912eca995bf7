//! Managers built from a persistence configuration file.

use crate::common::{init_tracing, Txn};
use std::io::Write;
use txscope::memory::{MemoryCatalog, MemoryFactory};
use txscope::{BoxError, ConfigError, PersistenceConfig, TransactionError, TransactionManager};

const CONFIG: &str = r#"
[[pool]]
name = "accounts"
url = "memory://ledger"

[[pool]]
name = "reporting"
"#;

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn first_declared_pool_becomes_default() {
    init_tracing();
    let file = write_config(CONFIG);
    let config = PersistenceConfig::from_path(file.path()).unwrap();
    let catalog = MemoryCatalog::new();

    let manager = TransactionManager::<MemoryFactory>::builder()
        .default_pool(&config)
        .provider(catalog.clone())
        .build()
        .unwrap();
    assert_eq!(manager.default_pool(), "accounts");

    manager
        .exec_default(
            |txn: &Txn, (): ()| -> Result<(), BoxError> { txn.resource_manager()?.put("x", 1) },
            (),
        )
        .unwrap();
    assert_eq!(catalog.factory("accounts").unwrap().value("x"), Some(1));
}

#[test]
fn provider_maps_pool_to_backing_store() {
    let config = PersistenceConfig::from_toml(CONFIG).unwrap();
    let stores = MemoryCatalog::new();
    let provider = {
        let config = config.clone();
        let stores = stores.clone();
        move |pool: &str| -> Result<MemoryFactory, BoxError> {
            let store = config.backing_store(pool).to_string();
            Ok(stores.factory(&store).unwrap_or_else(|| {
                let factory = MemoryFactory::new(store);
                stores.register(factory.clone());
                factory
            }))
        }
    };
    let manager = TransactionManager::new(&config, provider).unwrap();

    let txn = manager.create_transaction(None).unwrap();
    assert_eq!(txn.pool(), "accounts");
    txn.commit().unwrap();

    assert!(stores.factory("memory://ledger").is_some());
    assert!(stores.factory("accounts").is_none());
}

#[test]
fn configuration_without_pools_is_fatal() {
    let config = PersistenceConfig::from_toml("").unwrap();
    let err = TransactionManager::<MemoryFactory>::new(&config, MemoryCatalog::new()).unwrap_err();
    assert!(err.is_config());
    assert!(matches!(
        err,
        TransactionError::Config(ConfigError::MissingPool)
    ));
}

#[test]
fn malformed_configuration_file_is_rejected() {
    let file = write_config("[[pool]\nname = ");
    let err = PersistenceConfig::from_path(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
