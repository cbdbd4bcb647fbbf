//! Account Registry
//!
//! Allocates and remembers the bitcoin deposit address for each native-ledger
//! account. An account keeps one address for its lifetime: repeat requests
//! return the stored record instead of burning fresh wallet addresses, and a
//! creation mutex keeps concurrent first requests from racing.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::bitcoin::{BitcoinRpc, RpcError};
use crate::storage::{ExchangeStore, StorageError};
use crate::types::BitcoinAccount;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("address allocation failed: {0}")]
    Gateway(#[from] RpcError),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

/// One deposit address per ledger account
pub struct AccountRegistry {
    store: Arc<dyn ExchangeStore>,
    bitcoin: Arc<dyn BitcoinRpc>,
    create_lock: Mutex<()>,
}

impl AccountRegistry {
    pub fn new(store: Arc<dyn ExchangeStore>, bitcoin: Arc<dyn BitcoinRpc>) -> Self {
        Self {
            store,
            bitcoin,
            create_lock: Mutex::new(()),
        }
    }

    /// Return the account's deposit address, allocating one on first use.
    ///
    /// The public key is stored only at creation; later calls return the
    /// original record untouched.
    pub async fn get_or_create(
        &self,
        ledger_account_id: u64,
        public_key: Option<Vec<u8>>,
    ) -> Result<BitcoinAccount, RegistryError> {
        if let Some(existing) = self
            .store
            .get_account(ledger_account_id)
            .await
            .map_err(RegistryError::Storage)?
        {
            return Ok(existing);
        }

        let _guard = self.create_lock.lock().await;

        // Re-check under the lock: a concurrent caller may have just won.
        if let Some(existing) = self
            .store
            .get_account(ledger_account_id)
            .await
            .map_err(RegistryError::Storage)?
        {
            return Ok(existing);
        }

        let label = format!("account-{}", ledger_account_id);
        let address = self.bitcoin.get_new_address(&label).await?;

        let account = BitcoinAccount::new(ledger_account_id, address, public_key);
        match self.store.store_account(&account).await {
            Ok(()) => {
                info!(
                    account = ledger_account_id,
                    address = %account.bitcoin_address,
                    "allocated deposit address"
                );
                Ok(account)
            }
            // Lost a cross-process race; the stored record wins.
            Err(StorageError::Duplicate(_)) => self
                .store
                .get_account(ledger_account_id)
                .await
                .map_err(RegistryError::Storage)?
                .ok_or_else(|| {
                    RegistryError::Storage(StorageError::Database(
                        "account vanished after duplicate insert".to_string(),
                    ))
                }),
            Err(e) => Err(RegistryError::Storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::MockBitcoinRpc;
    use crate::storage::MemoryExchangeStore;

    fn registry_with(mock: MockBitcoinRpc) -> (Arc<AccountRegistry>, Arc<MemoryExchangeStore>) {
        let store = Arc::new(MemoryExchangeStore::new());
        let registry = AccountRegistry::new(store.clone(), Arc::new(mock));
        (Arc::new(registry), store)
    }

    #[tokio::test]
    async fn test_repeat_requests_reuse_address() {
        let mut mock = MockBitcoinRpc::new();
        mock.expect_get_new_address()
            .times(1)
            .returning(|_| Ok("tb1qfirst".to_string()));

        let (registry, _store) = registry_with(mock);

        let first = registry.get_or_create(1001, None).await.unwrap();
        let second = registry.get_or_create(1001, None).await.unwrap();

        assert_eq!(first.bitcoin_address, "tb1qfirst");
        assert_eq!(second.bitcoin_address, "tb1qfirst");
    }

    #[tokio::test]
    async fn test_concurrent_requests_allocate_once() {
        let mut mock = MockBitcoinRpc::new();
        mock.expect_get_new_address()
            .times(1)
            .returning(|_| Ok("tb1qonly".to_string()));

        let (registry, store) = registry_with(mock);

        let a = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_or_create(7, None).await.unwrap() })
        };
        let b = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_or_create(7, None).await.unwrap() })
        };

        let (first, second) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(first.bitcoin_address, "tb1qonly");
        assert_eq!(second.bitcoin_address, "tb1qonly");
        assert!(store.get_account(7).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_gateway_failure_surfaces_and_stores_nothing() {
        let mut mock = MockBitcoinRpc::new();
        mock.expect_get_new_address().times(1).returning(|_| {
            Err(RpcError::Node {
                code: -28,
                message: "loading wallet".to_string(),
            })
        });

        let (registry, store) = registry_with(mock);

        let result = registry.get_or_create(1001, None).await;
        assert!(matches!(result, Err(RegistryError::Gateway(_))));
        assert!(store.get_account(1001).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_public_key_fixed_at_creation() {
        let mut mock = MockBitcoinRpc::new();
        mock.expect_get_new_address()
            .times(1)
            .returning(|_| Ok("tb1qkey".to_string()));

        let (registry, _store) = registry_with(mock);

        let created = registry.get_or_create(5, None).await.unwrap();
        assert!(created.public_key.is_none());

        // A later key is ignored; the stored record stands.
        let again = registry.get_or_create(5, Some(vec![1u8; 32])).await.unwrap();
        assert!(again.public_key.is_none());
    }
}
