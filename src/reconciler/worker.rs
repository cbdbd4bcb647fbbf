//! Reconciler Worker
//!
//! All mutating flows run on one task. The HTTP boundary (or any embedding
//! chain observer) converts notifications into `ChainEvent`s and queues
//! them; the worker consumes the queue serially, so two notifications can
//! never interleave their read-check-write sequences.
//!
//! Block triggers get special treatment: a sweep can outlast the block
//! interval, and sweeping twice concurrently is exactly the failure mode
//! this crate exists to prevent. A one-permit semaphore rides inside the
//! event; while a sweep is queued or running, further block triggers are
//! dropped on the spot instead of piling up behind it.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::service::Reconciler;
use crate::types::RedemptionNotice;

/// Queue depth for chain notifications
const EVENT_QUEUE_DEPTH: usize = 256;

/// Chain notification consumed by the worker
#[derive(Debug)]
pub enum ChainEvent {
    /// A wallet transaction was announced
    Transaction { txid: String },
    /// A block was connected. Carries the sweep slot permit; dropping the
    /// event (queue full, worker gone) frees the slot automatically.
    Block { id: String, permit: OwnedSemaphorePermit },
    /// A redemption transfer was observed on the native chain
    Redemption { notice: RedemptionNotice },
}

/// Cloneable feed into the reconciler worker
#[derive(Clone)]
pub struct ReconcilerHandle {
    events: mpsc::Sender<ChainEvent>,
    sweep_slot: Arc<Semaphore>,
}

impl ReconcilerHandle {
    /// Queue a transaction notification. Waits for queue space; returns
    /// false only when the worker is gone.
    pub async fn notify_transaction(&self, txid: String) -> bool {
        self.events
            .send(ChainEvent::Transaction { txid })
            .await
            .is_ok()
    }

    /// Queue a redemption notice. Same contract as `notify_transaction`.
    pub async fn notify_redemption(&self, notice: RedemptionNotice) -> bool {
        self.events
            .send(ChainEvent::Redemption { notice })
            .await
            .is_ok()
    }

    /// Offer a block trigger. Returns false when a sweep is already queued
    /// or running; the trigger is dropped, not queued behind it. The next
    /// block re-offers, so a dropped trigger costs one sweep delay at most.
    pub fn notify_block(&self, id: String) -> bool {
        let permit = match self.sweep_slot.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(block = %id, "sweep in flight, block trigger dropped");
                return false;
            }
        };

        match self.events.try_send(ChainEvent::Block { id: id.clone(), permit }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(block = %id, "event queue full, block trigger dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(block = %id, "reconciler worker gone, block trigger dropped");
                false
            }
        }
    }
}

/// Start the worker task. The handle feeds it; the `JoinHandle` outlives
/// every handle clone and finishes once the last one drops.
pub fn spawn_reconciler(reconciler: Reconciler) -> (ReconcilerHandle, JoinHandle<()>) {
    let (events, mut rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let handle = ReconcilerHandle {
        events,
        sweep_slot: Arc::new(Semaphore::new(1)),
    };

    let worker = tokio::spawn(async move {
        info!("reconciler worker started");

        while let Some(event) = rx.recv().await {
            match event {
                ChainEvent::Transaction { txid } => {
                    match reconciler.observe_transaction(&txid).await {
                        Ok(outcome) => debug!(txid = %txid, ?outcome, "transaction notification handled"),
                        Err(e) => error!(txid = %txid, error = %e, "transaction observation failed"),
                    }
                }
                ChainEvent::Redemption { notice } => {
                    if let Err(e) = reconciler.observe_redemption(&notice).await {
                        error!(
                            ledger_tx = %notice.ledger_tx_id,
                            error = %e,
                            "redemption observation failed"
                        );
                    }
                }
                ChainEvent::Block { id, permit } => {
                    match reconciler.sweep().await {
                        Ok(report) => {
                            if report.has_activity() {
                                info!(block = %id, %report, "sweep finished");
                            } else {
                                debug!(block = %id, %report, "sweep finished");
                            }
                        }
                        Err(e) => error!(block = %id, error = %e, "sweep failed"),
                    }
                    // Freed only now: the slot covers queue wait plus the sweep
                    drop(permit);
                }
            }
        }

        info!("reconciler worker stopped");
    });

    (handle, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::{BitcoinRpc, RpcError, WalletTx};
    use crate::config::{ExchangeConfig, SuspendSwitch};
    use crate::ledger::{LedgerError, NativeLedger};
    use crate::storage::{ExchangeStore, MemoryExchangeStore};
    use crate::types::{BitcoinAccount, Token};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Ledger double that parks inside `current_height` until released,
    /// so a test can hold a sweep open at will.
    struct GatedLedger {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        height_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NativeLedger for GatedLedger {
        async fn current_height(&self) -> Result<u32, LedgerError> {
            self.height_calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(5000)
        }

        async fn transfer_currency(&self, _recipient: u64, _units: u64, _reference: &str) -> Result<String, LedgerError> {
            Ok("ltx".to_string())
        }
    }

    struct PlainLedger;

    #[async_trait]
    impl NativeLedger for PlainLedger {
        async fn current_height(&self) -> Result<u32, LedgerError> {
            Ok(5000)
        }

        async fn transfer_currency(&self, _recipient: u64, _units: u64, _reference: &str) -> Result<String, LedgerError> {
            Ok("ltx".to_string())
        }
    }

    /// Wallet double that counts payouts and answers lookups with a
    /// deposit to the test account's address.
    struct CountingBitcoin {
        pay_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BitcoinRpc for CountingBitcoin {
        async fn get_new_address(&self, _label: &str) -> Result<String, RpcError> {
            Ok("tb1qnew".to_string())
        }

        async fn lookup_transaction(&self, txid: &str) -> Result<Option<WalletTx>, RpcError> {
            Ok(Some(WalletTx {
                txid: txid.to_string(),
                address: "tb1qdeposit".to_string(),
                amount_sats: 100_000_000,
                confirmations: 0,
            }))
        }

        async fn send_to_address(&self, _address: &str, _amount_sats: u64, _comment: &str) -> Result<String, RpcError> {
            let n = self.pay_calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("payout-{}", n))
        }
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_block_triggers_coalesce_while_sweeping() {
        let store = Arc::new(MemoryExchangeStore::new());
        // One redemption ready to pay as soon as a sweep runs
        store
            .store_token(&Token::redeem_leg("rtx1", 1001, 1, 10_000, 1_000_000, "tb1qu".into()))
            .await
            .unwrap();

        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let height_calls = Arc::new(AtomicUsize::new(0));
        let pay_calls = Arc::new(AtomicUsize::new(0));

        let reconciler = Reconciler::new(
            store.clone(),
            Arc::new(CountingBitcoin {
                pay_calls: pay_calls.clone(),
            }),
            Arc::new(GatedLedger {
                entered: entered.clone(),
                release: release.clone(),
                height_calls: height_calls.clone(),
            }),
            Arc::new(ExchangeConfig::default()),
            SuspendSwitch::new(),
        );
        let (handle, _worker) = spawn_reconciler(reconciler);

        assert!(handle.notify_block("b1".to_string()));
        entered.notified().await;

        // Sweep in flight: further triggers bounce
        assert!(!handle.notify_block("b2".to_string()));
        assert!(!handle.notify_block("b3".to_string()));

        release.notify_one();
        wait_for(|| pay_calls.load(Ordering::SeqCst) == 1).await;

        // The slot frees once the sweep finishes; b4 goes through
        let mut accepted = false;
        for _ in 0..400 {
            if handle.notify_block("b4".to_string()) {
                accepted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(accepted, "slot never freed after sweep");

        entered.notified().await;
        release.notify_one();
        wait_for(|| height_calls.load(Ordering::SeqCst) == 2).await;

        // Three triggers, two sweeps, one payout: the settled token did not
        // pay twice and the dropped triggers ran no sweep of their own.
        assert_eq!(height_calls.load(Ordering::SeqCst), 2);
        assert_eq!(pay_calls.load(Ordering::SeqCst), 1);
        let token = store.get_token("rtx1").await.unwrap().unwrap();
        assert!(token.exchanged);
        assert_eq!(token.bitcoin_txid.as_deref(), Some("payout-1"));
    }

    #[tokio::test]
    async fn test_worker_consumes_transaction_and_redemption_events() {
        let store = Arc::new(MemoryExchangeStore::new());
        store
            .store_account(&BitcoinAccount::new(1001, "tb1qdeposit".to_string(), None))
            .await
            .unwrap();

        let reconciler = Reconciler::new(
            store.clone(),
            Arc::new(CountingBitcoin {
                pay_calls: Arc::new(AtomicUsize::new(0)),
            }),
            Arc::new(PlainLedger),
            Arc::new(ExchangeConfig::default()),
            SuspendSwitch::new(),
        );
        let (handle, worker) = spawn_reconciler(reconciler);

        assert!(handle.notify_transaction("dep1".to_string()).await);
        assert!(
            handle
                .notify_redemption(RedemptionNotice {
                    ledger_tx_id: "rtx9".to_string(),
                    sender_account_id: 1001,
                    height: 4000,
                    token_amount: 5_000,
                    bitcoin_address: "tb1qu".to_string(),
                })
                .await
        );

        let mut ready = false;
        for _ in 0..400 {
            if store.get_token("dep1").await.unwrap().is_some()
                && store.get_token("rtx9").await.unwrap().is_some()
            {
                ready = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(ready, "worker did not process events in time");
        assert!(store.get_transaction("dep1").await.unwrap().is_some());

        // A dead worker refuses instead of losing events silently
        worker.abort();
        let _ = worker.await;
        assert!(!handle.notify_transaction("dep2".to_string()).await);
        assert!(!handle.notify_block("b1".to_string()));
    }
}
