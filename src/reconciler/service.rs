//! Reconciliation Service
//!
//! Turns chain observations into durable exchange state and settles pending
//! tokens. Three flows live here:
//!
//! - `observe_transaction`: an inbound bitcoin notification becomes a
//!   transaction row plus a mint-leg token, or is recognized as a duplicate
//!   and dropped. The transaction primary key is the dedup gate; whatever
//!   the notifier resends, one row means one mint leg, ever.
//! - `observe_redemption`: a currency transfer into the redemption account
//!   becomes a redeem-leg token keyed by the ledger transaction id.
//! - `sweep`: walks every pending token and settles the eligible ones,
//!   repairing half-written state from a previous crash first.
//!
//! Settlement is deliberately conservative: any gateway failure leaves the
//! token pending for the next sweep rather than guessing.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::bitcoin::{BitcoinRpc, RpcError};
use crate::config::{ExchangeConfig, SuspendSwitch};
use crate::ledger::{LedgerError, NativeLedger};
use crate::storage::{ExchangeStore, StorageError};
use crate::types::token::{RedemptionNotice, Token, TokenSide};
use crate::types::transaction::BitcoinTransaction;
use crate::types::units;

/// Reconciliation errors. All variants are retryable: nothing is persisted
/// past the point of failure, so re-delivery completes the flow.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("bitcoin rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Outcome of an inbound transaction observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// First observation: transaction recorded, mint leg created
    Recorded { token_id: String },
    /// Already on file; nothing changed
    AlreadyRecorded,
    /// The wallet does not track the txid, or no managed address received it
    Unmanaged,
}

/// What a sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Mint legs recreated for orphaned transactions
    pub repaired: usize,
    /// Deposits that issued currency units
    pub minted: usize,
    /// Redemptions that paid out bitcoin
    pub paid: usize,
    /// Tokens still short of the required depth
    pub awaiting_confirmations: usize,
    /// Tokens skipped because sends are suspended
    pub skipped_suspended: usize,
    /// Tokens whose settlement failed and stays pending
    pub deferred: usize,
}

impl SweepReport {
    pub fn has_activity(&self) -> bool {
        self.repaired > 0 || self.minted > 0 || self.paid > 0 || self.deferred > 0
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "repaired: {}, minted: {}, paid: {}, waiting: {}, suspended: {}, deferred: {}",
            self.repaired,
            self.minted,
            self.paid,
            self.awaiting_confirmations,
            self.skipped_suspended,
            self.deferred
        )
    }
}

enum Settlement {
    Minted,
    Paid,
    AwaitingDepth,
}

/// The reconciliation engine
pub struct Reconciler {
    store: Arc<dyn ExchangeStore>,
    bitcoin: Arc<dyn BitcoinRpc>,
    ledger: Arc<dyn NativeLedger>,
    config: Arc<ExchangeConfig>,
    suspend: SuspendSwitch,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ExchangeStore>,
        bitcoin: Arc<dyn BitcoinRpc>,
        ledger: Arc<dyn NativeLedger>,
        config: Arc<ExchangeConfig>,
        suspend: SuspendSwitch,
    ) -> Self {
        Self {
            store,
            bitcoin,
            ledger,
            config,
            suspend,
        }
    }

    /// Handle an inbound transaction notification.
    ///
    /// Reads come first, writes last: a failure anywhere leaves no partial
    /// state, so the notifier can simply deliver again.
    pub async fn observe_transaction(&self, txid: &str) -> Result<InboundOutcome, ReconcileError> {
        if self.store.get_transaction(txid).await?.is_some() {
            debug!(txid, "transaction already recorded");
            return Ok(InboundOutcome::AlreadyRecorded);
        }

        let wallet_tx = match self.bitcoin.lookup_transaction(txid).await? {
            Some(tx) => tx,
            None => {
                debug!(txid, "wallet does not track transaction");
                return Ok(InboundOutcome::Unmanaged);
            }
        };

        let account = match self.store.get_account_by_address(&wallet_tx.address).await? {
            Some(account) => account,
            None => {
                debug!(txid, address = %wallet_tx.address, "no account for receiving address");
                return Ok(InboundOutcome::Unmanaged);
            }
        };

        let height = self.ledger.current_height().await?;

        let record = BitcoinTransaction::new(
            txid.to_string(),
            account.ledger_account_id,
            wallet_tx.amount_sats,
            wallet_tx.confirmations,
        );

        if !self.store.store_transaction(&record).await? {
            debug!(txid, "lost the duplicate race, transaction already stored");
            return Ok(InboundOutcome::AlreadyRecorded);
        }

        // This call alone creates the mint leg; a crash before the insert is
        // healed by the sweep's repair pass, never by re-notification.
        let token = self.mint_leg_for(&record, height, account.bitcoin_address.clone());
        if !self.store.store_token(&token).await? {
            debug!(token_id = %token.id, "mint leg already present");
        }

        info!(
            txid,
            account = account.ledger_account_id,
            sats = wallet_tx.amount_sats,
            units = token.token_amount,
            "deposit recorded"
        );
        Ok(InboundOutcome::Recorded { token_id: token.id })
    }

    /// Handle a currency transfer into the redemption account. Returns
    /// whether this notice created the redeem leg (duplicates return false).
    pub async fn observe_redemption(&self, notice: &RedemptionNotice) -> Result<bool, ReconcileError> {
        let bitcoin_amount = match units::sats_from_token_units(
            notice.token_amount,
            self.config.exchange_rate,
            self.config.currency_decimals,
        ) {
            Some(sats) => sats,
            None => {
                warn!(
                    ledger_tx = %notice.ledger_tx_id,
                    units = notice.token_amount,
                    "redemption amount not convertible, recording zero payout"
                );
                0
            }
        };

        let token = Token::redeem_leg(
            &notice.ledger_tx_id,
            notice.sender_account_id,
            notice.height,
            notice.token_amount,
            bitcoin_amount,
            notice.bitcoin_address.clone(),
        );

        let inserted = self.store.store_token(&token).await?;
        if inserted {
            info!(
                ledger_tx = %notice.ledger_tx_id,
                account = notice.sender_account_id,
                units = notice.token_amount,
                sats = bitcoin_amount,
                "redemption recorded"
            );
        } else {
            debug!(ledger_tx = %notice.ledger_tx_id, "duplicate redemption notice");
        }
        Ok(inserted)
    }

    /// Settle everything that is ready.
    ///
    /// Scans the full pending set every time; eligibility is re-derived from
    /// persisted state, so there is no watermark to lose or corrupt. Errors
    /// on a single token defer that token, not the sweep.
    pub async fn sweep(&self) -> Result<SweepReport, ReconcileError> {
        let mut report = SweepReport::default();
        let chain_height = self.ledger.current_height().await?;

        // Repair pass: transactions whose mint leg never landed.
        for tx in self.store.get_unminted_transactions().await? {
            let address = match self.store.get_account(tx.ledger_account_id).await? {
                Some(account) => account.bitcoin_address,
                None => String::new(),
            };
            let token = self.mint_leg_for(&tx, chain_height, address);
            if self.store.store_token(&token).await? {
                info!(txid = %tx.txid, "recreated missing mint leg");
                report.repaired += 1;
            }
        }

        for token in self.store.get_tokens(0, false).await? {
            // Re-checked per token so a suspend mid-sweep stops the rest
            if self.suspend.is_suspended() {
                report.skipped_suspended += 1;
                continue;
            }

            match self.settle_token(&token, chain_height).await {
                Ok(Settlement::Minted) => report.minted += 1,
                Ok(Settlement::Paid) => report.paid += 1,
                Ok(Settlement::AwaitingDepth) => report.awaiting_confirmations += 1,
                Err(e) => {
                    warn!(token_id = %token.id, error = %e, "settlement deferred");
                    report.deferred += 1;
                }
            }
        }

        Ok(report)
    }

    /// Settle one token if it has reached the required depth.
    async fn settle_token(&self, token: &Token, chain_height: u32) -> Result<Settlement, ReconcileError> {
        match token.side {
            TokenSide::Mint => {
                let txid = token.bitcoin_txid.as_deref().unwrap_or(&token.id);
                let confirmations = match self.bitcoin.lookup_transaction(txid).await? {
                    Some(tx) => tx.confirmations,
                    None => {
                        warn!(token_id = %token.id, "deposit no longer known to wallet");
                        return Ok(Settlement::AwaitingDepth);
                    }
                };

                if confirmations < self.config.confirmations_required {
                    return Ok(Settlement::AwaitingDepth);
                }

                let ledger_txid = self
                    .ledger
                    .transfer_currency(token.sender_account_id, token.token_amount, &token.id)
                    .await?;

                match self.store.mark_token_exchanged(&token.id, None).await {
                    Ok(true) => {}
                    Ok(false) => warn!(token_id = %token.id, "token vanished during settlement"),
                    Err(e) => {
                        error!(
                            token_id = %token.id,
                            ledger_txid = %ledger_txid,
                            error = %e,
                            "currency issued but not recorded, manual check required"
                        );
                        return Err(e.into());
                    }
                }

                info!(
                    token_id = %token.id,
                    ledger_txid = %ledger_txid,
                    units = token.token_amount,
                    "currency issued for deposit"
                );
                Ok(Settlement::Minted)
            }
            TokenSide::Redeem => {
                if chain_height.saturating_sub(token.height) < self.config.confirmations_required {
                    return Ok(Settlement::AwaitingDepth);
                }

                let payout_txid = self
                    .bitcoin
                    .send_to_address(&token.bitcoin_address, token.bitcoin_amount, &token.id)
                    .await?;

                match self.store.mark_token_exchanged(&token.id, Some(&payout_txid)).await {
                    Ok(true) => {}
                    Ok(false) => warn!(token_id = %token.id, "token vanished during settlement"),
                    Err(e) => {
                        error!(
                            token_id = %token.id,
                            bitcoin_txid = %payout_txid,
                            error = %e,
                            "bitcoin sent but not recorded, manual check required"
                        );
                        return Err(e.into());
                    }
                }

                info!(
                    token_id = %token.id,
                    bitcoin_txid = %payout_txid,
                    sats = token.bitcoin_amount,
                    "bitcoin paid for redemption"
                );
                Ok(Settlement::Paid)
            }
        }
    }

    fn mint_leg_for(&self, tx: &BitcoinTransaction, height: u32, deposit_address: String) -> Token {
        let token_amount = match units::token_units_from_sats(
            tx.amount_sats,
            self.config.exchange_rate,
            self.config.currency_decimals,
        ) {
            Some(units) => units,
            None => {
                warn!(txid = %tx.txid, sats = tx.amount_sats, "deposit amount not convertible, recording zero mint");
                0
            }
        };

        Token::mint_leg(
            &tx.txid,
            tx.ledger_account_id,
            height,
            token_amount,
            tx.amount_sats,
            deposit_address,
        )
    }
}
