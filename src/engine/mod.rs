//! Wallet ledger engine.
//!
//! The ledger owns every wallet and the idempotency cache, and is the only
//! place where balances change. It is `Send + Sync`; share it behind an `Arc`
//! and call it from as many threads or tasks as needed.
//!
//! Locking:
//! - the wallet index is held only to insert or look up a record
//! - a funding holds its wallet lock, then (when keyed) the cache lock
//! - a transfer holds both wallet locks, taken in ascending id order

use std::fmt::Display;

use parking_lot::MutexGuard;
use tracing::{debug, info};

use crate::Amount;
use crate::model::{Transaction, Wallet, WalletId};

mod state;
use state::{WalletRecord, monotonic_now};

mod store;
pub use store::WalletStore;
use store::WalletHandle;

mod idempotency;
pub use idempotency::{Fingerprint, IdempotencyCache, Lookup};

mod error;
pub use error::{ErrorKind, FundError, LedgerError, TransferError};

/// The ledger engine.
#[derive(Debug, Default)]
pub struct Ledger {
    store: WalletStore,
    idempotency: IdempotencyCache,
}

/// Public API
impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new empty wallet.
    pub fn create_wallet(&self) -> Wallet {
        let wallet = self.store.create();
        info!(wallet = %wallet.id, "wallet created");
        wallet
    }

    /// Snapshot of one wallet.
    pub fn get_wallet(&self, id: &WalletId) -> Result<Wallet, LedgerError> {
        self.store.get(id).ok_or(LedgerError::WalletNotFound(*id))
    }

    /// Credit `amount` to a wallet.
    ///
    /// With an idempotency key, the first successful call for that key is the
    /// only one that mutates; later calls with the same wallet and amount get
    /// the first call's snapshot back, and calls with other parameters fail
    /// with [`FundError::IdempotencyConflict`].
    pub fn fund(
        &self,
        wallet: WalletId,
        amount: Amount,
        idempotency_key: Option<&str>,
    ) -> Result<Wallet, LedgerError> {
        let result = self.apply_fund(wallet, amount, idempotency_key);
        Self::log_result("fund", wallet, amount, &result);
        Ok(result?)
    }

    /// Move `amount` from `sender` to `receiver`. Returns the sender's snapshot.
    pub fn transfer(
        &self,
        sender: WalletId,
        receiver: WalletId,
        amount: Amount,
    ) -> Result<Wallet, LedgerError> {
        let result = self.apply_transfer(sender, receiver, amount);
        Self::log_result("transfer", sender, amount, &result);
        Ok(result?)
    }

    pub fn wallet_count(&self) -> usize {
        self.store.len()
    }

    /// Sum of all wallet balances at a single consistent point, or `None`
    /// if it exceeds the [`Amount`] range.
    pub fn total_balance(&self) -> Option<Amount> {
        self.store.total_balance()
    }
}

/// Private API
impl Ledger {
    /// Small helper to log operation results
    fn log_result<E: Display>(
        op: &str,
        wallet: WalletId,
        amount: Amount,
        result: &Result<Wallet, E>,
    ) {
        match result {
            Ok(snapshot) => {
                info!(
                    wallet = %wallet,
                    amount = %amount,
                    balance = %snapshot.balance,
                    "{op} applied"
                );
            }
            Err(e) => {
                info!(
                    wallet = %wallet,
                    amount = %amount,
                    reason = %e,
                    "{op} skipped"
                );
            }
        }
    }

    /// Apply a funding:
    /// - Ensure the wallet exists and the amount is positive
    /// - Under the wallet lock (and the cache lock when keyed), replay or
    ///   reject a known key
    /// - Credit the wallet and register the snapshot under the key
    fn apply_fund(
        &self,
        wallet: WalletId,
        amount: Amount,
        idempotency_key: Option<&str>,
    ) -> Result<Wallet, FundError> {
        let handle = self
            .store
            .handle(&wallet)
            .ok_or(FundError::WalletNotFound(wallet))?;

        if !amount.is_positive() {
            return Err(FundError::InvalidAmount(amount));
        }

        let mut record = handle.lock();

        let Some(key) = idempotency_key else {
            return Self::credit(&mut record, amount);
        };

        let fingerprint = Fingerprint::new(wallet, amount);
        let mut cache = self.idempotency.lock();
        match cache.lookup(key, fingerprint) {
            Lookup::Replay(snapshot) => {
                debug!(wallet = %wallet, key, "fund replayed from idempotency cache");
                return Ok(snapshot);
            }
            Lookup::Conflict { stored } => {
                return Err(FundError::IdempotencyConflict {
                    key: key.to_owned(),
                    wallet: stored.wallet,
                    amount: stored.amount,
                });
            }
            Lookup::Miss => {}
        }

        let snapshot = Self::credit(&mut record, amount)?;
        // Both locks are still held, so no other caller can have taken the key.
        cache.register(key, fingerprint, snapshot.clone());
        Ok(snapshot)
    }

    fn credit(record: &mut WalletRecord, amount: Amount) -> Result<Wallet, FundError> {
        let new_balance = record
            .balance_after_credit(amount)
            .ok_or(FundError::BalanceOverflow(record.id(), amount))?;
        let created_at = monotonic_now(record.last_activity());
        record.credit(new_balance, Transaction::funding(amount, created_at));
        Ok(record.snapshot())
    }

    /// Apply a transfer:
    /// - Ensure both wallets exist, the amount is positive and the wallets differ
    /// - Lock both wallets in id order
    /// - Ensure the sender covers the amount and the receiver cannot overflow
    /// - Append the linked debit/credit pair
    fn apply_transfer(
        &self,
        sender: WalletId,
        receiver: WalletId,
        amount: Amount,
    ) -> Result<Wallet, TransferError> {
        let sender_handle = self
            .store
            .handle(&sender)
            .ok_or(TransferError::SenderNotFound(sender))?;
        let receiver_handle = self
            .store
            .handle(&receiver)
            .ok_or(TransferError::ReceiverNotFound(receiver))?;

        if !amount.is_positive() {
            return Err(TransferError::InvalidAmount(amount));
        }
        if sender == receiver {
            return Err(TransferError::SameWallet(sender));
        }

        let (mut from, mut to) =
            Self::lock_ordered((sender, &sender_handle), (receiver, &receiver_handle));

        if from.balance() < amount {
            return Err(TransferError::InsufficientFunds(
                sender,
                from.balance(),
                amount,
            ));
        }
        let receiver_balance = to
            .balance_after_credit(amount)
            .ok_or(TransferError::BalanceOverflow(receiver, amount))?;

        let created_at = monotonic_now(from.last_activity().max(to.last_activity()));
        let (debit, credit) = Transaction::transfer_pair(sender, receiver, amount, created_at);
        from.debit(debit);
        to.credit(receiver_balance, credit);

        Ok(from.snapshot())
    }

    /// Lock two distinct wallets by ascending id, returning `(sender, receiver)` guards.
    fn lock_ordered<'a>(
        sender: (WalletId, &'a WalletHandle),
        receiver: (WalletId, &'a WalletHandle),
    ) -> (
        MutexGuard<'a, WalletRecord>,
        MutexGuard<'a, WalletRecord>,
    ) {
        if sender.0 < receiver.0 {
            let from = sender.1.lock();
            let to = receiver.1.lock();
            (from, to)
        } else {
            let to = receiver.1.lock();
            let from = sender.1.lock();
            (from, to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionKind;

    // test utils

    fn whole(units: i64) -> Amount {
        Amount::from_whole(units).unwrap()
    }

    fn funded(ledger: &Ledger, units: i64) -> WalletId {
        let id = ledger.create_wallet().id;
        if units > 0 {
            ledger.fund(id, whole(units), None).unwrap();
        }
        id
    }

    #[test]
    fn new_ledger() {
        let ledger = Ledger::new();
        assert_eq!(ledger.wallet_count(), 0);
        assert_eq!(ledger.total_balance(), Some(Amount::ZERO));
    }

    // Create / get

    #[test]
    fn created_wallet_is_empty() {
        let ledger = Ledger::new();
        let wallet = ledger.create_wallet();

        assert_eq!(wallet.balance, Amount::ZERO);
        assert!(wallet.transactions.is_empty());
        assert_eq!(ledger.get_wallet(&wallet.id).unwrap(), wallet);
    }

    #[test]
    fn created_wallet_ids_are_distinct() {
        let ledger = Ledger::new();
        let ids: std::collections::HashSet<_> =
            (0..100).map(|_| ledger.create_wallet().id).collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(ledger.wallet_count(), 100);
    }

    #[test]
    fn get_unknown_wallet_fails() {
        let ledger = Ledger::new();
        let unknown = WalletId::generate();
        let result = ledger.get_wallet(&unknown);
        assert!(matches!(result, Err(LedgerError::WalletNotFound(id)) if id == unknown));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    // Fund

    #[test]
    fn fund_increases_balance_and_appends_credit() {
        let ledger = Ledger::new();
        let id = ledger.create_wallet().id;

        let wallet = ledger.fund(id, whole(100), None).unwrap();
        assert_eq!(wallet.balance, whole(100));
        assert_eq!(wallet.transactions.len(), 1);

        let tx = &wallet.transactions[0];
        assert_eq!(tx.kind, TransactionKind::Credit);
        assert_eq!(tx.amount, whole(100));
        assert!(tx.to_wallet_id.is_none());
        assert!(tx.correlation_id.is_none());
    }

    #[test]
    fn fund_accumulates_balance() {
        let ledger = Ledger::new();
        let id = funded(&ledger, 100);
        let wallet = ledger.fund(id, whole(50), None).unwrap();

        assert_eq!(wallet.balance, whole(150));
        assert_eq!(wallet.transactions.len(), 2);
        assert!(wallet.transactions[0].created_at <= wallet.transactions[1].created_at);
    }

    #[test]
    fn fund_non_positive_amount_fails() {
        let ledger = Ledger::new();
        let id = funded(&ledger, 10);

        for amount in [Amount::ZERO, whole(-5)] {
            let result = ledger.fund(id, amount, None);
            assert!(matches!(
                result,
                Err(LedgerError::Fund(FundError::InvalidAmount(a))) if a == amount
            ));
            assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument);
        }

        // Wallet unchanged
        let wallet = ledger.get_wallet(&id).unwrap();
        assert_eq!(wallet.balance, whole(10));
        assert_eq!(wallet.transactions.len(), 1);
    }

    #[test]
    fn fund_unknown_wallet_fails() {
        let ledger = Ledger::new();
        let result = ledger.fund(WalletId::generate(), whole(100), None);
        assert!(matches!(
            result,
            Err(LedgerError::Fund(FundError::WalletNotFound(_)))
        ));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn fund_overflow_fails_without_mutation() {
        let ledger = Ledger::new();
        let id = ledger.create_wallet().id;
        ledger
            .fund(id, Amount::from_scaled(i64::MAX), None)
            .unwrap();

        let result = ledger.fund(id, Amount::from_scaled(1), None);
        assert!(matches!(
            result,
            Err(LedgerError::Fund(FundError::BalanceOverflow(..)))
        ));
        assert_eq!(ledger.get_wallet(&id).unwrap().transactions.len(), 1);
    }

    // Idempotency

    #[test]
    fn fund_with_same_key_applies_once() {
        let ledger = Ledger::new();
        let id = ledger.create_wallet().id;

        let first = ledger.fund(id, whole(5000), Some("K")).unwrap();
        let second = ledger.fund(id, whole(5000), Some("K")).unwrap();

        assert_eq!(first.balance, whole(5000));
        assert_eq!(second.balance, whole(5000));
        assert_eq!(second.transactions.len(), 1);
        assert_eq!(first.transactions[0].id, second.transactions[0].id);
        assert_eq!(ledger.get_wallet(&id).unwrap().transactions.len(), 1);
    }

    #[test]
    fn fund_with_new_key_applies_again() {
        let ledger = Ledger::new();
        let id = ledger.create_wallet().id;

        ledger.fund(id, whole(5000), Some("K")).unwrap();
        let wallet = ledger.fund(id, whole(2000), Some("K2")).unwrap();

        assert_eq!(wallet.balance, whole(7000));
        assert_eq!(wallet.transactions.len(), 2);
    }

    #[test]
    fn replay_returns_snapshot_from_first_application() {
        let ledger = Ledger::new();
        let id = ledger.create_wallet().id;

        let first = ledger.fund(id, whole(10), Some("K")).unwrap();
        ledger.fund(id, whole(3), None).unwrap();
        let replay = ledger.fund(id, whole(10), Some("K")).unwrap();

        assert_eq!(replay, first);
        assert_eq!(ledger.get_wallet(&id).unwrap().balance, whole(13));
    }

    #[test]
    fn reused_key_with_different_amount_conflicts() {
        let ledger = Ledger::new();
        let id = ledger.create_wallet().id;
        ledger.fund(id, whole(5000), Some("K")).unwrap();

        let result = ledger.fund(id, whole(2000), Some("K"));
        assert!(matches!(
            &result,
            Err(LedgerError::Fund(FundError::IdempotencyConflict { key, amount, .. }))
                if key == "K" && *amount == whole(5000)
        ));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::IdempotencyConflict);

        let wallet = ledger.get_wallet(&id).unwrap();
        assert_eq!(wallet.balance, whole(5000));
        assert_eq!(wallet.transactions.len(), 1);
    }

    #[test]
    fn reused_key_on_other_wallet_conflicts() {
        let ledger = Ledger::new();
        let a = ledger.create_wallet().id;
        let b = ledger.create_wallet().id;
        ledger.fund(a, whole(10), Some("K")).unwrap();

        let result = ledger.fund(b, whole(10), Some("K"));
        assert!(matches!(
            result,
            Err(LedgerError::Fund(FundError::IdempotencyConflict { wallet, .. })) if wallet == a
        ));
        assert_eq!(ledger.get_wallet(&b).unwrap().balance, Amount::ZERO);
    }

    #[test]
    fn failed_keyed_fund_does_not_register_key() {
        let ledger = Ledger::new();
        let id = ledger.create_wallet().id;

        assert!(ledger.fund(id, Amount::ZERO, Some("K")).is_err());
        let wallet = ledger.fund(id, whole(1), Some("K")).unwrap();
        assert_eq!(wallet.balance, whole(1));
    }

    #[test]
    fn returned_snapshot_is_independent() {
        let ledger = Ledger::new();
        let id = ledger.create_wallet().id;

        let mut snapshot = ledger.fund(id, whole(10), Some("K")).unwrap();
        snapshot.balance = whole(999);
        snapshot.transactions.clear();

        assert_eq!(ledger.get_wallet(&id).unwrap().balance, whole(10));
        let replay = ledger.fund(id, whole(10), Some("K")).unwrap();
        assert_eq!(replay.balance, whole(10));
        assert_eq!(replay.transactions.len(), 1);
    }

    // Transfer

    #[test]
    fn transfer_moves_funds_and_links_entries() {
        let ledger = Ledger::new();
        let a = funded(&ledger, 1000);
        let b = funded(&ledger, 0);

        let sender = ledger.transfer(a, b, whole(300)).unwrap();
        let receiver = ledger.get_wallet(&b).unwrap();

        assert_eq!(sender.balance, whole(700));
        assert_eq!(receiver.balance, whole(300));
        assert_eq!(ledger.total_balance(), Some(whole(1000)));

        assert_eq!(sender.transactions.len(), 2);
        assert_eq!(receiver.transactions.len(), 1);
        let debit = &sender.transactions[1];
        let credit = &receiver.transactions[0];
        assert_eq!(debit.kind, TransactionKind::Debit);
        assert_eq!(debit.to_wallet_id, Some(b));
        assert_eq!(credit.kind, TransactionKind::Credit);
        assert_eq!(credit.from_wallet_id, Some(a));
        assert!(debit.correlation_id.is_some());
        assert_eq!(debit.correlation_id, credit.correlation_id);
        assert!(debit.created_at <= credit.created_at);
    }

    #[test]
    fn transfer_exact_balance_succeeds() {
        let ledger = Ledger::new();
        let a = funded(&ledger, 100);
        let b = funded(&ledger, 0);

        let sender = ledger.transfer(a, b, whole(100)).unwrap();
        assert_eq!(sender.balance, Amount::ZERO);
    }

    #[test]
    fn transfer_insufficient_funds_fails() {
        let ledger = Ledger::new();
        let a = funded(&ledger, 100);
        let b = funded(&ledger, 5);

        let result = ledger.transfer(a, b, whole(101));
        assert!(matches!(
            result,
            Err(LedgerError::Transfer(TransferError::InsufficientFunds(id, _, _))) if id == a
        ));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientFunds);

        // Both wallets unchanged
        let sender = ledger.get_wallet(&a).unwrap();
        let receiver = ledger.get_wallet(&b).unwrap();
        assert_eq!(sender.balance, whole(100));
        assert_eq!(sender.transactions.len(), 1);
        assert_eq!(receiver.balance, whole(5));
        assert_eq!(receiver.transactions.len(), 1);
    }

    #[test]
    fn transfer_unknown_sender_fails() {
        let ledger = Ledger::new();
        let b = funded(&ledger, 0);
        let result = ledger.transfer(WalletId::generate(), b, whole(1));
        assert!(matches!(
            result,
            Err(LedgerError::Transfer(TransferError::SenderNotFound(_)))
        ));
    }

    #[test]
    fn transfer_unknown_receiver_fails() {
        let ledger = Ledger::new();
        let a = funded(&ledger, 10);
        let result = ledger.transfer(a, WalletId::generate(), whole(1));
        assert!(matches!(
            result,
            Err(LedgerError::Transfer(TransferError::ReceiverNotFound(_)))
        ));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(ledger.get_wallet(&a).unwrap().balance, whole(10));
    }

    #[test]
    fn transfer_non_positive_amount_fails() {
        let ledger = Ledger::new();
        let a = funded(&ledger, 10);
        let b = funded(&ledger, 0);

        for amount in [Amount::ZERO, whole(-5)] {
            let result = ledger.transfer(a, b, amount);
            assert!(matches!(
                result,
                Err(LedgerError::Transfer(TransferError::InvalidAmount(_)))
            ));
        }
        assert_eq!(ledger.get_wallet(&a).unwrap().balance, whole(10));
    }

    #[test]
    fn transfer_to_self_fails() {
        let ledger = Ledger::new();
        let a = funded(&ledger, 10);

        let result = ledger.transfer(a, a, whole(1));
        assert!(matches!(
            result,
            Err(LedgerError::Transfer(TransferError::SameWallet(id))) if id == a
        ));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(ledger.get_wallet(&a).unwrap().transactions.len(), 1);
    }

    #[test]
    fn transfer_receiver_overflow_fails_without_mutation() {
        let ledger = Ledger::new();
        let a = funded(&ledger, 10);
        let b = ledger.create_wallet().id;
        ledger
            .fund(b, Amount::from_scaled(i64::MAX), None)
            .unwrap();

        let result = ledger.transfer(a, b, whole(1));
        assert!(matches!(
            result,
            Err(LedgerError::Transfer(TransferError::BalanceOverflow(..)))
        ));
        assert_eq!(ledger.get_wallet(&a).unwrap().balance, whole(10));
    }

    #[test]
    fn transfers_in_both_directions() {
        let ledger = Ledger::new();
        let a = funded(&ledger, 50);
        let b = funded(&ledger, 50);

        ledger.transfer(a, b, whole(20)).unwrap();
        ledger.transfer(b, a, whole(70)).unwrap();

        assert_eq!(ledger.get_wallet(&a).unwrap().balance, whole(100));
        assert_eq!(ledger.get_wallet(&b).unwrap().balance, Amount::ZERO);
        assert_eq!(ledger.total_balance(), Some(whole(100)));
    }

    // Totals

    #[test]
    fn total_balance_near_the_limit_is_exact() {
        let ledger = Ledger::new();
        let quarter = Amount::from_scaled(i64::MAX / 4);
        let ids: Vec<WalletId> = (0..3).map(|_| ledger.create_wallet().id).collect();
        for id in &ids {
            ledger.fund(*id, quarter, None).unwrap();
        }
        ledger.transfer(ids[0], ids[1], quarter).unwrap();

        assert_eq!(
            ledger.total_balance(),
            Some(Amount::from_scaled(i64::MAX / 4 * 3))
        );

        // one unit below the maximum still fits
        let last = ledger.create_wallet().id;
        let remainder = i64::MAX - i64::MAX / 4 * 3;
        ledger.fund(last, Amount::from_scaled(remainder), None).unwrap();
        assert_eq!(ledger.total_balance(), Some(Amount::from_scaled(i64::MAX)));
    }

    #[test]
    fn total_balance_overflow_is_reported_not_wrapped() {
        let ledger = Ledger::new();
        let a = ledger.create_wallet().id;
        let b = ledger.create_wallet().id;
        ledger.fund(a, Amount::from_scaled(i64::MAX), None).unwrap();
        ledger.fund(b, Amount::from_scaled(i64::MAX), None).unwrap();

        assert_eq!(ledger.total_balance(), None);

        // per-wallet state is untouched
        assert_eq!(
            ledger.get_wallet(&a).unwrap().balance,
            Amount::from_scaled(i64::MAX)
        );
        assert_eq!(ledger.wallet_count(), 2);
    }

    #[test]
    fn logs_replay_to_balance() {
        let ledger = Ledger::new();
        let a = funded(&ledger, 500);
        let b = funded(&ledger, 20);
        ledger.transfer(a, b, whole(120)).unwrap();
        ledger.transfer(b, a, whole(40)).unwrap();
        ledger.fund(b, whole(3), Some("x")).unwrap();

        for id in [a, b] {
            let wallet = ledger.get_wallet(&id).unwrap();
            assert_eq!(wallet.replayed_balance(), wallet.balance.scaled() as i128);
        }
    }
}
