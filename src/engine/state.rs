use chrono::{DateTime, Utc};

use crate::Amount;
use crate::model::{Currency, Transaction, Wallet, WalletId};

/// Live state of one wallet. Only reachable through the ledger's locks.
#[derive(Debug)]
pub struct WalletRecord {
    id: WalletId,
    balance: Amount,
    transactions: Vec<Transaction>,
}

impl WalletRecord {
    pub fn new(id: WalletId) -> Self {
        Self {
            id,
            balance: Amount::ZERO,
            transactions: Vec::new(),
        }
    }

    pub fn id(&self) -> WalletId {
        self.id
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Timestamp of the newest entry, if any.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.transactions.last().map(|tx| tx.created_at)
    }

    /// Balance after crediting `amount`, or `None` on overflow.
    pub fn balance_after_credit(&self, amount: Amount) -> Option<Amount> {
        self.balance.checked_add(amount)
    }

    /// Add a credit entry and its amount. The caller has checked
    /// [`balance_after_credit`](Self::balance_after_credit).
    pub fn credit(&mut self, new_balance: Amount, entry: Transaction) {
        debug_assert_eq!(self.balance.checked_add(entry.amount), Some(new_balance));
        self.balance = new_balance;
        self.transactions.push(entry);
    }

    /// Subtract a debit entry's amount. The caller has checked the balance covers it.
    pub fn debit(&mut self, entry: Transaction) {
        debug_assert!(entry.amount <= self.balance);
        self.balance = Amount::from_scaled(self.balance.scaled() - entry.amount.scaled());
        self.transactions.push(entry);
    }

    /// Deep copy handed out to callers and to the idempotency cache.
    pub fn snapshot(&self) -> Wallet {
        Wallet {
            id: self.id,
            balance: self.balance,
            currency: Currency::Usd,
            transactions: self.transactions.clone(),
        }
    }
}

/// A timestamp no earlier than `floor`, keeping per-wallet logs non-decreasing
/// even if the wall clock steps back.
pub fn monotonic_now(floor: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match floor {
        Some(floor) if floor > now => floor,
        _ => now,
    }
}
