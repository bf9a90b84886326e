//! Core domain types for the wallet ledger.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::Amount;

/// Wallet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct WalletId(Uuid);

impl WalletId {
    pub(crate) fn generate() -> Self {
        WalletId(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        WalletId(id)
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transaction identifier. Also used as the correlation id of a transfer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TxId(Uuid);

impl TxId {
    pub(crate) fn generate() -> Self {
        TxId(Uuid::new_v4())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The single denomination the ledger accounts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Currency {
    #[default]
    #[serde(rename = "USD")]
    Usd,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Usd => f.write_str("USD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
}

/// An entry in a wallet's log. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TxId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Amount,
    /// Receiver of a transfer, set on the sender's debit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_wallet_id: Option<WalletId>,
    /// Sender of a transfer, set on the receiver's credit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_wallet_id: Option<WalletId>,
    /// Shared by both legs of a transfer; absent for plain funding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<TxId>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// A plain funding credit.
    pub(crate) fn funding(amount: Amount, created_at: DateTime<Utc>) -> Self {
        Self {
            id: TxId::generate(),
            kind: TransactionKind::Credit,
            amount,
            to_wallet_id: None,
            from_wallet_id: None,
            correlation_id: None,
            created_at,
        }
    }

    /// Both legs of a transfer, `(sender debit, receiver credit)`.
    pub(crate) fn transfer_pair(
        sender: WalletId,
        receiver: WalletId,
        amount: Amount,
        created_at: DateTime<Utc>,
    ) -> (Self, Self) {
        let correlation_id = Some(TxId::generate());
        let debit = Self {
            id: TxId::generate(),
            kind: TransactionKind::Debit,
            amount,
            to_wallet_id: Some(receiver),
            from_wallet_id: None,
            correlation_id,
            created_at,
        };
        let credit = Self {
            id: TxId::generate(),
            kind: TransactionKind::Credit,
            amount,
            to_wallet_id: None,
            from_wallet_id: Some(sender),
            correlation_id,
            created_at,
        };
        (debit, credit)
    }

    /// Contribution of this entry to the wallet balance.
    pub fn signed_amount(&self) -> i128 {
        match self.kind {
            TransactionKind::Credit => self.amount.scaled() as i128,
            TransactionKind::Debit => -(self.amount.scaled() as i128),
        }
    }
}

/// Point-in-time copy of a wallet. Owns all of its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wallet {
    pub id: WalletId,
    pub balance: Amount,
    pub currency: Currency,
    pub transactions: Vec<Transaction>,
}

impl Wallet {
    /// Recompute the balance from the log.
    pub fn replayed_balance(&self) -> i128 {
        self.transactions.iter().map(Transaction::signed_amount).sum()
    }
}
