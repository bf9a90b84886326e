//! Error types for ledger operations.

use thiserror::Error;

use crate::Amount;
use crate::model::WalletId;

/// Coarse classification used by adapters to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    InsufficientFunds,
    IdempotencyConflict,
}

/// Top-level error returned by [`Ledger`](super::Ledger) operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("fund failed: {0}")]
    Fund(#[from] FundError),

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("wallet {0} not found")]
    WalletNotFound(WalletId),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Fund(e) => e.kind(),
            LedgerError::Transfer(e) => e.kind(),
            LedgerError::WalletNotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Error during funding.
#[derive(Debug, Error)]
pub enum FundError {
    #[error("wallet {0} not found")]
    WalletNotFound(WalletId),
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Amount),
    #[error("crediting {1} would overflow the balance of wallet {0}")]
    BalanceOverflow(WalletId, Amount),
    #[error("idempotency key '{key}' was already used for wallet {wallet} with amount {amount}")]
    IdempotencyConflict {
        key: String,
        wallet: WalletId,
        amount: Amount,
    },
}

impl FundError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FundError::WalletNotFound(_) => ErrorKind::NotFound,
            FundError::InvalidAmount(_) | FundError::BalanceOverflow(..) => {
                ErrorKind::InvalidArgument
            }
            FundError::IdempotencyConflict { .. } => ErrorKind::IdempotencyConflict,
        }
    }
}

/// Error during a transfer between two wallets.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("sender wallet {0} not found")]
    SenderNotFound(WalletId),
    #[error("receiver wallet {0} not found")]
    ReceiverNotFound(WalletId),
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Amount),
    #[error("sender and receiver are the same wallet {0}")]
    SameWallet(WalletId),
    #[error("insufficient funds in wallet {0}: balance {1}, requested {2}")]
    InsufficientFunds(WalletId, Amount, Amount),
    #[error("crediting {1} would overflow the balance of wallet {0}")]
    BalanceOverflow(WalletId, Amount),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::SenderNotFound(_) | TransferError::ReceiverNotFound(_) => {
                ErrorKind::NotFound
            }
            TransferError::InvalidAmount(_)
            | TransferError::SameWallet(_)
            | TransferError::BalanceOverflow(..) => ErrorKind::InvalidArgument,
            TransferError::InsufficientFunds(..) => ErrorKind::InsufficientFunds,
        }
    }
}
