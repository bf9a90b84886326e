pub mod amount;
pub mod csv;
pub mod engine;
pub mod model;
pub mod session;

pub use amount::Amount;
pub use engine::{ErrorKind, Ledger, LedgerError};
pub use model::{Currency, Transaction, TransactionKind, TxId, Wallet, WalletId};
pub use session::{Command, Session};
