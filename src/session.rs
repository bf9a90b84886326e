//! Batch driver that feeds labelled commands into a [`Ledger`].
//!
//! Wallet ids are generated by the ledger, so command sources refer to wallets
//! by caller-chosen labels; the session keeps the label → id mapping.

use std::collections::HashMap;

use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::engine::{Ledger, LedgerError};
use crate::{Amount, Wallet, WalletId};

/// A single input of the batch driver.
#[derive(Debug, Clone)]
pub enum Command {
    /// Open a wallet and bind it to `label`.
    Create { label: String },
    /// Credit a wallet, optionally guarded by an idempotency key.
    Fund {
        label: String,
        amount: Amount,
        key: Option<String>,
    },
    /// Move funds between two labelled wallets.
    Transfer {
        from: String,
        to: String,
        amount: Amount,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown wallet label '{0}'")]
    UnknownLabel(String),

    #[error("wallet label '{0}' is already bound")]
    DuplicateLabel(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Default)]
pub struct Session {
    ledger: Ledger,
    labels: HashMap<String, WalletId>,
}

impl Session {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            labels: HashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Run the session over the given command stream.
    pub async fn run(&mut self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(command) = stream.next().await {
            // a failing command must not stop the batch
            if let Err(e) = self.apply(command) {
                warn!("{e}");
            }
        }
    }

    /// Apply one command, returning the snapshot the ledger produced.
    pub fn apply(&mut self, command: Command) -> Result<Wallet, SessionError> {
        match command {
            Command::Create { label } => {
                if self.labels.contains_key(&label) {
                    return Err(SessionError::DuplicateLabel(label));
                }
                let wallet = self.ledger.create_wallet();
                self.labels.insert(label, wallet.id);
                Ok(wallet)
            }
            Command::Fund { label, amount, key } => {
                let id = self.resolve(&label)?;
                Ok(self.ledger.fund(id, amount, key.as_deref())?)
            }
            Command::Transfer { from, to, amount } => {
                let sender = self.resolve(&from)?;
                let receiver = self.resolve(&to)?;
                Ok(self.ledger.transfer(sender, receiver, amount)?)
            }
        }
    }

    /// Current snapshot of every labelled wallet, sorted by label.
    pub fn wallets(&self) -> Vec<(&str, Wallet)> {
        let mut wallets: Vec<_> = self
            .labels
            .iter()
            .filter_map(|(label, id)| {
                let wallet = self.ledger.get_wallet(id).ok()?;
                Some((label.as_str(), wallet))
            })
            .collect();
        wallets.sort_by(|a, b| a.0.cmp(b.0));
        wallets
    }

    fn resolve(&self, label: &str) -> Result<WalletId, SessionError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| SessionError::UnknownLabel(label.to_string()))
    }
}
