use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::state::WalletRecord;
use crate::Amount;
use crate::model::{Wallet, WalletId};

pub type WalletHandle = Arc<Mutex<WalletRecord>>;

/// Index from wallet id to its individually locked record.
///
/// The index lock is only held for insertion and lookup; mutation happens
/// under the per-wallet lock obtained through [`WalletStore::handle`].
#[derive(Debug, Default)]
pub struct WalletStore {
    wallets: RwLock<HashMap<WalletId, WalletHandle>>,
}

impl WalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh, empty wallet.
    pub fn create(&self) -> Wallet {
        let id = WalletId::generate();
        let record = WalletRecord::new(id);
        let wallet = record.snapshot();
        self.wallets.write().insert(id, Arc::new(Mutex::new(record)));
        wallet
    }

    pub fn get(&self, id: &WalletId) -> Option<Wallet> {
        let handle = self.handle(id)?;
        let record = handle.lock();
        Some(record.snapshot())
    }

    /// Lockable record for `id`. Crate-internal: only the ledger mutates wallets.
    pub(crate) fn handle(&self, id: &WalletId) -> Option<WalletHandle> {
        self.wallets.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.wallets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of all balances.
    ///
    /// Holds the index read lock and visits each wallet lock once, in id order,
    /// so a transfer is never seen half-applied across the two wallets.
    /// `None` if the sum does not fit in an [`Amount`].
    pub fn total_balance(&self) -> Option<Amount> {
        let wallets = self.wallets.read();
        let mut ids: Vec<&WalletId> = wallets.keys().collect();
        ids.sort();
        let guards: Vec<_> = ids.iter().map(|id| wallets[*id].lock()).collect();
        guards
            .iter()
            .try_fold(Amount::ZERO, |total, record| total.checked_add(record.balance()))
    }
}
