//! At-most-once bookkeeping for keyed funding requests.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use parking_lot::{Mutex, MutexGuard};

use crate::Amount;
use crate::model::{Wallet, WalletId};

/// Parameters that must match for a repeated key to count as a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub wallet: WalletId,
    pub amount: Amount,
}

impl Fingerprint {
    pub fn new(wallet: WalletId, amount: Amount) -> Self {
        Self { wallet, amount }
    }
}

#[derive(Debug, Clone)]
struct IdempotencyRecord {
    fingerprint: Fingerprint,
    result: Wallet,
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Key never seen.
    Miss,
    /// Same key and fingerprint: the stored result.
    Replay(Wallet),
    /// Same key, different parameters.
    Conflict { stored: Fingerprint },
}

#[derive(Debug, Default)]
pub struct IdempotencyCache {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the cache lock for a lookup-then-register sequence.
    pub(crate) fn lock(&self) -> CacheGuard<'_> {
        CacheGuard {
            records: self.records.lock(),
        }
    }

}

// Single-call wrappers. The ledger itself always goes through `lock()`.
#[cfg(test)]
impl IdempotencyCache {
    fn lookup(&self, key: &str, fingerprint: Fingerprint) -> Lookup {
        self.lock().lookup(key, fingerprint)
    }

    fn register(&self, key: &str, fingerprint: Fingerprint, result: Wallet) -> bool {
        self.lock().register(key, fingerprint, result)
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to the cache, held across a whole keyed funding.
pub(crate) struct CacheGuard<'a> {
    records: MutexGuard<'a, HashMap<String, IdempotencyRecord>>,
}

impl CacheGuard<'_> {
    pub fn lookup(&self, key: &str, fingerprint: Fingerprint) -> Lookup {
        match self.records.get(key) {
            None => Lookup::Miss,
            Some(record) if record.fingerprint == fingerprint => {
                Lookup::Replay(record.result.clone())
            }
            Some(record) => Lookup::Conflict {
                stored: record.fingerprint,
            },
        }
    }

    /// Store `result` under `key`. First write wins: returns `false` if the
    /// key was already taken.
    pub fn register(&mut self, key: &str, fingerprint: Fingerprint, result: Wallet) -> bool {
        match self.records.entry(key.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(IdempotencyRecord {
                    fingerprint,
                    result,
                });
                true
            }
        }
    }
}
