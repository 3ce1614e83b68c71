//! Collaborator seams: wallet notification and the peer handle.

use std::sync::Arc;

use parking_lot::RwLock;

use cinder_core::hash::Hash256;
use cinder_core::types::{Block, Transaction};

/// Wallet-side observer of chain activity.
///
/// Called on mempool accept, block connect (`connect = true`) and block
/// disconnect (`connect = false`). `update` signals that the transaction
/// may already be known and should be refreshed.
pub trait WalletNotifier: Send + Sync {
    fn sync_transaction(&self, tx: &Transaction, block: Option<&Block>, update: bool, connect: bool);
}

/// Registered wallet set, guarded by its own lock (acquired last in the
/// mempool → chain → wallet-set order).
#[derive(Default)]
pub struct NotifierSet {
    wallets: RwLock<Vec<Arc<dyn WalletNotifier>>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, wallet: Arc<dyn WalletNotifier>) {
        self.wallets.write().push(wallet);
    }

    pub fn unregister(&self, wallet: &Arc<dyn WalletNotifier>) {
        self.wallets
            .write()
            .retain(|w| !Arc::ptr_eq(w, wallet));
    }

    pub fn len(&self) -> usize {
        self.wallets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.read().is_empty()
    }

    pub fn sync_with_wallets(
        &self,
        tx: &Transaction,
        block: Option<&Block>,
        update: bool,
        connect: bool,
    ) {
        for wallet in self.wallets.read().iter() {
            wallet.sync_transaction(tx, block, update, connect);
        }
    }
}

/// Opaque handle to the peer that sourced an object. The core only talks
/// back to assign misbehavior scores and to request missing ancestors.
pub trait Peer: Send + Sync {
    /// Add `score` to the peer's misbehavior tally.
    fn misbehaving(&self, score: u32);

    /// Ask the peer for blocks from our best chain toward `wanted` (the
    /// deepest missing ancestor of an orphan).
    fn request_blocks(&self, from_best: Hash256, wanted: Hash256);
}
