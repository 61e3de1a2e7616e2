//! Cross-context access to the KVT store.
//!
//! [`KvtShared`] owns the store behind a mutex and exposes two entry points:
//!
//! - [`KvtShared::lock`] blocks. Used from the UI/idle context for save, load
//!   and forced resync, which run on their own timeline.
//! - [`KvtShared::try_lock`] never blocks. Used by the periodic sync, which
//!   must not stall a render deadline. Contention skips the cycle.
//!
//! A poisoned mutex is recovered: the store contains no invariants a panic
//! half-way through an operation could break beyond a lost change.

use std::sync::{Mutex, MutexGuard, TryLockError};

use log::{debug, error, trace};

use crate::kvt::{KvtChange, KvtParam, KvtStore, Pending};

/// Receiver of drained KVT changes.
pub trait KvtObserver {
    /// A parameter was created or changed.
    fn kvt_write(&mut self, name: &str, value: &KvtParam);

    /// A parameter was removed.
    fn kvt_remove(&mut self, _name: &str) {}
}

/// Result of one periodic sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The store was busy; nothing was done.
    Skipped,
    /// Both queues were drained.
    Synced {
        /// Changes delivered to the UI.
        to_ui: usize,
        /// UI edits acknowledged.
        to_render: usize,
    },
}

/// KVT store shared between the render and UI contexts.
#[derive(Debug, Default)]
pub struct KvtShared {
    store: Mutex<KvtStore>,
}

impl KvtShared {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the store, waiting for the other context if needed.
    pub fn lock(&self) -> MutexGuard<'_, KvtStore> {
        self.store.lock().unwrap_or_else(|poisoned| {
            error!("KVT store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Acquire the store only if it is free right now.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, KvtStore>> {
        match self.store.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(poisoned)) => {
                error!("KVT store lock poisoned, recovering");
                Some(poisoned.into_inner())
            }
        }
    }

    /// Queue every live parameter toward the UI so a freshly attached editor
    /// receives the full tree.
    pub fn force_resync(&self) {
        let mut kvt = self.lock();
        kvt.touch_all(Pending::ToUi);
        debug!("KVT resync queued {} parameters", kvt.pending_len(Pending::ToUi));
    }

    /// Periodic sync between the render and UI sides.
    ///
    /// Render→UI changes are delivered to `ui` until the queue is empty.
    /// UI→render edits are handed to `render` when a listener is installed,
    /// dumped to the log when `trace` is set, and committed in every case.
    pub fn sync(
        &self,
        ui: &mut dyn KvtObserver,
        mut render: Option<&mut dyn KvtObserver>,
        trace: bool,
    ) -> SyncOutcome {
        let Some(mut kvt) = self.try_lock() else {
            return SyncOutcome::Skipped;
        };

        let mut to_ui = 0;
        while let Some(change) = kvt.commit_next(Pending::ToUi) {
            if trace {
                dump_change("TX kvt param (DSP->UI)", &change);
            }
            deliver(ui, &change);
            to_ui += 1;
        }

        let mut to_render = 0;
        if trace || render.is_some() {
            while let Some(change) = kvt.commit_next(Pending::ToRender) {
                if trace {
                    dump_change("RX kvt param (UI->DSP)", &change);
                }
                if let Some(listener) = render.as_deref_mut() {
                    deliver(listener, &change);
                }
                to_render += 1;
            }
        } else {
            to_render = kvt.pending_len(Pending::ToRender);
            kvt.commit_all(Pending::ToRender);
        }

        kvt.gc();
        SyncOutcome::Synced { to_ui, to_render }
    }
}

fn deliver(observer: &mut dyn KvtObserver, change: &KvtChange) {
    match change {
        KvtChange::Set(name, value) => observer.kvt_write(name, value),
        KvtChange::Removed(name) => observer.kvt_remove(name),
    }
}

fn dump_change(prefix: &str, change: &KvtChange) {
    match change {
        KvtChange::Set(name, value) => trace!("{prefix}: {name} = {}", value.dump()),
        KvtChange::Removed(name) => trace!("{prefix}: {name} removed"),
    }
}
