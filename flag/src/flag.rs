use std::fmt;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::{Mutex, Once};

use crate::done::{Done, Never};

/// A concurrent-safe boolean value. It starts unset and once it has been set, it cannot be unset
/// again.
///
/// The flag owns the only sender of a channel that never carries a message. Setting the flag drops
/// that sender, which disconnects the channel. Both [`Self::is_set`] and every [`Done`] handle read
/// that one disconnection, so a poll and a wait can never disagree.
pub struct Flag {
    once: Once,
    tx: Mutex<Option<Sender<Never>>>,
    rx: Receiver<Never>,
}

impl Flag {
    /// Creates a new, unset flag.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        Flag {
            once: Once::new(),
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Sets the flag permanently.
    ///
    /// Setting an already set flag is safe but has no effect. Every thread waiting on a [`Done`]
    /// handle of this flag is released.
    pub fn set(&self) {
        self.try_set();
    }

    /// Sets the flag and returns `true` if this call is the one that performed the transition.
    ///
    /// When called concurrently from many threads exactly one of them gets `true`. The others wait
    /// until the transition is complete and then return `false`.
    pub fn try_set(&self) -> bool {
        let mut transitioned = false;
        self.once.call_once(|| {
            let tx = self.tx.lock().take();
            debug_assert!(tx.is_some(), "flag sender dropped twice");
            drop(tx);
            tracing::trace!("flag set");
            transitioned = true;
        });
        transitioned
    }

    /// Returns `true` if the flag is set or `false` otherwise. Never blocks.
    pub fn is_set(&self) -> bool {
        match self.rx.try_recv() {
            Ok(never) => match never {},
            Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => false,
        }
    }

    /// Returns a handle that becomes ready when the flag is set.
    ///
    /// Successive calls return handles to the same underlying channel. This never blocks; blocking
    /// happens only when the caller waits on the handle.
    pub fn done(&self) -> Done {
        Done::new(self.rx.clone())
    }

    /// Blocks the current thread until the flag is set.
    pub fn wait(&self) {
        self.done().wait()
    }
}

impl Default for Flag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flag").field("set", &self.is_set()).finish()
    }
}
