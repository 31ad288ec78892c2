use crossbeam_channel::{Receiver, RecvError, TryRecvError};

/// The element type of the channel behind a [`Done`] handle.
///
/// It has no values, so nothing can ever be received from the channel. A receive only completes
/// once the channel is disconnected, which happens exactly when the flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Never {}

/// A handle that becomes ready, permanently, once its [`Flag`](crate::Flag) is set.
///
/// All handles obtained from the same flag share a single channel, no matter whether they were
/// obtained before or after the flag was set.
#[derive(Debug, Clone)]
pub struct Done {
    rx: Receiver<Never>,
}

impl Done {
    pub(crate) fn new(rx: Receiver<Never>) -> Self {
        Self { rx }
    }

    /// Returns `true` if the flag has been set. Never blocks.
    pub fn is_ready(&self) -> bool {
        match self.rx.try_recv() {
            Ok(never) => match never {},
            Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => false,
        }
    }

    /// Blocks the current thread until the flag is set.
    ///
    /// Returns immediately if the flag has been set already.
    pub fn wait(&self) {
        match self.rx.recv() {
            Ok(never) => match never {},
            Err(RecvError) => {}
        }
    }

    /// The channel underlying this handle, for use in [`crossbeam_channel::select!`].
    ///
    /// A `recv` operation on it completes with `Err(RecvError)` once the flag is set. This is the
    /// way to bound a wait: select on this receiver alongside a timer such as
    /// [`crossbeam_channel::after`] or a `default(timeout)` arm.
    pub fn receiver(&self) -> &Receiver<Never> {
        &self.rx
    }
}
