//! Query cancellation. A [`CancelHandle`] is held by whoever owns the
//! top-level query; every loader and upstream call gets a clone of the
//! matching [`CancelSignal`].

use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    channel::oneshot,
    future::{FutureExt, Shared},
};

/// Create a linked handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = oneshot::channel();

    (
        CancelHandle { sender },
        CancelSignal {
            receiver: receiver.shared(),
        },
    )
}

/// The cancelling side. Dropping the handle without calling
/// [`cancel`][CancelHandle::cancel] means the query can no longer be
/// cancelled; it does not cancel it.
#[derive(Debug)]
pub struct CancelHandle {
    sender: oneshot::Sender<()>,
}

impl CancelHandle {
    pub fn cancel(self) {
        // The only error is "every signal was dropped", in which case there
        // is nobody left to tell.
        let _ = self.sender.send(());
    }
}

#[derive(Clone)]
pub struct CancelSignal {
    receiver: Shared<oneshot::Receiver<()>>,
}

impl Debug for CancelSignal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_handle, signal) = cancel_pair();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.receiver.clone().now_or_never(), Some(Ok(())))
    }

    /// A future that completes when the query is cancelled, and never
    /// completes otherwise.
    pub fn cancelled(&self) -> Cancelled {
        Cancelled {
            receiver: Some(self.receiver.clone()),
        }
    }
}

#[must_use = "futures do nothing unless polled"]
pub struct Cancelled {
    // Cleared once the handle is dropped without cancelling; a Shared must
    // not be polled again after it completes.
    receiver: Option<Shared<oneshot::Receiver<()>>>,
}

impl Debug for Cancelled {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancelled")
            .field("live", &self.receiver.is_some())
            .finish()
    }
}

impl Future for Cancelled {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<()> {
        let receiver = match self.receiver.as_mut() {
            Some(receiver) => receiver,
            None => return Poll::Pending,
        };

        match receiver.poll_unpin(ctx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => Poll::Ready(()),
            Poll::Ready(Err(oneshot::Canceled)) => {
                self.receiver = None;
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_observes_cancel() {
        let (handle, signal) = cancel_pair();
        let other = signal.clone();

        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());
        assert!(other.is_cancelled());
        assert_eq!(other.cancelled().now_or_never(), Some(()));
    }

    #[test]
    fn dropped_handle_never_cancels() {
        let (handle, signal) = cancel_pair();
        drop(handle);

        assert!(!signal.is_cancelled());

        let mut cancelled = signal.cancelled();
        assert_eq!((&mut cancelled).now_or_never(), None);
        assert_eq!((&mut cancelled).now_or_never(), None);
    }

    #[test]
    fn never_is_never_cancelled() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        assert_eq!(signal.cancelled().now_or_never(), None);
    }
}
