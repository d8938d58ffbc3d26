//! These tests ensure that dropped futures correctly update the shared state
use cooked_waker::{IntoWaker, Wake, WakeRef};
use futures::{
    executor,
    future::{self, BoxFuture, FutureExt},
};
use machine_loader::{
    deduplicating, next_tick, CancelSignal, Loader, LoaderRules, Lookup, Outcome, UpstreamError,
};
use std::{
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

/// A Waker that does nothing. Used for when we're manually calling poll.
#[derive(Debug, Default, Copy, Clone, IntoWaker)]
struct NoOpWaker;

impl WakeRef for NoOpWaker {
    fn wake_by_ref(&self) {}
}

impl Wake for NoOpWaker {
    fn wake(self) {}
}

/// Puts each key in an Arc, so that tests can count how many copies of an
/// outcome are alive. Every key it was asked for is recorded. If `slow` is
/// set, each lookup yields once before answering.
#[derive(Debug, Default)]
struct ArcLookup {
    requested: Mutex<Vec<u32>>,
    slow: bool,
}

impl ArcLookup {
    fn slow() -> Self {
        ArcLookup {
            requested: Mutex::default(),
            slow: true,
        }
    }

    fn requested(&self) -> Vec<u32> {
        let mut requested = self.requested.lock().unwrap().clone();
        requested.sort_unstable();
        requested
    }
}

impl Lookup<u32> for ArcLookup {
    type Value = Arc<u32>;

    fn lookup<'a>(
        &'a self,
        key: &'a u32,
        _cancel: &'a CancelSignal,
    ) -> BoxFuture<'a, Result<Option<Arc<u32>>, UpstreamError>> {
        self.requested.lock().unwrap().push(*key);

        async move {
            if self.slow {
                next_tick().await;
            }

            Ok(Some(Arc::new(*key)))
        }
        .boxed()
    }
}

fn value<V>(outcome: Outcome<V>) -> V {
    match outcome {
        Outcome::Value(value) => value,
        Outcome::Missing => panic!("expected a value, got nothing"),
        Outcome::Failed(err) => panic!("expected a value, got {}", err),
    }
}

/// This test establishes a baseline behavior for our clone counters
#[test]
fn test_simple_drop_after_resolution() {
    let rules = LoaderRules::new(deduplicating::<u32, _>(
        Arc::new(ArcLookup::default()),
        CancelSignal::never(),
    ));
    let loader = Loader::new(&rules);

    let fut1 = loader.request(1);
    let fut2 = loader.request(1);
    let fut3 = loader.request(1);
    let fut4 = loader.request(1);

    let res1 = value(executor::block_on(fut1));

    // At this point, the shared outcome and our local fut1 outcome should
    // both have an Arc
    assert_eq!(Arc::strong_count(&res1), 2);

    // Resolving fut2 simply clones the underlying Arc
    let res2 = value(executor::block_on(fut2));
    assert_eq!(Arc::strong_count(&res2), 3);

    // Dropping this future shouldn't change anything
    drop(fut3);
    assert_eq!(Arc::strong_count(&res2), 3);

    // fut4 is the last caller, so it takes the shared outcome itself instead
    // of a clone.
    let res4 = value(executor::block_on(fut4));
    assert_eq!(Arc::strong_count(&res4), 3);

    drop(res1);
    drop(res2);
    assert_eq!(Arc::strong_count(&res4), 1);
}

/// Dropping every caller of a key while the tick is still buffering keeps
/// that key out of the upstream calls.
#[test]
fn test_drop_while_buffering() {
    let lookup = Arc::new(ArcLookup::default());
    let rules = LoaderRules::new(deduplicating::<u32, _>(lookup.clone(), CancelSignal::never()));
    let loader = Loader::new(&rules);

    let fut1 = loader.request(1);
    let fut2 = loader.request(2);
    let fut3 = loader.request(3);
    let fut2_again = loader.request(2);

    drop(fut2);
    drop(fut2_again);

    let (res1, res3) = executor::block_on(future::join(fut1, fut3));

    assert_eq!(*value(res1), 1);
    assert_eq!(*value(res3), 3);
    assert_eq!(lookup.requested(), [1, 3]);
}

/// Dropping one caller of a key keeps the key in the tick for the others.
#[test]
fn test_drop_one_duplicate_while_buffering() {
    let lookup = Arc::new(ArcLookup::default());
    let rules = LoaderRules::new(deduplicating::<u32, _>(lookup.clone(), CancelSignal::never()));
    let loader = Loader::new(&rules);

    let fut1 = loader.request(1);
    let fut1_again = loader.request(1);

    drop(fut1);

    let res = value(executor::block_on(fut1_again));

    // Only one caller was left, so it owns the outcome outright.
    assert_eq!(Arc::strong_count(&res), 1);
    assert_eq!(lookup.requested(), [1]);
}

/// A caller dropped while its key is in flight has its outcome discarded as
/// soon as the tick resolves.
#[test]
fn test_drop_while_dispatching() {
    let lookup = Arc::new(ArcLookup::slow());
    let rules = LoaderRules::new(deduplicating::<u32, _>(lookup.clone(), CancelSignal::never()));
    let loader = Loader::new(&rules);

    let mut fut1 = loader.request(1);
    let fut1_again = loader.request(1);
    let fut2 = loader.request(2);

    let waker = NoOpWaker.into_waker();
    let mut ctx = Context::from_waker(&waker);

    // Close the window and start the lookups, which yield once.
    assert!(fut1.poll_unpin(&mut ctx).is_pending());
    assert!(fut1.poll_unpin(&mut ctx).is_pending());
    assert_eq!(lookup.requested(), [1, 2]);

    drop(fut1_again);

    let res1 = match fut1.poll_unpin(&mut ctx) {
        Poll::Ready(outcome) => value(outcome),
        Poll::Pending => panic!("lookups should have finished"),
    };

    // The dropped duplicate's share was discarded, so there's no copy left
    // in the tick.
    assert_eq!(Arc::strong_count(&res1), 1);

    let res2 = value(executor::block_on(fut2));
    assert_eq!(*res2, 2);
}

/// A caller that is dropped unpolled after its tick resolved just discards
/// its outcome; the next request opens a fresh tick.
#[test]
fn test_drop_after_resolution_without_polling() {
    let rules = LoaderRules::new(deduplicating::<u32, _>(
        Arc::new(ArcLookup::default()),
        CancelSignal::never(),
    ));
    let loader = Loader::new(&rules);

    let fut1 = loader.request(1);
    let fut2 = loader.request(2);

    let res1 = value(executor::block_on(fut1));
    assert_eq!(Arc::strong_count(&res1), 1);

    drop(fut2);

    // A fresh tick opens for the next request.
    let res2 = value(executor::block_on(loader.request(2)));
    assert_eq!(*res2, 2);
}
