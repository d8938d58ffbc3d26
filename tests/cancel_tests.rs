//! These tests ensure that cancelling a query resolves every pending caller
//! with a cancellation, whether the tick was still buffering or already
//! waiting on the upstream.

use cooked_waker::{IntoWaker, Wake, WakeRef};
use futures::{
    executor,
    future::{self, BoxFuture, FutureExt},
};
use machine_loader::{
    cancel_pair, coalescing, deduplicating, CancelSignal, ColumnBatch, ColumnKey, ColumnValues,
    Fetch, LoadError, Loader, LoaderRules, Lookup, Outcome, TimeRange, UpstreamError,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
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

/// Answers every column with 1.0, or never answers at all if `hang` is set.
#[derive(Debug, Default)]
struct SnapshotClient {
    calls: AtomicUsize,
    hang: bool,
}

impl SnapshotClient {
    fn hanging() -> Self {
        SnapshotClient {
            calls: AtomicUsize::new(0),
            hang: true,
        }
    }
}

impl Fetch<ColumnValues<f64>> for SnapshotClient {
    fn fetch<'a>(
        &'a self,
        batch: &'a ColumnBatch,
        _cancel: &'a CancelSignal,
    ) -> BoxFuture<'a, Result<HashMap<String, f64>, UpstreamError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.hang {
            return future::pending().boxed();
        }

        let values = batch
            .column_ids()
            .iter()
            .map(|column| (column.clone(), 1.0))
            .collect();

        future::ready(Ok(values)).boxed()
    }
}

fn speed(machine: &str) -> ColumnKey {
    ColumnKey::new(machine, "speed", vec![TimeRange::new(0, 1000)])
}

/// A query cancelled before its tick closes sends nothing upstream.
#[test]
fn test_cancel_before_dispatch() {
    let client = Arc::new(SnapshotClient::default());
    let (handle, signal) = cancel_pair();
    let rules = LoaderRules::new(coalescing::<ColumnValues<f64>, _>(client.clone(), signal));
    let loader = Loader::new(&rules);

    let fut1 = loader.request(speed("press-1"));
    let fut2 = loader.request(speed("press-2"));

    handle.cancel();

    let (res1, res2) = executor::block_on(future::join(fut1, fut2));

    assert_eq!(res1, Outcome::Failed(LoadError::Cancelled));
    assert_eq!(res2, Outcome::Failed(LoadError::Cancelled));
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

/// Calls in flight when the query is cancelled are abandoned, and their keys
/// resolve as cancelled rather than waiting forever.
#[test]
fn test_cancel_during_dispatch() {
    let client = Arc::new(SnapshotClient::hanging());
    let (handle, signal) = cancel_pair();
    let rules = LoaderRules::new(coalescing::<ColumnValues<f64>, _>(client.clone(), signal));
    let loader = Loader::new(&rules);

    let mut fut1 = loader.request(speed("press-1"));
    let mut fut2 = loader.request(speed("press-2"));

    let waker = NoOpWaker.into_waker();
    let mut ctx = Context::from_waker(&waker);

    // The first poll opens the window; the second closes it and dispatches
    // both batches, which never answer.
    assert_eq!(fut1.poll_unpin(&mut ctx), Poll::Pending);
    assert_eq!(fut1.poll_unpin(&mut ctx), Poll::Pending);
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    assert_eq!(fut1.poll_unpin(&mut ctx), Poll::Pending);

    handle.cancel();

    assert_eq!(
        fut1.poll_unpin(&mut ctx),
        Poll::Ready(Outcome::Failed(LoadError::Cancelled))
    );
    assert_eq!(
        fut2.poll_unpin(&mut ctx),
        Poll::Ready(Outcome::Failed(LoadError::Cancelled))
    );
}

/// Dropping the handle without cancelling leaves the query running.
#[test]
fn test_dropped_handle_does_not_cancel() {
    let client = Arc::new(SnapshotClient::default());
    let (handle, signal) = cancel_pair();
    let rules = LoaderRules::new(coalescing::<ColumnValues<f64>, _>(client.clone(), signal));
    let loader = Loader::new(&rules);

    let fut = loader.request(speed("press-1"));
    drop(handle);

    assert_eq!(executor::block_on(fut), Outcome::Value(1.0));
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
}

/// A lookup that never answers.
#[derive(Debug)]
struct HangingLookup;

impl Lookup<u32> for HangingLookup {
    type Value = u32;

    fn lookup<'a>(
        &'a self,
        _key: &'a u32,
        _cancel: &'a CancelSignal,
    ) -> BoxFuture<'a, Result<Option<u32>, UpstreamError>> {
        future::pending().boxed()
    }
}

#[test]
fn test_cancel_deduplicating_loader() {
    let (handle, signal) = cancel_pair();
    let rules = LoaderRules::new(deduplicating::<u32, _>(Arc::new(HangingLookup), signal));
    let loader = Loader::new(&rules);

    let mut fut1 = loader.request(1);
    let fut2 = loader.request(1);
    let fut3 = loader.request(2);

    let waker = NoOpWaker.into_waker();
    let mut ctx = Context::from_waker(&waker);

    assert_eq!(fut1.poll_unpin(&mut ctx), Poll::Pending);
    assert_eq!(fut1.poll_unpin(&mut ctx), Poll::Pending);

    handle.cancel();

    for mut fut in vec![fut1, fut2, fut3] {
        assert_eq!(
            fut.poll_unpin(&mut ctx),
            Poll::Ready(Outcome::Failed(LoadError::Cancelled))
        );
    }
}
