//! Loader configuration, and the tick functions behind the two loader
//! shapes.
//!
//! A [`LoaderRules`] pairs a tick function (called once per tick with every
//! unique key buffered in it) with a window (a future that decides how long
//! a tick buffers). Two tick functions are provided:
//!
//! - [`coalescing`] is the batch loader. It groups the tick's keys into
//!   batches, calls the upstream once per batch, and demultiplexes the
//!   responses back to each key. Used for the column, limited column,
//!   grouped-sum and metadata families.
//! - [`deduplicating`] is the cache loader. Every unique key is its own
//!   upstream call; identical keys in one tick share that call.

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures::future::{self, BoxFuture, Either, FutureExt};
use futures_timer::Delay;
use tracing::{debug, warn};

use crate::{
    cancel::CancelSignal,
    data::KeySet,
    demux::demultiplex,
    dispatch::dispatch,
    family::{Family, Fetch},
    group::group_keys,
    loader::TickResult,
    outcome::{LoadError, Outcome, UpstreamError},
};

/// The future returned by the tick functions in this module.
pub type TickFuture<Value> = BoxFuture<'static, TickResult<Value>>;

/// Configuration for a [`Loader`][crate::Loader]. The loader borrows its
/// rules, so they have to outlive it.
#[derive(Debug, Clone, Default)]
pub struct LoaderRules<Batcher, Windower> {
    /// Called once per tick with the tick's unique keys.
    pub batcher: Batcher,

    /// Called when a tick opens. The tick buffers keys until the returned
    /// future completes.
    pub window: Windower,
}

impl<Batcher> LoaderRules<Batcher, fn() -> NextTick> {
    /// Rules with the default window, [`next_tick`].
    pub fn new(batcher: Batcher) -> Self {
        Self {
            batcher,
            window: next_tick,
        }
    }
}

impl<Batcher, Windower> LoaderRules<Batcher, Windower> {
    pub fn with_window<W>(self, window: W) -> LoaderRules<Batcher, W> {
        LoaderRules {
            batcher: self.batcher,
            window,
        }
    }
}

/// A window that yields to the executor exactly once. Only the caller
/// driving the tick polls it, so it closes on the driver's next poll: by
/// then every sibling polled in the same pass has requested its key.
pub fn next_tick() -> NextTick {
    NextTick { yielded: false }
}

#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct NextTick {
    yielded: bool,
}

impl Future for NextTick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            ctx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// A window that buffers for a fixed period after the tick opens.
pub fn debounce(period: Duration) -> impl Fn() -> Delay + Clone {
    move || Delay::new(period)
}

/// The batch loader tick function for family `F`.
///
/// If `cancel` has already fired when the tick closes, nothing is sent and
/// the whole tick fails with [`LoadError::Cancelled`].
pub fn coalescing<F, X>(
    fetcher: Arc<X>,
    cancel: CancelSignal,
) -> impl Fn(KeySet<F::Key>) -> TickFuture<F::Value>
where
    F: Family,
    X: Fetch<F> + Send + Sync + 'static,
{
    move |keys| {
        let fetcher = Arc::clone(&fetcher);
        let cancel = cancel.clone();

        async move { run_coalescing_tick::<F, X>(&*fetcher, keys, &cancel).await }.boxed()
    }
}

async fn run_coalescing_tick<F, X>(
    fetcher: &X,
    keys: KeySet<F::Key>,
    cancel: &CancelSignal,
) -> TickResult<F::Value>
where
    F: Family,
    X: Fetch<F> + ?Sized,
{
    if cancel.is_cancelled() {
        debug!(keys = keys.len(), "tick cancelled before dispatch");
        return Err(LoadError::Cancelled);
    }

    let batches: Vec<F::Batch> = group_keys(keys.keys());
    debug!(
        keys = keys.len(),
        batches = batches.len(),
        "dispatching coalesced tick"
    );

    let responses = dispatch::<F, X>(fetcher, batches, cancel).await;

    Ok(keys.into_values(|key| demultiplex::<F>(&responses, key)))
}

/// An upstream client answering one key per call, for the cache loader.
pub trait Lookup<Key> {
    type Value;

    /// Fetch `key`. `Ok(None)` means the upstream has no value for it, which
    /// is not an error.
    fn lookup<'a>(
        &'a self,
        key: &'a Key,
        cancel: &'a CancelSignal,
    ) -> BoxFuture<'a, Result<Option<Self::Value>, UpstreamError>>;
}

/// The cache loader tick function. Every unique key is looked up once, all
/// concurrently, and a failure only affects the key whose lookup failed.
pub fn deduplicating<Key, X>(
    fetcher: Arc<X>,
    cancel: CancelSignal,
) -> impl Fn(KeySet<Key>) -> TickFuture<X::Value>
where
    Key: Eq + Hash + Clone + Send + Sync + 'static,
    X: Lookup<Key> + Send + Sync + 'static,
    X::Value: Clone + Send + 'static,
{
    move |keys| {
        let fetcher = Arc::clone(&fetcher);
        let cancel = cancel.clone();

        async move { run_deduplicating_tick(&*fetcher, keys, &cancel).await }.boxed()
    }
}

async fn run_deduplicating_tick<Key, X>(
    fetcher: &X,
    keys: KeySet<Key>,
    cancel: &CancelSignal,
) -> TickResult<X::Value>
where
    Key: Eq + Hash + Clone,
    X: Lookup<Key> + ?Sized,
    X::Value: Clone,
{
    if cancel.is_cancelled() {
        debug!(keys = keys.len(), "tick cancelled before dispatch");
        return Err(LoadError::Cancelled);
    }

    let unique: Vec<Key> = keys.keys().into_iter().cloned().collect();
    debug!(keys = unique.len(), "dispatching deduplicated tick");

    let outcomes =
        future::join_all(unique.iter().map(|key| lookup_one(fetcher, key, cancel))).await;
    let mut outcomes: HashMap<Key, Outcome<X::Value>> = unique.into_iter().zip(outcomes).collect();

    Ok(keys.into_values(|key| {
        outcomes
            .remove(key)
            .expect("every buffered key was looked up")
    }))
}

async fn lookup_one<Key, X>(fetcher: &X, key: &Key, cancel: &CancelSignal) -> Outcome<X::Value>
where
    X: Lookup<Key> + ?Sized,
{
    match future::select(fetcher.lookup(key, cancel), cancel.cancelled()).await {
        Either::Left((Err(err), _)) => {
            warn!(error = %err, "lookup failed");
            Outcome::Failed(err.into())
        }
        Either::Left((found, _)) => found.into(),
        Either::Right(((), _)) => Outcome::Failed(LoadError::Cancelled),
    }
}
