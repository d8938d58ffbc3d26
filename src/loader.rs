use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    hash::Hash,
    mem,
    pin::Pin,
    sync::{Arc, Mutex, Weak},
    task::{Context, Poll},
};

use arc_swap::ArcSwapWeak;
use tracing::trace;

use crate::{
    data::{KeySet, Token as KeyToken, ValueSet},
    outcome::{LoadError, Outcome},
    rules::LoaderRules,
    waiters::{WaiterId, Waiters},
};

/// The result of a whole tick: every key's outcome, or one failure shared by
/// every caller of the tick.
pub type TickResult<Value> = Result<ValueSet<Outcome<Value>>, LoadError>;

struct Buffering<'a, Key: Eq + Hash, Batcher, Window> {
    keys: KeySet<Key>,
    batcher: &'a Batcher,
    window: Window,
    waiters: Waiters,
}

impl<'a, Key, Batcher, Window> Debug for Buffering<'a, Key, Batcher, Window>
where
    Key: Debug + Eq + Hash,
    Window: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffering")
            .field("keys", &self.keys)
            .field("batcher", &"<closure>")
            .field("window", &self.window)
            .field("waiters", &self.waiters)
            .finish()
    }
}

struct Dispatching<Fut> {
    fut: Fut,
    waiters: Waiters,
    // Callers that went away while the tick was in flight. Their outcomes
    // are discarded as soon as the tick resolves.
    abandoned: Vec<KeyToken>,
}

/// One tick: buffering keys until its window closes, then running the tick
/// function once, then holding the outcomes until every caller has taken
/// theirs.
enum Tick<'a, Key: Eq + Hash, Value, Fut, Batcher, Window> {
    Buffering(Buffering<'a, Key, Batcher, Window>),
    Dispatching(Dispatching<Fut>),
    Resolved(TickResult<Value>),
}

type SharedTick<'a, Key, Value, Fut, Batcher, Window> =
    Arc<Mutex<Tick<'a, Key, Value, Fut, Batcher, Window>>>;

/// The coordination layer. A `Loader` hands each caller a
/// [`PendingOutcome`] for its key, and groups every key requested during one
/// tick into a single run of the tick function from its [`LoaderRules`].
///
/// A tick opens on the first request after the previous tick stopped
/// buffering, and stops buffering once its window future completes. Keys are
/// added when [`request`][Loader::request] is called, not when the returned
/// future is first polled, so everything requested before any caller awaits
/// lands in the same tick.
///
/// The loader only keeps a weak pointer to the buffering tick. The tick
/// itself is owned by its callers, and is freed once all of them have their
/// outcome or have gone away; nothing carries over from one tick to the
/// next.
pub struct Loader<'a, Key: Eq + Hash, Value, Fut, Batcher, Window, Windower> {
    rules: &'a LoaderRules<Batcher, Windower>,

    #[allow(clippy::type_complexity)]
    current: ArcSwapWeak<Mutex<Tick<'a, Key, Value, Fut, Batcher, Window>>>,
}

impl<'a, Key, Value, Fut, Batcher, Window, Windower> Debug
    for Loader<'a, Key, Value, Fut, Batcher, Window, Windower>
where
    Key: Eq + Hash,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("buffering", &self.current.load().upgrade().is_some())
            .finish()
    }
}

impl<'a, Key, Value, Fut, Batcher, Window, Windower>
    Loader<'a, Key, Value, Fut, Batcher, Window, Windower>
where
    Key: Eq + Hash,
    Value: Clone,
    Batcher: Fn(KeySet<Key>) -> Fut,
    Fut: Future<Output = TickResult<Value>> + Unpin,
    Windower: Fn() -> Window,
    Window: Future<Output = ()> + Unpin,
{
    pub fn new(rules: &'a LoaderRules<Batcher, Windower>) -> Self {
        Self {
            rules,
            current: ArcSwapWeak::new(Weak::new()),
        }
    }

    /// Request the outcome for `key`. The key joins the buffering tick, or
    /// opens a new one if no tick is buffering.
    pub fn request(&self, key: Key) -> PendingOutcome<'a, Key, Value, Fut, Batcher, Window> {
        loop {
            let current = self.current.load_full();

            // Join the current tick if it's still buffering. A poisoned tick
            // is treated like a finished one.
            if let Some(tick) = current.upgrade() {
                let mut lock_result = tick.lock();
                if let Ok(ref mut guard) = lock_result {
                    if let Tick::Buffering(ref mut buffering) = **guard {
                        let key_token = buffering.keys.add_key(key);
                        drop(lock_result);
                        return PendingOutcome::new(key_token, tick);
                    }
                }
            }

            // Open a new tick. It stays locked until our key is in it, so
            // that no other caller can close its window first.
            let tick = Arc::new(Mutex::new(Tick::Buffering(Buffering {
                keys: KeySet::new(),
                batcher: &self.rules.batcher,
                window: (self.rules.window)(),
                waiters: Waiters::default(),
            })));
            let mut lock_result = tick.lock();

            let previous = self
                .current
                .compare_and_swap(&current, Arc::downgrade(&tick));

            if Weak::ptr_eq(&*previous, &current) {
                if let Ok(ref mut guard) = lock_result {
                    if let Tick::Buffering(ref mut buffering) = **guard {
                        trace!("opened a new tick");
                        let key_token = buffering.keys.add_key(key);
                        drop(lock_result);
                        return PendingOutcome::new(key_token, tick);
                    }
                }

                unreachable!("a freshly opened tick is always buffering");
            }

            // Another caller opened a tick first; join theirs instead.
        }
    }
}

/// A caller's pending outcome for one key. Resolves once the tick its key
/// was buffered in has run.
///
/// Polling is what drives the tick: there is no background task. The first
/// pending caller to poll drives the tick's window and its tick function;
/// the rest are woken only when outcomes are ready, or when the driving
/// caller is dropped and one of them has to take over. Because later
/// callers never poll the window, a caller that requests its key while
/// being polled still lands in the tick its siblings opened.
pub struct PendingOutcome<'a, Key: Eq + Hash, Value, Fut, Batcher, Window> {
    key_token: Option<KeyToken>,
    waiter: Option<WaiterId>,
    tick: Option<SharedTick<'a, Key, Value, Fut, Batcher, Window>>,
}

impl<'a, Key, Value, Fut, Batcher, Window> PendingOutcome<'a, Key, Value, Fut, Batcher, Window>
where
    Key: Eq + Hash,
{
    fn new(key_token: KeyToken, tick: SharedTick<'a, Key, Value, Fut, Batcher, Window>) -> Self {
        Self {
            key_token: Some(key_token),
            waiter: None,
            tick: Some(tick),
        }
    }
}

impl<'a, Key, Value, Fut, Batcher, Window> Debug
    for PendingOutcome<'a, Key, Value, Fut, Batcher, Window>
where
    Key: Eq + Hash,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOutcome")
            .field("key_token", &self.key_token)
            .field("waiter", &self.waiter)
            .field("resolved", &self.tick.is_none())
            .finish()
    }
}

impl<'a, Key, Value, Fut, Batcher, Window> Future
    for PendingOutcome<'a, Key, Value, Fut, Batcher, Window>
where
    Key: Eq + Hash,
    Value: Clone,
    Batcher: Fn(KeySet<Key>) -> Fut,
    Fut: Future<Output = TickResult<Value>> + Unpin,
    Window: Future<Output = ()> + Unpin,
{
    type Output = Outcome<Value>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Outcome<Value>> {
        let this = Pin::into_inner(self);

        // The lock is only held for the duration of one poll, never across
        // an await.
        let mut guard = this
            .tick
            .as_ref()
            .expect("PendingOutcome polled after it resolved")
            .lock()
            // If a different caller panicked while driving this tick, the
            // mutex is poisoned, and the panic propagates to every caller.
            .expect("tick poisoned by a panic in another caller");

        // Only the driver polls the window and the tick function; everyone
        // else just leaves a waker and waits to be told the outcome is ready.
        let driving = match *guard {
            Tick::Buffering(ref mut buffering) => {
                buffering.waiters.upsert(&mut this.waiter, ctx.waker())
            }
            Tick::Dispatching(ref mut dispatching) => {
                dispatching.waiters.upsert(&mut this.waiter, ctx.waker())
            }
            Tick::Resolved(..) => true,
        };

        if !driving {
            return Poll::Pending;
        }

        if let Tick::Buffering(ref mut buffering) = *guard {
            if Pin::new(&mut buffering.window).poll(ctx).is_pending() {
                return Poll::Pending;
            }

            let waiters = mem::take(&mut buffering.waiters);
            let keys = buffering.keys.take();
            trace!(keys = keys.len(), "window closed");
            let fut = (buffering.batcher)(keys);

            *guard = Tick::Dispatching(Dispatching {
                fut,
                waiters,
                abandoned: Vec::new(),
            });
        }

        if let Tick::Dispatching(ref mut dispatching) = *guard {
            let mut result = match Pin::new(&mut dispatching.fut).poll(ctx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(result) => result,
            };

            if let Ok(values) = &mut result {
                dispatching
                    .abandoned
                    .drain(..)
                    .for_each(|token| values.discard(token));
            }

            // We're about to take our own outcome, so only wake the others.
            mem::take(&mut dispatching.waiters).wake_all_except(this.waiter.take().as_ref());
            trace!(failed = result.is_err(), "tick resolved");

            *guard = Tick::Resolved(result);
        }

        let outcome = match *guard {
            Tick::Resolved(Ok(ref mut values)) => {
                this.key_token.take().and_then(|token| values.take(token))
            }
            Tick::Resolved(Err(ref err)) => Some(Outcome::Failed(err.clone())),
            _ => None,
        };

        // Release the lock before panicking so the other callers aren't
        // poisoned by this one.
        drop(guard);
        this.tick = None;

        match outcome {
            Some(outcome) => Poll::Ready(outcome),
            None => panic!("tick resolved without an outcome for a buffered key"),
        }
    }
}

impl<'a, Key, Value, Fut, Batcher, Window> Drop
    for PendingOutcome<'a, Key, Value, Fut, Batcher, Window>
where
    Key: Eq + Hash,
{
    fn drop(&mut self) {
        // A dropped caller might have been the one driving the tick, so the
        // waiters are told to hand off to someone else. Its key is also
        // withdrawn: before dispatch it is removed from the key set, during
        // dispatch its outcome is discarded on arrival, and after dispatch
        // the outcome is discarded right away.
        //
        // Nothing is cleaned up if the tick is poisoned; the panic already
        // reached (or will reach) every other caller.
        let tick = match self.tick.take() {
            Some(tick) => tick,
            None => return,
        };

        let mut guard = match tick.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };

        match *guard {
            Tick::Buffering(ref mut buffering) => {
                if let Some(waiter) = self.waiter.take() {
                    buffering.waiters.retire(waiter);
                }
                if let Some(token) = self.key_token.take() {
                    buffering.keys.discard_token(token);
                }
            }
            Tick::Dispatching(ref mut dispatching) => {
                if let Some(waiter) = self.waiter.take() {
                    dispatching.waiters.retire(waiter);
                }
                if let Some(token) = self.key_token.take() {
                    dispatching.abandoned.push(token);
                }
            }
            Tick::Resolved(Ok(ref mut values)) => {
                if let Some(token) = self.key_token.take() {
                    values.discard(token);
                }
            }
            Tick::Resolved(Err(..)) => {}
        }
    }
}
