use std::{collections::HashMap, task::Waker};

/// A caller's registration in a [`Waiters`] set. Deliberately not `Clone`:
/// each pending caller owns exactly one.
#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) struct WaiterId(usize);

impl WaiterId {
    fn duplicate(&self) -> Self {
        WaiterId(self.0)
    }
}

/// The wakers of every caller waiting on one tick.
///
/// Only one caller drives a tick forward (polls its window, then its
/// upstream work); the others just wait for the outcome. The driver is the
/// first caller to poll, and it keeps driving until it goes away. Callers
/// arriving later never touch the window, so a window that yields once
/// closes only when the driver comes back around, after every sibling
/// queued in the same pass has added its key. If the driver goes away,
/// [`retire`][Waiters::retire] wakes a replacement so the tick is never left
/// without anyone polling it.
#[derive(Debug, Default)]
pub(crate) struct Waiters {
    wakers: HashMap<WaiterId, Waker>,
    driver: Option<WaiterId>,
    next_id: usize,
}

impl Waiters {
    /// Register a caller that has just polled the tick. It becomes the
    /// driver if nobody is driving yet.
    #[must_use]
    pub(crate) fn register(&mut self, waker: &Waker) -> WaiterId {
        let id = WaiterId(self.next_id);
        self.next_id += 1;

        self.wakers.insert(id.duplicate(), waker.clone());
        if self.driver.is_none() {
            self.driver = Some(id.duplicate());
        }
        id
    }

    /// Update a registered caller's waker after it polled again.
    ///
    /// Panics if the id is not in this set.
    pub(crate) fn refresh(&mut self, id: &WaiterId, waker: &Waker) {
        let slot = self
            .wakers
            .get_mut(id)
            .expect("refreshed a waiter that was never registered");

        if !slot.will_wake(waker) {
            slot.clone_from(waker);
        }
    }

    /// Register or refresh, depending on whether the caller already has an
    /// id. Returns true if the caller is the driver.
    pub(crate) fn upsert(&mut self, id: &mut Option<WaiterId>, waker: &Waker) -> bool {
        match id {
            Some(id) => self.refresh(id, waker),
            None => *id = Some(self.register(waker)),
        }

        self.driver == *id
    }

    /// Remove a caller that is going away before the tick finished. If it was
    /// driving (or nobody was), another caller is promoted and woken so it
    /// can pick up the work.
    pub(crate) fn retire(&mut self, id: WaiterId) {
        self.wakers.remove(&id);

        if self.driver.is_none() || self.driver.as_ref() == Some(&id) {
            self.driver = self.wakers.iter().next().map(|(next, waker)| {
                waker.wake_by_ref();
                next.duplicate()
            });
        }
    }

    /// Wake every caller except `skip`, which is about to collect its own
    /// outcome.
    pub(crate) fn wake_all_except(self, skip: Option<&WaiterId>) {
        self.wakers
            .into_iter()
            .filter(|(id, _waker)| Some(id) != skip)
            .for_each(|(_id, waker)| waker.wake());
    }

    #[cfg(test)]
    fn driver(&self) -> Option<&WaiterId> {
        self.driver.as_ref()
    }
}
