use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use futures_util::future::LocalBoxFuture;

use crate::{
    runtime::{Runtime, ScheduledTimeout},
    session::{SessionVersion, VersionCounter},
};

/// Performs a refresh. Resolves to the remaining lifetime (in seconds) of the newly obtained
/// token, or `None` if no new token was obtained.
pub type RefreshFn = Rc<dyn Fn() -> LocalBoxFuture<'static, Option<i64>>>;

/// Decides when a token with a given remaining lifetime should be refreshed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshPolicy {
    /// Upper bound for the remaining lifetime taken into account.
    pub ceiling: Duration,

    /// Share of the (capped) remaining lifetime to wait for.
    pub factor: f64,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            ceiling: Duration::from_secs(600),
            factor: 0.9,
        }
    }
}

impl RefreshPolicy {
    /// `round(min(remaining, ceiling) * factor)` seconds. Zero for already expired tokens.
    pub fn delay_for(&self, remaining_seconds: i64) -> Duration {
        let ceiling = i64::try_from(self.ceiling.as_secs()).unwrap_or(i64::MAX);
        let seconds = (remaining_seconds.min(ceiling) as f64 * self.factor).round();
        if seconds.is_nan() || seconds <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs(seconds as u64)
    }
}

/// Keeps at most one refresh timer alive.
///
/// Arming an already armed scheduler is a no-op. Once a timer fires, the refresh runs and,
/// if it yields a new token lifetime, the scheduler re-arms itself.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Rc<Inner>,
}

struct Inner {
    runtime: Rc<dyn Runtime>,
    policy: RefreshPolicy,
    armed: Cell<bool>,
    pending: RefCell<Option<Box<dyn ScheduledTimeout>>>,

    /// Incremented on every cancellation, invalidating fired timers and running refreshes.
    generation: VersionCounter,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("policy", &self.inner.policy)
            .field("armed", &self.inner.armed.get())
            .finish()
    }
}

impl RefreshScheduler {
    pub fn new(runtime: Rc<dyn Runtime>, policy: RefreshPolicy) -> Self {
        Self {
            inner: Rc::new(Inner {
                runtime,
                policy,
                armed: Cell::new(false),
                pending: RefCell::new(None),
                generation: VersionCounter::default(),
            }),
        }
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.inner.policy
    }

    pub fn is_armed(&self) -> bool {
        self.inner.armed.get()
    }

    /// Schedule `refresh` for a token expiring in `remaining_seconds`.
    ///
    /// Returns `false` if a refresh was already scheduled (or running) or the runtime refused
    /// to schedule the timeout.
    pub fn arm(&self, remaining_seconds: i64, refresh: RefreshFn) -> bool {
        if self.inner.armed.get() {
            tracing::trace!("Refresh already scheduled.");
            return false;
        }

        let delay = self.inner.policy.delay_for(remaining_seconds);
        let generation = self.inner.generation.current();
        let weak = Rc::downgrade(&self.inner);
        let callback = Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.generation.is_current(generation) {
                tracing::trace!("Ignoring timeout of a cancelled refresh.");
                return;
            }
            inner.pending.borrow_mut().take();
            let runtime = inner.runtime.clone();
            let scheduler = RefreshScheduler { inner };
            runtime.spawn_local(Box::pin(async move {
                tracing::trace!("Performing scheduled refresh.");
                let next = refresh().await;
                scheduler.on_refresh_completed(generation, next, refresh);
            }));
        });

        tracing::debug!(?delay, remaining_seconds, "Scheduling token refresh.");
        self.inner.armed.set(true);
        match self.inner.runtime.set_timeout(delay, callback) {
            Some(handle) => {
                *self.inner.pending.borrow_mut() = Some(handle);
                true
            }
            None => {
                self.inner.armed.set(false);
                false
            }
        }
    }

    /// Drop any scheduled refresh. A refresh currently running will not re-arm.
    pub fn cancel(&self) {
        let pending = self.inner.pending.borrow_mut().take();
        if let Some(pending) = pending {
            tracing::trace!("Clearing scheduled refresh.");
            pending.clear();
        }
        self.inner.armed.set(false);
        self.inner.generation.increment();
    }

    fn on_refresh_completed(
        &self,
        generation: SessionVersion,
        next_remaining_seconds: Option<i64>,
        refresh: RefreshFn,
    ) {
        if !self.inner.generation.is_current(generation) {
            tracing::trace!("Scheduler was cancelled during refresh. Not re-arming.");
            return;
        }
        self.inner.armed.set(false);
        if let Some(remaining_seconds) = next_remaining_seconds {
            self.arm(remaining_seconds, refresh);
        }
    }
}
