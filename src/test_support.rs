use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    time::Duration,
};

use futures_util::future::LocalBoxFuture;

use crate::{
    broadcaster::{AuthEvent, Broadcaster, Topic},
    identity::{IdentityEvent, IdentityListener, IdentityProvider, LoginOptions, LogoutOptions},
    listeners::Subscription,
    runtime::{Runtime, ScheduledTimeout},
};

struct Timer {
    delay: Duration,
    callback: Option<Box<dyn FnOnce()>>,
    cleared: Rc<Cell<bool>>,
}

struct ManualTimeout(Rc<Cell<bool>>);

impl ScheduledTimeout for ManualTimeout {
    fn clear(&self) {
        self.0.set(true);
    }
}

/// Runtime whose timers only fire when told to and whose tasks only run when awaited.
#[derive(Default)]
pub(crate) struct ManualRuntime {
    timers: RefCell<Vec<Timer>>,
    tasks: RefCell<VecDeque<LocalBoxFuture<'static, ()>>>,
}

impl ManualRuntime {
    /// Delays of all timers ever scheduled.
    pub(crate) fn scheduled_delays(&self) -> Vec<Duration> {
        self.timers.borrow().iter().map(|timer| timer.delay).collect()
    }

    /// Delays of timers neither fired nor cleared.
    pub(crate) fn pending_delays(&self) -> Vec<Duration> {
        self.timers
            .borrow()
            .iter()
            .filter(|timer| timer.callback.is_some() && !timer.cleared.get())
            .map(|timer| timer.delay)
            .collect()
    }

    /// Fire the oldest pending timer. Returns `false` if there was none.
    pub(crate) fn fire_next(&self) -> bool {
        let callback = self
            .timers
            .borrow_mut()
            .iter_mut()
            .find(|timer| timer.callback.is_some() && !timer.cleared.get())
            .and_then(|timer| timer.callback.take());
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Run spawned tasks, including tasks spawned by them, until none are left.
    pub(crate) async fn run_tasks(&self) {
        loop {
            let task = self.tasks.borrow_mut().pop_front();
            match task {
                Some(task) => task.await,
                None => break,
            }
        }
    }
}

impl Runtime for ManualRuntime {
    fn set_timeout(
        &self,
        delay: Duration,
        callback: Box<dyn FnOnce()>,
    ) -> Option<Box<dyn ScheduledTimeout>> {
        let cleared = Rc::new(Cell::new(false));
        self.timers.borrow_mut().push(Timer {
            delay,
            callback: Some(callback),
            cleared: cleared.clone(),
        });
        Some(Box::new(ManualTimeout(cleared)))
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        self.tasks.borrow_mut().push_back(task);
    }
}

/// Identity provider driven by the test.
#[derive(Default)]
pub(crate) struct FakeIdentityProvider {
    listener: RefCell<Option<IdentityListener>>,
    pub(crate) logins: RefCell<Vec<LoginOptions>>,
    pub(crate) logouts: Cell<usize>,
}

impl FakeIdentityProvider {
    pub(crate) fn emit(&self, event: IdentityEvent) {
        let listener = self.listener.borrow().clone();
        match listener {
            Some(listener) => listener(event),
            None => panic!("identity provider was not initialized"),
        }
    }
}

impl IdentityProvider for FakeIdentityProvider {
    fn init(&self, listener: IdentityListener) {
        *self.listener.borrow_mut() = Some(listener);
    }

    fn login(&self, options: &LoginOptions) {
        self.logins.borrow_mut().push(options.clone());
    }

    fn logout(&self, _options: &LogoutOptions) {
        self.logouts.set(self.logouts.get() + 1);
    }
}

/// Records every broadcast event.
pub(crate) struct EventLog {
    events: Rc<RefCell<Vec<AuthEvent>>>,
    _subscriptions: Vec<Subscription>,
}

impl EventLog {
    pub(crate) fn attach(broadcaster: &Broadcaster) -> Self {
        let events = Rc::new(RefCell::new(Vec::new()));
        let subscriptions = Topic::ALL
            .iter()
            .map(|topic| {
                let events = events.clone();
                broadcaster.on(*topic, move |event| events.borrow_mut().push(event.clone()))
            })
            .collect();
        Self {
            events,
            _subscriptions: subscriptions,
        }
    }

    pub(crate) fn events(&self) -> Vec<AuthEvent> {
        self.events.borrow().clone()
    }

    pub(crate) fn count(&self, topic: Topic) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.topic() == topic)
            .count()
    }
}

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}
