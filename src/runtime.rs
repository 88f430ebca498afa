use std::time::Duration;

use futures_util::future::LocalBoxFuture;

/// A timeout scheduled through a `Runtime`.
pub trait ScheduledTimeout {
    /// Cancel the timeout. Has no effect if it already fired.
    fn clear(&self);
}

/// Host capabilities required to drive token refreshes: one-shot timers and local tasks.
pub trait Runtime {
    /// Schedule `callback` to run once after `delay`.
    /// Returns `None` if the host refused to schedule the timeout.
    fn set_timeout(
        &self,
        delay: Duration,
        callback: Box<dyn FnOnce()>,
    ) -> Option<Box<dyn ScheduledTimeout>>;

    /// Run `task` to completion on the current thread.
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}

/// Runtime of a Leptos application running in the browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserRuntime;

struct BrowserTimeout(leptos::prelude::TimeoutHandle);

impl ScheduledTimeout for BrowserTimeout {
    fn clear(&self) {
        self.0.clear();
    }
}

impl Runtime for BrowserRuntime {
    fn set_timeout(
        &self,
        delay: Duration,
        callback: Box<dyn FnOnce()>,
    ) -> Option<Box<dyn ScheduledTimeout>> {
        match leptos::prelude::set_timeout_with_handle(callback, delay) {
            Ok(handle) => Some(Box::new(BrowserTimeout(handle))),
            Err(err) => {
                tracing::error!(?err, ?delay, "Could not schedule timeout.");
                None
            }
        }
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        leptos::task::spawn_local(task);
    }
}
