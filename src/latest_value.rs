use std::{cell::RefCell, fmt::Debug};

use crate::listeners::{Listeners, Subscription};

/// Holds the most recent value and replays it to every new subscriber.
pub struct LatestValue<T> {
    value: RefCell<Option<T>>,
    listeners: Listeners<T>,
}

impl<T> Default for LatestValue<T> {
    fn default() -> Self {
        Self {
            value: RefCell::new(None),
            listeners: Listeners::default(),
        }
    }
}

impl<T: Debug + 'static> Debug for LatestValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestValue")
            .field("value", &self.value.borrow())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl<T: Clone + 'static> LatestValue<T> {
    pub fn get(&self) -> Option<T> {
        self.value.borrow().clone()
    }

    /// Store `value` and notify all subscribers.
    pub fn set(&self, value: T) {
        *self.value.borrow_mut() = Some(value.clone());
        self.listeners.notify(&value);
    }

    /// Forget the current value. Subscribers stay registered and are not notified.
    pub fn clear(&self) {
        self.value.borrow_mut().take();
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Receive all future values. Should a value be present, `listener` is called with it
    /// immediately.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        if let Some(current) = self.get() {
            listener(&current);
        }
        self.listeners.add(listener)
    }
}
