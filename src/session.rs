use std::cell::Cell;

/// Whether a user session exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    LoggedOut,
    LoggedIn,
}

/// Identifies one login (or logout) of the current page.
///
/// Async work remembers the version it started in and drops its result once the version moved
/// on. Only compared for equality, so wrapping on overflow is harmless.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SessionVersion(u64);

impl SessionVersion {
    pub(crate) const ZERO: SessionVersion = SessionVersion(0);

    pub fn increment(self) -> Self {
        SessionVersion(self.0.wrapping_add(1))
    }
}

impl Default for SessionVersion {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Shared, incrementable session version.
///
/// Incrementing creates a boundary that allows us to invalidate async operations (refreshes,
/// exchanges, scheduled timeouts) which originated from the previous version.
#[derive(Debug, Default)]
pub(crate) struct VersionCounter(Cell<SessionVersion>);

impl VersionCounter {
    pub(crate) fn current(&self) -> SessionVersion {
        self.0.get()
    }

    pub(crate) fn increment(&self) -> SessionVersion {
        let next = self.0.get().increment();
        self.0.set(next);
        next
    }

    pub(crate) fn is_current(&self, version: SessionVersion) -> bool {
        self.0.get() == version
    }
}

#[cfg(test)]
mod tests {
    use assertr::prelude::*;

    use super::*;

    #[test]
    fn session_version_default_is_zero() {
        assert_that(SessionVersion::default()).is_equal_to(SessionVersion::ZERO);
        assert_that(SessionVersion::ZERO).is_equal_to(SessionVersion(0));
    }

    #[test]
    fn session_version_increment() {
        let v = SessionVersion(0);
        assert_that(v.increment()).is_equal_to(SessionVersion(1));
    }

    #[test]
    fn session_version_increment_wraps_around() {
        let v = SessionVersion(u64::MAX);
        assert_that(v.increment()).is_equal_to(SessionVersion(0));
    }

    #[test]
    fn counter_invalidates_old_versions() {
        let counter = VersionCounter::default();
        let before = counter.current();

        let after = counter.increment();

        assert_that(counter.is_current(before)).is_false();
        assert_that(counter.is_current(after)).is_true();
    }

    #[test]
    fn initial_state_is_logged_out() {
        assert_that(SessionState::default()).is_equal_to(SessionState::LoggedOut);
    }
}
