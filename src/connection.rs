use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Connections currently being handled, read by the shutdown drain loop.
static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Identifier for one accepted client connection.
///
/// Unique for the process lifetime, never reused, and used only for log
/// correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn{}", self.0)
    }
}

/// Hands out monotonically increasing connection ids.
///
/// Owned by the accept loop and passed into each connection explicitly
/// rather than kept as hidden global state.
#[derive(Debug)]
pub struct ConnectionIds {
    next: AtomicU64,
}

impl ConnectionIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionIds {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard keeping the active-connection counter accurate on every exit
/// path of a connection's handling task.
pub struct ConnectionGuard {
    counter: &'static AtomicUsize,
    decremented: bool,
}

impl ConnectionGuard {
    pub fn new() -> Self {
        Self::on(&ACTIVE_CONNECTIONS)
    }

    fn on(counter: &'static AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self {
            counter,
            decremented: false,
        }
    }

    /// Current number of in-flight connections.
    pub fn active_count() -> usize {
        ACTIVE_CONNECTIONS.load(Ordering::Relaxed)
    }

    fn decrement(&mut self) {
        if !self.decremented {
            self.counter.fetch_sub(1, Ordering::Relaxed);
            self.decremented = true;
        }
    }
}

impl Default for ConnectionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.decrement();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let ids = ConnectionIds::new();
        let first = ids.next_id();
        let second = ids.next_id();
        assert_ne!(first, second);
        assert_eq!(first.to_string(), "conn1");
        assert_eq!(second.to_string(), "conn2");
    }

    #[test]
    fn guard_decrements_exactly_once() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        {
            let _guard = ConnectionGuard::on(&COUNTER);
            assert_eq!(COUNTER.load(Ordering::Relaxed), 1);
        }
        assert_eq!(COUNTER.load(Ordering::Relaxed), 0);

        let mut guard = ConnectionGuard::on(&COUNTER);
        guard.decrement();
        guard.decrement();
        assert_eq!(COUNTER.load(Ordering::Relaxed), 0);
        drop(guard);

        // drop after a manual decrement must not underflow
        assert_eq!(COUNTER.load(Ordering::Relaxed), 0);
    }
}
