use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies an open session
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Returns an id no other session in this process carries
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Single-owner gate for queue and stream operations
///
/// Only consulted under the device control mutex.
#[derive(Debug, Default)]
pub struct OwnershipGuard {
    owner: Option<SessionId>,
}

impl OwnershipGuard {
    pub fn new() -> Self {
        OwnershipGuard { owner: None }
    }

    /// Claims ownership for `session`
    ///
    /// Succeeds if nobody owns the device or `session` already does.
    ///
    /// # Example
    ///
    /// ```
    /// use stk1160::ownership::{OwnershipGuard, SessionId};
    ///
    /// let (a, b) = (SessionId::next(), SessionId::next());
    /// let mut guard = OwnershipGuard::new();
    /// assert!(guard.acquire(a));
    /// assert!(!guard.acquire(b));
    /// ```
    pub fn acquire(&mut self, session: SessionId) -> bool {
        match self.owner {
            Some(owner) if owner != session => false,
            _ => {
                self.owner = Some(session);
                true
            }
        }
    }

    /// Drops ownership, whoever holds it
    pub fn release(&mut self) {
        self.owner = None;
    }

    pub fn is_owner(&self, session: SessionId) -> bool {
        self.owner == Some(session)
    }

    pub fn owner(&self) -> Option<SessionId> {
        self.owner
    }
}
