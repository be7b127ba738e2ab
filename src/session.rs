//! Session handle storage
//!
//! A connector's session (socket, broker channel, client) is stored in a
//! [`SessionSlot`]. The slot is the one piece of connector state shared
//! between the supervisory loop, on-demand readers and external close
//! requests, so access goes through a single narrow lock around the handle
//! reference. The lock is never held across an await point: callers take a
//! cheap `Arc` clone of the session and release the lock before doing I/O.

use crate::lifecycle::{spawn_teardown, Teardown};
use std::sync::{Arc, Mutex, MutexGuard};

/// Lock-guarded, optional session handle
#[derive(Debug)]
pub struct SessionSlot<T> {
    inner: Mutex<Option<Arc<T>>>,
}

impl<T> SessionSlot<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        // A poisoned slot only means a panic elsewhere; the handle itself is still valid.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Get the current session, if any
    pub fn get(&self) -> Option<Arc<T>> {
        self.lock().clone()
    }

    /// Whether a session is stored
    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// Store a session unless one is already present
    ///
    /// Returns the session that ends up in the slot and, if the offered
    /// session lost the race, gives it back so the caller can close it.
    pub fn install(&self, session: T) -> (Arc<T>, Option<T>) {
        let mut guard = self.lock();
        match guard.as_ref() {
            Some(existing) => (Arc::clone(existing), Some(session)),
            None => {
                let session = Arc::new(session);
                *guard = Some(Arc::clone(&session));
                (session, None)
            }
        }
    }

    /// Remove and return the stored session
    pub fn take(&self) -> Option<Arc<T>> {
        self.lock().take()
    }

    /// Remove the stored session only if it is the given one
    ///
    /// Used when an operation on `session` failed: a newer session that a
    /// concurrent connect stored in the meantime is left alone.
    pub fn drop_if_current(&self, session: &Arc<T>) -> bool {
        let mut guard = self.lock();
        if guard.as_ref().is_some_and(|s| Arc::ptr_eq(s, session)) {
            *guard = None;
            true
        } else {
            false
        }
    }

    /// Drop a broken session and close it in the background
    ///
    /// `close` only runs if `session` was still the stored one.
    pub fn release(
        &self,
        name: &str,
        session: Arc<T>,
        close: impl FnOnce(Arc<T>) -> Teardown,
    ) -> bool {
        if !self.drop_if_current(&session) {
            return false;
        }
        spawn_teardown(name, close(session));
        true
    }
}

impl<T> Default for SessionSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::sync::oneshot;

    #[test]
    fn test_install_and_take() {
        let slot = SessionSlot::new();
        assert!(!slot.is_connected());

        let (session, rejected) = slot.install(7);
        assert_eq!(*session, 7);
        assert!(rejected.is_none());
        assert!(slot.is_connected());

        let taken = slot.take().unwrap();
        assert_eq!(*taken, 7);
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_install_keeps_existing_session() {
        let slot = SessionSlot::new();
        slot.install("first");
        let (session, rejected) = slot.install("second");
        assert_eq!(*session, "first");
        assert_eq!(rejected, Some("second"));
    }

    #[test]
    fn test_drop_if_current_ignores_stale_handle() {
        let slot = SessionSlot::new();
        let (old, _) = slot.install(1);
        assert!(slot.drop_if_current(&old));

        let (_new, _) = slot.install(2);
        assert!(!slot.drop_if_current(&old));
        assert_eq!(*slot.get().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_release_closes_current_session() {
        let slot = SessionSlot::new();
        let (session, _) = slot.install(5);
        let (tx, rx) = oneshot::channel();

        let released = slot.release("test", session, move |s| {
            async move {
                let _ = tx.send(*s);
                Ok(())
            }
            .boxed()
        });
        assert!(released);
        assert!(!slot.is_connected());
        assert_eq!(rx.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_release_leaves_newer_session() {
        let slot = SessionSlot::new();
        let (old, _) = slot.install(1);
        slot.take();
        slot.install(2);

        let released = slot.release("test", old, |_| {
            panic!("stale session must not be closed");
        });
        assert!(!released);
        assert_eq!(*slot.get().unwrap(), 2);
    }
}
