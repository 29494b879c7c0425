//! Logout notifications
//!
//! Collaborators (UI, caches) register a callback and are told once per
//! session end why the session ended.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use novem_domain::LogoutReason;
use parking_lot::Mutex;

/// Handle returned by [`LogoutNotifier::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(LogoutReason) + Send + Sync>;

#[derive(Default)]
pub struct LogoutNotifier {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
}

impl LogoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(LogoutReason) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Call every listener in subscription order.
    pub fn notify(&self, reason: LogoutReason) {
        // Listeners may subscribe or unsubscribe from inside the callback
        let listeners: Vec<Listener> =
            self.listeners.lock().iter().map(|(_, listener)| Arc::clone(listener)).collect();

        for listener in listeners {
            listener(reason);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl std::fmt::Debug for LogoutNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogoutNotifier").field("listeners", &self.listener_count()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifies_in_subscription_order() {
        let notifier = LogoutNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            notifier.subscribe(move |reason| seen.lock().push((tag, reason)));
        }

        notifier.notify(LogoutReason::RefreshFailed);

        assert_eq!(
            *seen.lock(),
            vec![("first", LogoutReason::RefreshFailed), ("second", LogoutReason::RefreshFailed)]
        );
    }

    #[test]
    fn unsubscribed_listener_is_not_called() {
        let notifier = LogoutNotifier::new();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let id = notifier.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.notify(LogoutReason::UserInitiated);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let notifier = Arc::new(LogoutNotifier::new());
        let slot = Arc::new(Mutex::new(None));
        let (n, s) = (Arc::clone(&notifier), Arc::clone(&slot));
        let id = notifier.subscribe(move |_| {
            if let Some(id) = s.lock().take() {
                n.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        notifier.notify(LogoutReason::AccountDeleted);
        assert_eq!(notifier.listener_count(), 0);
    }
}
