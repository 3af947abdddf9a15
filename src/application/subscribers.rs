// Ordered observer list for location subscribers
use crate::domain::location::Location;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub type LocationCallback = Arc<dyn Fn(&Location) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Registration order is notification order. Ids are never reused, so a stale
/// handle cannot remove a later subscriber.
#[derive(Default)]
pub struct SubscriberList {
    next_id: u64,
    entries: Vec<(SubscriberId, LocationCallback)>,
}

impl SubscriberList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, callback: LocationCallback) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, callback));
        id
    }

    pub fn remove(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    pub fn snapshot(&self) -> Vec<(SubscriberId, LocationCallback)> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Invoke one subscriber, containing any panic it raises.
pub fn notify(id: SubscriberId, callback: &LocationCallback, location: &Location) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(location))) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                subscriber = ?id,
                "location subscriber panicked: {}",
                panic_message(payload.as_ref())
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
