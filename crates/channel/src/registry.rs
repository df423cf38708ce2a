//! Handler registry shared by channel implementations.
//!
//! Handlers are keyed by event name and invoked in subscription order. The
//! lock is released before any handler runs, so a handler may subscribe or
//! unsubscribe without deadlocking.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::adapter::{EventHandler, HandlerId, InboundEvent};

/// Event name -> subscribed handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to `event`.
    pub fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut map = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        map.entry(event.to_string()).or_default().push((id, handler));
        id
    }

    /// Unsubscribes a single handler.
    pub fn off(&self, event: &str, id: HandlerId) {
        let mut map = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = map.get_mut(event) {
            list.retain(|(h, _)| *h != id);
            if list.is_empty() {
                map.remove(event);
            }
        }
    }

    /// Drops every handler for `event`.
    pub fn remove_all(&self, event: &str) {
        let mut map = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        map.remove(event);
    }

    /// Number of handlers subscribed to `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        let map = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        map.get(event).map_or(0, Vec::len)
    }

    /// Invokes every handler subscribed to `event.name`. Returns how many ran.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        let targets: Vec<EventHandler> = {
            let map = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            match map.get(&event.name) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => Vec::new(),
            }
        };

        if targets.is_empty() {
            trace!(event = %event.name, "no handlers subscribed");
        }
        for handler in &targets {
            handler(event);
        }
        targets.len()
    }
}
