//! Connected clients, with or without a wallet attached

use crate::game::events::EventSink;
use crate::game::types::TransportId;
use std::collections::HashMap;

#[derive(Debug)]
pub struct Observer {
    pub transport_id: TransportId,
    pub wallet: Option<String>,
    pub(crate) sink: EventSink,
}

#[derive(Debug, Default)]
pub struct ObserverRegistry {
    observers: HashMap<TransportId, Observer>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport. Returns the observer and whether it was newly
    /// created; an existing registration is left untouched.
    pub fn connect(&mut self, transport_id: TransportId, sink: EventSink) -> (&Observer, bool) {
        let mut created = false;
        let observer = self
            .observers
            .entry(transport_id.clone())
            .or_insert_with(|| {
                created = true;
                Observer {
                    transport_id,
                    wallet: None,
                    sink,
                }
            });
        (observer, created)
    }

    /// Attach a wallet. Returns `false` when the transport is unknown.
    pub fn identify(&mut self, transport_id: &str, wallet: String) -> bool {
        match self.observers.get_mut(transport_id) {
            Some(observer) => {
                observer.wallet = Some(wallet);
                true
            }
            None => false,
        }
    }

    pub fn disconnect(&mut self, transport_id: &str) -> Option<Observer> {
        self.observers.remove(transport_id)
    }

    pub fn lookup(&self, transport_id: &str) -> Option<&Observer> {
        self.observers.get(transport_id)
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observer> {
        self.observers.values()
    }
}
