//! Outbound event delivery

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::Event;

/// The medium's "send one message" primitive
pub trait EventSink: Send + Sync {
    fn send(&self, event: Event);
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn send(&self, event: Event) {
        if mpsc::UnboundedSender::send(self, event).is_err() {
            warn!("Event receiver dropped");
        }
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn send(&self, event: Event) {
        (**self).send(event)
    }
}

/// Sink that keeps every event, for inspection in tests and tools
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for RecordingSink {
    fn send(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Logs and forwards events to the injected sink
#[derive(Clone)]
pub struct Emitter {
    sink: Arc<dyn EventSink>,
}

impl Emitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, event: Event) {
        debug!("-> {}", event.tag());
        self.sink.send(event);
    }
}
