//! Peer session state machine
//!
//! connecting -> open -> {closed, disconnected}; disconnected -> open after a
//! reconnect. Errors can arrive in any state and never force a transition.

use std::sync::Arc;
use tracing::{debug, info};

use crate::adapter::Context;
use crate::capability::{DataEndpoint, MediaEndpoint, PeerSession, SessionEvent};
use crate::registry::Resource;
use crate::types::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Disconnected,
    Closed,
}

/// Remote-initiated resource that the adapter must attach a machine to
#[derive(Debug)]
pub enum Incoming {
    Data { endpoint: DataEndpoint, local: String },
    Media { endpoint: MediaEndpoint, local: String },
}

pub struct PeerMachine {
    session: Arc<dyn PeerSession>,
    /// Identity confirmed by the last `Open`
    peer_id: Option<String>,
    state: SessionState,
}

impl PeerMachine {
    pub fn new(session: Arc<dyn PeerSession>) -> Self {
        Self {
            session,
            peer_id: None,
            state: SessionState::Connecting,
        }
    }

    pub fn session(&self) -> &Arc<dyn PeerSession> {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Confirmed id, else whatever the capability already knows, else empty
    pub fn local_id(&self) -> String {
        self.peer_id
            .clone()
            .or_else(|| self.session.id())
            .unwrap_or_default()
    }

    pub fn handle(&mut self, event: SessionEvent, cx: &Context<'_>) -> Option<Incoming> {
        match event {
            SessionEvent::Open(id) => self.on_open(id, cx),
            SessionEvent::Close => self.on_close(cx),
            SessionEvent::Disconnected => self.on_disconnected(cx),
            SessionEvent::Error(err) => self.on_error(err, cx),
            SessionEvent::Connection(endpoint) => return Some(self.on_connection(endpoint)),
            SessionEvent::Call(endpoint) => return Some(self.on_call(endpoint)),
        }
        None
    }

    pub fn on_open(&mut self, id: String, cx: &Context<'_>) {
        if self.state == SessionState::Closed {
            debug!("Ignoring open for closed session {}", id);
            return;
        }
        info!("Peer {} open", id);
        cx.registry.set(id.clone(), Resource::Peer(self.session.clone()));
        self.peer_id = Some(id.clone());
        self.state = SessionState::Open;
        cx.emitter.emit(Event::PeerOpened { peer_id: id });
    }

    pub fn on_close(&mut self, cx: &Context<'_>) {
        if self.state == SessionState::Closed {
            return;
        }
        let peer_id = self.local_id();
        if self.peer_id.is_some() && self.owns(&peer_id, cx) {
            cx.registry.delete(&peer_id);
        }
        info!("Peer {} closed", peer_id);
        self.state = SessionState::Closed;
        cx.emitter.emit(Event::PeerClosed { peer_id });
    }

    /// Whether `peer_id` is still registered to this machine's session
    /// rather than a newer session that reused the id
    fn owns(&self, peer_id: &str, cx: &Context<'_>) -> bool {
        match cx.registry.get(peer_id) {
            Some(Resource::Peer(session)) => {
                Arc::as_ptr(&session) as *const () == Arc::as_ptr(&self.session) as *const ()
            }
            _ => false,
        }
    }

    pub fn on_disconnected(&mut self, cx: &Context<'_>) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Disconnected;
        cx.emitter.emit(Event::PeerDisconnected {
            peer_id: self.local_id(),
        });
    }

    pub fn on_error(&mut self, err: String, cx: &Context<'_>) {
        cx.emitter.emit(Event::PeerError {
            peer_id: self.local_id(),
            err,
        });
    }

    pub fn on_connection(&mut self, endpoint: DataEndpoint) -> Incoming {
        debug!("Incoming data connection from {}", endpoint.object.peer());
        Incoming::Data {
            endpoint,
            local: self.local_id(),
        }
    }

    pub fn on_call(&mut self, endpoint: MediaEndpoint) -> Incoming {
        debug!("Incoming call from {}", endpoint.object.peer());
        Incoming::Media {
            endpoint,
            local: self.local_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityError, MediaStream};
    use crate::emitter::{Emitter, RecordingSink};
    use crate::ids::SequentialIds;
    use crate::registry::Registry;
    use crate::types::AdapterConfig;
    use async_trait::async_trait;

    struct StubSession(Option<String>);

    #[async_trait]
    impl PeerSession for StubSession {
        fn id(&self) -> Option<String> {
            self.0.clone()
        }
        async fn connect(&self, remote: &str) -> Result<DataEndpoint, CapabilityError> {
            Err(CapabilityError::PeerUnavailable(remote.to_string()))
        }
        async fn call(
            &self,
            remote: &str,
            _stream: MediaStream,
        ) -> Result<MediaEndpoint, CapabilityError> {
            Err(CapabilityError::PeerUnavailable(remote.to_string()))
        }
        async fn reconnect(&self) -> Result<(), CapabilityError> {
            Ok(())
        }
        async fn destroy(&self) {}
    }

    struct Fixture {
        registry: Registry,
        sink: RecordingSink,
        emitter: Emitter,
        ids: SequentialIds,
        config: AdapterConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let sink = RecordingSink::new();
            Self {
                registry: Registry::in_memory(),
                emitter: Emitter::new(Arc::new(sink.clone())),
                sink,
                ids: SequentialIds::new("h"),
                config: AdapterConfig::default(),
            }
        }

        fn cx(&self) -> Context<'_> {
            Context {
                registry: &self.registry,
                emitter: &self.emitter,
                ids: &self.ids,
                config: &self.config,
            }
        }
    }

    #[test]
    fn test_open_registers_and_close_deregisters() {
        let fx = Fixture::new();
        let mut machine = PeerMachine::new(Arc::new(StubSession(None)));

        machine.on_open("abc".to_string(), &fx.cx());
        assert_eq!(machine.state(), SessionState::Open);
        assert!(fx.registry.peer("abc").is_ok());

        machine.on_close(&fx.cx());
        assert!(machine.is_closed());
        assert!(!fx.registry.contains("abc"));

        assert_eq!(
            fx.sink.take(),
            vec![
                Event::PeerOpened { peer_id: "abc".into() },
                Event::PeerClosed { peer_id: "abc".into() },
            ]
        );
    }

    #[test]
    fn test_late_close_keeps_newer_session_with_same_id() {
        let fx = Fixture::new();
        let mut old = PeerMachine::new(Arc::new(StubSession(None)));
        old.on_open("abc".to_string(), &fx.cx());

        let newer: Arc<dyn PeerSession> = Arc::new(StubSession(None));
        let mut current = PeerMachine::new(newer.clone());
        current.on_open("abc".to_string(), &fx.cx());
        fx.sink.take();

        old.on_close(&fx.cx());
        assert!(old.is_closed());
        assert_eq!(fx.sink.take(), vec![Event::PeerClosed { peer_id: "abc".into() }]);

        let registered = fx.registry.peer("abc").unwrap();
        assert!(Arc::ptr_eq(&registered, &newer));

        current.on_close(&fx.cx());
        assert!(!fx.registry.contains("abc"));
    }

    #[test]
    fn test_disconnect_keeps_registration() {
        let fx = Fixture::new();
        let mut machine = PeerMachine::new(Arc::new(StubSession(None)));
        machine.on_open("abc".to_string(), &fx.cx());
        machine.on_disconnected(&fx.cx());

        assert_eq!(machine.state(), SessionState::Disconnected);
        assert!(fx.registry.contains("abc"));

        machine.on_open("abc".to_string(), &fx.cx());
        assert_eq!(machine.state(), SessionState::Open);
    }

    #[test]
    fn test_error_does_not_transition() {
        let fx = Fixture::new();
        let mut machine = PeerMachine::new(Arc::new(StubSession(Some("req".into()))));
        machine.on_error("boom".to_string(), &fx.cx());

        assert_eq!(machine.state(), SessionState::Connecting);
        assert_eq!(
            fx.sink.take(),
            vec![Event::PeerError {
                peer_id: "req".into(),
                err: "boom".into()
            }]
        );
    }

    #[test]
    fn test_events_after_close_are_ignored() {
        let fx = Fixture::new();
        let mut machine = PeerMachine::new(Arc::new(StubSession(None)));
        machine.on_open("abc".to_string(), &fx.cx());
        machine.on_close(&fx.cx());
        fx.sink.take();

        machine.on_close(&fx.cx());
        machine.on_disconnected(&fx.cx());
        machine.on_open("abc".to_string(), &fx.cx());
        assert!(fx.sink.is_empty());
        assert!(!fx.registry.contains("abc"));
    }
}
