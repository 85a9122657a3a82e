//! In-memory loopback capability
//!
//! Sessions created on the same `LoopbackNetwork` can reach each other by id.
//! Data channels and calls are linked endpoint pairs: whatever one side sends
//! shows up as a callback on the other. Used by the tests and by the
//! `peerport serve` binary, where every WebSocket client shares one network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::capability::{
    event_channel, CapabilityError, DataConnection, DataEndpoint, DataEvent, DataPayload,
    Endpoint, EventRx, EventTx, MediaConnection, MediaEndpoint, MediaEvent, MediaStream,
    MediaTrack, PeerNetwork, PeerSession, SessionEndpoint, SessionEvent, TrackKind,
};
use crate::ids::{IdGenerator, RandomIds};

#[derive(Default)]
struct Hub {
    sessions: HashMap<String, Slot>,
    next_key: u64,
    next_stream: u64,
}

/// A registered session as seen by the hub
struct Slot {
    key: u64,
    events: EventTx<SessionEvent>,
    connected: bool,
    links: Vec<Link>,
}

impl Slot {
    fn link(&mut self, link: Link) {
        self.links.retain(|l| !l.is_closed());
        self.links.push(link);
    }
}

enum Link {
    Data(Arc<LoopbackData>),
    Media(Arc<LoopbackMedia>),
}

impl Link {
    fn is_closed(&self) -> bool {
        match self {
            Link::Data(d) => d.closed.load(Ordering::SeqCst),
            Link::Media(m) => m.closed.load(Ordering::SeqCst),
        }
    }

    fn shutdown(&self) {
        match self {
            Link::Data(d) => d.shutdown(),
            Link::Media(m) => m.shutdown(),
        }
    }
}

fn lock(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Hub {
    /// Slot owned by `session`, if it is still registered
    fn slot_mut(&mut self, session: &LoopbackSession) -> Option<&mut Slot> {
        let id = session.id.as_deref()?;
        self.sessions.get_mut(id).filter(|slot| slot.key == session.key)
    }

    /// Id of `session` if it may open connections
    fn live_id(&mut self, session: &LoopbackSession) -> Result<String, CapabilityError> {
        let slot = self.slot_mut(session).ok_or(CapabilityError::Destroyed)?;
        if !slot.connected {
            return Err(CapabilityError::Disconnected);
        }
        Ok(session.id.clone().unwrap_or_default())
    }
}

/// Shared in-process "signaling server"
#[derive(Clone)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
    ids: Arc<dyn IdGenerator>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::with_ids(Arc::new(RandomIds::default()))
    }

    /// Use `ids` to assign session ids when none is requested
    pub fn with_ids(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub::default())),
            ids,
        }
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        lock(&self.hub).sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.hub).sessions.contains_key(id)
    }

    /// Simulate losing the signaling server. Returns false for unknown ids.
    pub fn disconnect(&self, id: &str) -> bool {
        let mut hub = lock(&self.hub);
        match hub.sessions.get_mut(id) {
            Some(slot) if slot.connected => {
                slot.connected = false;
                let _ = slot.events.send(SessionEvent::Disconnected);
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Raise a session-level error. Returns false for unknown ids.
    pub fn fail(&self, id: &str, err: &str) -> bool {
        let hub = lock(&self.hub);
        match hub.sessions.get(id) {
            Some(slot) => {
                let _ = slot.events.send(SessionEvent::Error(err.to_string()));
                true
            }
            None => false,
        }
    }
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerNetwork for LoopbackNetwork {
    async fn create(&self, id: Option<String>) -> Result<SessionEndpoint, CapabilityError> {
        let (tx, rx) = event_channel();
        let mut hub = lock(&self.hub);
        hub.next_key += 1;
        let key = hub.next_key;

        let taken = id
            .as_ref()
            .is_some_and(|id| hub.sessions.contains_key(id));
        if taken {
            let requested = id.clone().unwrap_or_default();
            warn!("Session id {} already taken", requested);
            let err = CapabilityError::UnavailableId(requested);
            let _ = tx.send(SessionEvent::Error(err.to_string()));
            let _ = tx.send(SessionEvent::Close);
            let session = LoopbackSession {
                hub: self.hub.clone(),
                key,
                id,
                events: tx,
            };
            return Ok(Endpoint::new(Arc::new(session), rx));
        }

        let id = match id {
            Some(id) => id,
            None => loop {
                let candidate = self.ids.next_id();
                if !hub.sessions.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        debug!("Session {} registered", id);
        hub.sessions.insert(
            id.clone(),
            Slot {
                key,
                events: tx.clone(),
                connected: true,
                links: Vec::new(),
            },
        );
        let _ = tx.send(SessionEvent::Open(id.clone()));

        let session = LoopbackSession {
            hub: self.hub.clone(),
            key,
            id: Some(id),
            events: tx,
        };
        Ok(Endpoint::new(Arc::new(session), rx))
    }

    async fn open_local_stream(
        &self,
        audio: bool,
        video: bool,
    ) -> Result<MediaStream, CapabilityError> {
        if !audio && !video {
            return Err(CapabilityError::Media("no tracks requested".to_string()));
        }
        let mut hub = lock(&self.hub);
        hub.next_stream += 1;
        let mut tracks = Vec::new();
        if audio {
            tracks.push(MediaTrack {
                kind: TrackKind::Audio,
                label: "loopback audio".to_string(),
            });
        }
        if video {
            tracks.push(MediaTrack {
                kind: TrackKind::Video,
                label: "loopback video".to_string(),
            });
        }
        Ok(MediaStream::new(format!("local-{}", hub.next_stream), tracks))
    }
}

pub struct LoopbackSession {
    hub: Arc<Mutex<Hub>>,
    key: u64,
    id: Option<String>,
    events: EventTx<SessionEvent>,
}

#[async_trait]
impl PeerSession for LoopbackSession {
    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    async fn connect(&self, remote: &str) -> Result<DataEndpoint, CapabilityError> {
        let mut hub = lock(&self.hub);
        let local = hub.live_id(self)?;
        let ((near, near_rx), (far, far_rx)) = LoopbackData::pair(&local, remote);

        match hub.sessions.get_mut(remote) {
            Some(slot) if slot.connected => {
                slot.link(Link::Data(far.clone()));
                let _ = far.own.send(DataEvent::Open);
                let _ = near.own.send(DataEvent::Open);
                let far_object: Arc<dyn DataConnection> = far;
                let _ = slot
                    .events
                    .send(SessionEvent::Connection(Endpoint::new(far_object, far_rx)));
            }
            _ => {
                debug!("Data connection {} -> {} failed: no such peer", local, remote);
                let err = CapabilityError::PeerUnavailable(remote.to_string());
                let _ = near.own.send(DataEvent::Error(err.to_string()));
                near.shutdown();
            }
        }
        if let Some(slot) = hub.slot_mut(self) {
            slot.link(Link::Data(near.clone()));
        }

        let near_object: Arc<dyn DataConnection> = near;
        Ok(Endpoint::new(near_object, near_rx))
    }

    async fn call(
        &self,
        remote: &str,
        stream: MediaStream,
    ) -> Result<MediaEndpoint, CapabilityError> {
        let mut hub = lock(&self.hub);
        let local = hub.live_id(self)?;
        let ((near, near_rx), (far, far_rx)) = LoopbackMedia::pair(&local, remote, stream);

        match hub.sessions.get_mut(remote) {
            Some(slot) if slot.connected => {
                slot.link(Link::Media(far.clone()));
                let far_object: Arc<dyn MediaConnection> = far;
                let _ = slot
                    .events
                    .send(SessionEvent::Call(Endpoint::new(far_object, far_rx)));
            }
            _ => {
                debug!("Call {} -> {} failed: no such peer", local, remote);
                let err = CapabilityError::PeerUnavailable(remote.to_string());
                let _ = near.own.send(MediaEvent::Error(err.to_string()));
                near.shutdown();
            }
        }
        if let Some(slot) = hub.slot_mut(self) {
            slot.link(Link::Media(near.clone()));
        }

        let near_object: Arc<dyn MediaConnection> = near;
        Ok(Endpoint::new(near_object, near_rx))
    }

    async fn reconnect(&self) -> Result<(), CapabilityError> {
        let mut hub = lock(&self.hub);
        let slot = hub.slot_mut(self).ok_or(CapabilityError::Destroyed)?;
        if !slot.connected {
            slot.connected = true;
            let id = self.id.clone().unwrap_or_default();
            let _ = slot.events.send(SessionEvent::Open(id));
        }
        Ok(())
    }

    async fn destroy(&self) {
        let links = {
            let mut hub = lock(&self.hub);
            if hub.slot_mut(self).is_none() {
                return;
            }
            let id = self.id.clone().unwrap_or_default();
            match hub.sessions.remove(&id) {
                Some(slot) => slot.links,
                None => return,
            }
        };
        for link in &links {
            link.shutdown();
        }
        let _ = self.events.send(SessionEvent::Close);
    }
}

/// One side of a loopback data channel
pub struct LoopbackData {
    peer: String,
    own: EventTx<DataEvent>,
    far: EventTx<DataEvent>,
    closed: Arc<AtomicBool>,
}

type DataSide = (Arc<LoopbackData>, EventRx<DataEvent>);

impl LoopbackData {
    /// Linked pair: the first side faces `b`, the second faces `a`
    fn pair(a: &str, b: &str) -> (DataSide, DataSide) {
        let (tx_a, rx_a) = event_channel();
        let (tx_b, rx_b) = event_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let near = Arc::new(Self {
            peer: b.to_string(),
            own: tx_a.clone(),
            far: tx_b.clone(),
            closed: closed.clone(),
        });
        let far = Arc::new(Self {
            peer: a.to_string(),
            own: tx_b,
            far: tx_a,
            closed,
        });
        ((near, rx_a), (far, rx_b))
    }

    fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.own.send(DataEvent::Close);
            let _ = self.far.send(DataEvent::Close);
        }
    }
}

#[async_trait]
impl DataConnection for LoopbackData {
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn send(&self, payload: DataPayload) -> Result<(), CapabilityError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CapabilityError::Closed);
        }
        self.far
            .send(DataEvent::Data(payload))
            .map_err(|_| CapabilityError::Closed)
    }

    async fn close(&self) {
        self.shutdown();
    }
}

/// One side of a loopback call
pub struct LoopbackMedia {
    peer: String,
    own: EventTx<MediaEvent>,
    far: EventTx<MediaEvent>,
    /// Caller's stream, held by the callee side until answered
    offered: Option<MediaStream>,
    answered: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

type MediaSide = (Arc<LoopbackMedia>, EventRx<MediaEvent>);

impl LoopbackMedia {
    /// Linked pair: the caller side faces `callee`, the callee side faces `caller`
    fn pair(caller: &str, callee: &str, stream: MediaStream) -> (MediaSide, MediaSide) {
        let (tx_a, rx_a) = event_channel();
        let (tx_b, rx_b) = event_channel();
        let answered = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        let outgoing = Arc::new(Self {
            peer: callee.to_string(),
            own: tx_a.clone(),
            far: tx_b.clone(),
            offered: None,
            answered: answered.clone(),
            closed: closed.clone(),
        });
        let incoming = Arc::new(Self {
            peer: caller.to_string(),
            own: tx_b,
            far: tx_a,
            offered: Some(stream),
            answered,
            closed,
        });
        ((outgoing, rx_a), (incoming, rx_b))
    }

    fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.own.send(MediaEvent::Close);
            let _ = self.far.send(MediaEvent::Close);
        }
    }
}

#[async_trait]
impl MediaConnection for LoopbackMedia {
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn answer(&self, stream: Option<MediaStream>) -> Result<(), CapabilityError> {
        let Some(offer) = &self.offered else {
            return Err(CapabilityError::Other(
                "cannot answer an outgoing call".to_string(),
            ));
        };
        if self.closed.load(Ordering::SeqCst) {
            return Err(CapabilityError::Closed);
        }
        if self.answered.swap(true, Ordering::SeqCst) {
            return Err(CapabilityError::Other("call already answered".to_string()));
        }
        let _ = self.own.send(MediaEvent::Stream(offer.clone()));
        if let Some(stream) = stream {
            let _ = self.far.send(MediaEvent::Stream(stream));
        }
        Ok(())
    }

    async fn close(&self) {
        self.shutdown();
    }
}
