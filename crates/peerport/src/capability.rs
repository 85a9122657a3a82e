//! Peer-to-peer capability abstraction
//!
//! Defines the traits the adapter drives. A capability (a real WebRTC stack
//! or the in-memory loopback) owns the life cycle of every session, data
//! channel and media connection; the adapter only issues requests and
//! consumes the callbacks each object reports on its event receiver.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported synchronously by capability calls
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("peer {0} is unavailable")]
    PeerUnavailable(String),
    #[error("id {0} is already taken")]
    UnavailableId(String),
    #[error("session destroyed")]
    Destroyed,
    #[error("not connected to server")]
    Disconnected,
    #[error("connection closed")]
    Closed,
    #[error("media unavailable: {0}")]
    Media(String),
    #[error("{0}")]
    Other(String),
}

/// Receiver half of an object's callback stream
pub type EventRx<E> = mpsc::UnboundedReceiver<E>;

/// Sender half of an object's callback stream
pub type EventTx<E> = mpsc::UnboundedSender<E>;

/// A capability object paired with the receiver of its callbacks
pub struct Endpoint<T: ?Sized, E> {
    pub object: Arc<T>,
    pub events: EventRx<E>,
}

impl<T: ?Sized, E> Endpoint<T, E> {
    pub fn new(object: Arc<T>, events: EventRx<E>) -> Self {
        Self { object, events }
    }
}

impl<T: ?Sized, E> fmt::Debug for Endpoint<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint").finish_non_exhaustive()
    }
}

pub type SessionEndpoint = Endpoint<dyn PeerSession, SessionEvent>;
pub type DataEndpoint = Endpoint<dyn DataConnection, DataEvent>;
pub type MediaEndpoint = Endpoint<dyn MediaConnection, MediaEvent>;

/// Callbacks raised by a peer session
#[derive(Debug)]
pub enum SessionEvent {
    /// Registered with the signaling server under this id
    Open(String),
    /// Session destroyed
    Close,
    /// Lost the signaling server; may be reopened with `reconnect`
    Disconnected,
    Error(String),
    /// Remote party opened a data channel to us
    Connection(DataEndpoint),
    /// Remote party is calling us
    Call(MediaEndpoint),
}

/// Callbacks raised by a data channel
#[derive(Debug)]
pub enum DataEvent {
    Open,
    Close,
    Error(String),
    Data(DataPayload),
}

/// Callbacks raised by a media connection
#[derive(Debug)]
pub enum MediaEvent {
    /// Remote stream became available
    Stream(MediaStream),
    Close,
    Error(String),
}

/// Value received on (or sent over) a data channel
#[derive(Debug, Clone, PartialEq)]
pub enum DataPayload {
    /// Explicitly wrapped structured value
    Json(serde_json::Value),
    Text(String),
    Number(f64),
    Bool(bool),
    /// Explicitly wrapped binary value
    Binary {
        content_type: Option<String>,
        bytes: Bytes,
    },
    /// Any value the library could not describe more precisely
    Opaque { type_name: String, bytes: Bytes },
}

/// Audio or video track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single track of a media stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub kind: TrackKind,
    pub label: String,
}

/// Local or remote audio/video source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    /// Library-side stream id (not a registry handle)
    pub id: String,
    pub tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Audio)
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Video)
    }
}

/// Entry point of the capability: creates sessions and local media
#[async_trait]
pub trait PeerNetwork: Send + Sync {
    /// Create a session. With `id` None the capability assigns one and
    /// reports it in `SessionEvent::Open`.
    async fn create(&self, id: Option<String>) -> Result<SessionEndpoint, CapabilityError>;

    /// Acquire a local stream with the requested tracks
    async fn open_local_stream(
        &self,
        audio: bool,
        video: bool,
    ) -> Result<MediaStream, CapabilityError>;
}

/// A local network identity
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Identity, if already known (requested ids are known before open)
    fn id(&self) -> Option<String>;

    /// Open a data channel to `remote`; the outcome arrives as a callback
    async fn connect(&self, remote: &str) -> Result<DataEndpoint, CapabilityError>;

    /// Call `remote` with a local stream; the outcome arrives as a callback
    async fn call(&self, remote: &str, stream: MediaStream)
        -> Result<MediaEndpoint, CapabilityError>;

    /// Re-register with the signaling server after a disconnect
    async fn reconnect(&self) -> Result<(), CapabilityError>;

    /// Destroy the session; raises `SessionEvent::Close`
    async fn destroy(&self);
}

/// Message channel between two sessions
#[async_trait]
pub trait DataConnection: Send + Sync {
    /// Remote peer id
    fn peer(&self) -> &str;

    async fn send(&self, payload: DataPayload) -> Result<(), CapabilityError>;

    async fn close(&self);
}

/// Audio/video call between two sessions
#[async_trait]
pub trait MediaConnection: Send + Sync {
    /// Remote peer id
    fn peer(&self) -> &str;

    /// Accept the call, optionally sending our own stream back
    async fn answer(&self, stream: Option<MediaStream>) -> Result<(), CapabilityError>;

    async fn close(&self);
}

/// Create a callback channel pair
pub fn event_channel<E>() -> (EventTx<E>, EventRx<E>) {
    mpsc::unbounded_channel()
}

// Blanket implementation for Arc<T> so shared networks can be handed to the adapter

#[async_trait]
impl<T: PeerNetwork + ?Sized> PeerNetwork for Arc<T> {
    async fn create(&self, id: Option<String>) -> Result<SessionEndpoint, CapabilityError> {
        (**self).create(id).await
    }

    async fn open_local_stream(
        &self,
        audio: bool,
        video: bool,
    ) -> Result<MediaStream, CapabilityError> {
        (**self).open_local_stream(audio, video).await
    }
}
