//! Command/event port over a peer-to-peer connection library
//!
//! Callers submit tagged commands (create peer, connect, call, answer,
//! reconnect, ...) and receive tagged events back. Library objects that
//! cannot cross the port are kept in a handle registry and referred to by
//! opaque string handles.
//!
//! # Overview
//!
//! - **Registry**: handle -> live session, channel, call, stream or payload
//! - **Adapter**: single actor that dispatches commands and re-emits callbacks
//! - **Capability**: traits the adapter drives, with an in-memory loopback
//!
//! # Example
//!
//! ```rust,no_run
//! use peerport::{Adapter, Command, LoopbackNetwork, RecordingSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let sink = RecordingSink::new();
//!     let mut adapter = Adapter::new(Arc::new(LoopbackNetwork::new()), Arc::new(sink.clone()));
//!
//!     adapter
//!         .handle_command(Command::NewPeer { peer_id: Some("abc".into()) })
//!         .await;
//!     adapter.drain();
//!
//!     for event in sink.take() {
//!         println!("{}", serde_json::to_string(&event).unwrap());
//!     }
//! }
//! ```

pub mod adapter;
pub mod capability;
pub mod data;
pub mod emitter;
pub mod ids;
pub mod loopback;
pub mod media;
pub mod registry;
pub mod session;
pub mod types;

pub use adapter::{Adapter, AdapterError, Context, Inbound};
pub use capability::{
    event_channel, CapabilityError, DataConnection, DataEndpoint, DataEvent, DataPayload,
    Endpoint, EventRx, EventTx, MediaConnection, MediaEndpoint, MediaEvent, MediaStream,
    MediaTrack, PeerNetwork, PeerSession, SessionEndpoint, SessionEvent, TrackKind,
};
pub use data::{classify, Classified};
pub use emitter::{Emitter, EventSink, RecordingSink};
pub use ids::{IdGenerator, RandomIds, SequentialIds};
pub use loopback::LoopbackNetwork;
pub use registry::{
    HandleStore, MemoryStore, RawPayload, Registry, RegistryError, Resource, ResourceKind,
};
pub use types::{AdapterConfig, Command, Event, Handle, BINARY_TYPE_NAME, DEFAULT_ID_LENGTH};
