//! Port message types
//!
//! Commands flow in from the message medium, events flow back out.
//! Both are internally tagged JSON objects: `{"type": "<Variant>", ...}`,
//! with field names matching the JavaScript-side port (`peerID`, `dataID`, ...).

use serde::{Deserialize, Serialize};

/// Opaque string identifier referencing a live resource in the registry
pub type Handle = String;

/// Inbound command from the message medium
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Create a peer session, optionally requesting an identifier
    NewPeer {
        #[serde(rename = "peerID", default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
    },

    /// Open a data channel from a local session to a remote peer
    ConnectToPeer { local: String, remote: String },

    /// Start a media call from a local session using a registered stream
    CallPeer {
        local: String,
        remote: String,
        #[serde(rename = "streamID")]
        stream_id: Handle,
    },

    /// Reconnect a disconnected session to the signaling server
    ReconnectToServer {
        #[serde(rename = "peerID")]
        peer_id: String,
    },

    /// Answer an inbound media connection, optionally with a local stream
    AnswerMediaConnection {
        #[serde(rename = "mediaConnectionID")]
        media_connection_id: Handle,
        #[serde(rename = "streamID", default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<Handle>,
    },

    /// Send a JSON value over an open data channel
    SendData {
        #[serde(rename = "dataID")]
        data_id: Handle,
        data: serde_json::Value,
    },

    /// Send a stored raw payload over an open data channel
    SendBlob {
        #[serde(rename = "dataID")]
        data_id: Handle,
        #[serde(rename = "blobID")]
        blob_id: Handle,
    },

    /// Close a data channel
    CloseDataConnection {
        #[serde(rename = "dataID")]
        data_id: Handle,
    },

    /// Hang up a media connection
    CloseMediaConnection {
        #[serde(rename = "mediaConnectionID")]
        media_connection_id: Handle,
    },

    /// Tear down a peer session and everything it owns
    DestroyPeer {
        #[serde(rename = "peerID")]
        peer_id: String,
    },

    /// Acquire a local audio/video stream
    OpenLocalStream {
        #[serde(default)]
        audio: bool,
        #[serde(default)]
        video: bool,
    },

    /// Read back a stored raw payload
    ReadBlob {
        #[serde(rename = "blobID")]
        blob_id: Handle,
    },

    /// Drop a stored raw payload
    ReleaseBlob {
        #[serde(rename = "blobID")]
        blob_id: Handle,
    },

    /// Drop a registered media stream
    ReleaseStream {
        #[serde(rename = "streamID")]
        stream_id: Handle,
    },
}

impl Command {
    /// Variant name, as it appears in the `type` field
    pub fn tag(&self) -> &'static str {
        match self {
            Command::NewPeer { .. } => "NewPeer",
            Command::ConnectToPeer { .. } => "ConnectToPeer",
            Command::CallPeer { .. } => "CallPeer",
            Command::ReconnectToServer { .. } => "ReconnectToServer",
            Command::AnswerMediaConnection { .. } => "AnswerMediaConnection",
            Command::SendData { .. } => "SendData",
            Command::SendBlob { .. } => "SendBlob",
            Command::CloseDataConnection { .. } => "CloseDataConnection",
            Command::CloseMediaConnection { .. } => "CloseMediaConnection",
            Command::DestroyPeer { .. } => "DestroyPeer",
            Command::OpenLocalStream { .. } => "OpenLocalStream",
            Command::ReadBlob { .. } => "ReadBlob",
            Command::ReleaseBlob { .. } => "ReleaseBlob",
            Command::ReleaseStream { .. } => "ReleaseStream",
        }
    }
}

/// Outbound event to the message medium
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    PeerOpened {
        #[serde(rename = "peerID")]
        peer_id: String,
    },
    PeerClosed {
        #[serde(rename = "peerID")]
        peer_id: String,
    },
    PeerDisconnected {
        #[serde(rename = "peerID")]
        peer_id: String,
    },
    PeerError {
        #[serde(rename = "peerID")]
        peer_id: String,
        err: String,
    },
    PeerDoesNotExist {
        #[serde(rename = "peerID")]
        peer_id: String,
    },

    DataOpened {
        #[serde(rename = "dataID")]
        data_id: Handle,
        local: String,
        remote: String,
    },
    DataClosed {
        #[serde(rename = "dataID")]
        data_id: Handle,
        local: String,
        remote: String,
    },
    DataError {
        #[serde(rename = "dataID")]
        data_id: Handle,
        local: String,
        remote: String,
        err: String,
    },
    /// Structured or primitive payload, carried inline
    #[serde(rename = "DataReceivedJSON")]
    DataReceivedJson {
        #[serde(rename = "dataID")]
        data_id: Handle,
        local: String,
        remote: String,
        data: serde_json::Value,
    },
    /// Binary or unrecognized payload, stored under `blobID`
    DataReceivedBlob {
        #[serde(rename = "dataID")]
        data_id: Handle,
        #[serde(rename = "blobID")]
        blob_id: Handle,
        local: String,
        remote: String,
        #[serde(rename = "contentType")]
        content_type: String,
    },
    DataConnectionDoesNotExist {
        #[serde(rename = "dataID")]
        data_id: Handle,
    },

    IncomingCall {
        #[serde(rename = "mediaConnectionID")]
        media_connection_id: Handle,
        local: String,
        remote: String,
    },
    MediaStreamReceived {
        #[serde(rename = "mediaConnectionID")]
        media_connection_id: Handle,
        #[serde(rename = "streamID")]
        stream_id: Handle,
        local: String,
        remote: String,
    },
    MediaConnectionClosed {
        #[serde(rename = "mediaConnectionID")]
        media_connection_id: Handle,
        local: String,
        remote: String,
    },
    MediaConnectionError {
        #[serde(rename = "mediaConnectionID")]
        media_connection_id: Handle,
        local: String,
        remote: String,
        err: String,
    },
    MediaConnectionDoesNotExist {
        #[serde(rename = "mediaConnectionID")]
        media_connection_id: Handle,
    },

    LocalStreamOpened {
        #[serde(rename = "streamID")]
        stream_id: Handle,
    },
    LocalStreamError {
        err: String,
    },
    StreamDoesNotExist {
        #[serde(rename = "streamID")]
        stream_id: Handle,
    },

    /// Stored payload, base64 encoded
    BlobRead {
        #[serde(rename = "blobID")]
        blob_id: Handle,
        #[serde(rename = "contentType")]
        content_type: String,
        data: String,
    },
    BlobDoesNotExist {
        #[serde(rename = "blobID")]
        blob_id: Handle,
    },

    UnknownCommand {
        reason: String,
    },
}

impl Event {
    /// Variant name, as it appears in the `type` field
    pub fn tag(&self) -> &'static str {
        match self {
            Event::PeerOpened { .. } => "PeerOpened",
            Event::PeerClosed { .. } => "PeerClosed",
            Event::PeerDisconnected { .. } => "PeerDisconnected",
            Event::PeerError { .. } => "PeerError",
            Event::PeerDoesNotExist { .. } => "PeerDoesNotExist",
            Event::DataOpened { .. } => "DataOpened",
            Event::DataClosed { .. } => "DataClosed",
            Event::DataError { .. } => "DataError",
            Event::DataReceivedJson { .. } => "DataReceivedJSON",
            Event::DataReceivedBlob { .. } => "DataReceivedBlob",
            Event::DataConnectionDoesNotExist { .. } => "DataConnectionDoesNotExist",
            Event::IncomingCall { .. } => "IncomingCall",
            Event::MediaStreamReceived { .. } => "MediaStreamReceived",
            Event::MediaConnectionClosed { .. } => "MediaConnectionClosed",
            Event::MediaConnectionError { .. } => "MediaConnectionError",
            Event::MediaConnectionDoesNotExist { .. } => "MediaConnectionDoesNotExist",
            Event::LocalStreamOpened { .. } => "LocalStreamOpened",
            Event::LocalStreamError { .. } => "LocalStreamError",
            Event::StreamDoesNotExist { .. } => "StreamDoesNotExist",
            Event::BlobRead { .. } => "BlobRead",
            Event::BlobDoesNotExist { .. } => "BlobDoesNotExist",
            Event::UnknownCommand { .. } => "UnknownCommand",
        }
    }

    /// True for the `*DoesNotExist` diagnostics raised by failed lookups
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Event::PeerDoesNotExist { .. }
                | Event::DataConnectionDoesNotExist { .. }
                | Event::MediaConnectionDoesNotExist { .. }
                | Event::StreamDoesNotExist { .. }
                | Event::BlobDoesNotExist { .. }
        )
    }
}

/// Adapter behaviour knobs
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Drop data channel and media connection handles when they close
    pub release_on_close: bool,
    /// Length of locally generated handles
    pub id_length: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            release_on_close: true,
            id_length: DEFAULT_ID_LENGTH,
        }
    }
}

/// Default handle length (same as nanoid)
pub const DEFAULT_ID_LENGTH: usize = 21;

/// Content type reported for a binary payload with no declared type
pub const BINARY_TYPE_NAME: &str = "Binary";
