//! Command dispatcher
//!
//! A single actor owns the registry and one state machine per live resource.
//! It alternates between inbound commands and the merged callback streams of
//! every attached capability object, so handlers never interleave.

use base64::Engine;
use futures::stream::{self, BoxStream, SelectAll, Stream, StreamExt};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capability::{
    CapabilityError, DataEndpoint, DataEvent, DataPayload, EventRx, MediaEndpoint, MediaEvent,
    PeerNetwork, SessionEvent,
};
use crate::data::DataMachine;
use crate::emitter::{Emitter, EventSink};
use crate::ids::{IdGenerator, RandomIds};
use crate::media::MediaMachine;
use crate::registry::{HandleStore, Registry, RegistryError, ResourceKind, Resource};
use crate::session::{Incoming, PeerMachine};
use crate::types::{AdapterConfig, Command, Event, Handle};

/// Command failures, each reported as exactly one diagnostic event
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    NotFound(#[from] RegistryError),
    #[error("peer {peer_id}: {source}")]
    Peer {
        peer_id: String,
        source: CapabilityError,
    },
    #[error("data connection {data_id}: {source}")]
    Data {
        data_id: Handle,
        local: String,
        remote: String,
        source: CapabilityError,
    },
    #[error("media connection {media_connection_id}: {source}")]
    Media {
        media_connection_id: Handle,
        local: String,
        remote: String,
        source: CapabilityError,
    },
    #[error("local stream: {0}")]
    LocalStream(CapabilityError),
}

impl AdapterError {
    pub fn into_event(self) -> Event {
        match self {
            AdapterError::NotFound(RegistryError::NotFound {
                handle, expected, ..
            }) => match expected {
                ResourceKind::Peer => Event::PeerDoesNotExist { peer_id: handle },
                ResourceKind::Data => Event::DataConnectionDoesNotExist { data_id: handle },
                ResourceKind::Media => Event::MediaConnectionDoesNotExist {
                    media_connection_id: handle,
                },
                ResourceKind::Stream => Event::StreamDoesNotExist { stream_id: handle },
                ResourceKind::Blob => Event::BlobDoesNotExist { blob_id: handle },
            },
            AdapterError::Peer { peer_id, source } => Event::PeerError {
                peer_id,
                err: source.to_string(),
            },
            AdapterError::Data {
                data_id,
                local,
                remote,
                source,
            } => Event::DataError {
                data_id,
                local,
                remote,
                err: source.to_string(),
            },
            AdapterError::Media {
                media_connection_id,
                local,
                remote,
                source,
            } => Event::MediaConnectionError {
                media_connection_id,
                local,
                remote,
                err: source.to_string(),
            },
            AdapterError::LocalStream(source) => Event::LocalStreamError {
                err: source.to_string(),
            },
        }
    }
}

/// What the medium delivers: typed commands, or raw text still to be decoded
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(Command),
    Text(String),
}

impl From<Command> for Inbound {
    fn from(command: Command) -> Self {
        Inbound::Command(command)
    }
}

impl From<String> for Inbound {
    fn from(text: String) -> Self {
        Inbound::Text(text)
    }
}

/// Shared state handed to the resource state machines
pub struct Context<'a> {
    pub registry: &'a Registry,
    pub emitter: &'a Emitter,
    pub ids: &'a dyn IdGenerator,
    pub config: &'a AdapterConfig,
}

/// Callback tagged with the machine it belongs to
enum Signal {
    Session(u64, SessionEvent),
    Data(Handle, DataEvent),
    Media(Handle, MediaEvent),
}

fn signal_stream<E, F>(events: EventRx<E>, wrap: F) -> BoxStream<'static, Signal>
where
    E: Send + 'static,
    F: Fn(E) -> Signal + Send + 'static,
{
    stream::unfold(events, |mut rx| async move { rx.recv().await.map(|e| (e, rx)) })
        .map(wrap)
        .boxed()
}

struct Shared {
    registry: Registry,
    emitter: Emitter,
    ids: Arc<dyn IdGenerator>,
    config: AdapterConfig,
}

impl Shared {
    fn cx(&self) -> Context<'_> {
        Context {
            registry: &self.registry,
            emitter: &self.emitter,
            ids: self.ids.as_ref(),
            config: &self.config,
        }
    }
}

/// Translates commands into capability calls and callbacks into events
pub struct Adapter {
    network: Arc<dyn PeerNetwork>,
    shared: Shared,
    custom_ids: bool,
    sessions: HashMap<u64, PeerMachine>,
    next_session: u64,
    channels: HashMap<Handle, DataMachine>,
    calls: HashMap<Handle, MediaMachine>,
    signals: SelectAll<BoxStream<'static, Signal>>,
}

impl Adapter {
    pub fn new(network: Arc<dyn PeerNetwork>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            network,
            shared: Shared {
                registry: Registry::in_memory(),
                emitter: Emitter::new(sink),
                ids: Arc::new(RandomIds::default()),
                config: AdapterConfig::default(),
            },
            custom_ids: false,
            sessions: HashMap::new(),
            next_session: 1,
            channels: HashMap::new(),
            calls: HashMap::new(),
            signals: SelectAll::new(),
        }
    }

    /// Use a different handle store (default: in-memory)
    pub fn with_store(mut self, store: Arc<dyn HandleStore>) -> Self {
        self.shared.registry = Registry::new(store);
        self
    }

    /// Use a different id generator (default: random, `config.id_length` long)
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.shared.ids = ids;
        self.custom_ids = true;
        self
    }

    pub fn with_config(mut self, config: AdapterConfig) -> Self {
        if !self.custom_ids {
            self.shared.ids = Arc::new(RandomIds::new(config.id_length));
        }
        self.shared.config = config;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn data_connection_count(&self) -> usize {
        self.channels.len()
    }

    pub fn media_connection_count(&self) -> usize {
        self.calls.len()
    }

    /// Drive the adapter until the command stream ends, then destroy every
    /// session it still owns
    pub async fn run<S, T>(mut self, mut commands: S)
    where
        S: Stream<Item = T> + Unpin,
        T: Into<Inbound>,
    {
        loop {
            tokio::select! {
                inbound = commands.next() => match inbound {
                    Some(inbound) => self.handle_inbound(inbound.into()).await,
                    None => break,
                },
                Some(signal) = self.signals.next(), if !self.signals.is_empty() => {
                    self.handle_signal(signal);
                }
            }
        }
        info!("Command stream ended");
        self.shutdown().await;
    }

    pub async fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Command(command) => self.handle_command(command).await,
            Inbound::Text(text) => self.handle_text(&text).await,
        }
    }

    /// Decode and dispatch one JSON command
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<Command>(text) {
            Ok(command) => self.handle_command(command).await,
            Err(e) => {
                warn!("Undecodable command: {}", e);
                self.shared.emitter.emit(Event::UnknownCommand {
                    reason: e.to_string(),
                });
            }
        }
    }

    pub async fn handle_command(&mut self, command: Command) {
        debug!("<- {}", command.tag());
        if let Err(err) = self.dispatch(command).await {
            warn!("{}", err);
            self.shared.emitter.emit(err.into_event());
        }
    }

    /// Process every callback already queued, without waiting for more
    pub fn drain(&mut self) -> usize {
        let mut processed = 0;
        while let Some(Some(signal)) = self.signals.next().now_or_never() {
            self.handle_signal(signal);
            processed += 1;
        }
        processed
    }

    /// Destroy every session still owned by this adapter
    pub async fn shutdown(&mut self) {
        for machine in self.sessions.values() {
            machine.session().destroy().await;
        }
        self.drain();
    }

    async fn dispatch(&mut self, command: Command) -> Result<(), AdapterError> {
        match command {
            Command::NewPeer { peer_id } => self.new_peer(peer_id).await,
            Command::ConnectToPeer { local, remote } => self.connect_to_peer(local, remote).await,
            Command::CallPeer {
                local,
                remote,
                stream_id,
            } => self.call_peer(local, remote, stream_id).await,
            Command::ReconnectToServer { peer_id } => self.reconnect_to_server(peer_id).await,
            Command::AnswerMediaConnection {
                media_connection_id,
                stream_id,
            } => self.answer(media_connection_id, stream_id).await,
            Command::SendData { data_id, data } => {
                self.send(data_id, None, DataPayload::Json(data)).await
            }
            Command::SendBlob { data_id, blob_id } => self.send_blob(data_id, blob_id).await,
            Command::CloseDataConnection { data_id } => {
                self.shared.registry.data(&data_id)?.close().await;
                Ok(())
            }
            Command::CloseMediaConnection {
                media_connection_id,
            } => {
                self.shared.registry.media(&media_connection_id)?.close().await;
                Ok(())
            }
            Command::DestroyPeer { peer_id } => {
                self.shared.registry.peer(&peer_id)?.destroy().await;
                Ok(())
            }
            Command::OpenLocalStream { audio, video } => self.open_local_stream(audio, video).await,
            Command::ReadBlob { blob_id } => self.read_blob(blob_id),
            Command::ReleaseBlob { blob_id } => {
                self.shared.registry.release(&blob_id, ResourceKind::Blob)?;
                Ok(())
            }
            Command::ReleaseStream { stream_id } => {
                self.shared
                    .registry
                    .release(&stream_id, ResourceKind::Stream)?;
                Ok(())
            }
        }
    }

    async fn new_peer(&mut self, requested: Option<String>) -> Result<(), AdapterError> {
        let endpoint = self
            .network
            .create(requested.clone())
            .await
            .map_err(|source| AdapterError::Peer {
                peer_id: requested.unwrap_or_default(),
                source,
            })?;

        let key = self.next_session;
        self.next_session += 1;
        self.signals
            .push(signal_stream(endpoint.events, move |e| Signal::Session(key, e)));
        self.sessions.insert(key, PeerMachine::new(endpoint.object));
        Ok(())
    }

    async fn connect_to_peer(&mut self, local: String, remote: String) -> Result<(), AdapterError> {
        let session = self.shared.registry.peer(&local)?;
        let endpoint = session
            .connect(&remote)
            .await
            .map_err(|source| AdapterError::Peer {
                peer_id: local.clone(),
                source,
            })?;
        self.attach_data(endpoint, local, remote);
        Ok(())
    }

    async fn call_peer(
        &mut self,
        local: String,
        remote: String,
        stream_id: Handle,
    ) -> Result<(), AdapterError> {
        let stream = self.shared.registry.stream(&stream_id)?;
        let session = self.shared.registry.peer(&local)?;
        let endpoint = session
            .call(&remote, stream)
            .await
            .map_err(|source| AdapterError::Peer {
                peer_id: local.clone(),
                source,
            })?;
        self.attach_media(endpoint, local, remote, false);
        Ok(())
    }

    async fn reconnect_to_server(&mut self, peer_id: String) -> Result<(), AdapterError> {
        let session = self.shared.registry.peer(&peer_id)?;
        session
            .reconnect()
            .await
            .map_err(|source| AdapterError::Peer { peer_id, source })
    }

    async fn answer(
        &mut self,
        media_connection_id: Handle,
        stream_id: Option<Handle>,
    ) -> Result<(), AdapterError> {
        let connection = self.shared.registry.media(&media_connection_id)?;
        let stream = match stream_id {
            Some(stream_id) => Some(self.shared.registry.stream(&stream_id)?),
            None => None,
        };
        connection
            .answer(stream)
            .await
            .map_err(|source| self.media_error(media_connection_id, source))
    }

    async fn send_blob(&mut self, data_id: Handle, blob_id: Handle) -> Result<(), AdapterError> {
        let blob = self.shared.registry.blob(&blob_id)?;
        let payload = DataPayload::Binary {
            content_type: Some(blob.content_type),
            bytes: blob.bytes,
        };
        self.send(data_id, Some(blob_id), payload).await
    }

    async fn send(
        &mut self,
        data_id: Handle,
        blob_id: Option<Handle>,
        payload: DataPayload,
    ) -> Result<(), AdapterError> {
        let connection = self.shared.registry.data(&data_id)?;
        if let Some(blob_id) = blob_id {
            debug!("Sending blob {} over {}", blob_id, data_id);
        }
        connection
            .send(payload)
            .await
            .map_err(|source| self.data_error(data_id, source))
    }

    async fn open_local_stream(&mut self, audio: bool, video: bool) -> Result<(), AdapterError> {
        let stream = self
            .network
            .open_local_stream(audio, video)
            .await
            .map_err(AdapterError::LocalStream)?;
        let stream_id = self.shared.ids.next_id();
        self.shared
            .registry
            .set(stream_id.clone(), Resource::Stream(stream));
        self.shared
            .emitter
            .emit(Event::LocalStreamOpened { stream_id });
        Ok(())
    }

    fn read_blob(&mut self, blob_id: Handle) -> Result<(), AdapterError> {
        let blob = self.shared.registry.blob(&blob_id)?;
        let data = base64::engine::general_purpose::STANDARD.encode(&blob.bytes);
        self.shared.emitter.emit(Event::BlobRead {
            blob_id,
            content_type: blob.content_type,
            data,
        });
        Ok(())
    }

    fn data_error(&self, data_id: Handle, source: CapabilityError) -> AdapterError {
        let (local, remote) = self
            .channels
            .get(&data_id)
            .map(|m| (m.local().to_string(), m.remote().to_string()))
            .unwrap_or_default();
        AdapterError::Data {
            data_id,
            local,
            remote,
            source,
        }
    }

    fn media_error(&self, media_connection_id: Handle, source: CapabilityError) -> AdapterError {
        let (local, remote) = self
            .calls
            .get(&media_connection_id)
            .map(|m| (m.local().to_string(), m.remote().to_string()))
            .unwrap_or_default();
        AdapterError::Media {
            media_connection_id,
            local,
            remote,
            source,
        }
    }

    fn attach_data(&mut self, endpoint: DataEndpoint, local: String, remote: String) {
        let handle = self.shared.ids.next_id();
        debug!("Attached data channel {} ({} -> {})", handle, local, remote);

        let tag = handle.clone();
        self.signals.push(signal_stream(endpoint.events, move |e| {
            Signal::Data(tag.clone(), e)
        }));
        self.channels.insert(
            handle.clone(),
            DataMachine::new(handle, endpoint.object, local, remote),
        );
    }

    fn attach_media(&mut self, endpoint: MediaEndpoint, local: String, remote: String, inbound: bool) {
        let handle = self.shared.ids.next_id();
        debug!("Attached media connection {} ({} -> {})", handle, local, remote);

        let machine = MediaMachine::attach(
            handle.clone(),
            endpoint.object,
            local.clone(),
            remote.clone(),
            &self.shared.cx(),
        );
        if inbound {
            self.shared.emitter.emit(Event::IncomingCall {
                media_connection_id: handle.clone(),
                local,
                remote,
            });
        }

        let tag = handle.clone();
        self.signals.push(signal_stream(endpoint.events, move |e| {
            Signal::Media(tag.clone(), e)
        }));
        self.calls.insert(handle, machine);
    }

    fn handle_signal(&mut self, signal: Signal) {
        let cx = self.shared.cx();
        match signal {
            Signal::Session(key, event) => {
                let Some(machine) = self.sessions.get_mut(&key) else {
                    debug!("Dropping callback for finished session {}", key);
                    return;
                };
                let incoming = machine.handle(event, &cx);
                if machine.is_closed() {
                    self.sessions.remove(&key);
                }
                match incoming {
                    Some(Incoming::Data { endpoint, local }) => {
                        let remote = endpoint.object.peer().to_string();
                        self.attach_data(endpoint, local, remote);
                    }
                    Some(Incoming::Media { endpoint, local }) => {
                        let remote = endpoint.object.peer().to_string();
                        self.attach_media(endpoint, local, remote, true);
                    }
                    None => {}
                }
            }
            Signal::Data(handle, event) => {
                let Some(machine) = self.channels.get_mut(&handle) else {
                    debug!("Dropping callback for finished data channel {}", handle);
                    return;
                };
                machine.handle(event, &cx);
                if machine.is_closed() && cx.config.release_on_close {
                    self.channels.remove(&handle);
                }
            }
            Signal::Media(handle, event) => {
                let Some(machine) = self.calls.get_mut(&handle) else {
                    debug!("Dropping callback for finished media connection {}", handle);
                    return;
                };
                machine.handle(event, &cx);
                if machine.is_closed() && cx.config.release_on_close {
                    self.calls.remove(&handle);
                }
            }
        }
    }
}
