//! Media connection state machine
//!
//! ringing -> {active, closed}, errors orthogonal. The connection handle is
//! registered at attach time so an inbound call can be answered before any
//! callback fires.

use std::sync::Arc;
use tracing::info;

use crate::adapter::Context;
use crate::capability::{MediaConnection, MediaEvent, MediaStream};
use crate::registry::Resource;
use crate::types::{Event, Handle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Ringing,
    Active,
    Closed,
}

pub struct MediaMachine {
    handle: Handle,
    local: String,
    remote: String,
    state: CallState,
}

impl MediaMachine {
    /// Register `connection` under `handle` and start ringing
    pub fn attach(
        handle: Handle,
        connection: Arc<dyn MediaConnection>,
        local: String,
        remote: String,
        cx: &Context<'_>,
    ) -> Self {
        cx.registry.set(handle.clone(), Resource::Media(connection));
        Self {
            handle,
            local,
            remote,
            state: CallState::Ringing,
        }
    }

    pub fn handle_id(&self) -> &str {
        &self.handle
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == CallState::Closed
    }

    pub fn handle(&mut self, event: MediaEvent, cx: &Context<'_>) {
        match event {
            MediaEvent::Stream(stream) => self.on_stream(stream, cx),
            MediaEvent::Close => self.on_close(cx),
            MediaEvent::Error(err) => self.on_error(err, cx),
        }
    }

    pub fn on_stream(&mut self, stream: MediaStream, cx: &Context<'_>) {
        if self.state == CallState::Closed {
            return;
        }
        let stream_id = cx.ids.next_id();
        info!(
            "Stream {} received on {} from {}",
            stream_id, self.handle, self.remote
        );
        cx.registry.set(stream_id.clone(), Resource::Stream(stream));
        self.state = CallState::Active;
        cx.emitter.emit(Event::MediaStreamReceived {
            media_connection_id: self.handle.clone(),
            stream_id,
            local: self.local.clone(),
            remote: self.remote.clone(),
        });
    }

    pub fn on_close(&mut self, cx: &Context<'_>) {
        if self.state == CallState::Closed {
            return;
        }
        if cx.config.release_on_close {
            cx.registry.delete(&self.handle);
        }
        info!("Media connection {} closed", self.handle);
        self.state = CallState::Closed;
        cx.emitter.emit(Event::MediaConnectionClosed {
            media_connection_id: self.handle.clone(),
            local: self.local.clone(),
            remote: self.remote.clone(),
        });
    }

    pub fn on_error(&mut self, err: String, cx: &Context<'_>) {
        cx.emitter.emit(Event::MediaConnectionError {
            media_connection_id: self.handle.clone(),
            local: self.local.clone(),
            remote: self.remote.clone(),
            err,
        });
    }
}
