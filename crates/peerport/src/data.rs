//! Data channel state machine and payload classification
//!
//! connecting -> open -> closed, errors orthogonal. Every inbound payload is
//! either forwarded inline (`DataReceivedJSON`) or stored under a fresh blob
//! handle (`DataReceivedBlob`), never both.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::adapter::Context;
use crate::capability::{DataConnection, DataEvent, DataPayload};
use crate::registry::{RawPayload, Resource};
use crate::types::{Event, Handle, BINARY_TYPE_NAME};

/// Outgoing shape of an inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Inline(Value),
    Blob(RawPayload),
}

/// Explicit JSON wrappers and bare primitives are inlined; explicit binary
/// wrappers and anything unrecognized become blobs.
pub fn classify(payload: DataPayload) -> Classified {
    match payload {
        DataPayload::Json(value) => Classified::Inline(value),
        DataPayload::Text(text) => Classified::Inline(Value::String(text)),
        // non-finite numbers have no JSON form and map to null
        DataPayload::Number(n) => Classified::Inline(Value::from(n)),
        DataPayload::Bool(b) => Classified::Inline(Value::Bool(b)),
        DataPayload::Binary {
            content_type,
            bytes,
        } => Classified::Blob(RawPayload {
            content_type: content_type.unwrap_or_else(|| BINARY_TYPE_NAME.to_string()),
            bytes,
        }),
        DataPayload::Opaque { type_name, bytes } => Classified::Blob(RawPayload {
            content_type: type_name,
            bytes,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

pub struct DataMachine {
    handle: Handle,
    channel: Arc<dyn DataConnection>,
    local: String,
    remote: String,
    state: ChannelState,
}

impl DataMachine {
    pub fn new(
        handle: Handle,
        channel: Arc<dyn DataConnection>,
        local: String,
        remote: String,
    ) -> Self {
        Self {
            handle,
            channel,
            local,
            remote,
            state: ChannelState::Connecting,
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

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ChannelState::Closed
    }

    pub fn handle(&mut self, event: DataEvent, cx: &Context<'_>) {
        match event {
            DataEvent::Open => self.on_open(cx),
            DataEvent::Close => self.on_close(cx),
            DataEvent::Error(err) => self.on_error(err, cx),
            DataEvent::Data(payload) => self.on_data(payload, cx),
        }
    }

    pub fn on_open(&mut self, cx: &Context<'_>) {
        if self.state != ChannelState::Connecting {
            return;
        }
        info!("Data channel {} open ({} -> {})", self.handle, self.local, self.remote);
        cx.registry
            .set(self.handle.clone(), Resource::Data(self.channel.clone()));
        self.state = ChannelState::Open;
        cx.emitter.emit(Event::DataOpened {
            data_id: self.handle.clone(),
            local: self.local.clone(),
            remote: self.remote.clone(),
        });
    }

    pub fn on_close(&mut self, cx: &Context<'_>) {
        if self.state == ChannelState::Closed {
            return;
        }
        if cx.config.release_on_close {
            cx.registry.delete(&self.handle);
        }
        info!("Data channel {} closed", self.handle);
        self.state = ChannelState::Closed;
        cx.emitter.emit(Event::DataClosed {
            data_id: self.handle.clone(),
            local: self.local.clone(),
            remote: self.remote.clone(),
        });
    }

    pub fn on_error(&mut self, err: String, cx: &Context<'_>) {
        cx.emitter.emit(Event::DataError {
            data_id: self.handle.clone(),
            local: self.local.clone(),
            remote: self.remote.clone(),
            err,
        });
    }

    pub fn on_data(&mut self, payload: DataPayload, cx: &Context<'_>) {
        let event = match classify(payload) {
            Classified::Inline(data) => Event::DataReceivedJson {
                data_id: self.handle.clone(),
                local: self.local.clone(),
                remote: self.remote.clone(),
                data,
            },
            Classified::Blob(raw) => {
                let blob_id = cx.ids.next_id();
                debug!(
                    "Stored {} bytes of {} as {}",
                    raw.bytes.len(),
                    raw.content_type,
                    blob_id
                );
                let content_type = raw.content_type.clone();
                cx.registry.set(blob_id.clone(), Resource::Blob(raw));
                Event::DataReceivedBlob {
                    data_id: self.handle.clone(),
                    blob_id,
                    local: self.local.clone(),
                    remote: self.remote.clone(),
                    content_type,
                }
            }
        };
        cx.emitter.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityError;
    use crate::emitter::{Emitter, RecordingSink};
    use crate::ids::SequentialIds;
    use crate::registry::Registry;
    use crate::types::AdapterConfig;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;

    struct StubChannel;

    #[async_trait]
    impl DataConnection for StubChannel {
        fn peer(&self) -> &str {
            "b"
        }
        async fn send(&self, _payload: DataPayload) -> Result<(), CapabilityError> {
            Ok(())
        }
        async fn close(&self) {}
    }

    #[test]
    fn test_channel_registered_on_open_only() {
        let registry = Registry::in_memory();
        let sink = RecordingSink::new();
        let emitter = Emitter::new(Arc::new(sink.clone()));
        let ids = SequentialIds::new("h");
        let config = AdapterConfig::default();
        let cx = Context {
            registry: &registry,
            emitter: &emitter,
            ids: &ids,
            config: &config,
        };

        let mut machine =
            DataMachine::new("d1".into(), Arc::new(StubChannel), "a".into(), "b".into());
        assert_eq!(machine.state(), ChannelState::Connecting);
        assert!(!registry.contains("d1"));
        assert!(sink.is_empty());

        machine.handle(DataEvent::Open, &cx);
        assert_eq!(machine.state(), ChannelState::Open);
        assert!(registry.data("d1").is_ok());
        assert_eq!(
            sink.take(),
            vec![Event::DataOpened {
                data_id: "d1".into(),
                local: "a".into(),
                remote: "b".into(),
            }]
        );

        // a repeated open neither re-registers nor re-emits
        machine.handle(DataEvent::Open, &cx);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_classify_primitives_inline() {
        assert_eq!(
            classify(DataPayload::Text("hello".into())),
            Classified::Inline(json!("hello"))
        );
        assert_eq!(
            classify(DataPayload::Number(4.5)),
            Classified::Inline(json!(4.5))
        );
        assert_eq!(
            classify(DataPayload::Bool(true)),
            Classified::Inline(json!(true))
        );
    }

    #[test]
    fn test_classify_json_wrapper_inline() {
        let value = json!({"kind": "chat", "body": [1, 2, 3]});
        assert_eq!(
            classify(DataPayload::Json(value.clone())),
            Classified::Inline(value)
        );
    }

    #[test]
    fn test_classify_non_finite_number() {
        assert_eq!(
            classify(DataPayload::Number(f64::NAN)),
            Classified::Inline(Value::Null)
        );
    }

    #[test]
    fn test_classify_binary_uses_declared_type() {
        let classified = classify(DataPayload::Binary {
            content_type: Some("image/png".into()),
            bytes: Bytes::from_static(b"\x89PNG"),
        });
        match classified {
            Classified::Blob(raw) => {
                assert_eq!(raw.content_type, "image/png");
                assert_eq!(raw.bytes, Bytes::from_static(b"\x89PNG"));
            }
            other => panic!("expected blob, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_binary_without_type() {
        match classify(DataPayload::Binary {
            content_type: None,
            bytes: Bytes::new(),
        }) {
            Classified::Blob(raw) => assert_eq!(raw.content_type, BINARY_TYPE_NAME),
            other => panic!("expected blob, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_opaque_uses_runtime_type() {
        match classify(DataPayload::Opaque {
            type_name: "File".into(),
            bytes: Bytes::from_static(b"..."),
        }) {
            Classified::Blob(raw) => assert_eq!(raw.content_type, "File"),
            other => panic!("expected blob, got {:?}", other),
        }
    }
}
