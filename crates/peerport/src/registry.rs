//! Handle registry
//!
//! Maps opaque string handles to live capability objects, which cannot cross
//! the port boundary themselves. Each slot keeps its resource alive until the
//! handle is deleted; the capability still drives the real life cycle.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::capability::{DataConnection, MediaConnection, MediaStream, PeerSession};
use crate::types::Handle;

/// Inbound payload that was not recognized as structured data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub content_type: String,
    pub bytes: Bytes,
}

/// Anything a handle can refer to
#[derive(Clone)]
pub enum Resource {
    Peer(Arc<dyn PeerSession>),
    Data(Arc<dyn DataConnection>),
    Media(Arc<dyn MediaConnection>),
    Stream(MediaStream),
    Blob(RawPayload),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Peer(_) => ResourceKind::Peer,
            Resource::Data(_) => ResourceKind::Data,
            Resource::Media(_) => ResourceKind::Media,
            Resource::Stream(_) => ResourceKind::Stream,
            Resource::Blob(_) => ResourceKind::Blob,
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
            Resource::Blob(blob) => f.debug_tuple("Blob").field(blob).finish(),
            other => write!(f, "{}", other.kind()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Peer,
    Data,
    Media,
    Stream,
    Blob,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Peer => "peer session",
            ResourceKind::Data => "data connection",
            ResourceKind::Media => "media connection",
            ResourceKind::Stream => "media stream",
            ResourceKind::Blob => "raw payload",
        };
        f.write_str(name)
    }
}

/// Typed lookup failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Handle absent, or present with a different kind
    #[error("{expected} {handle} does not exist")]
    NotFound {
        handle: Handle,
        expected: ResourceKind,
        found: Option<ResourceKind>,
    },
}

/// Pluggable handle storage
///
/// `set`, `get` and `delete` are the atomic units; no multi-step transactions.
pub trait HandleStore: Send + Sync {
    /// Store or replace; returns the replaced resource
    fn set(&self, handle: Handle, resource: Resource) -> Option<Resource>;

    fn get(&self, handle: &str) -> Option<Resource>;

    /// Remove if present; returns true if something was removed
    fn delete(&self, handle: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory handle store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<Handle, Resource>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All handles currently stored
    pub fn handles(&self) -> Vec<Handle> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl HandleStore for MemoryStore {
    fn set(&self, handle: Handle, resource: Resource) -> Option<Resource> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, resource)
    }

    fn get(&self, handle: &str) -> Option<Resource> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
    }

    fn delete(&self, handle: &str) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle)
            .is_some()
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Typed view over a handle store
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn HandleStore>,
}

impl Registry {
    pub fn new(store: Arc<dyn HandleStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn set(&self, handle: impl Into<Handle>, resource: Resource) {
        let handle = handle.into();
        if let Some(previous) = self.store.set(handle.clone(), resource) {
            tracing::debug!("Replaced {} under {}", previous.kind(), handle);
        }
    }

    pub fn get(&self, handle: &str) -> Option<Resource> {
        self.store.get(handle)
    }

    pub fn delete(&self, handle: &str) -> bool {
        self.store.delete(handle)
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.store.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn peer(&self, handle: &str) -> Result<Arc<dyn PeerSession>, RegistryError> {
        match self.store.get(handle) {
            Some(Resource::Peer(peer)) => Ok(peer),
            other => Err(not_found(handle, ResourceKind::Peer, other)),
        }
    }

    pub fn data(&self, handle: &str) -> Result<Arc<dyn DataConnection>, RegistryError> {
        match self.store.get(handle) {
            Some(Resource::Data(conn)) => Ok(conn),
            other => Err(not_found(handle, ResourceKind::Data, other)),
        }
    }

    pub fn media(&self, handle: &str) -> Result<Arc<dyn MediaConnection>, RegistryError> {
        match self.store.get(handle) {
            Some(Resource::Media(conn)) => Ok(conn),
            other => Err(not_found(handle, ResourceKind::Media, other)),
        }
    }

    pub fn stream(&self, handle: &str) -> Result<MediaStream, RegistryError> {
        match self.store.get(handle) {
            Some(Resource::Stream(stream)) => Ok(stream),
            other => Err(not_found(handle, ResourceKind::Stream, other)),
        }
    }

    pub fn blob(&self, handle: &str) -> Result<RawPayload, RegistryError> {
        match self.store.get(handle) {
            Some(Resource::Blob(blob)) => Ok(blob),
            other => Err(not_found(handle, ResourceKind::Blob, other)),
        }
    }

    /// Delete `handle` only if it holds a resource of `kind`
    pub fn release(&self, handle: &str, kind: ResourceKind) -> Result<(), RegistryError> {
        match self.store.get(handle) {
            Some(resource) if resource.kind() == kind => {
                self.store.delete(handle);
                Ok(())
            }
            other => Err(not_found(handle, kind, other)),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.store.len())
            .finish()
    }
}

fn not_found(handle: &str, expected: ResourceKind, found: Option<Resource>) -> RegistryError {
    RegistryError::NotFound {
        handle: handle.to_string(),
        expected,
        found: found.map(|r| r.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{MediaTrack, TrackKind};

    fn blob(bytes: &'static [u8]) -> Resource {
        Resource::Blob(RawPayload {
            content_type: "Binary".to_string(),
            bytes: Bytes::from_static(bytes),
        })
    }

    fn stream() -> Resource {
        Resource::Stream(MediaStream::new(
            "cam",
            vec![MediaTrack {
                kind: TrackKind::Video,
                label: "cam".to_string(),
            }],
        ))
    }

    #[test]
    fn test_set_get_delete() {
        let registry = Registry::in_memory();
        registry.set("b1", blob(b"abc"));
        assert!(registry.contains("b1"));
        assert_eq!(registry.len(), 1);

        assert!(registry.delete("b1"));
        assert!(!registry.contains("b1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_delete_twice_is_noop() {
        let registry = Registry::in_memory();
        registry.set("b1", blob(b"abc"));
        assert!(registry.delete("b1"));
        assert!(!registry.delete("b1"));
    }

    #[test]
    fn test_set_twice_replaces() {
        let registry = Registry::in_memory();
        registry.set("h", blob(b"first"));
        registry.set("h", blob(b"second"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.blob("h").unwrap().bytes, Bytes::from_static(b"second"));
    }

    #[test]
    fn test_typed_lookup_absent() {
        let registry = Registry::in_memory();
        let err = registry.stream("s1").unwrap_err();
        assert_eq!(
            err,
            RegistryError::NotFound {
                handle: "s1".to_string(),
                expected: ResourceKind::Stream,
                found: None,
            }
        );
    }

    #[test]
    fn test_typed_lookup_wrong_kind() {
        let registry = Registry::in_memory();
        registry.set("h", stream());

        assert!(registry.stream("h").is_ok());
        match registry.blob("h") {
            Err(RegistryError::NotFound { expected, found, .. }) => {
                assert_eq!(expected, ResourceKind::Blob);
                assert_eq!(found, Some(ResourceKind::Stream));
            }
            Ok(_) => panic!("stream returned as blob"),
        }
        assert!(registry.peer("h").is_err());
    }

    #[test]
    fn test_release_checks_kind() {
        let registry = Registry::in_memory();
        registry.set("s", stream());

        assert!(registry.release("s", ResourceKind::Blob).is_err());
        assert!(registry.contains("s"));

        registry.release("s", ResourceKind::Stream).unwrap();
        assert!(!registry.contains("s"));
        assert!(registry.release("s", ResourceKind::Stream).is_err());
    }

    #[test]
    fn test_memory_store_shared_between_clones() {
        let store = MemoryStore::new();
        let registry = Registry::new(Arc::new(store.clone()));
        registry.set("b1", blob(b"x"));
        assert_eq!(store.handles(), vec!["b1".to_string()]);
    }
}
