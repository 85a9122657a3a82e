//! Short identifier generation for locally named resources

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::types::DEFAULT_ID_LENGTH;

/// Source of fresh handles for data channels, media connections, streams and blobs
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random lowercase-hex ids cut from v4 UUIDs, collision-resistant at the
/// default length
#[derive(Debug, Clone)]
pub struct RandomIds {
    len: usize,
}

impl RandomIds {
    pub fn new(len: usize) -> Self {
        Self { len: len.max(1) }
    }
}

impl Default for RandomIds {
    fn default() -> Self {
        Self::new(DEFAULT_ID_LENGTH)
    }
}

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        let mut id = String::with_capacity(self.len + 32);
        while id.len() < self.len {
            id.push_str(&Uuid::new_v4().simple().to_string());
        }
        id.truncate(self.len);
        id
    }
}

/// Deterministic `prefix-N` ids, for tests and reproducible traces
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}
