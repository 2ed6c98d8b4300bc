//! Transient, session-scoped references used by the live preview.
//!
//! A preview reference is only valid while its owner keeps it alive, like a
//! browser object URL. The registry is the sole owner and revokes references
//! when an entry is replaced, removed or cleared.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PreviewUrl(String);

impl PreviewUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PreviewUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for PreviewUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues and revokes transient references to image data.
pub trait PreviewStore: Send + Sync {
    fn create(&self, data: Bytes, mime_type: &str) -> PreviewUrl;
    fn revoke(&self, url: &PreviewUrl);
}

/// In-memory [`PreviewStore`] handing out `blob:folio/<n>` references.
#[derive(Debug, Default)]
pub struct MemoryPreviewStore {
    next: AtomicU64,
    live: DashMap<PreviewUrl, (Bytes, String)>,
}

impl MemoryPreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self, url: &PreviewUrl) -> bool {
        self.live.contains_key(url)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Data and MIME type behind a live reference.
    pub fn resolve(&self, url: &PreviewUrl) -> Option<(Bytes, String)> {
        self.live.get(url).map(|entry| entry.value().clone())
    }
}

impl PreviewStore for MemoryPreviewStore {
    fn create(&self, data: Bytes, mime_type: &str) -> PreviewUrl {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let url = PreviewUrl(format!("blob:folio/{id}"));
        self.live.insert(url.clone(), (data, mime_type.to_owned()));
        url
    }

    fn revoke(&self, url: &PreviewUrl) {
        if self.live.remove(url).is_none() {
            tracing::debug!(%url, "revoking a preview reference that is not live");
        }
    }
}
