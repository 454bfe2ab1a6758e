//! Binary media collaborator.

use bytes::Bytes;
use dashmap::DashMap;
use uuid::Uuid;

/// Content types `v1:todos.attach` accepts for inline uploads.
pub const ACCEPTED_MEDIA_TYPES: [&str; 4] =
    ["image/png", "image/jpeg", "application/pdf", "text/plain"];

/// Upload size limit in bytes (10 MiB).
pub const MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub id: String,
    pub data: Bytes,
    pub content_type: String,
    pub filename: String,
}

/// Stores opaque blobs and hands back an id.
pub trait MediaStore: Send + Sync + 'static {
    fn store(&self, data: Bytes, content_type: &str, filename: &str) -> StoredMedia;

    fn get(&self, id: &str) -> Option<StoredMedia>;
}

#[derive(Debug, Default)]
pub struct InMemoryMediaStore {
    items: DashMap<String, StoredMedia>,
}

impl InMemoryMediaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl MediaStore for InMemoryMediaStore {
    fn store(&self, data: Bytes, content_type: &str, filename: &str) -> StoredMedia {
        let media = StoredMedia {
            id: Uuid::new_v4().to_string(),
            data,
            content_type: content_type.to_string(),
            filename: filename.to_string(),
        };
        self.items.insert(media.id.clone(), media.clone());
        media
    }

    fn get(&self, id: &str) -> Option<StoredMedia> {
        self.items.get(id).map(|entry| entry.value().clone())
    }
}
