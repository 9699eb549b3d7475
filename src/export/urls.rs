use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

struct UrlEntry {
    payload: Arc<[u8]>,
    mime_type: String,
}

/// Registry of transient URLs pointing at in-memory payloads.
///
/// Every URL handed out must be revoked; `live_count` exposes leaks.
#[derive(Default)]
pub struct ObjectUrlRegistry {
    entries: Mutex<HashMap<String, UrlEntry>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, payload: Arc<[u8]>, mime_type: &str) -> String {
        let url = format!("blob:practice-capture/{}", Uuid::new_v4());
        self.entries.lock().insert(
            url.clone(),
            UrlEntry {
                payload,
                mime_type: mime_type.to_string(),
            },
        );
        debug!("Created object URL {}", url);
        url
    }

    /// Returns false if the URL was unknown or already revoked
    pub fn revoke(&self, url: &str) -> bool {
        let removed = self.entries.lock().remove(url).is_some();
        if removed {
            debug!("Revoked object URL {}", url);
        }
        removed
    }

    pub fn resolve(&self, url: &str) -> Option<(Arc<[u8]>, String)> {
        self.entries
            .lock()
            .get(url)
            .map(|e| (Arc::clone(&e.payload), e.mime_type.clone()))
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.entries.lock().contains_key(url)
    }

    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn revoke_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }
}
