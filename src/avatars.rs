use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MAX_OBJECT_URLS;
use crate::core::store::{Blob, Bucket, StoreClient};

const OBJECT_URL_PREFIX: &str = "blob:";

#[derive(Default)]
struct Registry {
    blobs: HashMap<String, Blob>,
    /// Source key (an avatar path) to the id minted for it.
    keys: HashMap<String, String>,
    /// Ids in creation order, oldest first.
    order: VecDeque<String>,
}

impl Registry {
    fn remove(&mut self, id: &str) -> bool {
        self.keys.retain(|_, v| v != id);
        self.order.retain(|v| v != id);
        self.blobs.remove(id).is_some()
    }
}

/// Local, revocable handles to downloaded bytes. Holds at most one handle
/// per source key and at most `capacity` handles overall; the oldest is
/// revoked first.
#[derive(Clone)]
pub struct ObjectUrls {
    inner: Arc<RwLock<Registry>>,
    capacity: usize,
}

impl Default for ObjectUrls {
    fn default() -> Self {
        Self::with_capacity(MAX_OBJECT_URLS)
    }
}

impl ObjectUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    pub fn create(&self, blob: Blob) -> String {
        let id = Uuid::new_v4().to_string();
        let mut registry = self.inner.write().unwrap_or_else(|e| e.into_inner());
        while registry.order.len() >= self.capacity {
            let Some(oldest) = registry.order.front().cloned() else {
                break;
            };
            registry.remove(&oldest);
            debug!(id = %oldest, "object url evicted");
        }
        registry.blobs.insert(id.clone(), blob);
        registry.order.push_back(id.clone());
        format!("{}{}", OBJECT_URL_PREFIX, id)
    }

    /// Like `create`, replacing whatever handle `key` had before.
    pub fn create_for(&self, key: &str, blob: Blob) -> String {
        if let Some(previous) = self.lookup(key) {
            self.revoke(&previous);
        }
        let url = self.create(blob);
        let id = url.trim_start_matches(OBJECT_URL_PREFIX).to_string();
        let mut registry = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if registry.blobs.contains_key(&id) {
            registry.keys.insert(key.to_string(), id);
        }
        url
    }

    /// The live handle for `key`, if any.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let registry = self.inner.read().unwrap_or_else(|e| e.into_inner());
        registry.keys.get(key).map(|id| format!("{}{}", OBJECT_URL_PREFIX, id))
    }

    pub fn get(&self, url: &str) -> Option<Blob> {
        let id = url.strip_prefix(OBJECT_URL_PREFIX).unwrap_or(url);
        let registry = self.inner.read().unwrap_or_else(|e| e.into_inner());
        registry.blobs.get(id).cloned()
    }

    pub fn revoke(&self, url: &str) -> bool {
        let id = url.strip_prefix(OBJECT_URL_PREFIX).unwrap_or(url);
        let mut registry = self.inner.write().unwrap_or_else(|e| e.into_inner());
        registry.remove(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Path under which the server exposes an object URL.
pub fn href(url: &str) -> String {
    format!("/blob/{}", url.strip_prefix(OBJECT_URL_PREFIX).unwrap_or(url))
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AvatarState {
    Unfetched,
    Fetching,
    Fetched { url: String },
    Failed,
}

/// Avatar of one rendered row. A new path restarts the fetch cycle.
#[derive(Serialize, Clone, Debug)]
pub struct AvatarSlot {
    path: Option<String>,
    state: AvatarState,
}

impl AvatarSlot {
    pub fn new(path: Option<String>) -> Self {
        Self {
            path,
            state: AvatarState::Unfetched,
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn state(&self) -> &AvatarState {
        &self.state
    }

    /// Returns whether the path changed. A previous object URL is revoked.
    pub fn set_path(&mut self, path: Option<String>, urls: &ObjectUrls) -> bool {
        if path == self.path {
            return false;
        }
        if let AvatarState::Fetched { url } = &self.state {
            urls.revoke(url);
        }
        self.path = path;
        self.state = AvatarState::Unfetched;
        true
    }

    pub fn needs_fetch(&self) -> bool {
        self.path.is_some() && self.state == AvatarState::Unfetched
    }

    /// Download the avatar, reusing a live handle for the same path.
    /// Failures are logged and leave the placeholder.
    pub async fn load(&mut self, bucket: &Bucket, urls: &ObjectUrls) {
        let Some(path) = self.path.clone() else {
            return;
        };
        if !self.needs_fetch() {
            return;
        }
        if let Some(url) = urls.lookup(&path) {
            self.state = AvatarState::Fetched { url };
            return;
        }

        self.state = AvatarState::Fetching;
        self.state = match bucket.download(&path).await {
            Ok(blob) => AvatarState::Fetched {
                url: urls.create_for(&path, blob),
            },
            Err(err) => {
                warn!(path = %path, "avatar download failed: {}", err.message());
                AvatarState::Failed
            }
        };
    }

    /// Image source to render, `None` meaning the placeholder icon.
    pub fn display_url(&self) -> Option<String> {
        match &self.state {
            AvatarState::Fetched { url } => Some(href(url)),
            _ => None,
        }
    }
}

pub async fn load_avatar(store: &StoreClient, path: Option<&str>, urls: &ObjectUrls) -> AvatarSlot {
    let mut slot = AvatarSlot::new(path.map(str::to_string));
    if slot.needs_fetch() {
        slot.load(&store.bucket(&crate::config::avatar_bucket()), urls).await;
    }
    slot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob() -> Blob {
        Blob {
            bytes: vec![1, 2, 3],
            content_type: "image/png".to_string(),
        }
    }

    #[test]
    fn object_urls_are_revocable() {
        let urls = ObjectUrls::new();
        let url = urls.create(blob());
        assert!(url.starts_with("blob:"));
        assert_eq!(urls.get(&url).map(|b| b.bytes), Some(vec![1, 2, 3]));
        assert!(urls.revoke(&url));
        assert!(urls.get(&url).is_none());
        assert!(!urls.revoke(&url));
    }

    #[test]
    fn new_path_restarts_and_revokes() {
        let urls = ObjectUrls::new();
        let url = urls.create(blob());
        let mut slot = AvatarSlot {
            path: Some("a.png".to_string()),
            state: AvatarState::Fetched { url: url.clone() },
        };
        assert_eq!(slot.display_url(), Some(href(&url)));

        assert!(!slot.set_path(Some("a.png".to_string()), &urls));
        assert!(slot.set_path(Some("b.png".to_string()), &urls));
        assert_eq!(slot.state(), &AvatarState::Unfetched);
        assert!(slot.needs_fetch());
        assert!(urls.is_empty());
        assert_eq!(slot.display_url(), None);
    }

    #[test]
    fn one_handle_per_key() {
        let urls = ObjectUrls::new();
        let first = urls.create_for("u1/a.png", blob());
        assert_eq!(urls.lookup("u1/a.png"), Some(first.clone()));

        let second = urls.create_for("u1/a.png", blob());
        assert_ne!(first, second);
        assert_eq!(urls.len(), 1);
        assert!(urls.get(&first).is_none());
        assert_eq!(urls.lookup("u1/a.png"), Some(second.clone()));

        assert!(urls.revoke(&second));
        assert_eq!(urls.lookup("u1/a.png"), None);
        assert!(urls.is_empty());
    }

    #[test]
    fn oldest_handle_is_evicted_at_capacity() {
        let urls = ObjectUrls::with_capacity(2);
        let a = urls.create_for("a.png", blob());
        let b = urls.create_for("b.png", blob());
        let c = urls.create_for("c.png", blob());

        assert_eq!(urls.len(), 2);
        assert!(urls.get(&a).is_none());
        assert_eq!(urls.lookup("a.png"), None);
        assert!(urls.get(&b).is_some());
        assert_eq!(urls.lookup("c.png"), Some(c));
    }

    #[test]
    fn no_path_never_fetches() {
        let slot = AvatarSlot::new(None);
        assert!(!slot.needs_fetch());
        assert_eq!(slot.display_url(), None);
    }
}
