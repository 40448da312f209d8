//! Name directory held by the signal server.

use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One claimed name.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Dialable `ip:port` of the owning peer
    pub endpoint: String,
    /// Token proving ownership; only the holder may release the name
    pub lease: Uuid,
    /// Unix timestamp (seconds) of the claim
    pub registered_at: i64,
}

/// Thread-safe map of active names.
pub struct Directory {
    names: RwLock<HashMap<String, Registration>>,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    pub fn new() -> Self {
        Self {
            names: RwLock::new(HashMap::new()),
        }
    }

    /// Claim `name` for `endpoint`. Returns `None` if someone already holds it.
    pub async fn register(&self, name: &str, endpoint: String) -> Option<Uuid> {
        let mut names = self.names.write().await;
        if names.contains_key(name) {
            return None;
        }

        let lease = Uuid::new_v4();
        names.insert(
            name.to_string(),
            Registration {
                endpoint,
                lease,
                registered_at: chrono::Utc::now().timestamp(),
            },
        );
        Some(lease)
    }

    /// Release `name` if `lease` still owns it, returning the registration.
    pub async fn release(&self, name: &str, lease: Uuid) -> Option<Registration> {
        let mut names = self.names.write().await;
        if !names.get(name).is_some_and(|reg| reg.lease == lease) {
            return None;
        }
        names.remove(name)
    }

    pub async fn lookup(&self, name: &str) -> Option<String> {
        self.names
            .read()
            .await
            .get(name)
            .map(|reg| reg.endpoint.clone())
    }

    pub async fn len(&self) -> usize {
        self.names.read().await.len()
    }
}
