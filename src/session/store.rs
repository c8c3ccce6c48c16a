//! Session store

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use tokio::time::Instant;

/// Random bytes per session id
const SESSION_ID_BYTES: usize = 18;

/// An authenticated session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// May use admin-only resources
    pub admin: bool,
    pub created_at: Instant,
}

/// Sessions keyed by id
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session and return its id
    pub fn create(&mut self, admin: bool) -> String {
        let id = loop {
            let mut raw = [0u8; SESSION_ID_BYTES];
            rand::thread_rng().fill_bytes(&mut raw);
            let id = URL_SAFE_NO_PAD.encode(raw);
            if !self.sessions.contains_key(&id) {
                break id;
            }
        };

        self.sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                admin,
                created_at: Instant::now(),
            },
        );
        tracing::debug!(admin = admin, sessions = self.sessions.len(), "Session created");
        id
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn is_admin(&self, id: &str) -> bool {
        self.sessions.get(id).map(|s| s.admin).unwrap_or(false)
    }

    /// Drop a session; returns whether it existed
    pub fn invalidate(&mut self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            tracing::info!("Session invalidated");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let mut store = SessionStore::new();
        let admin = store.create(true);
        let user = store.create(false);

        assert_ne!(admin, user);
        assert_eq!(admin.len(), 24);
        assert!(store.is_admin(&admin));
        assert!(!store.is_admin(&user));
        assert!(!store.is_admin("nope"));
        assert_eq!(store.get(&user).unwrap().id, user);
    }

    #[test]
    fn test_invalidate() {
        let mut store = SessionStore::new();
        let id = store.create(true);

        assert!(store.invalidate(&id));
        assert!(!store.invalidate(&id));
        assert!(!store.is_admin(&id));
        assert!(store.is_empty());
    }
}
