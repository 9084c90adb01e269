//! Operator session: who is logged in, persisted across runs.
//!
//! One process-wide store with an explicit lifecycle: loaded from disk at
//! startup, mutated only by login/logout/update, removed from disk on
//! logout. Consumers register callbacks to hear about changes instead of
//! polling; the dashboard uses this to tear down the metrics connection
//! the moment the operator logs out.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::endpoints::config_dir;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginSession {
    pub pubkey: String,
    /// unix seconds at login
    pub created: i64,
}

type Listener = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    session: Option<LoginSession>,
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
}

pub struct SessionStore {
    inner: Mutex<Inner>,
    path: PathBuf,
}

pub fn session_path() -> PathBuf {
    config_dir().join("session.json")
}

/// Path of the operator's local signing key.
pub fn identity_path() -> PathBuf {
    config_dir().join("identity.key")
}

/// The process-wide store. Initialized from disk on first touch.
pub static SESSION: Lazy<SessionStore> = Lazy::new(|| SessionStore::open(session_path()));

impl SessionStore {
    pub fn open(path: PathBuf) -> Self {
        let session = fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok());
        Self {
            inner: Mutex::new(Inner {
                session,
                listeners: Vec::new(),
                next_id: 0,
            }),
            path,
        }
    }

    pub fn session(&self) -> Option<LoginSession> {
        self.inner.lock().unwrap().session.clone()
    }

    pub fn pubkey(&self) -> Option<String> {
        self.session().map(|s| s.pubkey)
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.lock().unwrap().session.is_some()
    }

    pub fn login(&self, session: LoginSession) {
        self.replace(Some(session));
    }

    pub fn update(&self, session: LoginSession) {
        self.replace(Some(session));
    }

    pub fn logout(&self) {
        self.replace(None);
    }

    /// Registers a change callback; returns an id for [`unsubscribe`].
    /// Callbacks run after the mutation, outside the store lock.
    ///
    /// [`unsubscribe`]: SessionStore::unsubscribe
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.inner
            .lock()
            .unwrap()
            .listeners
            .retain(|(lid, _)| *lid != id);
    }

    fn replace(&self, next: Option<LoginSession>) {
        let listeners: Vec<Listener> = {
            let mut inner = self.inner.lock().unwrap();
            inner.session = next;
            self.persist(inner.session.as_ref());
            inner.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        for l in listeners {
            l();
        }
    }

    fn persist(&self, session: Option<&LoginSession>) {
        let res = match session {
            Some(s) => {
                let data = serde_json::to_vec_pretty(s).expect("serialize session");
                self.path
                    .parent()
                    .map(fs::create_dir_all)
                    .transpose()
                    .and_then(|_| fs::write(&self.path, data).map(|_| ()))
            }
            None => match fs::remove_file(&self.path) {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
                _ => Ok(()),
            },
        };
        if let Err(err) = res {
            warn!(%err, path = %self.path.display(), "failed to persist session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample() -> LoginSession {
        LoginSession {
            pubkey: "ab".repeat(32),
            created: 1_700_000_000,
        }
    }

    #[test]
    fn login_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = SessionStore::open(path.clone());
        assert!(!store.is_logged_in());
        store.login(sample());
        assert_eq!(store.pubkey().as_deref(), Some(&*"ab".repeat(32)));

        // A second store opened on the same path sees the session.
        let reopened = SessionStore::open(path.clone());
        assert_eq!(reopened.session(), Some(sample()));

        reopened.logout();
        assert!(!path.exists());
        assert!(SessionStore::open(path).session().is_none());
    }

    #[test]
    fn listeners_fire_on_every_mutation_until_unsubscribed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("session.json"));

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let id = store.subscribe(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        store.login(sample());
        store.update(sample());
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        store.unsubscribe(id);
        store.logout();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_may_read_the_store() {
        // Callbacks run outside the lock, so re-entrant reads must not
        // deadlock.
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::open(dir.path().join("session.json")));
        let seen = Arc::new(Mutex::new(None));

        let s2 = store.clone();
        let seen2 = seen.clone();
        store.subscribe(move || {
            *seen2.lock().unwrap() = s2.pubkey();
        });

        store.login(sample());
        assert_eq!(seen.lock().unwrap().as_deref(), Some(&*"ab".repeat(32)));
    }
}
