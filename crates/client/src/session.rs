//! Persisted session: token pair plus identity record.
//!
//! Only the refresh routine and the explicit auth operations write here; page
//! code reads.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use vendora_shared::{AdminUser, AuthPayload, TokenPair};

use crate::config::ClientConfig;
use crate::storage::{self, FileStore, KeyValueStore, MemoryStore};

const ACCESS_TOKEN_KEY: &str = "token";
const REFRESH_TOKEN_KEY: &str = "refreshToken";
const USER_KEY: &str = "user";

/// Handle to the persisted session. Clones share the same backing store.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// File-backed store at the configured location, falling back to memory
    /// when no config directory exists.
    pub fn from_config(config: &ClientConfig) -> Self {
        let files = match &config.storage_dir {
            Some(dir) => Some(FileStore::new(dir)),
            None => FileStore::in_config_dir(),
        };
        match files {
            Some(files) => Self::new(Arc::new(files)),
            None => {
                crate::log_warn!("No config directory available, session will not persist");
                Self::in_memory()
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn user(&self) -> Option<AdminUser> {
        storage::load(self.store.as_ref(), USER_KEY)
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Overwrite the token pair. Returns `false` if either write failed.
    pub fn save_tokens(&self, tokens: &TokenPair) -> bool {
        let access = self.store.set(ACCESS_TOKEN_KEY, &tokens.access_token);
        let refresh = self.store.set(REFRESH_TOKEN_KEY, &tokens.refresh_token);
        if !access {
            crate::log_warn!("Failed to persist access token");
        }
        if !refresh {
            crate::log_warn!("Failed to persist refresh token");
        }
        access && refresh
    }

    /// Persist a fresh login: tokens and identity.
    pub fn save_login(&self, payload: &AuthPayload) {
        self.save_tokens(&payload.tokens);
        if !storage::save(self.store.as_ref(), USER_KEY, &payload.user) {
            crate::log_warn!("Failed to persist identity for {}", payload.user.id);
        }
    }

    /// Delete tokens and identity.
    pub fn clear(&self) {
        self.store.remove(ACCESS_TOKEN_KEY);
        self.store.remove(REFRESH_TOKEN_KEY);
        self.store.remove(USER_KEY);
    }
}

/// Where the user currently is, and how to send them elsewhere.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn redirect(&self, path: &str);
}

/// Navigator that records the location and publishes each redirect. The
/// Dioxus layer feeds it the router's location and follows the redirects.
#[derive(Debug)]
pub struct MemoryNavigator {
    location: Mutex<String>,
    redirects: Mutex<Vec<String>>,
    latest: watch::Sender<Option<String>>,
}

impl MemoryNavigator {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            location: Mutex::new(initial.into()),
            redirects: Mutex::new(Vec::new()),
            latest: watch::channel(None).0,
        }
    }

    /// Record a user-initiated move (not counted as a redirect).
    pub fn set_location(&self, path: impl Into<String>) {
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = path.into();
    }

    /// Every redirect issued so far, oldest first.
    pub fn redirects(&self) -> Vec<String> {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Observe redirects issued from now on.
    pub fn watch_redirects(&self) -> watch::Receiver<Option<String>> {
        self.latest.subscribe()
    }
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn redirect(&self, path: &str) {
        self.set_location(path);
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
        self.latest.send_replace(Some(path.to_string()));
    }
}

/// Force the user out: clear the session and send them to the login page
/// unless they are already on it.
pub fn terminate(session: &SessionStore, navigator: &dyn Navigator, login_path: &str) {
    session.clear();
    let current = navigator.current_path();
    if current.trim_end_matches('/') != login_path.trim_end_matches('/') {
        crate::log_info!("Session terminated, redirecting from {} to {}", current, login_path);
        navigator.redirect(login_path);
    } else {
        crate::log_info!("Session terminated on the login page");
    }
}
