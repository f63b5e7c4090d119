//! Client configuration from environment variables.

use std::path::PathBuf;

use url::Url;

use crate::ws::ReconnectConfig;

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_LOGIN_PATH: &str = "/login";
const SOCKET_PATH: &str = "/socket";

/// Where the client talks to and how it behaves when the channel drops.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base, e.g. `https://api.example.com/api`.
    pub api_url: String,
    /// Real-time endpoint, e.g. `wss://api.example.com/socket`.
    pub ws_url: String,
    pub reconnect: ReconnectConfig,
    /// The login entry point session termination redirects to.
    pub login_path: String,
    /// Directory for persisted session files. `None` uses the platform config dir.
    pub storage_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_api(DEFAULT_API_URL)
    }
}

impl ClientConfig {
    /// Configuration for an API base with every other setting at its default.
    pub fn for_api(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into();
        Self {
            ws_url: derive_ws_url(&api_url),
            api_url,
            reconnect: ReconnectConfig::default(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            storage_dir: None,
        }
    }

    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `VENDORA_API_URL`: REST base (default: "http://localhost:5000/api")
    /// - `VENDORA_WS_URL`: real-time endpoint (default: API origin + "/socket")
    /// - `VENDORA_WS_RECONNECT_ATTEMPTS`: reconnect attempts (default: 5)
    /// - `VENDORA_WS_RECONNECT_DELAY_MS`: delay between attempts (default: 1000)
    /// - `VENDORA_LOGIN_PATH`: login entry point (default: "/login")
    /// - `VENDORA_STORAGE_DIR`: session directory (default: platform config dir)
    pub fn from_env() -> Self {
        let api_url =
            std::env::var("VENDORA_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let mut config = Self::for_api(api_url);

        if let Ok(ws_url) = std::env::var("VENDORA_WS_URL") {
            config.ws_url = ws_url;
        }
        if let Some(attempts) = env_number("VENDORA_WS_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = attempts;
        }
        if let Some(delay) = env_number("VENDORA_WS_RECONNECT_DELAY_MS") {
            config.reconnect.delay_ms = delay;
        }
        if let Ok(path) = std::env::var("VENDORA_LOGIN_PATH") {
            config.login_path = path;
        }
        config.storage_dir = std::env::var_os("VENDORA_STORAGE_DIR").map(PathBuf::from);

        config
    }

    /// Point at another API base. The WS URL follows unless set afterwards.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self.ws_url = derive_ws_url(&self.api_url);
        self
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Construct an API URL for a path
    pub fn api_url(&self, path: &str) -> String {
        join_url(&self.api_url, path)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            crate::log_warn!("Ignoring {}: '{}' is not a number", key, raw);
            None
        }
    }
}

/// Join a base and a path with exactly one slash. Absolute URLs pass through.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if base.is_empty() {
        return if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Convert the API origin to WS/WSS and point it at the socket endpoint.
pub fn derive_ws_url(api_url: &str) -> String {
    let Ok(mut url) = Url::parse(api_url) else {
        return SOCKET_PATH.to_string();
    };
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    if url.set_scheme(scheme).is_err() {
        return SOCKET_PATH.to_string();
    }
    url.set_path(SOCKET_PATH);
    url.set_query(None);
    url.to_string()
}
