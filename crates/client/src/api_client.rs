//! HTTP API client with bearer auth and transparent token refresh.
//!
//! A 401 on a request's first attempt triggers one refresh exchange and one
//! replay of that request. Concurrent 401s share the same exchange: the
//! in-flight refresh future itself is cached in [`RefreshGate`] until it
//! settles, so N expired requests cost exactly one call to `/auth/refresh`.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use vendora_shared::{ApiError, ApiResponse, ErrorKind, RefreshRequest, TokenPair};

use crate::config::{join_url, ClientConfig};
use crate::session::{self, MemoryNavigator, Navigator, SessionStore};

const REFRESH_PATH: &str = "/auth/refresh";

/// An outbound call as the transport sees it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a request and hands back status and body. Transport failures come
/// back as [`ErrorKind::Network`] errors; HTTP failures are not errors here.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        let mut rb = self.client.request(request.method.clone(), &request.url);

        if let Some(token) = &request.bearer {
            rb = rb.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            rb = rb.json(body);
        }

        let resp = rb.send().await.map_err(|e| ApiError::network(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| ApiError::network(format!("failed to read body: {e}")))?;

        Ok(RawResponse { status, body })
    }
}

/// Whether a request has already been replayed after a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retried,
}

#[derive(Debug)]
struct PendingRequest {
    request: ApiRequest,
    attempt: Attempt,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<TokenPair, ApiError>>>;

/// Holds the refresh exchange currently in flight, if any.
///
/// Only [`ApiClient::refresh`] writes the slot: it installs a future when the
/// slot is empty and removes that same future once it has settled.
#[derive(Default)]
struct RefreshGate {
    in_flight: Mutex<Option<RefreshFuture>>,
}

impl RefreshGate {
    fn join_or_start(&self, start: impl FnOnce() -> RefreshFuture) -> RefreshFuture {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(exchange) = slot.as_ref() {
            return exchange.clone();
        }
        let exchange = start();
        *slot = Some(exchange.clone());
        exchange
    }

    fn settle(&self, exchange: &RefreshFuture) {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(exchange)) {
            *slot = None;
        }
    }
}

/// HTTP client for the marketplace API. Clones share the session, the
/// transport and the refresh gate.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    login_path: String,
    session: SessionStore,
    navigator: Arc<dyn Navigator>,
    refresh_gate: Arc<RefreshGate>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: &ClientConfig, session: SessionStore) -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::default()),
            base_url: config.api_url.clone(),
            login_path: config.login_path.clone(),
            session,
            navigator: Arc::new(MemoryNavigator::default()),
            refresh_gate: Arc::new(RefreshGate::default()),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Issue an authenticated request and return the response envelope as-is.
    pub async fn request<TReq, TRes>(
        &self,
        method: Method,
        path: &str,
        body: Option<&TReq>,
    ) -> Result<ApiResponse<TRes>, ApiError>
    where
        TReq: Serialize + ?Sized,
        TRes: DeserializeOwned,
    {
        let request = self.build(method, path, body, self.session.access_token())?;
        let response = self
            .execute(PendingRequest {
                request,
                attempt: Attempt::First,
            })
            .await?;
        parse_envelope(&response.body)
    }

    /// Issue a request without credentials and without refresh handling.
    /// Used by the endpoints that create a session.
    pub async fn request_public<TReq, TRes>(
        &self,
        method: Method,
        path: &str,
        body: Option<&TReq>,
    ) -> Result<ApiResponse<TRes>, ApiError>
    where
        TReq: Serialize + ?Sized,
        TRes: DeserializeOwned,
    {
        let request = self.build(method, path, body, None)?;
        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(response.status, &response.body));
        }
        parse_envelope(&response.body)
    }

    pub async fn get<TRes: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<TRes>, ApiError> {
        self.request::<(), TRes>(Method::GET, path, None).await
    }

    pub async fn post<TReq, TRes>(&self, path: &str, body: &TReq) -> Result<ApiResponse<TRes>, ApiError>
    where
        TReq: Serialize + ?Sized,
        TRes: DeserializeOwned,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<TReq, TRes>(&self, path: &str, body: &TReq) -> Result<ApiResponse<TRes>, ApiError>
    where
        TReq: Serialize + ?Sized,
        TRes: DeserializeOwned,
    {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch<TReq, TRes>(&self, path: &str, body: &TReq) -> Result<ApiResponse<TRes>, ApiError>
    where
        TReq: Serialize + ?Sized,
        TRes: DeserializeOwned,
    {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete<TRes: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<TRes>, ApiError> {
        self.request::<(), TRes>(Method::DELETE, path, None).await
    }

    fn build<TReq: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&TReq>,
        bearer: Option<String>,
    ) -> Result<ApiRequest, ApiError> {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ApiError::deserialize(format!("failed to encode body: {e}")))?;
        Ok(ApiRequest {
            method,
            url: self.url(path),
            bearer,
            body,
        })
    }

    async fn execute(&self, mut pending: PendingRequest) -> Result<RawResponse, ApiError> {
        loop {
            let response = self.transport.send(&pending.request).await?;
            if response.is_success() {
                return Ok(response);
            }

            let error = ApiError::from_response(response.status, &response.body);
            if !error.is_unauthorized() {
                return Err(error);
            }

            match pending.attempt {
                Attempt::First => {
                    crate::log_debug!(
                        "{} {} was rejected with 401, refreshing",
                        pending.request.method,
                        pending.request.url
                    );
                    pending.attempt = Attempt::Retried;
                    let tokens = self.refresh().await?;
                    pending.request.bearer = Some(tokens.access_token);
                }
                Attempt::Retried => {
                    crate::log_warn!(
                        "{} {} still unauthorized after refresh",
                        pending.request.method,
                        pending.request.url
                    );
                    self.terminate_session();
                    return Err(ApiError {
                        kind: ErrorKind::SessionExpired,
                        ..error
                    });
                }
            }
        }
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// Joins the exchange already in flight if there is one. On failure the
    /// session has been terminated by the time this returns.
    pub async fn refresh(&self) -> Result<TokenPair, ApiError> {
        let exchange = self.refresh_gate.join_or_start(|| {
            let client = self.clone();
            async move { client.exchange_tokens().await }.boxed().shared()
        });

        let outcome = exchange.clone().await;
        self.refresh_gate.settle(&exchange);
        outcome
    }

    async fn exchange_tokens(&self) -> Result<TokenPair, ApiError> {
        match self.call_refresh_endpoint().await {
            Ok(tokens) => {
                self.session.save_tokens(&tokens);
                crate::log_info!("Access token refreshed");
                Ok(tokens)
            }
            Err(e) => {
                crate::log_warn!("Token refresh failed: {}", e);
                self.terminate_session();
                Err(ApiError {
                    kind: ErrorKind::SessionExpired,
                    ..e
                })
            }
        }
    }

    async fn call_refresh_endpoint(&self) -> Result<TokenPair, ApiError> {
        let Some(refresh_token) = self.session.refresh_token() else {
            return Err(ApiError::session_expired("No refresh token available"));
        };
        let request = self.build(
            Method::POST,
            REFRESH_PATH,
            Some(&RefreshRequest { refresh_token }),
            None,
        )?;

        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(response.status, &response.body));
        }
        parse_envelope::<TokenPair>(&response.body)?.into_data()
    }

    /// Clear the persisted session and send the user to the login page.
    pub fn terminate_session(&self) {
        session::terminate(&self.session, self.navigator.as_ref(), &self.login_path);
    }
}

fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<ApiResponse<T>, ApiError> {
    if body.trim().is_empty() {
        return Ok(ApiResponse {
            success: true,
            data: None,
            message: None,
            pagination: None,
        });
    }
    serde_json::from_str(body).map_err(|e| ApiError::deserialize(e.to_string()))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable in-process backend.

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    pub struct FakeBackend {
        valid_token: Mutex<String>,
        refresh_calls: AtomicUsize,
        refresh_fails: AtomicBool,
        always_unauthorized: AtomicBool,
        requests: Mutex<Vec<ApiRequest>>,
        responses: Mutex<Vec<(String, RawResponse)>>,
    }

    impl FakeBackend {
        pub fn new(valid_token: &str) -> Arc<Self> {
            Arc::new(Self {
                valid_token: Mutex::new(valid_token.to_string()),
                refresh_calls: AtomicUsize::new(0),
                refresh_fails: AtomicBool::new(false),
                always_unauthorized: AtomicBool::new(false),
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(Vec::new()),
            })
        }

        pub fn fail_refresh(&self) {
            self.refresh_fails.store(true, Ordering::SeqCst);
        }

        pub fn reject_everything(&self) {
            self.always_unauthorized.store(true, Ordering::SeqCst);
        }

        /// Revoke the current access token server-side.
        pub fn rotate(&self, token: &str) {
            *self.valid_token.lock().unwrap() = token.to_string();
        }

        /// Canned answer for any URL ending in `suffix`.
        pub fn respond(&self, suffix: &str, status: u16, body: serde_json::Value) {
            self.responses.lock().unwrap().push((
                suffix.to_string(),
                RawResponse {
                    status,
                    body: body.to_string(),
                },
            ));
        }

        pub fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for FakeBackend {
        async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
            self.requests.lock().unwrap().push(request.clone());

            if request.url.ends_with(REFRESH_PATH) {
                let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
                if self.refresh_fails.load(Ordering::SeqCst) {
                    return Ok(RawResponse {
                        status: 401,
                        body: json!({ "success": false, "message": "Refresh token expired" })
                            .to_string(),
                    });
                }
                let access = format!("fresh-{n}");
                self.rotate(&access);
                return Ok(RawResponse {
                    status: 200,
                    body: json!({
                        "success": true,
                        "data": { "token": access, "refreshToken": format!("refresh-{n}") }
                    })
                    .to_string(),
                });
            }

            let canned = self
                .responses
                .lock()
                .unwrap()
                .iter()
                .find(|(suffix, _)| request.url.ends_with(suffix.as_str()))
                .map(|(_, response)| response.clone());
            if let Some(response) = canned {
                return Ok(response);
            }

            let valid = self.valid_token.lock().unwrap().clone();
            let authorized = request.bearer.as_deref() == Some(valid.as_str())
                && !self.always_unauthorized.load(Ordering::SeqCst);
            if authorized {
                Ok(RawResponse {
                    status: 200,
                    body: json!({ "success": true, "data": request.url }).to_string(),
                })
            } else {
                Ok(RawResponse {
                    status: 401,
                    body: json!({ "success": false, "message": "jwt expired" }).to_string(),
                })
            }
        }
    }

    pub fn signed_in_session(access: &str) -> SessionStore {
        let session = SessionStore::in_memory();
        session.save_tokens(&TokenPair {
            access_token: access.into(),
            refresh_token: "refresh-0".into(),
        });
        session
    }

    pub fn client_for(backend: &Arc<FakeBackend>, session: SessionStore) -> (ApiClient, Arc<MemoryNavigator>) {
        let navigator = Arc::new(MemoryNavigator::new("/dashboard"));
        let client = ApiClient::new(&ClientConfig::for_api("http://api.test/api"), session)
            .with_transport(backend.clone())
            .with_navigator(navigator.clone());
        (client, navigator)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::future::join_all;
    use serde_json::json;

    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn attaches_bearer_token() {
        let backend = FakeBackend::new("live");
        let (client, _) = client_for(&backend, signed_in_session("live"));

        let resp: ApiResponse<String> = client.get("/products").await.unwrap();
        assert_eq!(resp.data.as_deref(), Some("http://api.test/api/products"));

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].bearer.as_deref(), Some("live"));
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_expiries_share_one_refresh() {
        let backend = FakeBackend::new("not-yet-issued");
        let (client, navigator) = client_for(&backend, signed_in_session("stale"));

        let calls = (0..5).map(|i| {
            let client = client.clone();
            async move { client.get::<String>(&format!("/orders/{i}")).await }
        });
        let results = join_all(calls).await;

        assert_eq!(backend.refresh_calls(), 1);
        for result in results {
            assert!(result.unwrap().success);
        }
        assert_eq!(client.session().access_token().as_deref(), Some("fresh-1"));
        assert_eq!(client.session().refresh_token().as_deref(), Some("refresh-1"));
        assert!(navigator.redirects().is_empty());

        let retried: Vec<_> = backend
            .requests()
            .into_iter()
            .filter(|r| r.bearer.as_deref() == Some("fresh-1"))
            .collect();
        assert_eq!(retried.len(), 5);
    }

    #[tokio::test]
    async fn later_expiry_starts_a_new_exchange() {
        let backend = FakeBackend::new("not-yet-issued");
        let (client, _) = client_for(&backend, signed_in_session("stale"));

        client.get::<String>("/products").await.unwrap();
        backend.rotate("revoked-by-server");
        client.get::<String>("/products").await.unwrap();

        assert_eq!(backend.refresh_calls(), 2);
        assert_eq!(client.session().access_token().as_deref(), Some("fresh-2"));
    }

    #[tokio::test]
    async fn retries_at_most_once() {
        let backend = FakeBackend::new("stale");
        backend.reject_everything();
        let (client, navigator) = client_for(&backend, signed_in_session("stale"));

        let err = client.get::<String>("/analytics/sales").await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::SessionExpired);
        assert_eq!(err.message, "jwt expired");
        assert_eq!(backend.refresh_calls(), 1);
        // first try, refresh, replay
        assert_eq!(backend.requests().len(), 3);
        assert!(!client.session().is_authenticated());
        assert_eq!(navigator.redirects(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn refresh_failure_tears_down_the_session() {
        let backend = FakeBackend::new("never");
        backend.fail_refresh();
        let session = signed_in_session("stale");
        session.save_login(&vendora_shared::AuthPayload {
            tokens: TokenPair {
                access_token: "stale".into(),
                refresh_token: "refresh-0".into(),
            },
            user: serde_json::from_value(json!({
                "id": "u1", "name": "Ada", "email": "ada@shop.test", "role": "admin"
            }))
            .unwrap(),
        });
        let (client, navigator) = client_for(&backend, session);

        let results = join_all((0..3).map(|_| client.get::<String>("/orders"))).await;
        for result in results {
            let err = result.unwrap_err();
            assert_eq!(err.kind, ErrorKind::SessionExpired);
            assert_eq!(err.message, "Refresh token expired");
        }
        assert_eq!(backend.refresh_calls(), 1);
        assert!(client.session().access_token().is_none());
        assert!(client.session().refresh_token().is_none());
        assert!(client.session().user().is_none());
        assert_eq!(navigator.redirects(), vec!["/login".to_string()]);

        // Nothing left to authenticate with: the next call goes out bare and
        // fails without another exchange.
        let err = client.get::<String>("/orders").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionExpired);
        assert_eq!(err.status, Some(401));
        assert_eq!(backend.refresh_calls(), 1);
        assert!(backend.requests().last().unwrap().bearer.is_none());
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_without_network() {
        let backend = FakeBackend::new("never");
        let session = SessionStore::in_memory();
        session.save_tokens(&TokenPair {
            access_token: "stale".into(),
            refresh_token: String::new(),
        });
        let (client, _) = client_for(&backend, session);

        let err = client.get::<String>("/orders").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionExpired);
        assert_eq!(err.message, "No refresh token available");
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn refresh_token_alone_recovers_the_session() {
        let backend = FakeBackend::new("never");
        let session = SessionStore::in_memory();
        session.save_tokens(&TokenPair {
            access_token: String::new(),
            refresh_token: "refresh-0".into(),
        });
        let (client, navigator) = client_for(&backend, session);

        let resp = client.get::<String>("/orders").await.unwrap();
        assert!(resp.success);
        assert_eq!(backend.refresh_calls(), 1);
        assert!(backend.requests()[0].bearer.is_none());
        assert_eq!(backend.requests().last().unwrap().bearer.as_deref(), Some("fresh-1"));
        assert!(navigator.redirects().is_empty());
    }

    #[tokio::test]
    async fn other_failures_pass_through_normalized() {
        let backend = FakeBackend::new("live");
        backend.respond(
            "/products",
            422,
            json!({ "success": false, "message": "Price must be positive", "errors": { "priceMinor": "min 1" } }),
        );
        let (client, _) = client_for(&backend, signed_in_session("live"));

        let err = client
            .post::<_, serde_json::Value>("/products", &json!({ "priceMinor": 0 }))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Http);
        assert_eq!(err.status, Some(422));
        assert_eq!(err.message, "Price must be positive");
        assert_eq!(
            err.to_envelope().errors,
            Some(json!({ "priceMinor": "min 1" }))
        );
        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn public_requests_skip_refresh() {
        let backend = FakeBackend::new("live");
        backend.respond("/auth/login", 401, json!({ "message": "Invalid credentials" }));
        let (client, navigator) = client_for(&backend, signed_in_session("live"));

        let err = client
            .request_public::<_, serde_json::Value>(Method::POST, "/auth/login", Some(&json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.message, "Invalid credentials");
        assert_eq!(backend.refresh_calls(), 0);
        assert!(backend.requests()[0].bearer.is_none());
        assert!(navigator.redirects().is_empty());
    }
}
