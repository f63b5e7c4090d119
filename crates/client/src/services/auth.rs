//! Session-creating endpoints.

use reqwest::Method;
use vendora_shared::{
    AdminUser, ApiError, ApiResponse, AuthPayload, LoginRequest, RegisterRequest, VerifyOtpRequest,
};

use crate::api_client::ApiClient;

/// Login, registration, OTP verification and logout.
///
/// These are the only callers besides the refresh routine that write the
/// token pair.
#[derive(Debug, Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AdminUser, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let resp = self
            .client
            .request_public(Method::POST, "/auth/login", Some(&body))
            .await?;
        self.persist(resp)
    }

    /// Registration may hand back a session directly or ask for OTP
    /// verification first; `None` means an OTP was sent.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Option<AdminUser>, ApiError> {
        let resp: ApiResponse<AuthPayload> = self
            .client
            .request_public(Method::POST, "/auth/register", Some(request))
            .await?;
        if resp.success && resp.data.is_none() {
            crate::log_info!("Registration for {} awaits OTP verification", request.email);
            return Ok(None);
        }
        self.persist(resp).map(Some)
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<AdminUser, ApiError> {
        let body = VerifyOtpRequest {
            email: email.to_string(),
            otp: otp.to_string(),
        };
        let resp = self
            .client
            .request_public(Method::POST, "/auth/verify-otp", Some(&body))
            .await?;
        self.persist(resp)
    }

    /// The identity the server currently associates with our token.
    pub async fn me(&self) -> Result<ApiResponse<AdminUser>, ApiError> {
        self.client.get("/auth/me").await
    }

    /// Tell the server, then drop the local session regardless of its answer.
    pub async fn logout(&self) {
        if self.client.session().is_authenticated() {
            let result = self
                .client
                .post::<_, serde_json::Value>("/auth/logout", &serde_json::json!({}))
                .await;
            if let Err(e) = result {
                crate::log_warn!("Logout request failed: {}", e);
            }
        }
        self.client.session().clear();
        crate::log_info!("Logged out");
    }

    fn persist(&self, resp: ApiResponse<AuthPayload>) -> Result<AdminUser, ApiError> {
        let payload = resp.into_data()?;
        self.client.session().save_login(&payload);
        crate::log_info!("Signed in as {}", payload.user.email);
        Ok(payload.user)
    }
}
