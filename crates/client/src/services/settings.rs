//! Store settings.

use vendora_shared::{ApiError, ApiResponse, StoreSettings};

use crate::api_client::ApiClient;

#[derive(Debug, Clone)]
pub struct SettingsApi {
    client: ApiClient,
}

impl SettingsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn get(&self) -> Result<ApiResponse<StoreSettings>, ApiError> {
        self.client.get("/settings/store").await
    }

    pub async fn update(&self, settings: &StoreSettings) -> Result<ApiResponse<StoreSettings>, ApiError> {
        self.client.put("/settings/store", settings).await
    }
}
