//! Sub-admin provisioning.

use vendora_shared::{AdminUser, ApiError, ApiResponse, NewSubAdmin, PermissionsUpdate};

use crate::api_client::ApiClient;

#[derive(Debug, Clone)]
pub struct SubAdminsApi {
    client: ApiClient,
}

impl SubAdminsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<ApiResponse<Vec<AdminUser>>, ApiError> {
        self.client.get("/sub-admins").await
    }

    pub async fn create(&self, sub_admin: &NewSubAdmin) -> Result<ApiResponse<AdminUser>, ApiError> {
        self.client.post("/sub-admins", sub_admin).await
    }

    pub async fn set_permissions(
        &self,
        id: &str,
        permissions: Vec<String>,
    ) -> Result<ApiResponse<AdminUser>, ApiError> {
        self.client
            .put(
                &format!("/sub-admins/{}/permissions", urlencoding::encode(id)),
                &PermissionsUpdate { permissions },
            )
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<ApiResponse<serde_json::Value>, ApiError> {
        self.client
            .delete(&format!("/sub-admins/{}", urlencoding::encode(id)))
            .await
    }
}
