//! Order tracking endpoints.

use vendora_shared::{ApiError, ApiResponse, Order, OrderStatus, OrderStatusUpdate, PageQuery};

use super::{page_params, query_string};
use crate::api_client::ApiClient;

#[derive(Debug, Clone)]
pub struct OrdersApi {
    client: ApiClient,
}

impl OrdersApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(
        &self,
        page: PageQuery,
        status: Option<OrderStatus>,
    ) -> Result<ApiResponse<Vec<Order>>, ApiError> {
        let [page, limit] = page_params(page);
        let query = query_string(&[
            page,
            limit,
            ("status", status.map(|s| s.as_str().to_string())),
        ]);
        self.client.get(&format!("/orders{query}")).await
    }

    pub async fn get(&self, id: &str) -> Result<ApiResponse<Order>, ApiError> {
        self.client.get(&format!("/orders/{}", urlencoding::encode(id))).await
    }

    pub async fn update_status(
        &self,
        id: &str,
        update: &OrderStatusUpdate,
    ) -> Result<ApiResponse<Order>, ApiError> {
        self.client
            .patch(&format!("/orders/{}/status", urlencoding::encode(id)), update)
            .await
    }
}
