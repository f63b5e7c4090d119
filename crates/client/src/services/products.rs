//! Product catalog endpoints.

use vendora_shared::{ApiError, ApiResponse, NewProduct, PageQuery, Product, ProductUpdate};

use super::{page_params, query_string};
use crate::api_client::ApiClient;

/// Filters for the product list.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub page: PageQuery,
    pub search: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProductsApi {
    client: ApiClient,
}

impl ProductsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, filter: &ProductFilter) -> Result<ApiResponse<Vec<Product>>, ApiError> {
        let [page, limit] = page_params(filter.page);
        let query = query_string(&[
            page,
            limit,
            ("search", filter.search.clone()),
            ("category", filter.category.clone()),
        ]);
        self.client.get(&format!("/products{query}")).await
    }

    pub async fn get(&self, id: &str) -> Result<ApiResponse<Product>, ApiError> {
        self.client.get(&format!("/products/{}", urlencoding::encode(id))).await
    }

    pub async fn create(&self, product: &NewProduct) -> Result<ApiResponse<Product>, ApiError> {
        self.client.post("/products", product).await
    }

    pub async fn update(&self, id: &str, update: &ProductUpdate) -> Result<ApiResponse<Product>, ApiError> {
        self.client
            .put(&format!("/products/{}", urlencoding::encode(id)), update)
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<ApiResponse<serde_json::Value>, ApiError> {
        self.client
            .delete(&format!("/products/{}", urlencoding::encode(id)))
            .await
    }
}
