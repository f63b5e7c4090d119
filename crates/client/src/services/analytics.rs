//! Sales reporting.

use chrono::NaiveDate;
use vendora_shared::{ApiError, ApiResponse, SalesSummary};

use super::query_string;
use crate::api_client::ApiClient;

#[derive(Debug, Clone)]
pub struct AnalyticsApi {
    client: ApiClient,
}

impl AnalyticsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Revenue and order counts for `[from, to]`, inclusive.
    pub async fn sales(&self, from: NaiveDate, to: NaiveDate) -> Result<ApiResponse<SalesSummary>, ApiError> {
        let query = query_string(&[
            ("from", Some(from.format("%Y-%m-%d").to_string())),
            ("to", Some(to.format("%Y-%m-%d").to_string())),
        ]);
        self.client.get(&format!("/analytics/sales{query}")).await
    }
}
