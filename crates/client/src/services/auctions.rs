//! Auction management over REST. Live bidding goes through [`crate::ws`].

use vendora_shared::{ApiError, ApiResponse, Auction, AuctionState, NewAuction, PageQuery};

use super::{page_params, query_string};
use crate::api_client::ApiClient;

#[derive(Debug, Clone)]
pub struct AuctionsApi {
    client: ApiClient,
}

impl AuctionsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(
        &self,
        page: PageQuery,
        state: Option<AuctionState>,
    ) -> Result<ApiResponse<Vec<Auction>>, ApiError> {
        let [page, limit] = page_params(page);
        let state = state
            .and_then(|s| serde_json::to_value(s).ok())
            .and_then(|v| v.as_str().map(str::to_string));
        let query = query_string(&[page, limit, ("state", state)]);
        self.client.get(&format!("/auctions{query}")).await
    }

    pub async fn get(&self, id: &str) -> Result<ApiResponse<Auction>, ApiError> {
        self.client.get(&format!("/auctions/{}", urlencoding::encode(id))).await
    }

    pub async fn create(&self, auction: &NewAuction) -> Result<ApiResponse<Auction>, ApiError> {
        self.client.post("/auctions", auction).await
    }

    pub async fn cancel(&self, id: &str) -> Result<ApiResponse<Auction>, ApiError> {
        self.client
            .post(
                &format!("/auctions/{}/cancel", urlencoding::encode(id)),
                &serde_json::json!({}),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api_client::testing::{client_for, signed_in_session, FakeBackend};

    #[tokio::test]
    async fn state_filter_is_lowercase() {
        let backend = FakeBackend::new("live");
        backend.respond(
            "/auctions?page=1&limit=20&state=active",
            200,
            json!({ "success": true, "data": [] }),
        );
        let (client, _) = client_for(&backend, signed_in_session("live"));

        let resp = AuctionsApi::new(client)
            .list(PageQuery::default(), Some(AuctionState::Active))
            .await
            .unwrap();
        assert_eq!(resp.data, Some(vec![]));
    }
}
