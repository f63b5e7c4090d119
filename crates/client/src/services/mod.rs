//! Typed wrappers over the dashboard REST endpoints.
//!
//! Each wrapper returns the response envelope untouched; pages decide whether
//! to unwrap it with [`vendora_shared::ApiResponse::into_data`] or read the
//! pagination alongside.

pub mod analytics;
pub mod auctions;
pub mod auth;
pub mod orders;
pub mod products;
pub mod settings;
pub mod sub_admins;

pub use analytics::AnalyticsApi;
pub use auctions::AuctionsApi;
pub use auth::AuthApi;
pub use orders::OrdersApi;
pub use products::ProductsApi;
pub use settings::SettingsApi;
pub use sub_admins::SubAdminsApi;

use vendora_shared::PageQuery;

/// Render a query string from `(name, value)` pairs, skipping empty values.
pub(crate) fn query_string(params: &[(&str, Option<String>)]) -> String {
    let parts: Vec<String> = params
        .iter()
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}={}", name, urlencoding::encode(v)))
        })
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}

pub(crate) fn page_params(page: PageQuery) -> [(&'static str, Option<String>); 2] {
    [
        ("page", Some(page.page.to_string())),
        ("limit", Some(page.limit.to_string())),
    ]
}
