//! Vendora Client - vendor dashboard core
//!
//! Authenticated REST access with transparent token refresh, the dashboard
//! services built on it, and live auction bidding over WebSocket, with Dioxus
//! bindings for both.

pub mod logging;

pub mod api_client;
pub mod auth_session;
pub mod config;
pub mod services;
pub mod session;
pub mod storage;
pub mod ws;

pub use api_client::{ApiClient, HttpTransport, ReqwestTransport};
pub use auth_session::{use_session_routing, AuthContext, AuthProvider};
pub use config::ClientConfig;
pub use session::{MemoryNavigator, Navigator, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use ws::{use_auction_bidding, AuctionBidding, AuctionChannel, AuctionView};
