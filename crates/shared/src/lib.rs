//! Shared types for the vendora dashboard client and the marketplace API.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
