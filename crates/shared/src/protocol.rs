//! Real-time auction channel events.
//!
//! Frames are JSON text of the form `{"event": "<name>", "data": <payload>}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::AuctionState;

/// Events sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinAuction(String),
    LeaveAuction(String),
    PlaceBid(BidPlacement),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BidPlacement {
    pub auction_id: String,
    pub amount_minor: i64,
    pub user_id: String,
}

/// Events pushed by the server.
///
/// `AuctionState` and `NewBid` are room-scoped; the bid acknowledgments answer
/// this client's own last submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    AuctionState(AuctionStateUpdate),
    NewBid(NewBid),
    BidSuccess,
    BidError(BidRejection),
}

impl ServerEvent {
    /// The room a broadcast belongs to, if it is room-scoped.
    pub fn auction_id(&self) -> Option<&str> {
        match self {
            ServerEvent::AuctionState(update) => Some(&update.auction_id),
            ServerEvent::NewBid(bid) => Some(&bid.auction_id),
            ServerEvent::BidSuccess | ServerEvent::BidError(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionStateUpdate {
    pub auction_id: String,
    pub state: AuctionState,
    pub current_bid: Option<i64>,
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewBid {
    pub auction_id: String,
    pub bid: BidAmount,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BidAmount {
    pub amount_minor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BidRejection {
    pub error: String,
}
