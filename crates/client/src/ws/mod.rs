//! Real-time auction bidding.
//!
//! One WebSocket connection is shared by the whole process:
//!
//! ```text
//! connection loop ──► AuctionChannel ──► Subscription (room A) ──► AuctionBidding ──► hook
//!        ▲                  │        └─► Subscription (room B) ──► ...
//!        └──── outbound ◄───┘
//! ```
//!
//! A [`Subscription`] owns its place in the room. Dropping it leaves the room,
//! so a view can never be updated by a room it has stopped following.

mod bidding;
mod channel;
mod connection;
mod hooks;

pub use bidding::{
    place_bid, AuctionBidding, AuctionRoom, AuctionView, BiddingPhase, NOT_CONNECTED,
    SIGN_IN_TO_BID, TICK_PERIOD,
};
pub use channel::{AuctionChannel, ChannelEvent, Subscription};
pub use connection::{ConnectionState, ReconnectConfig};
pub use hooks::{use_auction_bidding, UseAuctionBidding};
