//! Live bidding view for one auction room at a time.
//!
//! [`AuctionRoom`] folds channel events into the view. [`AuctionBidding`]
//! owns the subscription and the local countdown, and is what the Dioxus hook
//! drives.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use vendora_shared::{AuctionState, BidPlacement, ClientEvent, ServerEvent};

use super::channel::{AuctionChannel, ChannelEvent, Subscription};
use super::connection::ConnectionState;
use crate::session::SessionStore;

/// Local countdown period.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

pub const NOT_CONNECTED: &str = "Not connected to the auction server";
pub const SIGN_IN_TO_BID: &str = "You must be signed in to bid";

/// Where a bidding view stands with respect to its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiddingPhase {
    Disconnected,
    Connecting,
    Connected,
    /// Connected with a room joined.
    Subscribed,
}

impl BiddingPhase {
    pub fn from_parts(state: &ConnectionState, subscribed: bool) -> Self {
        match state {
            ConnectionState::Connected if subscribed => BiddingPhase::Subscribed,
            ConnectionState::Connected => BiddingPhase::Connected,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => {
                BiddingPhase::Connecting
            }
            ConnectionState::Disconnected | ConnectionState::Failed { .. } => {
                BiddingPhase::Disconnected
            }
        }
    }
}

/// What a bidding page renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuctionView {
    pub is_connected: bool,
    pub current_bid: Option<i64>,
    pub auction_state: Option<AuctionState>,
    pub time_left: Option<Duration>,
    pub error: Option<String>,
}

/// State of one subscribed room.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionRoom {
    auction_id: String,
    connected: bool,
    current_bid: Option<i64>,
    auction_state: Option<AuctionState>,
    time_left: Option<Duration>,
    error: Option<String>,
}

impl AuctionRoom {
    pub fn new(auction_id: impl Into<String>, connected: bool) -> Self {
        Self {
            auction_id: auction_id.into(),
            connected,
            current_bid: None,
            auction_state: None,
            time_left: None,
            error: None,
        }
    }

    pub fn auction_id(&self) -> &str {
        &self.auction_id
    }

    /// Fold one event into the room. Broadcasts for other rooms are ignored.
    /// Returns whether anything visible changed.
    pub fn apply(&mut self, event: &ChannelEvent, now: DateTime<Utc>) -> bool {
        match event {
            ChannelEvent::Connected => self.set_connected(true),
            ChannelEvent::Disconnected => self.set_connected(false),
            ChannelEvent::Server(ServerEvent::AuctionState(update)) => {
                if update.auction_id != self.auction_id {
                    return false;
                }
                self.auction_state = Some(update.state);
                self.current_bid = update.current_bid;
                self.time_left = update
                    .end_at
                    .map(|end| (end - now).to_std().unwrap_or(Duration::ZERO));
                true
            }
            ChannelEvent::Server(ServerEvent::NewBid(bid)) => {
                if bid.auction_id != self.auction_id {
                    return false;
                }
                self.current_bid = Some(bid.bid.amount_minor);
                true
            }
            ChannelEvent::Server(ServerEvent::BidSuccess) => self.error.take().is_some(),
            ChannelEvent::Server(ServerEvent::BidError(rejection)) => {
                self.error = Some(rejection.error.clone());
                true
            }
        }
    }

    /// Advance the countdown by one period, stopping at zero.
    pub fn tick(&mut self) -> bool {
        match self.time_left {
            Some(left) if !left.is_zero() => {
                self.time_left = Some(left.saturating_sub(TICK_PERIOD));
                true
            }
            _ => false,
        }
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub fn view(&self) -> AuctionView {
        AuctionView {
            is_connected: self.connected,
            current_bid: self.current_bid,
            auction_state: self.auction_state,
            time_left: self.time_left,
            error: self.error.clone(),
        }
    }

    fn set_connected(&mut self, connected: bool) -> bool {
        let changed = self.connected != connected;
        self.connected = connected;
        changed
    }
}

/// Emit a bid for `auction_id` as the persisted user.
///
/// Fails locally, without touching the socket, when there is no room or
/// no live connection. The server's verdict arrives later as
/// `bid_success` or `bid_error`.
pub fn place_bid(
    channel: &AuctionChannel,
    session: &SessionStore,
    auction_id: Option<&str>,
    amount_minor: i64,
) -> Result<(), String> {
    let auction_id = match auction_id {
        Some(id) if channel.is_connected() => id,
        _ => return Err(NOT_CONNECTED.to_string()),
    };
    let user = session.user().ok_or_else(|| SIGN_IN_TO_BID.to_string())?;

    crate::log_debug!("Placing bid of {} on auction {}", amount_minor, auction_id);
    channel.emit(ClientEvent::PlaceBid(BidPlacement {
        auction_id: auction_id.to_string(),
        amount_minor,
        user_id: user.id,
    }))
}

struct ActiveRoom {
    subscription: Subscription,
    room: AuctionRoom,
    ticker: Option<Interval>,
}

enum Wake {
    Event(Option<ChannelEvent>),
    Tick,
}

fn countdown() -> Interval {
    let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Headless bidding view over a shared channel.
///
/// Holds at most one room subscription. Switching rooms or dropping the
/// value leaves the old room before anything else happens.
pub struct AuctionBidding {
    channel: AuctionChannel,
    session: SessionStore,
    active: Option<ActiveRoom>,
    idle_error: Option<String>,
}

impl AuctionBidding {
    pub fn new(channel: AuctionChannel, session: SessionStore) -> Self {
        Self {
            channel,
            session,
            active: None,
            idle_error: None,
        }
    }

    pub fn auction_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.room.auction_id())
    }

    pub fn phase(&self) -> BiddingPhase {
        BiddingPhase::from_parts(&self.channel.state(), self.active.is_some())
    }

    pub fn view(&self) -> AuctionView {
        match &self.active {
            Some(active) => active.room.view(),
            None => AuctionView {
                is_connected: self.channel.is_connected(),
                error: self.idle_error.clone(),
                ..AuctionView::default()
            },
        }
    }

    /// Point the view at `auction_id`, or at nothing.
    pub fn set_auction(&mut self, auction_id: Option<&str>) {
        if self.auction_id() == auction_id {
            return;
        }
        // Leaves the old room and stops its countdown.
        self.active = None;
        self.idle_error = None;

        if let Some(auction_id) = auction_id {
            let subscription = self.channel.subscribe(auction_id);
            let room = AuctionRoom::new(auction_id, self.channel.is_connected());
            self.active = Some(ActiveRoom {
                subscription,
                room,
                ticker: None,
            });
        }
    }

    /// Apply every event already queued for the room.
    pub fn pump(&mut self) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let mut changed = false;
        while let Some(event) = active.subscription.try_next() {
            changed |= active.room.apply(&event, Utc::now());
        }
        changed
    }

    /// One countdown step, outside of [`changed`](Self::changed).
    pub fn tick(&mut self) -> bool {
        self.active
            .as_mut()
            .map(|active| active.room.tick())
            .unwrap_or(false)
    }

    /// Submit a bid. Local failures are recorded in the view's `error` as
    /// well as returned.
    pub fn place_bid(&mut self, amount_minor: i64) -> Result<(), String> {
        let result = place_bid(&self.channel, &self.session, self.auction_id(), amount_minor);
        let error = result.as_ref().err().cloned();
        if let Some(e) = &error {
            crate::log_warn!("Bid not sent: {}", e);
        }
        match self.active.as_mut() {
            Some(active) => active.room.set_error(error),
            None => self.idle_error = error,
        }
        result
    }

    /// Wait until the view changes and return it. `None` when there is no
    /// room or its feed has closed. Cancel-safe.
    pub async fn changed(&mut self) -> Option<AuctionView> {
        loop {
            let active = self.active.as_mut()?;
            let ticker = active.ticker.get_or_insert_with(countdown);

            let wake = tokio::select! {
                event = active.subscription.next() => Wake::Event(event),
                _ = ticker.tick() => Wake::Tick,
            };

            match wake {
                Wake::Event(None) => return None,
                Wake::Event(Some(event)) => {
                    let fresh_state = matches!(
                        &event,
                        ChannelEvent::Server(ServerEvent::AuctionState(update))
                            if update.auction_id == active.room.auction_id()
                    );
                    if fresh_state {
                        // Count from the broadcast, not from the old phase.
                        active.ticker = None;
                    }
                    if active.room.apply(&event, Utc::now()) {
                        return Some(active.room.view());
                    }
                }
                Wake::Tick => {
                    if active.room.tick() {
                        return Some(active.room.view());
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for AuctionBidding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuctionBidding")
            .field("auction_id", &self.auction_id())
            .field("view", &self.view())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use vendora_shared::{
        AdminRole, AdminUser, AuctionStateUpdate, AuthPayload, BidAmount, BidRejection, NewBid,
        TokenPair,
    };

    use super::super::channel::drain;
    use super::*;

    fn state(auction_id: &str, current_bid: i64, end_at: DateTime<Utc>) -> ServerEvent {
        ServerEvent::AuctionState(AuctionStateUpdate {
            auction_id: auction_id.into(),
            state: AuctionState::Active,
            current_bid: Some(current_bid),
            end_at: Some(end_at),
        })
    }

    fn new_bid(auction_id: &str, amount_minor: i64) -> ServerEvent {
        ServerEvent::NewBid(NewBid {
            auction_id: auction_id.into(),
            bid: BidAmount { amount_minor },
        })
    }

    fn signed_in() -> SessionStore {
        let session = SessionStore::in_memory();
        session.save_login(&AuthPayload {
            tokens: TokenPair {
                access_token: "access".into(),
                refresh_token: "refresh".into(),
            },
            user: AdminUser {
                id: "u-7".into(),
                name: "Vendor".into(),
                email: "vendor@example.com".into(),
                role: AdminRole::Vendor,
                permissions: Vec::new(),
            },
        });
        session
    }

    #[test]
    fn follows_state_then_bids_and_refuses_offline_bid() {
        let (channel, mut outbound) = AuctionChannel::detached();
        let mut bidding = AuctionBidding::new(channel.clone(), signed_in());
        bidding.set_auction(Some("A1"));

        let end_at = Utc::now() + chrono::Duration::milliseconds(60_000);
        channel.dispatch(state("A1", 500, end_at));
        assert!(bidding.pump());
        let view = bidding.view();
        assert_eq!(view.auction_state, Some(AuctionState::Active));
        assert_eq!(view.current_bid, Some(500));
        let left = view.time_left.unwrap();
        assert!(left <= Duration::from_secs(60) && left > Duration::from_secs(59));

        channel.dispatch(new_bid("A1", 600));
        assert!(bidding.pump());
        let after_bid = bidding.view();
        assert_eq!(after_bid.current_bid, Some(600));
        assert_eq!(after_bid.auction_state, Some(AuctionState::Active));
        assert_eq!(after_bid.time_left, view.time_left);

        assert_eq!(bidding.place_bid(650), Err(NOT_CONNECTED.to_string()));
        assert_eq!(bidding.view().error.as_deref(), Some(NOT_CONNECTED));
        assert!(drain(&mut outbound).is_empty());
    }

    #[test]
    fn ignores_other_rooms() {
        let (channel, _outbound) = AuctionChannel::detached();
        let mut bidding = AuctionBidding::new(channel.clone(), signed_in());
        bidding.set_auction(Some("A"));

        let before = bidding.view();
        channel.dispatch(state("B", 900, Utc::now() + chrono::Duration::seconds(30)));
        channel.dispatch(new_bid("B", 1000));
        assert!(!bidding.pump());
        assert_eq!(bidding.view(), before);
    }

    #[test]
    fn leaving_a_room_stops_updates() {
        let (channel, mut outbound) = AuctionChannel::detached();
        channel.set_state(ConnectionState::Connected);
        let mut bidding = AuctionBidding::new(channel.clone(), signed_in());

        bidding.set_auction(Some("A1"));
        assert_eq!(drain(&mut outbound), vec![ClientEvent::JoinAuction("A1".into())]);
        assert_eq!(bidding.phase(), BiddingPhase::Subscribed);

        bidding.set_auction(None);
        assert_eq!(drain(&mut outbound), vec![ClientEvent::LeaveAuction("A1".into())]);
        assert_eq!(channel.listener_count(), 0);
        assert_eq!(bidding.phase(), BiddingPhase::Connected);

        channel.dispatch(new_bid("A1", 700));
        assert!(!bidding.pump());
        assert_eq!(bidding.view().current_bid, None);
    }

    #[test]
    fn switching_rooms_leaves_before_joining() {
        let (channel, mut outbound) = AuctionChannel::detached();
        channel.set_state(ConnectionState::Connected);
        let mut bidding = AuctionBidding::new(channel.clone(), signed_in());

        bidding.set_auction(Some("A1"));
        bidding.set_auction(Some("A2"));
        assert_eq!(
            drain(&mut outbound),
            vec![
                ClientEvent::JoinAuction("A1".into()),
                ClientEvent::LeaveAuction("A1".into()),
                ClientEvent::JoinAuction("A2".into()),
            ]
        );
        assert_eq!(bidding.auction_id(), Some("A2"));
    }

    #[test]
    fn bid_round_trip() {
        let (channel, mut outbound) = AuctionChannel::detached();
        channel.set_state(ConnectionState::Connected);
        let mut bidding = AuctionBidding::new(channel.clone(), signed_in());
        bidding.set_auction(Some("A1"));
        drain(&mut outbound);

        assert_eq!(bidding.place_bid(650), Ok(()));
        assert_eq!(
            drain(&mut outbound),
            vec![ClientEvent::PlaceBid(BidPlacement {
                auction_id: "A1".into(),
                amount_minor: 650,
                user_id: "u-7".into(),
            })]
        );

        channel.dispatch(ServerEvent::BidError(BidRejection {
            error: "Bid too low".into(),
        }));
        bidding.pump();
        let view = bidding.view();
        assert_eq!(view.error.as_deref(), Some("Bid too low"));
        assert_eq!(view.current_bid, None);

        channel.dispatch(ServerEvent::BidSuccess);
        bidding.pump();
        assert_eq!(bidding.view().error, None);
    }

    #[test]
    fn bidding_requires_a_persisted_user() {
        let (channel, mut outbound) = AuctionChannel::detached();
        channel.set_state(ConnectionState::Connected);
        let mut bidding = AuctionBidding::new(channel, SessionStore::in_memory());
        bidding.set_auction(Some("A1"));
        drain(&mut outbound);

        assert_eq!(bidding.place_bid(100), Err(SIGN_IN_TO_BID.to_string()));
        assert!(drain(&mut outbound).is_empty());
    }

    #[test]
    fn bidding_without_a_room_is_not_connected() {
        let (channel, _outbound) = AuctionChannel::detached();
        channel.set_state(ConnectionState::Connected);
        let mut bidding = AuctionBidding::new(channel, signed_in());

        assert_eq!(bidding.place_bid(100), Err(NOT_CONNECTED.to_string()));
        assert_eq!(bidding.view().error.as_deref(), Some(NOT_CONNECTED));
    }

    #[test]
    fn tracks_connection_events() {
        let (channel, _outbound) = AuctionChannel::detached();
        let mut bidding = AuctionBidding::new(channel.clone(), signed_in());
        bidding.set_auction(Some("A1"));
        assert!(!bidding.view().is_connected);
        assert_eq!(bidding.phase(), BiddingPhase::Disconnected);

        channel.set_state(ConnectionState::Connecting);
        assert_eq!(bidding.phase(), BiddingPhase::Connecting);
        channel.set_state(ConnectionState::Connected);
        assert!(bidding.pump());
        assert!(bidding.view().is_connected);

        channel.set_state(ConnectionState::Reconnecting { attempt: 1 });
        assert!(bidding.pump());
        assert!(!bidding.view().is_connected);
    }

    #[test]
    fn countdown_stops_at_zero() {
        let mut room = AuctionRoom::new("A1", true);
        let now = Utc::now();
        room.apply(
            &ChannelEvent::Server(state("A1", 100, now + chrono::Duration::milliseconds(1500))),
            now,
        );
        assert_eq!(room.view().time_left, Some(Duration::from_millis(1500)));

        assert!(room.tick());
        assert_eq!(room.view().time_left, Some(Duration::from_millis(500)));
        assert!(room.tick());
        assert_eq!(room.view().time_left, Some(Duration::ZERO));
        assert!(!room.tick());
        assert_eq!(room.view().time_left, Some(Duration::ZERO));
    }

    #[test]
    fn past_end_reads_as_zero() {
        let mut room = AuctionRoom::new("A1", true);
        let now = Utc::now();
        room.apply(
            &ChannelEvent::Server(state("A1", 100, now - chrono::Duration::seconds(5))),
            now,
        );
        assert_eq!(room.view().time_left, Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_once_per_second() {
        let (channel, _outbound) = AuctionChannel::detached();
        let mut bidding = AuctionBidding::new(channel.clone(), signed_in());
        bidding.set_auction(Some("A1"));

        channel.dispatch(state("A1", 500, Utc::now() + chrono::Duration::seconds(10)));
        let first = bidding.changed().await.unwrap().time_left.unwrap();

        let started = Instant::now();
        let mut previous = first;
        for step in 1..=3u32 {
            let left = bidding.changed().await.unwrap().time_left.unwrap();
            assert_eq!(left, previous - TICK_PERIOD);
            assert_eq!(started.elapsed(), TICK_PERIOD * step);
            previous = left;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_state_restarts_the_countdown() {
        let (channel, _outbound) = AuctionChannel::detached();
        let mut bidding = AuctionBidding::new(channel.clone(), signed_in());
        bidding.set_auction(Some("A1"));

        channel.dispatch(state("A1", 500, Utc::now() + chrono::Duration::seconds(30)));
        bidding.changed().await.unwrap();
        bidding.changed().await.unwrap();

        tokio::time::advance(Duration::from_millis(400)).await;
        channel.dispatch(state("A1", 800, Utc::now() + chrono::Duration::seconds(20)));
        let view = bidding.changed().await.unwrap();
        assert_eq!(view.current_bid, Some(800));

        let resumed = Instant::now();
        bidding.changed().await.unwrap();
        assert_eq!(resumed.elapsed(), TICK_PERIOD);
    }

    #[test]
    fn rejoins_after_reconnect() {
        let (channel, mut outbound) = AuctionChannel::detached();
        let mut bidding = AuctionBidding::new(channel.clone(), signed_in());
        bidding.set_auction(Some("A1"));

        channel.set_state(ConnectionState::Connected);
        channel.set_state(ConnectionState::Reconnecting { attempt: 1 });
        channel.set_state(ConnectionState::Connected);
        assert_eq!(
            drain(&mut outbound),
            vec![
                ClientEvent::JoinAuction("A1".into()),
                ClientEvent::JoinAuction("A1".into()),
            ]
        );
        assert!(bidding.pump());
        assert!(bidding.view().is_connected);
    }
}
