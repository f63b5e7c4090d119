//! Dioxus binding for the bidding view.

use std::time::Duration;

use dioxus::core::Task;
use dioxus::prelude::*;
use tokio::sync::mpsc::{self, UnboundedSender};
use vendora_shared::AuctionState;

use super::bidding::{AuctionBidding, AuctionView, NOT_CONNECTED};
use crate::auth_session::AuthContext;

/// Reactive handle returned by [`use_auction_bidding`].
#[derive(Clone, Copy, PartialEq)]
pub struct UseAuctionBidding {
    view: Signal<AuctionView>,
    bids: Signal<Option<UnboundedSender<i64>>>,
}

impl UseAuctionBidding {
    pub fn is_connected(&self) -> bool {
        self.view.read().is_connected
    }

    pub fn current_bid(&self) -> Option<i64> {
        self.view.read().current_bid
    }

    pub fn auction_state(&self) -> Option<AuctionState> {
        self.view.read().auction_state
    }

    pub fn time_left(&self) -> Option<Duration> {
        self.view.read().time_left
    }

    pub fn error(&self) -> Option<String> {
        self.view.read().error.clone()
    }

    pub fn view(&self) -> AuctionView {
        self.view.read().clone()
    }

    /// Submit a bid. The outcome shows up in [`error`](Self::error) and
    /// [`current_bid`](Self::current_bid).
    pub fn place_bid(&self, amount_minor: i64) {
        let sent = self
            .bids
            .peek()
            .as_ref()
            .is_some_and(|bids| bids.send(amount_minor).is_ok());
        if !sent {
            let mut view = self.view;
            view.write().error = Some(NOT_CONNECTED.to_string());
        }
    }
}

/// Follow one auction room over the shared channel.
///
/// Passing `None` leaves the current room. Changing the id leaves the old
/// room before joining the new one; unmounting leaves it as well.
/// Requires an [`AuthProvider`](crate::auth_session::AuthProvider) ancestor.
pub fn use_auction_bidding(auction_id: Option<String>) -> UseAuctionBidding {
    let auth = use_context::<AuthContext>();
    let channel = use_hook(|| auth.auction_channel());
    let session = use_hook(|| auth.session());

    let mut view = use_signal(AuctionView::default);
    let mut bids = use_signal(|| None::<UnboundedSender<i64>>);
    let mut feed = use_signal(|| None::<Task>);

    use_effect(use_reactive((&auction_id,), move |(auction_id,)| {
        if let Some(task) = feed.write().take() {
            task.cancel();
        }

        let mut bidding = AuctionBidding::new(channel.clone(), session.clone());
        bidding.set_auction(auction_id.as_deref());
        view.set(bidding.view());

        let (tx, mut rx) = mpsc::unbounded_channel::<i64>();
        bids.set(Some(tx));

        let task = spawn(async move {
            let mut open = true;
            loop {
                tokio::select! {
                    next = bidding.changed(), if open => match next {
                        Some(next) => view.set(next),
                        None => open = false,
                    },
                    amount = rx.recv() => match amount {
                        Some(amount) => {
                            // Failures land in the view's error.
                            let _ = bidding.place_bid(amount);
                            view.set(bidding.view());
                        }
                        None => break,
                    },
                }
            }
        });
        feed.set(Some(task));
    }));

    use_drop(move || {
        if let Some(task) = feed.write().take() {
            task.cancel();
        }
    });

    UseAuctionBidding { view, bids }
}
