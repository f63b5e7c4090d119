//! The process-wide auction channel and its room subscriptions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::OnceCell;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use vendora_shared::{ClientEvent, ServerEvent};

use super::connection::{start_connection_loop, ConnectionState};
use crate::config::ClientConfig;
use crate::session::SessionStore;

/// The shared connection, created on first use.
static SHARED: OnceCell<AuctionChannel> = OnceCell::new();

/// What a subscription receives, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Server(ServerEvent),
}

struct Listener {
    id: u64,
    auction_id: String,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

struct ChannelInner {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    state: watch::Sender<ConnectionState>,
    listeners: Mutex<Vec<Listener>>,
    next_listener: AtomicU64,
    connection: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelInner {
    fn new(outbound: mpsc::UnboundedSender<ClientEvent>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            outbound,
            state,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            connection: Mutex::new(None),
        }
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    fn emit(&self, event: ClientEvent) -> Result<(), String> {
        self.outbound
            .send(event)
            .map_err(|e| format!("Failed to send: {}", e))
    }

    fn set_state(&self, state: ConnectionState) {
        let was_connected = self.is_connected();
        let now_connected = state.is_connected();
        self.state.send_replace(state);
        if was_connected == now_connected {
            return;
        }

        let mut listeners = self.listeners();
        if now_connected {
            // The server forgets rooms with the socket; join them again.
            let mut rooms: Vec<&str> = listeners.iter().map(|l| l.auction_id.as_str()).collect();
            rooms.sort_unstable();
            rooms.dedup();
            for room in rooms {
                crate::log_info!("Joining auction room {}", room);
                if let Err(e) = self.emit(ClientEvent::JoinAuction(room.to_string())) {
                    crate::log_error!("{}", e);
                }
            }
        }
        let event = if now_connected {
            ChannelEvent::Connected
        } else {
            ChannelEvent::Disconnected
        };
        listeners.retain(|l| l.events.send(event.clone()).is_ok());
    }

    fn dispatch(&self, event: ServerEvent) {
        let mut listeners = self.listeners();
        listeners.retain(|l| l.events.send(ChannelEvent::Server(event.clone())).is_ok());
    }

    fn detach(&self, id: u64) {
        let mut listeners = self.listeners();
        let Some(pos) = listeners.iter().position(|l| l.id == id) else {
            return;
        };
        let listener = listeners.remove(pos);
        let room_still_watched = listeners.iter().any(|l| l.auction_id == listener.auction_id);
        if !room_still_watched && self.is_connected() {
            crate::log_info!("Leaving auction room {}", listener.auction_id);
            if let Err(e) = self.emit(ClientEvent::LeaveAuction(listener.auction_id)) {
                crate::log_error!("{}", e);
            }
        }
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        let task = self
            .connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// Handle to a real-time connection. Clones share the connection.
#[derive(Clone)]
pub struct AuctionChannel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for AuctionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuctionChannel")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl AuctionChannel {
    /// The process-wide channel. The first call opens the connection; later
    /// calls ignore their arguments.
    ///
    /// Must be called from within a tokio runtime.
    pub fn shared(config: &ClientConfig, session: &SessionStore) -> Self {
        SHARED
            .get_or_init(|| Self::connect(config, session.clone()))
            .clone()
    }

    /// Open a dedicated connection authenticated from `session`.
    pub fn connect(config: &ClientConfig, session: SessionStore) -> Self {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(ChannelInner::new(outbound));

        let for_state = Arc::downgrade(&inner);
        let for_events = Arc::downgrade(&inner);
        let task = start_connection_loop(
            config.ws_url.clone(),
            Arc::new(move || session.access_token()),
            receiver,
            Arc::new(move |state| {
                if let Some(inner) = for_state.upgrade() {
                    inner.set_state(state);
                }
            }),
            Arc::new(move |event| {
                if let Some(inner) = for_events.upgrade() {
                    inner.dispatch(event);
                }
            }),
            config.reconnect.clone(),
        );
        *inner.connection.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        Self { inner }
    }

    /// A channel with no socket behind it. Outbound events land on the
    /// returned receiver; state and inbound events are driven by hand.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let channel = Self {
            inner: Arc::new(ChannelInner::new(outbound)),
        };
        (channel, receiver)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Join `auction_id` and start receiving its events.
    pub fn subscribe(&self, auction_id: &str) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut listeners = self.inner.listeners();
        let already_joined = listeners.iter().any(|l| l.auction_id == auction_id);
        listeners.push(Listener {
            id,
            auction_id: auction_id.to_string(),
            events: tx,
        });
        if !already_joined && self.is_connected() {
            crate::log_info!("Joining auction room {}", auction_id);
            if let Err(e) = self.inner.emit(ClientEvent::JoinAuction(auction_id.to_string())) {
                crate::log_error!("{}", e);
            }
        }
        drop(listeners);

        Subscription {
            channel: self.clone(),
            id,
            auction_id: auction_id.to_string(),
            events: rx,
        }
    }

    /// Queue an event for the server. Fails only if the connection task is gone.
    pub fn emit(&self, event: ClientEvent) -> Result<(), String> {
        self.inner.emit(event)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.inner.set_state(state);
    }

    pub(crate) fn dispatch(&self, event: ServerEvent) {
        self.inner.dispatch(event);
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

/// One room's event feed. Dropping it leaves the room; events still queued
/// are discarded with it.
pub struct Subscription {
    channel: AuctionChannel,
    id: u64,
    auction_id: String,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("auction_id", &self.auction_id)
            .finish()
    }
}

impl Subscription {
    pub fn auction_id(&self) -> &str {
        &self.auction_id
    }

    pub fn channel(&self) -> &AuctionChannel {
        &self.channel
    }

    /// Wait for the next event. Cancel-safe.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// The next queued event, if any.
    pub fn try_next(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    /// Leave the room now.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.events.close();
        self.channel.inner.detach(self.id);
    }
}

#[cfg(test)]
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
