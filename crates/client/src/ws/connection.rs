//! WebSocket connection with state management and auto-reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use vendora_shared::{ClientEvent, ServerEvent};

/// How long to wait for a token before checking again.
const NO_TOKEN_POLL: Duration = Duration::from_secs(1);

/// A connection that stays open this long restores the full reconnect budget.
const STABLE_CONNECTION: Duration = Duration::from_secs(10);

/// Connection state for a WebSocket
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 1000,
        }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Whether `attempt` failed attempts exhaust the budget.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

pub(crate) type StateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;
pub(crate) type EventCallback = Arc<dyn Fn(ServerEvent) + Send + Sync>;
pub(crate) type TokenSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Build the handshake request, authenticating with the access token.
fn handshake_request(url: &str, token: &str) -> Result<Request, String> {
    let mut request = url
        .into_client_request()
        .map_err(|e| format!("invalid socket url {url}: {e}"))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| format!("invalid access token header: {e}"))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    Ok(request)
}

/// Start the connection management loop in a background tokio task.
///
/// Commands queued on the outbound receiver are only written while a socket
/// is open; anything queued in between waits for the next connection.
pub(crate) fn start_connection_loop(
    url: String,
    token_source: TokenSource,
    receiver: UnboundedReceiver<ClientEvent>,
    on_state: StateCallback,
    on_event: EventCallback,
    reconnect_config: ReconnectConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Shared between the write tasks of successive connections
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let mut attempt = 0u32;

        loop {
            let Some(token) = token_source() else {
                // Not signed in yet
                on_state(ConnectionState::Disconnected);
                tokio::time::sleep(NO_TOKEN_POLL).await;
                continue;
            };

            if attempt == 0 {
                on_state(ConnectionState::Connecting);
            } else {
                on_state(ConnectionState::Reconnecting { attempt });
            }

            let request = match handshake_request(&url, &token) {
                Ok(request) => request,
                Err(reason) => {
                    crate::log_error!("{}", reason);
                    on_state(ConnectionState::Failed { reason });
                    break;
                }
            };

            match connect_async(request).await {
                Ok((ws_stream, _response)) => {
                    let opened_at = tokio::time::Instant::now();
                    crate::log_info!("WebSocket connected to {}", url);

                    let (mut write, mut read) = ws_stream.split();
                    let (close_tx, mut close_rx) = mpsc::unbounded_channel::<()>();

                    let on_event_clone = on_event.clone();
                    let close_tx_for_read = close_tx.clone();
                    let read_task = tokio::spawn(async move {
                        while let Some(msg_result) = read.next().await {
                            match msg_result {
                                Ok(Message::Text(text)) => {
                                    match serde_json::from_str::<ServerEvent>(text.as_str()) {
                                        Ok(event) => on_event_clone(event),
                                        Err(e) => crate::log_error!(
                                            "Failed to parse message: {} ({})",
                                            e,
                                            text.as_str()
                                        ),
                                    }
                                }
                                Ok(Message::Close(_)) => {
                                    crate::log_info!("WebSocket received close frame");
                                    break;
                                }
                                Ok(_) => {
                                    // Pong is handled automatically by tungstenite
                                }
                                Err(e) => {
                                    crate::log_error!("WebSocket read error: {}", e);
                                    break;
                                }
                            }
                        }
                        let _ = close_tx_for_read.send(());
                    });

                    let receiver_for_write = receiver.clone();
                    let write_task = tokio::spawn(async move {
                        loop {
                            let cmd = {
                                let mut rx = receiver_for_write.lock().await;
                                rx.recv().await
                            };
                            let Some(cmd) = cmd else {
                                crate::log_info!("Sender dropped, stopping write task");
                                break;
                            };
                            match serde_json::to_string(&cmd) {
                                Ok(json) => {
                                    crate::log_debug!("Sending {}", json);
                                    if let Err(e) = write.send(Message::Text(json.into())).await {
                                        crate::log_error!("Send failed: {}", e);
                                        break;
                                    }
                                }
                                Err(e) => crate::log_error!("Serialize failed: {}", e),
                            }
                        }
                        let _ = close_tx.send(());
                    });

                    on_state(ConnectionState::Connected);

                    // Wait for either half to stop
                    close_rx.recv().await;
                    read_task.abort();
                    write_task.abort();
                    crate::log_info!("WebSocket to {} closed", url);
                    on_state(ConnectionState::Disconnected);

                    if opened_at.elapsed() >= STABLE_CONNECTION {
                        attempt = 0;
                    }
                }
                Err(e) => {
                    crate::log_error!("WebSocket error for {}: {}", url, e);
                }
            }

            // Dropped and refused connections share one budget and delay.
            if reconnect_config.exhausted(attempt) {
                on_state(ConnectionState::Failed {
                    reason: format!(
                        "Max reconnect attempts ({}) exceeded",
                        reconnect_config.max_attempts
                    ),
                });
                break;
            }

            crate::log_info!(
                "Reconnecting to {} in {}ms (attempt {})",
                url,
                reconnect_config.delay_ms,
                attempt + 1
            );
            tokio::time::sleep(reconnect_config.delay()).await;
            attempt += 1;
        }
    })
}
