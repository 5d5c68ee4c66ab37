//! One viewer's WebSocket connection.
//!
//! A session registers with the hub, then multiplexes four sources until the
//! socket goes away: inbound frames (liveness), its outbound queue from the
//! hub, its subscription to the status feed, and a ping ticker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::ws::coalesce::{self, StatusTable};
use crate::ws::feed::{FeedEvent, Sequenced};
use crate::ws::hub::{Client, HubHandle};

/// Axum handler: upgrades HTTP to WebSocket at GET /api/ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, remote, state))
}

/// Unregisters from the hub on every exit path.
struct Registration {
    hub: HubHandle,
    id: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.unregister(&self.id);
    }
}

async fn run_session(socket: WebSocket, remote: SocketAddr, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let viewer = &state.config.viewer;

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(viewer.outbound_buffer.max(1));
    if !state
        .hub
        .register(Client::new(&conn_id, Some(remote), outbound_tx))
        .await
    {
        debug!(conn_id = %conn_id, "hub stopped, refusing viewer");
        return;
    }
    let _registration = Registration {
        hub: state.hub.clone(),
        id: conn_id.clone(),
    };

    let (mut sink, mut stream) = socket.split();
    let feed = state.feed.subscribe();
    let mut table = feed.table;
    let mut last_seq = feed.seq;
    let mut events = feed.events;

    let mut ping = tokio::time::interval(Duration::from_millis(viewer.ping_interval_ms.max(1)));
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => state.hub.seen(&conn_id).await,
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, "read failed: {e}");
                    break;
                }
            },

            payload = outbound_rx.recv() => match payload {
                Some(payload) => {
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                // Hub dropped us: evicted or shutting down.
                None => break,
            },

            event = events.recv() => match event {
                Ok(Sequenced { seq, event }) => {
                    // Already covered by a resync.
                    if seq <= last_seq {
                        continue;
                    }
                    last_seq = seq;
                    forward(&state.hub, &mut table, seq, &event).await;
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(conn_id = %conn_id, missed, "status feed lagged, resyncing");
                    (table, last_seq) = state.feed.snapshot();
                }
                Err(RecvError::Closed) => break,
            },

            _ = ping.tick() => {
                if sink.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
    info!(conn_id = %conn_id, "viewer session closed");
}

/// Merge feed event `seq` into this session's table and broadcast the
/// affected snapshot.
async fn forward(hub: &HubHandle, table: &mut StatusTable, seq: u64, event: &FeedEvent) {
    let snapshot = table.apply(event);
    match coalesce::encode(&snapshot) {
        Ok(Some(payload)) => hub.broadcast(seq, payload).await,
        Ok(None) => {}
        // Dropped; the next event re-serializes the current state.
        Err(e) => error!("failed to encode status snapshot: {e}"),
    }
}
