//! The Broadcast Hub: sole owner of the live viewer set.
//!
//! Sessions never touch the set directly. They submit to the hub's inlets
//! (`register`, `unregister`, `seen`, `broadcast`) and the hub loop applies
//! them one at a time. Eviction, whether from a failed write or the liveness
//! sweep, goes through the same removal path as `unregister`.
//!
//! Every session merges every feed event, so several sessions submit a
//! snapshot for the same event. Snapshots carry the event's sequence number
//! and the hub sends only the first one past the last sequence it sent.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const INLET_CAPACITY: usize = 16;

/// A connected viewer as the hub sees it.
pub struct Client {
    pub id: String,
    pub remote: Option<SocketAddr>,
    outbound: mpsc::Sender<String>,
}

impl Client {
    pub fn new(
        id: impl Into<String>,
        remote: Option<SocketAddr>,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        Self {
            id: id.into(),
            remote,
            outbound,
        }
    }
}

struct Entry {
    client: Client,
    last_seen: Instant,
}

/// Cloneable front door to the hub loop.
#[derive(Clone)]
pub struct HubHandle {
    register: mpsc::Sender<Client>,
    unregister: mpsc::UnboundedSender<String>,
    seen: mpsc::Sender<String>,
    broadcast: mpsc::Sender<(u64, String)>,
    clients: Arc<AtomicUsize>,
}

impl HubHandle {
    /// Add a client. Returns false if the hub has shut down.
    pub async fn register(&self, client: Client) -> bool {
        self.register.send(client).await.is_ok()
    }

    /// Drop a client. Safe to call for absent ids and from `Drop`.
    pub fn unregister(&self, id: &str) {
        let _ = self.unregister.send(id.to_string());
    }

    /// Refresh a client's liveness.
    pub async fn seen(&self, id: &str) {
        let _ = self.seen.send(id.to_string()).await;
    }

    /// Send a pre-serialized snapshot, taken as of feed event `seq`, to
    /// every client. Dropped if a snapshot at or past `seq` already went out.
    pub async fn broadcast(&self, seq: u64, payload: String) {
        let _ = self.broadcast.send((seq, payload)).await;
    }

    /// Live client count as last published by the hub loop.
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }
}

pub struct Hub {
    clients: HashMap<String, Entry>,
    register: mpsc::Receiver<Client>,
    unregister: mpsc::UnboundedReceiver<String>,
    seen: mpsc::Receiver<String>,
    broadcast: mpsc::Receiver<(u64, String)>,
    last_seq: u64,
    count: Arc<AtomicUsize>,
    sweep_interval: Duration,
    liveness_timeout: Duration,
}

impl Hub {
    pub fn new(sweep_interval: Duration, liveness_timeout: Duration) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(INLET_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (seen_tx, seen_rx) = mpsc::channel(INLET_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(INLET_CAPACITY);
        let count = Arc::new(AtomicUsize::new(0));

        let hub = Self {
            clients: HashMap::new(),
            register: register_rx,
            unregister: unregister_rx,
            seen: seen_rx,
            broadcast: broadcast_rx,
            last_seq: 0,
            count: Arc::clone(&count),
            sweep_interval,
            liveness_timeout,
        };
        let handle = HubHandle {
            register: register_tx,
            unregister: unregister_tx,
            seen: seen_tx,
            broadcast: broadcast_tx,
            clients: count,
        };
        (hub, handle)
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // Membership changes are applied before payloads queued after them.
            tokio::select! {
                biased;

                _ = shutdown.changed() => break,
                Some(client) = self.register.recv() => self.add(client),
                Some(id) = self.unregister.recv() => self.remove(&id, "unregistered"),
                Some(id) = self.seen.recv() => self.touch(&id),
                Some((seq, payload)) = self.broadcast.recv() => self.fan_out(seq, &payload),
                _ = sweep.tick() => self.sweep(),
            }
        }

        // Dropping the entries closes every outbound queue.
        self.clients.clear();
        self.publish_count();
        info!("broadcast hub stopped");
    }

    fn add(&mut self, client: Client) {
        info!(client_id = %client.id, remote = ?client.remote, "viewer connected");
        self.clients.insert(
            client.id.clone(),
            Entry {
                client,
                last_seen: Instant::now(),
            },
        );
        self.publish_count();
    }

    fn remove(&mut self, id: &str, reason: &str) {
        if self.clients.remove(id).is_some() {
            info!(client_id = %id, reason, clients = self.clients.len(), "viewer removed");
            self.publish_count();
        }
    }

    fn touch(&mut self, id: &str) {
        if let Some(entry) = self.clients.get_mut(id) {
            entry.last_seen = Instant::now();
        }
    }

    fn fan_out(&mut self, seq: u64, payload: &str) {
        if seq <= self.last_seq {
            debug!(seq, last_seq = self.last_seq, "snapshot already superseded, dropping");
            return;
        }
        self.last_seq = seq;
        debug!(seq, clients = self.clients.len(), bytes = payload.len(), "broadcasting status");

        let failed: Vec<String> = self
            .clients
            .values()
            .filter(|entry| entry.client.outbound.try_send(payload.to_string()).is_err())
            .map(|entry| entry.client.id.clone())
            .collect();

        for id in failed {
            warn!(client_id = %id, "write failed, evicting viewer");
            self.remove(&id, "write failed");
        }
    }

    fn sweep(&mut self) {
        let now = Instant::now();
        let stale: Vec<String> = self
            .clients
            .values()
            .filter(|entry| now.duration_since(entry.last_seen) > self.liveness_timeout)
            .map(|entry| entry.client.id.clone())
            .collect();

        for id in stale {
            warn!(client_id = %id, "viewer silent past liveness timeout");
            self.remove(&id, "stale");
        }
    }

    fn publish_count(&self) {
        self.count.store(self.clients.len(), Ordering::Relaxed);
    }
}
