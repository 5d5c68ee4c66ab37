//! Status feed: one relay drains the scheduler's queues and republishes every
//! event, stamped with a sequence number, to every subscribed session.
//!
//! The feed also keeps the merged table of everything published so far. A
//! session subscribes under the same lock, so it starts from a copy of that
//! table and then sees each later event exactly once, in order.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;
use vaultkeep_protocol::status::ChanMsg;
use vaultkeep_scheduler::StatusReceivers;

use crate::ws::coalesce::StatusTable;

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum FeedEvent {
    Output(ChanMsg),
    Error(ChanMsg),
}

/// An event as published, in feed order.
#[derive(Debug, Clone)]
pub struct Sequenced {
    pub seq: u64,
    pub event: FeedEvent,
}

/// Starting point for one session.
pub struct Subscription {
    /// Merged state up to and including `seq`.
    pub table: StatusTable,
    pub seq: u64,
    pub events: broadcast::Receiver<Sequenced>,
}

#[derive(Default)]
struct Published {
    seq: u64,
    table: StatusTable,
}

#[derive(Clone)]
pub struct StatusFeed {
    tx: broadcast::Sender<Sequenced>,
    published: Arc<Mutex<Published>>,
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            tx,
            published: Arc::new(Mutex::new(Published::default())),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let published = self.published.lock().expect("status feed poisoned");
        Subscription {
            table: published.table.clone(),
            seq: published.seq,
            events: self.tx.subscribe(),
        }
    }

    /// Current merged table and the sequence number it reflects.
    pub fn snapshot(&self) -> (StatusTable, u64) {
        let published = self.published.lock().expect("status feed poisoned");
        (published.table.clone(), published.seq)
    }

    /// Merge `event` and hand it to every subscriber. Returns its sequence number.
    pub(crate) fn publish(&self, event: FeedEvent) -> u64 {
        let mut published = self.published.lock().expect("status feed poisoned");
        published.seq += 1;
        published.table.apply(&event);
        let seq = published.seq;
        // No subscribers is fine: the table still has it.
        let _ = self.tx.send(Sequenced { seq, event });
        seq
    }

    /// Drain both scheduler queues until they close.
    pub async fn relay(self, mut receivers: StatusReceivers) {
        loop {
            let event = tokio::select! {
                Some(msg) = receivers.output.recv() => FeedEvent::Output(msg),
                Some(msg) = receivers.error.recv() => FeedEvent::Error(msg),
                else => break,
            };
            self.publish(event);
        }
        debug!("status relay stopped");
    }
}
