//! Merged view of the last known status of every job.
//!
//! Two tables, success and error, each keyed by job id with last-write-wins.
//! Insertion order is kept so the UI sees a stable list.

use std::collections::HashMap;

use vaultkeep_protocol::status::ChanMsg;
use vaultkeep_protocol::viewer::{is_blank, WsMsg};

use crate::ws::feed::FeedEvent;

#[derive(Debug, Default, Clone)]
struct LastValues {
    order: Vec<String>,
    values: HashMap<String, String>,
}

impl LastValues {
    fn set(&mut self, id: &str, payload: &str) {
        if self
            .values
            .insert(id.to_string(), payload.to_string())
            .is_none()
        {
            self.order.push(id.to_string());
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|id| self.values.get(id).map(|v| (id.as_str(), v.as_str())))
    }
}

#[derive(Debug, Default, Clone)]
pub struct StatusTable {
    output: LastValues,
    error: LastValues,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a success-path message and return the success snapshot.
    pub fn record_output(&mut self, msg: &ChanMsg) -> Vec<WsMsg> {
        if !is_blank(&msg.msg) {
            self.output.set(&msg.id, &msg.msg);
        }
        self.outputs()
    }

    /// Merge an error-path message and return the error snapshot.
    pub fn record_error(&mut self, msg: &ChanMsg) -> Vec<WsMsg> {
        if !is_blank(&msg.msg) {
            self.error.set(&msg.id, &msg.msg);
        }
        self.errors()
    }

    pub fn apply(&mut self, event: &FeedEvent) -> Vec<WsMsg> {
        match event {
            FeedEvent::Output(msg) => self.record_output(msg),
            FeedEvent::Error(msg) => self.record_error(msg),
        }
    }

    pub fn outputs(&self) -> Vec<WsMsg> {
        self.output
            .iter()
            .filter(|(_, out)| !is_blank(out))
            .map(|(id, out)| WsMsg::output(id, out))
            .collect()
    }

    pub fn errors(&self) -> Vec<WsMsg> {
        self.error
            .iter()
            .filter(|(_, err)| !is_blank(err))
            .map(|(id, err)| WsMsg::error(id, err))
            .collect()
    }
}

/// Serialize a snapshot to the wire payload. `None` for an empty snapshot.
pub fn encode(records: &[WsMsg]) -> serde_json::Result<Option<String>> {
    if records.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(records).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vaultkeep_protocol::status::StatusEvent;

    fn msg(id: &str, payload: &str) -> ChanMsg {
        ChanMsg::new(id, payload, Utc::now())
    }

    #[test]
    fn last_write_wins_per_id() {
        let mut table = StatusTable::new();
        table.record_output(&msg("a", "X"));
        let snapshot = table.record_output(&msg("a", "Y"));

        assert_eq!(snapshot, vec![WsMsg::output("a", "Y")]);
    }

    #[test]
    fn blank_payloads_never_appear() {
        let mut table = StatusTable::new();
        table.record_output(&msg("a", "{}"));
        table.record_output(&msg("b", "  "));
        let snapshot = table.record_output(&msg("c", r#"{"running":true}"#));

        assert_eq!(snapshot, vec![WsMsg::output("c", r#"{"running":true}"#)]);
        assert!(table.record_error(&msg("a", "")).is_empty());
    }

    #[test]
    fn blank_payload_keeps_previous_value() {
        let mut table = StatusTable::new();
        table.record_output(&msg("a", "X"));
        let snapshot = table.record_output(&msg("a", "{}"));

        assert_eq!(snapshot, vec![WsMsg::output("a", "X")]);
    }

    #[test]
    fn insertion_order_is_stable() {
        let mut table = StatusTable::new();
        table.record_output(&msg("b", "1"));
        table.record_output(&msg("a", "2"));
        let snapshot = table.record_output(&msg("b", "3"));

        let ids: Vec<_> = snapshot.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn failed_run_produces_error_snapshot() {
        let mut table = StatusTable::new();
        let (out, err) = StatusEvent::finished_error("s2", "disk full").into_messages();

        let outputs = table.apply(&FeedEvent::Output(out));
        assert_eq!(outputs, vec![WsMsg::output("s2", r#"{"running":false}"#)]);

        let errors = table.apply(&FeedEvent::Error(err.unwrap()));
        let wire = encode(&errors).unwrap().unwrap();
        assert_eq!(wire, r#"[{"id":"s2","out":"","err":"disk full"}]"#);
    }

    #[test]
    fn empty_snapshot_is_not_encoded() {
        assert!(encode(&[]).unwrap().is_none());
    }
}
