//! Connector metrics
//!
//! [`ConnectorMetrics`] keeps lock-free counters for one connector and
//! mirrors every update to the `metrics` crate facade, so an installed
//! recorder (Prometheus or otherwise) sees them as
//! `bridge_{prefix}_{name}`. Without a recorder the facade calls are no-ops.
//! Metrics are side effects only: nothing in the bridge reads them to make
//! a decision.

use crate::types::ConnectorKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Atomic counters for a single connector
#[derive(Debug)]
pub struct ConnectorMetrics {
    prefix: String,
    running: AtomicI64,
    reconnect_error: AtomicU64,
    reconnect_success: AtomicU64,
    count: AtomicU64,
    send_success: AtomicU64,
    send_error: AtomicU64,
    read_error: AtomicU64,
    ack_success: AtomicU64,
    ack_error: AtomicU64,
}

impl ConnectorMetrics {
    /// Counters for a named connector on one side of the pipeline
    pub fn for_connector(kind: ConnectorKind, name: &str) -> Self {
        Self::new(format!("{}_{name}", kind.as_str()))
    }

    /// Create counters for a connector, e.g. `output_amqp`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            running: AtomicI64::new(0),
            reconnect_error: AtomicU64::new(0),
            reconnect_success: AtomicU64::new(0),
            count: AtomicU64::new(0),
            send_success: AtomicU64::new(0),
            send_error: AtomicU64::new(0),
            read_error: AtomicU64::new(0),
            ack_success: AtomicU64::new(0),
            ack_error: AtomicU64::new(0),
        }
    }

    /// Metric path prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn bump(&self, counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(format!("bridge_{}_{name}", self.prefix)).increment(1);
    }

    /// Mark the supervisory loop as started
    pub fn loop_started(&self) {
        let value = self.running.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!(format!("bridge_{}_running", self.prefix)).set(value as f64);
    }

    /// Mark the supervisory loop as stopped
    pub fn loop_stopped(&self) {
        let value = self.running.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::gauge!(format!("bridge_{}_running", self.prefix)).set(value as f64);
    }

    /// Record a failed connect attempt
    pub fn record_reconnect_error(&self) {
        self.bump(&self.reconnect_error, "reconnect_error");
    }

    /// Record a successful connect attempt
    pub fn record_reconnect_success(&self) {
        self.bump(&self.reconnect_success, "reconnect_success");
    }

    /// Record a message taken into processing
    pub fn record_message(&self) {
        self.bump(&self.count, "count");
    }

    /// Record a part or message delivered successfully
    pub fn record_send_success(&self) {
        self.bump(&self.send_success, "send_success");
    }

    /// Record a part or message that failed to deliver
    pub fn record_send_error(&self) {
        self.bump(&self.send_error, "send_error");
    }

    /// Record a failed read
    pub fn record_read_error(&self) {
        self.bump(&self.read_error, "read_error");
    }

    /// Record an acknowledgment passed back to the source
    pub fn record_ack(&self, ok: bool) {
        if ok {
            self.bump(&self.ack_success, "ack_success");
        } else {
            self.bump(&self.ack_error, "ack_error");
        }
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            prefix: self.prefix.clone(),
            running: self.running.load(Ordering::Relaxed),
            reconnect_error: self.reconnect_error.load(Ordering::Relaxed),
            reconnect_success: self.reconnect_success.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
            send_success: self.send_success.load(Ordering::Relaxed),
            send_error: self.send_error.load(Ordering::Relaxed),
            read_error: self.read_error.load(Ordering::Relaxed),
            ack_success: self.ack_success.load(Ordering::Relaxed),
            ack_error: self.ack_error.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of a connector's counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub prefix: String,
    pub running: i64,
    pub reconnect_error: u64,
    pub reconnect_success: u64,
    pub count: u64,
    pub send_success: u64,
    pub send_error: u64,
    pub read_error: u64,
    pub ack_success: u64,
    pub ack_error: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_from_kind() {
        let m = ConnectorMetrics::for_connector(ConnectorKind::Pipeline, "0");
        assert_eq!(m.prefix(), "pipeline_0");
    }

    #[test]
    fn test_counters_start_at_zero() {
        let m = ConnectorMetrics::new("output_amqp");
        let snap = m.snapshot();
        assert_eq!(snap.prefix, "output_amqp");
        assert_eq!(snap.count, 0);
        assert_eq!(snap.running, 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let m = ConnectorMetrics::new("input_websocket");
        m.loop_started();
        m.record_reconnect_error();
        m.record_reconnect_error();
        m.record_reconnect_success();
        m.record_message();
        m.record_send_success();
        m.record_ack(true);
        m.record_ack(false);

        let snap = m.snapshot();
        assert_eq!(snap.running, 1);
        assert_eq!(snap.reconnect_error, 2);
        assert_eq!(snap.reconnect_success, 1);
        assert_eq!(snap.count, 1);
        assert_eq!(snap.send_success, 1);
        assert_eq!(snap.ack_success, 1);
        assert_eq!(snap.ack_error, 1);

        m.loop_stopped();
        assert_eq!(m.snapshot().running, 0);
    }
}
