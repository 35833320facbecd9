//! Server-wide counters
//!
//! Connection tasks bump the atomic counters in [`ServerMetrics`];
//! [`ServerMetrics::snapshot`] produces a plain [`ServerStats`] value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ServerMetrics {
    connections_total: AtomicU64,
    connections_active: AtomicU64,
    connections_rejected: AtomicU64,
    players_online: AtomicU64,
    packets_received: AtomicU64,
    packets_sent: AtomicU64,
    protocol_errors: AtomicU64,
    start_time: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            players_online: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection reached PLAY
    pub fn player_joined(&self) {
        self.players_online.fetch_add(1, Ordering::Relaxed);
    }

    pub fn player_left(&self) {
        self.players_online.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn players_online(&self) -> usize {
        self.players_online.load(Ordering::Relaxed) as usize
    }

    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            players_online: self.players_online.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            uptime: self.start_time.elapsed(),
        }
    }
}

/// Server statistics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub players_online: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub protocol_errors: u64,
    pub uptime: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = ServerMetrics::new();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();
        metrics.connection_rejected();
        metrics.player_joined();
        metrics.packet_received();
        metrics.packet_sent();
        metrics.packet_sent();
        metrics.protocol_error();

        let stats = metrics.snapshot();
        assert_eq!(stats.connections_total, 2);
        assert_eq!(stats.connections_active, 1);
        assert_eq!(stats.connections_rejected, 1);
        assert_eq!(stats.players_online, 1);
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.packets_sent, 2);
        assert_eq!(stats.protocol_errors, 1);
        assert_eq!(metrics.players_online(), 1);
    }
}
