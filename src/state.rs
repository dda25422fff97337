//! # Server State
//!
//! Counters shared by the accept loop and every connection task.
//!
//! ## Thread Safety:
//! Every counter is an atomic, so connection tasks update them without a lock.
//! `ServerState` is a cheap `Arc` clone handed to each task.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Default)]
struct ServerMetrics {
    connections_accepted: AtomicU64,
    active_connections: AtomicU64,
    connections_completed: AtomicU64,
    connections_failed: AtomicU64,
    chunks_processed: AtomicU64,
    bytes_processed: AtomicU64,
}

/// Point-in-time copy of the server counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub active_connections: u64,
    pub connections_completed: u64,
    pub connections_failed: u64,
    pub chunks_processed: u64,
    pub bytes_processed: u64,
    pub uptime_seconds: u64,
}

/// Shared server state.
#[derive(Debug, Clone)]
pub struct ServerState {
    metrics: Arc<ServerMetrics>,
    start_time: Instant,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(ServerMetrics::default()),
            start_time: Instant::now(),
        }
    }

    /// Record an accepted connection. Pair with [`ServerState::connection_closed`].
    pub fn connection_opened(&self) {
        self.metrics.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.metrics.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self, succeeded: bool) {
        self.metrics.active_connections.fetch_sub(1, Ordering::Relaxed);
        if succeeded {
            self.metrics.connections_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.connections_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_chunk(&self, bytes: usize) {
        self.metrics.chunks_processed.fetch_add(1, Ordering::Relaxed);
        self.metrics.bytes_processed.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> u64 {
        self.metrics.active_connections.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let m = &self.metrics;
        MetricsSnapshot {
            connections_accepted: m.connections_accepted.load(Ordering::Relaxed),
            active_connections: m.active_connections.load(Ordering::Relaxed),
            connections_completed: m.connections_completed.load(Ordering::Relaxed),
            connections_failed: m.connections_failed.load(Ordering::Relaxed),
            chunks_processed: m.chunks_processed.load(Ordering::Relaxed),
            bytes_processed: m.bytes_processed.load(Ordering::Relaxed),
            uptime_seconds: self.uptime_seconds(),
        }
    }
}
