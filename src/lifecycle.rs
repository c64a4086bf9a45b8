//! Connection tracking, drain detection and shutdown.
//!
//! Every `/mcp` exchange registers with the [`ConnectionManager`] and holds
//! a [`ConnectionGuard`] for as long as it runs; dropping the guard removes
//! the connection. Streams additionally get a keep-alive task that ticks
//! every `sse_keep_alive` and a close signal fired on shutdown.
//!
//! Draining is entered two ways:
//!
//! - `shutdown()`, called on SIGINT/SIGTERM. Permanent.
//! - The drain monitor: no request for `drain_after` while at least one
//!   connection is open. The next check after a request arrives leaves
//!   this state again.
//!
//! While draining, new streams are refused and `/health` reports it.
//! In-flight exchanges finish.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::errors::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// A single POST request/response exchange.
    Post,
    /// A long-lived server-to-client event stream.
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Open,
    Active,
}

struct ConnectionEntry {
    kind: ConnectionKind,
    opened_at: Instant,
    state: ConnectionState,
    keep_alive: Option<JoinHandle<()>>,
    close_tx: watch::Sender<bool>,
}

struct Registry {
    connections: HashMap<u64, ConnectionEntry>,
    last_request: Instant,
    requests: u64,
    /// Request count when the inactivity drain began.
    drain_mark: Option<u64>,
    draining: bool,
    shutting_down: bool,
    monitor: Option<JoinHandle<()>>,
}

/// Snapshot returned by `GET /health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub ok: bool,
    pub draining: bool,
    pub active_connections: usize,
    /// Seconds since the manager was created.
    pub uptime: u64,
    pub started_at: DateTime<Utc>,
    pub connections: ConnectionStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// Milliseconds.
    pub sse_keep_alive_interval: u64,
    /// Seconds; 0 when there are no connections.
    pub oldest_connection: u64,
    /// Seconds; 0 when there are no connections.
    pub average_age: u64,
}

pub struct ConnectionManager {
    inner: Mutex<Registry>,
    next_id: AtomicU64,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
    drain_after: Duration,
    drain_check_interval: Duration,
    keep_alive: Duration,
}

impl ConnectionManager {
    pub fn new(config: &ServerConfig) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            inner: Mutex::new(Registry {
                connections: HashMap::new(),
                last_request: now,
                requests: 0,
                drain_mark: None,
                draining: false,
                shutting_down: false,
                monitor: None,
            }),
            next_id: AtomicU64::new(1),
            started_at: now,
            started_at_utc: Utc::now(),
            drain_after: config.drain_after(),
            drain_check_interval: config.drain_check_interval(),
            keep_alive: config.sse_keep_alive(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a connection.
    ///
    /// Streams are refused while draining; everything is refused once
    /// shutdown has begun.
    pub fn open(self: &Arc<Self>, kind: ConnectionKind) -> Result<ConnectionGuard, LifecycleError> {
        let mut reg = self.lock();
        if reg.shutting_down {
            return Err(LifecycleError::ShuttingDown);
        }
        if reg.draining && kind == ConnectionKind::Stream {
            info!("rejecting new stream during drain");
            return Err(LifecycleError::Draining);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (close_tx, close_rx) = watch::channel(false);

        let (keep_alive, ticks) = if kind == ConnectionKind::Stream {
            let (tx, rx) = mpsc::channel(1);
            (Some(spawn_keep_alive(id, self.keep_alive, tx)), Some(rx))
        } else {
            (None, None)
        };

        reg.connections.insert(
            id,
            ConnectionEntry {
                kind,
                opened_at: Instant::now(),
                state: ConnectionState::Open,
                keep_alive,
                close_tx,
            },
        );
        debug!(id, ?kind, active = reg.connections.len(), "connection opened");

        Ok(ConnectionGuard {
            manager: Arc::clone(self),
            id,
            close_rx,
            ticks,
        })
    }

    fn set_state(&self, id: u64, state: ConnectionState) {
        if let Some(entry) = self.lock().connections.get_mut(&id) {
            entry.state = state;
        }
    }

    fn close(&self, id: u64) {
        let mut reg = self.lock();
        if let Some(mut entry) = reg.connections.remove(&id) {
            if let Some(task) = entry.keep_alive.take() {
                task.abort();
            }
            info!(
                id,
                kind = ?entry.kind,
                last_state = ?entry.state,
                active = reg.connections.len(),
                "connection closed"
            );
        }
    }

    /// Note an inbound request. The drain flag is left alone until the
    /// next [`check_drain`](Self::check_drain).
    pub fn record_request(&self) {
        let mut reg = self.lock();
        reg.last_request = Instant::now();
        reg.requests += 1;
    }

    /// Leave an inactivity drain if requests arrived since it began,
    /// otherwise enter one if idle past `drain_after` with connections
    /// open. A shutdown drain is never left. Returns the draining flag.
    pub fn check_drain(&self, now: Instant) -> bool {
        let mut reg = self.lock();
        if reg.shutting_down {
            return reg.draining;
        }
        if let Some(mark) = reg.drain_mark {
            if reg.requests > mark {
                reg.draining = false;
                reg.drain_mark = None;
                info!("requests resumed, exiting drain mode");
            }
        } else if !reg.connections.is_empty()
            && now.saturating_duration_since(reg.last_request) > self.drain_after
        {
            reg.draining = true;
            reg.drain_mark = Some(reg.requests);
            info!(
                idle_ms = self.drain_after.as_millis() as u64,
                active = reg.connections.len(),
                "no requests received, assuming drain"
            );
        }
        reg.draining
    }

    pub fn is_draining(&self) -> bool {
        self.lock().draining
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    pub fn active_connections(&self) -> usize {
        self.lock().connections.len()
    }

    /// Periodically run [`check_drain`](Self::check_drain). Aborted by
    /// [`shutdown`](Self::shutdown).
    pub fn spawn_drain_monitor(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let period = self.drain_check_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.check_drain(Instant::now());
            }
        });

        let mut reg = self.lock();
        if let Some(previous) = reg.monitor.replace(handle) {
            previous.abort();
        }
    }

    /// Begin shutdown: stop the monitor and keep-alive tasks and tell every
    /// connection to close. Returns how many connections were signalled.
    pub fn shutdown(&self) -> usize {
        let mut reg = self.lock();
        reg.draining = true;
        reg.shutting_down = true;
        reg.drain_mark = None;
        if let Some(monitor) = reg.monitor.take() {
            monitor.abort();
        }

        let count = reg.connections.len();
        for (_, mut entry) in reg.connections.drain() {
            if let Some(task) = entry.keep_alive.take() {
                task.abort();
            }
            let _ = entry.close_tx.send(true);
        }
        info!(count, "closed all connections for shutdown");
        count
    }

    pub fn health(&self) -> HealthReport {
        let reg = self.lock();
        let now = Instant::now();
        let ages: Vec<u64> = reg
            .connections
            .values()
            .map(|c| now.saturating_duration_since(c.opened_at).as_millis() as u64)
            .collect();

        let oldest_ms = ages.iter().copied().max().unwrap_or(0);
        let average_ms = if ages.is_empty() {
            0
        } else {
            ages.iter().sum::<u64>() / ages.len() as u64
        };

        HealthReport {
            ok: true,
            draining: reg.draining,
            active_connections: reg.connections.len(),
            uptime: now.saturating_duration_since(self.started_at).as_secs(),
            started_at: self.started_at_utc,
            connections: ConnectionStats {
                sse_keep_alive_interval: self.keep_alive.as_millis() as u64,
                oldest_connection: round_secs(oldest_ms),
                average_age: round_secs(average_ms),
            },
        }
    }
}

fn round_secs(ms: u64) -> u64 {
    (ms + 500) / 1000
}

fn spawn_keep_alive(id: u64, period: Duration, ticks: mpsc::Sender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let opened = Instant::now();
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!(id, age_secs = opened.elapsed().as_secs(), "stream connection active");
            if ticks.send(()).await.is_err() {
                break;
            }
        }
    })
}

/// Registration of one live connection. Dropping it closes the connection.
pub struct ConnectionGuard {
    manager: Arc<ConnectionManager>,
    id: u64,
    close_rx: watch::Receiver<bool>,
    ticks: Option<mpsc::Receiver<()>>,
}

impl ConnectionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Mark a request in flight on this connection.
    pub fn activate(&self) {
        self.manager.set_state(self.id, ConnectionState::Active);
    }

    /// Keep-alive ticks for a stream. `None` for POST connections or once taken.
    pub fn take_keep_alive(&mut self) -> Option<mpsc::Receiver<()>> {
        self.ticks.take()
    }

    /// Resolves once shutdown asks this connection to close.
    pub async fn closed(&mut self) {
        while !*self.close_rx.borrow() {
            if self.close_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.close(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(drain_after_ms: u64) -> ServerConfig {
        ServerConfig {
            drain_after_ms,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_guard_registers_and_unregisters() {
        let manager = ConnectionManager::new(&config(60_000));
        let a = manager.open(ConnectionKind::Post).unwrap();
        let b = manager.open(ConnectionKind::Stream).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(manager.active_connections(), 2);
        drop(a);
        assert_eq!(manager.active_connections(), 1);
        drop(b);
        assert_eq!(manager.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_drain_needs_idle_time_and_a_connection() {
        let manager = ConnectionManager::new(&config(1_000));
        let later = Instant::now() + Duration::from_secs(5);
        assert!(!manager.check_drain(later), "no connections, no drain");

        let _conn = manager.open(ConnectionKind::Post).unwrap();
        assert!(!manager.check_drain(Instant::now()));
        assert!(manager.check_drain(later));
        assert!(manager.is_draining());
    }

    #[tokio::test]
    async fn test_draining_refuses_streams_but_not_posts() {
        let manager = ConnectionManager::new(&config(1_000));
        let _conn = manager.open(ConnectionKind::Post).unwrap();
        manager.check_drain(Instant::now() + Duration::from_secs(5));

        assert_eq!(
            manager.open(ConnectionKind::Stream).err(),
            Some(LifecycleError::Draining)
        );
        assert!(manager.open(ConnectionKind::Post).is_ok());
    }

    #[tokio::test]
    async fn test_request_exits_inactivity_drain() {
        let manager = ConnectionManager::new(&config(1_000));
        let _conn = manager.open(ConnectionKind::Post).unwrap();
        manager.check_drain(Instant::now() + Duration::from_secs(5));
        assert!(manager.is_draining());

        manager.record_request();
        assert!(manager.is_draining(), "flag holds until the next check");
        assert!(!manager.check_drain(Instant::now()));
        assert!(!manager.is_draining());
        assert!(manager.open(ConnectionKind::Stream).is_ok());
    }

    #[tokio::test]
    async fn test_idle_checks_keep_drain() {
        let manager = ConnectionManager::new(&config(1_000));
        let _conn = manager.open(ConnectionKind::Post).unwrap();
        let later = Instant::now() + Duration::from_secs(5);
        assert!(manager.check_drain(later));
        assert!(manager.check_drain(later + Duration::from_secs(5)));
        assert!(manager.health().draining);
    }

    #[tokio::test]
    async fn test_shutdown_is_permanent_and_signals_streams() {
        let manager = ConnectionManager::new(&config(60_000));
        let mut stream = manager.open(ConnectionKind::Stream).unwrap();
        assert!(stream.take_keep_alive().is_some());
        assert!(stream.take_keep_alive().is_none());

        assert_eq!(manager.shutdown(), 1);
        tokio::time::timeout(Duration::from_secs(1), stream.closed())
            .await
            .expect("close signal");

        manager.record_request();
        assert!(manager.check_drain(Instant::now()));
        assert!(manager.is_draining());
        assert!(manager.is_shutting_down());
        assert_eq!(
            manager.open(ConnectionKind::Post).err(),
            Some(LifecycleError::ShuttingDown)
        );
        assert_eq!(manager.active_connections(), 0);
        drop(stream);
        assert_eq!(manager.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_keep_alive_ticks() {
        let manager = ConnectionManager::new(&ServerConfig {
            sse_keep_alive_ms: 100,
            ..ServerConfig::default()
        });
        let mut stream = manager.open(ConnectionKind::Stream).unwrap();
        let mut ticks = stream.take_keep_alive().unwrap();
        tokio::time::timeout(Duration::from_secs(1), ticks.recv())
            .await
            .expect("tick")
            .expect("channel open");
    }

    #[tokio::test]
    async fn test_health_report() {
        let manager = ConnectionManager::new(&config(60_000));
        let empty = manager.health();
        assert!(empty.ok);
        assert_eq!(empty.active_connections, 0);
        assert_eq!(empty.connections.oldest_connection, 0);
        assert_eq!(empty.connections.sse_keep_alive_interval, 30_000);

        let _conn = manager.open(ConnectionKind::Post).unwrap();
        let report = serde_json::to_value(manager.health()).unwrap();
        assert_eq!(report["activeConnections"], 1);
        assert_eq!(report["draining"], false);
        assert!(report["startedAt"].is_string());
        assert!(report["connections"]["averageAge"].is_u64());
    }
}
