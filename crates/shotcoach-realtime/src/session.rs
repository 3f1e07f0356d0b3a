//! Session management: per-session state, client fan-out, heartbeat
//! liveness, reconnection backoff and stale-session cleanup.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use shotcoach_models::{now_ms, MotionType, ServerMessage, SessionSnapshot};

use crate::advice::AdviceEngine;
use crate::analyzer::RealtimeAnalyzer;
use crate::error::{RealtimeError, RealtimeResult};
use crate::metrics;

/// Configuration for session management.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Expected client heartbeat cadence.
    pub heartbeat_interval: Duration,
    /// A client missing heartbeats for this long is stale (3 missed).
    pub heartbeat_timeout: Duration,
    /// A session idle for this long is reaped.
    pub session_timeout: Duration,
    /// Grace period before an empty session is reaped.
    pub empty_session_grace: Duration,
    /// Cadence of the background cleanup sweep.
    pub cleanup_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub initial_reconnect_delay_s: f64,
    pub max_reconnect_delay_s: f64,
    pub reconnect_backoff_multiplier: f64,
    /// Bounded per-client delivery channel size.
    pub client_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(15),
            session_timeout: Duration::from_secs(300),
            empty_session_grace: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(60),
            max_reconnect_attempts: 5,
            initial_reconnect_delay_s: 1.0,
            max_reconnect_delay_s: 30.0,
            reconnect_backoff_multiplier: 2.0,
            client_channel_capacity: 32,
        }
    }
}

impl SessionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            session_timeout: Duration::from_secs(
                std::env::var("SHOTCOACH_SESSION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.session_timeout.as_secs()),
            ),
            max_reconnect_attempts: std::env::var("SHOTCOACH_MAX_RECONNECT_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_reconnect_attempts),
            ..defaults
        }
    }
}

/// One attached client: delivery channel plus liveness/reconnect bookkeeping.
#[derive(Debug)]
struct ClientConnection {
    sender: mpsc::Sender<ServerMessage>,
    connected_at_ms: i64,
    last_heartbeat: Instant,
    reconnect_attempts: u32,
    reconnect_delay_s: f64,
}

impl ClientConnection {
    fn is_stale(&self, timeout: Duration) -> bool {
        self.last_heartbeat.elapsed() > timeout
    }
}

/// Mutable per-session analysis bookkeeping.
#[derive(Debug)]
struct SessionStats {
    motion_state: MotionType,
    subject_lost_since_ms: Option<i64>,
    total_analyses: u64,
    ema_latency_ms: f64,
    last_activity: Instant,
}

/// One realtime session: the fan-out group plus its analyzer and advice
/// engine. The analyzer/engine mutexes serialize analysis cycles, which
/// gives the per-session ordering guarantee.
pub struct Session {
    pub id: String,
    created_at_ms: i64,
    pub analyzer: Mutex<RealtimeAnalyzer>,
    pub advice_engine: Mutex<AdviceEngine>,
    stats: Mutex<SessionStats>,
    clients: RwLock<HashMap<String, ClientConnection>>,
}

impl Session {
    fn new(id: String) -> Self {
        Self {
            id,
            created_at_ms: now_ms(),
            analyzer: Mutex::new(RealtimeAnalyzer::default()),
            advice_engine: Mutex::new(AdviceEngine::default()),
            stats: Mutex::new(SessionStats {
                motion_state: MotionType::Static,
                subject_lost_since_ms: None,
                total_analyses: 0,
                ema_latency_ms: 0.0,
                last_activity: Instant::now(),
            }),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Record one completed analysis cycle (EMA latency, alpha = 0.2).
    pub async fn record_analysis(
        &self,
        latency_ms: f64,
        motion_state: MotionType,
        subject_lost: bool,
    ) {
        let mut stats = self.stats.lock().await;
        if stats.total_analyses == 0 {
            stats.ema_latency_ms = latency_ms;
        } else {
            stats.ema_latency_ms = 0.2 * latency_ms + 0.8 * stats.ema_latency_ms;
        }
        stats.total_analyses += 1;
        stats.motion_state = motion_state;
        if subject_lost {
            if stats.subject_lost_since_ms.is_none() {
                stats.subject_lost_since_ms = Some(now_ms());
            }
        } else {
            stats.subject_lost_since_ms = None;
        }
        stats.last_activity = Instant::now();
    }

    pub async fn touch(&self) {
        self.stats.lock().await.last_activity = Instant::now();
    }

    /// Telemetry snapshot for status queries.
    pub async fn snapshot(&self, heartbeat_timeout: Duration) -> SessionSnapshot {
        let stats = self.stats.lock().await;
        let clients = self.clients.read().await;
        let active_clients = clients
            .values()
            .filter(|c| !c.is_stale(heartbeat_timeout))
            .count();
        SessionSnapshot {
            session_id: self.id.clone(),
            created_at_ms: self.created_at_ms,
            motion_state: stats.motion_state,
            subject_lost_since_ms: stats.subject_lost_since_ms,
            total_analyses: stats.total_analyses,
            ema_latency_ms: stats.ema_latency_ms,
            active_clients,
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Deliver a message to every attached, live client. Individual failures
    /// are logged and do not cancel delivery to the others. Senders are
    /// collected under the read lock; the actual sends happen without it.
    pub async fn fan_out(&self, message: &ServerMessage, heartbeat_timeout: Duration) {
        let targets: Vec<(String, mpsc::Sender<ServerMessage>)> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .filter(|(_, c)| !c.is_stale(heartbeat_timeout))
                .map(|(id, c)| (id.clone(), c.sender.clone()))
                .collect()
        };

        for (client_id, sender) in targets {
            // Non-blocking first; a full channel applies backpressure.
            match sender.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(msg)) => {
                    debug!(session_id = %self.id, client_id = %client_id, "client channel full");
                    if sender.send(msg).await.is_err() {
                        metrics::record_delivery_failure();
                        warn!(session_id = %self.id, client_id = %client_id, "delivery failed");
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    metrics::record_delivery_failure();
                    warn!(session_id = %self.id, client_id = %client_id, "client channel closed");
                }
            }
        }
    }

    /// Deliver a message to a single client.
    pub async fn send_to(&self, client_id: &str, message: ServerMessage) -> RealtimeResult<()> {
        let sender = {
            let clients = self.clients.read().await;
            clients
                .get(client_id)
                .map(|c| c.sender.clone())
                .ok_or_else(|| RealtimeError::ClientNotFound {
                    session_id: self.id.clone(),
                    client_id: client_id.to_string(),
                })?
        };
        sender
            .send(message)
            .await
            .map_err(|_| RealtimeError::Delivery(client_id.to_string()))
    }
}

/// Owns all sessions. The only shared singleton in the system; per-session
/// mutations are serialized behind the session's own locks.
pub struct SessionManager {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a session, or return the existing one (idempotent).
    pub async fn create_session(&self, session_id: &str) -> Arc<Session> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(session_id) {
            return session.clone();
        }
        let session = Arc::new(Session::new(session_id.to_string()));
        sessions.insert(session_id.to_string(), session.clone());
        metrics::record_session_created();
        metrics::set_active_sessions(sessions.len());
        info!(session_id, "session created");
        session
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn delete_session(&self, session_id: &str) {
        let removed = self.sessions.write().await.remove(session_id);
        if removed.is_some() {
            info!(session_id, "session deleted");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Attach a client to a session, returning its delivery channel.
    /// Successful registration resets the client's reconnection state.
    pub async fn register_client(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> RealtimeResult<mpsc::Receiver<ServerMessage>> {
        let session = self
            .get_session(session_id)
            .await
            .ok_or_else(|| RealtimeError::SessionNotFound(session_id.to_string()))?;

        let (sender, receiver) = mpsc::channel(self.config.client_channel_capacity);
        let connection = ClientConnection {
            sender,
            connected_at_ms: now_ms(),
            last_heartbeat: Instant::now(),
            reconnect_attempts: 0,
            reconnect_delay_s: self.config.initial_reconnect_delay_s,
        };

        session
            .clients
            .write()
            .await
            .insert(client_id.to_string(), connection);
        session.touch().await;
        info!(session_id, client_id, "client registered");
        Ok(receiver)
    }

    pub async fn deregister_client(&self, session_id: &str, client_id: &str) {
        if let Some(session) = self.get_session(session_id).await {
            session.clients.write().await.remove(client_id);
            info!(session_id, client_id, "client deregistered");
        }
    }

    /// Record a client heartbeat; false when the client is unknown.
    pub async fn heartbeat(&self, session_id: &str, client_id: &str) -> bool {
        let Some(session) = self.get_session(session_id).await else {
            return false;
        };
        session.touch().await;
        let mut clients = session.clients.write().await;
        match clients.get_mut(client_id) {
            Some(client) => {
                client.last_heartbeat = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Record a reconnection attempt for a (session, client) pair.
    ///
    /// Returns the delay before the next attempt, with exponential growth
    /// capped at the maximum and +/-20% jitter. After the attempt ceiling
    /// the pair is rejected with a terminal error.
    pub async fn record_reconnect_attempt(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> RealtimeResult<f64> {
        let session = self
            .get_session(session_id)
            .await
            .ok_or_else(|| RealtimeError::SessionNotFound(session_id.to_string()))?;

        let mut clients = session.clients.write().await;
        let client = clients
            .get_mut(client_id)
            .ok_or_else(|| RealtimeError::ClientNotFound {
                session_id: session_id.to_string(),
                client_id: client_id.to_string(),
            })?;

        client.reconnect_attempts += 1;
        if client.reconnect_attempts >= self.config.max_reconnect_attempts {
            return Err(RealtimeError::ReconnectExhausted {
                attempts: client.reconnect_attempts,
            });
        }

        let next = (client.reconnect_delay_s * self.config.reconnect_backoff_multiplier)
            .min(self.config.max_reconnect_delay_s);
        let jitter = next * 0.2 * rand::rng().random_range(-1.0..=1.0);
        let delay = (next + jitter).max(0.0);
        client.reconnect_delay_s = delay;
        Ok(delay)
    }

    /// Reset reconnection state after a successful attach.
    pub async fn reset_reconnect_state(&self, session_id: &str, client_id: &str) {
        if let Some(session) = self.get_session(session_id).await {
            if let Some(client) = session.clients.write().await.get_mut(client_id) {
                client.reconnect_attempts = 0;
                client.reconnect_delay_s = self.config.initial_reconnect_delay_s;
            }
        }
    }

    /// One cleanup pass: drop stale clients, reap idle/empty sessions.
    pub async fn sweep(&self) {
        let sessions: Vec<Arc<Session>> =
            self.sessions.read().await.values().cloned().collect();

        let mut to_reap = Vec::new();
        for session in sessions {
            let mut clients = session.clients.write().await;
            let before = clients.len();
            clients.retain(|client_id, client| {
                let stale = client.is_stale(self.config.heartbeat_timeout);
                if stale {
                    info!(
                        session_id = %session.id,
                        client_id,
                        connected_at_ms = client.connected_at_ms,
                        "removing stale client"
                    );
                }
                !stale
            });
            let empty = clients.is_empty();
            drop(clients);

            let idle_for = session.stats.lock().await.last_activity.elapsed();
            let reap = if empty {
                idle_for > self.config.empty_session_grace
            } else {
                idle_for > self.config.session_timeout
            };
            if reap {
                to_reap.push(session.id.clone());
            } else if before > 0 && empty {
                debug!(session_id = %session.id, "session now empty, grace period running");
            }
        }

        if !to_reap.is_empty() {
            let mut sessions = self.sessions.write().await;
            for session_id in to_reap {
                if sessions.remove(&session_id).is_some() {
                    metrics::record_session_reaped();
                    info!(session_id = %session_id, "reaped stale session");
                }
            }
            metrics::set_active_sessions(sessions.len());
        }
    }

    /// Spawn the background cleanup task. Aborting the returned handle is
    /// the cooperative shutdown path.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.cleanup_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                manager.sweep().await;
            }
        })
    }

    /// Spawn the per-session heartbeat task, probing every attached client
    /// on the configured interval. The task ends when the session is gone.
    pub fn spawn_heartbeat_task(self: &Arc<Self>, session_id: String) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(session) = manager.get_session(&session_id).await else {
                    break;
                };
                session
                    .fan_out(&ServerMessage::heartbeat(), manager.config.heartbeat_timeout)
                    .await;
            }
        })
    }

    /// Telemetry snapshot for one session.
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let session = self.get_session(session_id).await?;
        Some(session.snapshot(self.config.heartbeat_timeout).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_session_is_idempotent() {
        let manager = SessionManager::default();
        let first = manager.create_session("s1").await;
        let second = manager.create_session("s1").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_register_and_deliver() {
        let manager = SessionManager::default();
        manager.create_session("s1").await;
        let mut receiver = manager.register_client("s1", "c1").await.unwrap();

        let session = manager.get_session("s1").await.unwrap();
        session
            .send_to("c1", ServerMessage::heartbeat_ack())
            .await
            .unwrap();
        let message = receiver.recv().await.unwrap();
        assert!(matches!(message, ServerMessage::HeartbeatAck { .. }));
    }

    #[tokio::test]
    async fn test_register_unknown_session_fails() {
        let manager = SessionManager::default();
        let result = manager.register_client("missing", "c1").await;
        assert!(matches!(result, Err(RealtimeError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_fan_out_reaches_all_live_clients() {
        let manager = SessionManager::default();
        manager.create_session("s1").await;
        let mut rx_a = manager.register_client("s1", "a").await.unwrap();
        let mut rx_b = manager.register_client("s1", "b").await.unwrap();

        let session = manager.get_session("s1").await.unwrap();
        session
            .fan_out(
                &ServerMessage::frame_ack(8, 42.0),
                manager.config().heartbeat_timeout,
            )
            .await;

        assert!(matches!(rx_a.recv().await.unwrap(), ServerMessage::FrameAck { .. }));
        assert!(matches!(rx_b.recv().await.unwrap(), ServerMessage::FrameAck { .. }));
    }

    #[tokio::test]
    async fn test_fan_out_survives_dropped_client() {
        let manager = SessionManager::default();
        manager.create_session("s1").await;
        let rx_a = manager.register_client("s1", "a").await.unwrap();
        let mut rx_b = manager.register_client("s1", "b").await.unwrap();
        drop(rx_a); // client A's channel closes

        let session = manager.get_session("s1").await.unwrap();
        session
            .fan_out(
                &ServerMessage::frame_ack(8, 42.0),
                manager.config().heartbeat_timeout,
            )
            .await;

        assert!(matches!(rx_b.recv().await.unwrap(), ServerMessage::FrameAck { .. }));
    }

    #[tokio::test]
    async fn test_reconnect_backoff_grows_and_exhausts() {
        let manager = SessionManager::default();
        manager.create_session("s1").await;
        let _rx = manager.register_client("s1", "c1").await.unwrap();

        let mut last_delay = 0.0;
        for attempt in 1..5 {
            let delay = manager.record_reconnect_attempt("s1", "c1").await.unwrap();
            // Exponential with +/-20% jitter around min(prev * 2, 30).
            assert!(delay > 0.0, "attempt {attempt} delay {delay}");
            assert!(delay <= 30.0 * 1.2);
            if attempt > 1 {
                assert!(delay > last_delay * 0.5);
            }
            last_delay = delay;
        }

        let result = manager.record_reconnect_attempt("s1", "c1").await;
        assert!(matches!(
            result,
            Err(RealtimeError::ReconnectExhausted { attempts: 5 })
        ));
    }

    #[tokio::test]
    async fn test_registration_resets_reconnect_state() {
        let manager = SessionManager::default();
        manager.create_session("s1").await;
        let _rx = manager.register_client("s1", "c1").await.unwrap();
        for _ in 0..3 {
            manager.record_reconnect_attempt("s1", "c1").await.unwrap();
        }
        manager.reset_reconnect_state("s1", "c1").await;
        // After reset the full attempt budget is available again.
        for _ in 0..4 {
            manager.record_reconnect_attempt("s1", "c1").await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_stale_clients_and_empty_sessions() {
        let config = SessionConfig {
            heartbeat_timeout: Duration::from_secs(15),
            empty_session_grace: Duration::from_secs(60),
            ..Default::default()
        };
        let manager = SessionManager::new(config);
        manager.create_session("s1").await;
        let _rx = manager.register_client("s1", "c1").await.unwrap();

        // Not yet stale.
        tokio::time::advance(Duration::from_secs(10)).await;
        manager.sweep().await;
        assert_eq!(
            manager.get_session("s1").await.unwrap().client_count().await,
            1
        );

        // Past heartbeat timeout: the client goes, the session stays for the
        // grace period.
        tokio::time::advance(Duration::from_secs(10)).await;
        manager.sweep().await;
        let session = manager.get_session("s1").await.unwrap();
        assert_eq!(session.client_count().await, 0);

        // Past the empty-session grace: the session is reaped.
        tokio::time::advance(Duration::from_secs(120)).await;
        manager.sweep().await;
        assert!(manager.get_session("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_client_alive() {
        let manager = SessionManager::default();
        manager.create_session("s1").await;
        let _rx = manager.register_client("s1", "c1").await.unwrap();
        assert!(manager.heartbeat("s1", "c1").await);
        assert!(!manager.heartbeat("s1", "unknown").await);
        assert!(!manager.heartbeat("missing", "c1").await);
    }

    #[tokio::test]
    async fn test_snapshot_tracks_analyses() {
        let manager = SessionManager::default();
        let session = manager.create_session("s1").await;
        let _rx = manager.register_client("s1", "c1").await.unwrap();

        session.record_analysis(100.0, MotionType::Pan, false).await;
        session.record_analysis(200.0, MotionType::Pan, true).await;

        let snapshot = manager.snapshot("s1").await.unwrap();
        assert_eq!(snapshot.total_analyses, 2);
        assert_eq!(snapshot.motion_state, MotionType::Pan);
        assert!(snapshot.subject_lost_since_ms.is_some());
        // EMA: 0.2 * 200 + 0.8 * 100 = 120.
        assert!((snapshot.ema_latency_ms - 120.0).abs() < 1e-9);
        assert_eq!(snapshot.active_clients, 1);
    }
}
