//! Protocol message handling, transport-agnostic.
//!
//! A transport layer (WebSocket or otherwise) attaches clients, forwards
//! each inbound text frame to `handle_text`, and drains the per-client
//! delivery channel. One inbound task per client keeps analysis cycles
//! sequentially ordered per session via the session's analyzer lock.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use shotcoach_models::{ClientMessage, ErrorCode, ServerMessage};

use crate::advice::DeviceClass;
use crate::error::RealtimeResult;
use crate::metrics;
use crate::session::{Session, SessionManager};

/// Transport-facing service tying sessions, analysis and advice together.
pub struct RealtimeService {
    manager: Arc<SessionManager>,
}

impl RealtimeService {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Attach a client: create the session if needed, register the client
    /// and queue the `connected` greeting. Returns the delivery channel the
    /// transport should drain.
    pub async fn attach_client(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> RealtimeResult<mpsc::Receiver<ServerMessage>> {
        let session = self.manager.create_session(session_id).await;
        let receiver = self.manager.register_client(session_id, client_id).await?;
        session
            .send_to(client_id, ServerMessage::connected(session_id))
            .await?;
        Ok(receiver)
    }

    /// Detach a client. The session itself lives on until the cleanup task
    /// reaps it after the grace period.
    pub async fn detach_client(&self, session_id: &str, client_id: &str) {
        self.manager.deregister_client(session_id, client_id).await;
    }

    /// Handle one raw inbound message from a client. All responses flow
    /// through the client delivery channels; errors for this client never
    /// affect the rest of the session.
    pub async fn handle_text(&self, session_id: &str, client_id: &str, raw: &str) {
        let Some(session) = self.manager.get_session(session_id).await else {
            warn!(session_id, client_id, "message for unknown session");
            return;
        };

        let message: ClientMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                let _ = session
                    .send_to(
                        client_id,
                        ServerMessage::error_with_details(ErrorCode::ParseError, e.to_string()),
                    )
                    .await;
                return;
            }
        };

        match message {
            ClientMessage::Frames { frames, fps } => {
                metrics::record_client_message("frames");
                self.handle_frames(&session, client_id, frames, fps).await;
            }
            ClientMessage::Heartbeat => {
                metrics::record_client_message("heartbeat");
                self.manager.heartbeat(session_id, client_id).await;
                let _ = session
                    .send_to(client_id, ServerMessage::heartbeat_ack())
                    .await;
            }
            ClientMessage::Status => {
                metrics::record_client_message("status");
                if let Some(snapshot) = self.manager.snapshot(session_id).await {
                    let _ = session
                        .send_to(client_id, ServerMessage::status(snapshot))
                        .await;
                }
            }
        }
    }

    /// Run one analysis cycle for an inbound frame buffer and fan out the
    /// results. The analyzer lock serializes cycles within the session.
    async fn handle_frames(
        &self,
        session: &Arc<Session>,
        client_id: &str,
        frames: Vec<String>,
        fps: f64,
    ) {
        if frames.is_empty() {
            let _ = session
                .send_to(client_id, ServerMessage::error(ErrorCode::InvalidFrameBuffer))
                .await;
            return;
        }

        let heartbeat_timeout = self.manager.config().heartbeat_timeout;

        let (frame_count, result) = {
            let mut analyzer = session.analyzer.lock().await;
            analyzer.analyze_encoded(&frames, fps)
        };

        let _ = session
            .send_to(
                client_id,
                ServerMessage::frame_ack(frame_count, result.analysis_latency_ms),
            )
            .await;

        let advice_list = {
            let mut engine = session.advice_engine.lock().await;
            let now_s = shotcoach_models::now_ms() as f64 / 1000.0;
            let advice = engine.generate_advice(
                &result,
                None,
                now_s,
                DeviceClass::Consumer,
                None,
                true,
            );
            session
                .record_analysis(
                    result.analysis_latency_ms,
                    engine.motion_type(),
                    result.subject_lost,
                )
                .await;
            advice
        };

        for advice in advice_list {
            session
                .fan_out(&ServerMessage::advice(advice), heartbeat_timeout)
                .await;
        }

        session
            .fan_out(&ServerMessage::telemetry(&result), heartbeat_timeout)
            .await;

        info!(
            session_id = %session.id,
            client_id,
            frame_count,
            latency_ms = result.analysis_latency_ms,
            "analysis cycle complete"
        );
    }
}
