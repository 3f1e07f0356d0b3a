//! Message envelopes for the realtime bidirectional stream.
//!
//! Transport framing (WebSocket upgrade, auth, rate limiting) lives outside
//! this workspace; these types define the JSON protocol only.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::realtime::{now_ms, AdvicePayload, RealtimeAnalysisResult, SessionSnapshot};

/// Error codes delivered to realtime clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CameraAccessDenied,
    AnalysisTimeout,
    ConnectionLost,
    SessionExpired,
    ResourceExhausted,
    ParseError,
    InvalidFrameBuffer,
}

impl ErrorCode {
    /// Localized user-facing text for this code.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::CameraAccessDenied => "无法访问摄像头，请检查权限设置",
            ErrorCode::AnalysisTimeout => "分析超时，正在切换到轻量模式",
            ErrorCode::ConnectionLost => "连接已断开，正在重连...",
            ErrorCode::SessionExpired => "会话已过期，请重新扫码",
            ErrorCode::ResourceExhausted => "设备资源不足，建议关闭其他应用",
            ErrorCode::ParseError => "消息解析失败",
            ErrorCode::InvalidFrameBuffer => "帧缓冲区无效",
        }
    }

    /// Whether the client should attempt to reconnect after this error.
    pub fn recoverable(&self) -> bool {
        !matches!(self, ErrorCode::SessionExpired)
    }
}

/// Messages sent from a mobile client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Submit a buffer of base64-encoded JPEG frames.
    Frames {
        frames: Vec<String>,
        #[serde(default = "default_fps")]
        fps: f64,
    },
    /// Liveness signal, expected every 5 seconds.
    Heartbeat,
    /// Request a session telemetry snapshot.
    Status,
}

fn default_fps() -> f64 {
    30.0
}

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when a client attaches to a session.
    Connected {
        session_id: String,
        timestamp: i64,
    },

    /// Prioritized shooting advice.
    Advice {
        #[serde(flatten)]
        payload: AdvicePayload,
    },

    /// Per-cycle indicator telemetry.
    Telemetry {
        avg_speed_px_frame: f64,
        speed_variance: f64,
        motion_smoothness: f64,
        primary_direction_deg: f64,
        subject_occupancy: f64,
        confidence: f64,
        timestamp: i64,
    },

    /// Acknowledgment of a received frame buffer.
    FrameAck {
        frame_count: usize,
        analysis_latency_ms: f64,
        timestamp: i64,
    },

    /// Server-initiated liveness probe.
    Heartbeat { timestamp: i64 },

    /// Reply to a client heartbeat.
    HeartbeatAck { timestamp: i64 },

    /// Session telemetry snapshot, in reply to a status request.
    Status {
        #[serde(flatten)]
        snapshot: SessionSnapshot,
        timestamp: i64,
    },

    /// Error delivered to one client; `recoverable` tells it whether to reconnect.
    Error {
        code: ErrorCode,
        message: String,
        recoverable: bool,
        timestamp: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl ServerMessage {
    pub fn connected(session_id: impl Into<String>) -> Self {
        ServerMessage::Connected {
            session_id: session_id.into(),
            timestamp: now_ms(),
        }
    }

    pub fn advice(payload: AdvicePayload) -> Self {
        ServerMessage::Advice { payload }
    }

    pub fn telemetry(result: &RealtimeAnalysisResult) -> Self {
        ServerMessage::Telemetry {
            avg_speed_px_frame: result.avg_speed_px_frame,
            speed_variance: result.speed_variance,
            motion_smoothness: result.motion_smoothness,
            primary_direction_deg: result.primary_direction_deg,
            subject_occupancy: result.subject_occupancy,
            confidence: result.confidence,
            timestamp: now_ms(),
        }
    }

    pub fn frame_ack(frame_count: usize, analysis_latency_ms: f64) -> Self {
        ServerMessage::FrameAck {
            frame_count,
            analysis_latency_ms,
            timestamp: now_ms(),
        }
    }

    pub fn heartbeat() -> Self {
        ServerMessage::Heartbeat { timestamp: now_ms() }
    }

    pub fn heartbeat_ack() -> Self {
        ServerMessage::HeartbeatAck { timestamp: now_ms() }
    }

    pub fn status(snapshot: SessionSnapshot) -> Self {
        ServerMessage::Status {
            snapshot,
            timestamp: now_ms(),
        }
    }

    pub fn error(code: ErrorCode) -> Self {
        ServerMessage::Error {
            code,
            message: code.message().to_string(),
            recoverable: code.recoverable(),
            timestamp: now_ms(),
            details: None,
        }
    }

    pub fn error_with_details(code: ErrorCode, details: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: code.message().to_string(),
            recoverable: code.recoverable(),
            timestamp: now_ms(),
            details: Some(details.into()),
        }
    }
}
