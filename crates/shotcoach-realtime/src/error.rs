//! Realtime error types.
//!
//! A failure for one client never unwinds its session; errors surface as
//! `error` messages to that client only.

use thiserror::Error;

pub type RealtimeResult<T> = Result<T, RealtimeError>;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("client {client_id} not found in session {session_id}")]
    ClientNotFound {
        session_id: String,
        client_id: String,
    },

    #[error("reconnection rejected after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("delivery to client {0} failed")]
    Delivery(String),
}
