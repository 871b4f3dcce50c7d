//! Error types and handling for the world server.
//!
//! This module defines the error types that can occur during server operations,
//! providing clear categorization of different failure modes.

use world_sim::SessionId;

/// Enumeration of possible server errors.
///
/// Categorizes errors into network-related, configuration and internal
/// server errors to help with debugging and error handling.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// The world content or opcode table could not be built from configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors such as a stopped world runner
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures delivering frames to a single session.
///
/// Each of these ends the affected session only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("{session} outbound queue exceeded {limit} frames")]
    QueueOverflow { session: SessionId, limit: usize },

    #[error("{0} is closed")]
    Closed(SessionId),

    #[error("{0} is not connected")]
    UnknownSession(SessionId),
}
