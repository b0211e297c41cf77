//! Error types for Notegate
//!
//! This module provides the crate error hierarchy using thiserror.
//! All errors can be converted to NotegateError for unified handling.

use thiserror::Error;

/// Main error type for Notegate operations
#[derive(Error, Debug)]
pub enum NotegateError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("MCP protocol error: {0}")]
    Mcp(String),

    #[error("Tool '{name}' is already registered")]
    DuplicateTool { name: String },

    #[error("Upstream bridge error: {0}")]
    Upstream(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenient result type for Notegate operations
pub type Result<T> = std::result::Result<T, NotegateError>;

impl NotegateError {
    /// Create a validation error
    #[inline]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        NotegateError::Validation(msg.into())
    }

    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        NotegateError::Config(msg.into())
    }

    /// Create an auth error
    #[inline]
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        NotegateError::OAuth(msg.into())
    }

    /// Create a session error
    #[inline]
    pub fn session<S: Into<String>>(msg: S) -> Self {
        NotegateError::Session(msg.into())
    }

    /// Create an MCP protocol error
    #[inline]
    pub fn mcp<S: Into<String>>(msg: S) -> Self {
        NotegateError::Mcp(msg.into())
    }

    /// Create an upstream error
    #[inline]
    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        NotegateError::Upstream(msg.into())
    }

    /// Create an internal error for unexpected conditions
    #[inline]
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        NotegateError::Internal(msg.into())
    }

    /// Add context to an error
    pub fn context<C: std::fmt::Display>(self, context: C) -> Self {
        match self {
            Self::Validation(msg) => Self::Validation(format!("{}: {}", context, msg)),
            Self::Config(msg) => Self::Config(format!("{}: {}", context, msg)),
            Self::OAuth(msg) => Self::OAuth(format!("{}: {}", context, msg)),
            Self::Session(msg) => Self::Session(format!("{}: {}", context, msg)),
            Self::Mcp(msg) => Self::Mcp(format!("{}: {}", context, msg)),
            Self::Upstream(msg) => Self::Upstream(format!("{}: {}", context, msg)),
            Self::Internal(msg) => Self::Internal(format!("{}: {}", context, msg)),
            // For errors with source, preserve the source and add context at the top level
            other => Self::Internal(format!("{}: {}", context, other)),
        }
    }
}
