//! Error taxonomy for the search and download pipeline.
//!
//! Transport failures from grammers are first wrapped as [`BackendError`] with
//! a human-readable context, then lifted into the pipeline [`Error`] that
//! callers and the HTTP layer act on.

use crate::config::ChannelRef;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a [`crate::backend::ChannelBackend`].
#[derive(Error, Debug)]
pub enum BackendError {
    /// The session is not (or no longer) authorized.
    #[error("Session is not authorized: {0}")]
    Unauthorized(String),

    /// Network or RPC failure.
    #[error("{0}")]
    Transport(String),

    /// A failed Telegram call, with what was being attempted.
    #[error("{context}: {source}")]
    Rpc {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Local file-system failure while writing media.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline errors, one variant per failure class the caller can act on.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid credentials. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transient; the next request reconnects.
    #[error("Connection failure: {0}")]
    Connection(BackendError),

    /// The channel could not be resolved to an entity.
    #[error("Could not resolve channel {channel}: {reason}")]
    EntityResolution { channel: String, reason: String },

    #[error("Search query is empty")]
    InvalidQuery,

    #[error("Message {0} not found")]
    MessageNotFound(i32),

    #[error("Message {0} has no media")]
    NoMedia(i32),

    #[error("Download of message {message_id} failed: {reason}")]
    DownloadFailed { message_id: i32, reason: String },

    /// The worker owning the Telegram session has stopped.
    #[error("Telegram worker is not running")]
    WorkerUnavailable,
}

impl Error {
    /// Caller-side errors as opposed to backend trouble.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::MessageNotFound(_) | Error::NoMedia(_) | Error::DownloadFailed { .. }
        )
    }
}

/// Extension trait to add Telegram-specific context to transport errors.
pub trait TgErrorContext<T> {
    /// Add context for authorization check.
    fn context_auth_check(self) -> std::result::Result<T, BackendError>;

    /// Add context for dialog iteration.
    fn context_dialogs(self) -> std::result::Result<T, BackendError>;

    /// Add context for resolving a username.
    fn context_resolve_username(self, username: &str) -> std::result::Result<T, BackendError>;

    /// Add context for resolving a peer by id.
    fn context_resolve_peer(self, id: i64) -> std::result::Result<T, BackendError>;

    /// Add context for iterating channel history.
    fn context_messages(self) -> std::result::Result<T, BackendError>;

    /// Add context for fetching a single message.
    fn context_fetch(self, msg_id: i32) -> std::result::Result<T, BackendError>;

    /// Add context for downloading media.
    fn context_download(self, msg_id: i32) -> std::result::Result<T, BackendError>;
}

impl<T, E> TgErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context_auth_check(self) -> std::result::Result<T, BackendError> {
        self.map_err(|e| rpc("Failed to check authorization status".to_string(), e))
    }

    fn context_dialogs(self) -> std::result::Result<T, BackendError> {
        self.map_err(|e| rpc("Failed to fetch dialogs from Telegram".to_string(), e))
    }

    fn context_resolve_username(self, username: &str) -> std::result::Result<T, BackendError> {
        self.map_err(|e| rpc(format!("Failed to resolve username @{username}"), e))
    }

    fn context_resolve_peer(self, id: i64) -> std::result::Result<T, BackendError> {
        self.map_err(|e| rpc(format!("Failed to resolve peer {id}"), e))
    }

    fn context_messages(self) -> std::result::Result<T, BackendError> {
        self.map_err(|e| rpc("Failed to fetch channel messages".to_string(), e))
    }

    fn context_fetch(self, msg_id: i32) -> std::result::Result<T, BackendError> {
        self.map_err(|e| rpc(format!("Failed to fetch message {msg_id}"), e))
    }

    fn context_download(self, msg_id: i32) -> std::result::Result<T, BackendError> {
        self.map_err(|e| rpc(format!("Failed to download media of message {msg_id}"), e))
    }
}

fn rpc<E>(context: String, source: E) -> BackendError
where
    E: std::error::Error + Send + Sync + 'static,
{
    BackendError::Rpc {
        context,
        source: Box::new(source),
    }
}

/// Lifts backend failures into pipeline errors.
pub trait BackendContext<T> {
    fn or_connection(self) -> Result<T>;

    fn or_resolution(self, channel: &ChannelRef) -> Result<T>;

    fn or_download(self, message_id: i32) -> Result<T>;
}

impl<T> BackendContext<T> for std::result::Result<T, BackendError> {
    fn or_connection(self) -> Result<T> {
        self.map_err(Error::Connection)
    }

    fn or_resolution(self, channel: &ChannelRef) -> Result<T> {
        self.map_err(|e| Error::EntityResolution {
            channel: channel.to_string(),
            reason: e.to_string(),
        })
    }

    fn or_download(self, message_id: i32) -> Result<T> {
        self.map_err(|e| Error::DownloadFailed {
            message_id,
            reason: e.to_string(),
        })
    }
}
