//! The seam between the pipeline and the messaging transport.
//!
//! [`crate::tg::GrammersBackend`] is the production implementation; tests use
//! the scripted backend in [`mock`].

use crate::config::ChannelRef;
use crate::error::BackendError;
use crate::model::RawMessage;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::Path;

/// Newest-first stream over a bounded window of channel messages.
pub type MessageStream<'a, M> = BoxStream<'a, Result<RawMessage<M>, BackendError>>;

#[async_trait]
pub trait ChannelBackend: Send {
    /// Resolved channel handle, cached by the session.
    type Entity: Clone + Send + Sync;
    /// Downloadable payload carried by a message.
    type Media: Send + Sync;

    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<(), BackendError>;

    async fn disconnect(&mut self);

    /// Resolve the channel directly (by id or username).
    async fn resolve(
        &mut self,
        channel: &ChannelRef,
    ) -> Result<Option<Self::Entity>, BackendError>;

    /// Look the channel up among the account's dialogs.
    async fn find_in_dialogs(
        &mut self,
        channel: &ChannelRef,
    ) -> Result<Option<Self::Entity>, BackendError>;

    /// At most `limit` most recent messages, newest first.
    fn messages<'a>(
        &'a mut self,
        entity: &Self::Entity,
        limit: usize,
    ) -> MessageStream<'a, Self::Media>;

    async fn message(
        &mut self,
        entity: &Self::Entity,
        id: i32,
    ) -> Result<Option<RawMessage<Self::Media>>, BackendError>;

    /// Stream the message's media to `dest`, returning the bytes written.
    async fn download(
        &mut self,
        message: &RawMessage<Self::Media>,
        dest: &Path,
    ) -> Result<u64, BackendError>;
}
