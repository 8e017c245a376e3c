pub mod server;
pub mod worker;

use crate::backend::ChannelBackend;
use crate::download::Downloader;
use crate::error::Result;
use crate::model::{DownloadResult, ExtractedRecord};
use crate::scan::Scanner;
use crate::session::Session;
use serde::Serialize;

/// Snapshot of the Telegram session, reported by `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub channel: String,
    pub connected: bool,
    pub resolved: bool,
    /// Number of times the cached channel entity was dropped.
    pub generation: u64,
}

/// Search and download over one channel session.
///
/// Owned by the worker task; every operation runs with exclusive access to
/// the session.
pub struct App<B: ChannelBackend> {
    session: Session<B>,
    scanner: Scanner,
    downloader: Downloader,
}

impl<B: ChannelBackend> App<B> {
    pub fn new(session: Session<B>, scanner: Scanner, downloader: Downloader) -> Self {
        Self {
            session,
            scanner,
            downloader,
        }
    }

    pub async fn search(&mut self, query: &str) -> Result<Vec<ExtractedRecord>> {
        self.scanner.scan(&mut self.session, query).await
    }

    pub async fn download(&mut self, message_id: i32) -> Result<DownloadResult> {
        self.downloader.download(&mut self.session, message_id).await
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            channel: self.session.channel().to_string(),
            connected: self.session.backend().is_connected(),
            resolved: self.session.is_resolved(),
            generation: self.session.generation(),
        }
    }

    pub async fn shutdown(&mut self) {
        self.session.shutdown().await;
        log::info!("Telegram session closed");
    }
}
