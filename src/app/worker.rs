//! The task that owns the Telegram session.
//!
//! HTTP handlers never touch the session; they send a [`Command`] and await
//! the reply on a oneshot channel. Commands are served one at a time in
//! arrival order, so a search and a download never interleave on the wire.

use super::{App, SessionStatus};
use crate::backend::ChannelBackend;
use crate::error::{Error, Result};
use crate::model::{DownloadResult, ExtractedRecord};
use crate::shutdown::ShutdownController;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub enum Command {
    Search {
        query: String,
        response_tx: oneshot::Sender<Result<Vec<ExtractedRecord>>>,
    },
    Download {
        message_id: i32,
        response_tx: oneshot::Sender<Result<DownloadResult>>,
    },
    Status {
        response_tx: oneshot::Sender<SessionStatus>,
    },
}

pub type CommandTx = mpsc::UnboundedSender<Command>;
pub type CommandRx = mpsc::UnboundedReceiver<Command>;

pub fn command_channel() -> (CommandTx, CommandRx) {
    mpsc::unbounded_channel()
}

/// Cloneable client side of the worker.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: CommandTx,
}

impl WorkerHandle {
    pub fn new(tx: CommandTx) -> Self {
        Self { tx }
    }

    pub async fn search(&self, query: String) -> Result<Vec<ExtractedRecord>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(Command::Search { query, response_tx })?;
        response_rx.await.map_err(|_| Error::WorkerUnavailable)?
    }

    pub async fn download(&self, message_id: i32) -> Result<DownloadResult> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(Command::Download {
            message_id,
            response_tx,
        })?;
        response_rx.await.map_err(|_| Error::WorkerUnavailable)?
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(Command::Status { response_tx })?;
        response_rx.await.map_err(|_| Error::WorkerUnavailable)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::WorkerUnavailable)
    }
}

/// Serve commands until shutdown is triggered or every handle is dropped,
/// then close the Telegram session.
pub async fn run<B>(mut app: App<B>, mut rx: CommandRx, shutdown: ShutdownController)
where
    B: ChannelBackend + 'static,
{
    loop {
        let command = tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("Worker stopping on shutdown");
                break;
            }
            command = rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Search { query, response_tx } => {
                let result = app.search(&query).await;
                // The requester may have gone away; nothing to do then.
                let _ = response_tx.send(result);
            }
            Command::Download {
                message_id,
                response_tx,
            } => {
                let result = app.download(message_id).await;
                match &result {
                    Err(e) if e.is_not_found() => {
                        log::warn!("Download of message {} refused: {}", message_id, e)
                    }
                    Err(e) => log::error!("Download of message {} failed: {}", message_id, e),
                    Ok(r) => log::info!("Message {} available at {}", message_id, r.url),
                }
                let _ = response_tx.send(result);
            }
            Command::Status { response_tx } => {
                let _ = response_tx.send(app.status());
            }
        }
    }

    app.shutdown().await;
}

/// Spawn the worker task and return a handle to it.
pub fn spawn<B>(app: App<B>, shutdown: ShutdownController) -> (WorkerHandle, JoinHandle<()>)
where
    B: ChannelBackend + 'static,
{
    let (tx, rx) = command_channel();
    let task = tokio::spawn(run(app, rx, shutdown));
    (WorkerHandle::new(tx), task)
}
