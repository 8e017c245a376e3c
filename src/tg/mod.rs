//! grammers (MTProto) implementation of [`ChannelBackend`].

use crate::backend::{ChannelBackend, MessageStream};
use crate::config::ChannelRef;
use crate::error::{BackendError, TgErrorContext};
use crate::model::{AttachedFile, RawMessage};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::StreamExt;
use grammers_client::types::{Media, Message, Peer};
use grammers_client::Client;
use grammers_mtsender::SenderPool;
use grammers_session::defs::{PeerAuth, PeerId, PeerRef};
use grammers_session::storages::TlSession;
use grammers_tl_types as tl;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// A connected Telegram client with its pool runner handle.
pub struct TgClient {
    pub client: Client,
    pool_handle: tokio::task::JoinHandle<()>,
}

impl TgClient {
    /// Start a sender pool over `session` and return its client.
    pub fn connect(session: Arc<TlSession>, api_id: i32) -> Self {
        let pool = SenderPool::new(session, api_id);
        let client = Client::new(&pool);

        // Destructure pool to get runner (updates ignored here)
        let SenderPool {
            runner, updates: _, ..
        } = pool;

        let pool_handle = tokio::spawn(async move {
            runner.run().await;
        });

        TgClient {
            client,
            pool_handle,
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.pool_handle.is_finished()
    }
}

impl Drop for TgClient {
    fn drop(&mut self) {
        self.client.disconnect();
        self.pool_handle.abort();
    }
}

pub struct GrammersBackend {
    api_id: i32,
    session: Arc<TlSession>,
    tg: Option<TgClient>,
}

impl GrammersBackend {
    /// Load a pre-authorized session from its base64 string form.
    pub fn new(api_id: i32, session_b64: &str) -> Result<Self, BackendError> {
        let bytes = STANDARD
            .decode(session_b64.trim().as_bytes())
            .map_err(|e| BackendError::Unauthorized(format!("invalid session base64: {e}")))?;
        let session = TlSession::load(&bytes)
            .map_err(|e| BackendError::Unauthorized(format!("session load failed: {e}")))?;
        Ok(Self {
            api_id,
            session: Arc::new(session),
            tg: None,
        })
    }

    fn client(&self) -> Result<&Client, BackendError> {
        self.tg
            .as_ref()
            .map(|tg| &tg.client)
            .ok_or_else(|| BackendError::Transport("not connected to Telegram".to_string()))
    }
}

#[async_trait]
impl ChannelBackend for GrammersBackend {
    type Entity = PeerRef;
    type Media = Media;

    fn is_connected(&self) -> bool {
        self.tg.as_ref().is_some_and(TgClient::is_alive)
    }

    async fn connect(&mut self) -> Result<(), BackendError> {
        self.tg = None;
        let tg = TgClient::connect(Arc::clone(&self.session), self.api_id);
        let authorized = tg.client.is_authorized().await.context_auth_check()?;
        if !authorized {
            return Err(BackendError::Unauthorized(
                "the session string is not logged in".to_string(),
            ));
        }
        self.tg = Some(tg);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.tg.take().is_some() {
            log::info!("Disconnected from Telegram");
        }
    }

    async fn resolve(&mut self, channel: &ChannelRef) -> Result<Option<PeerRef>, BackendError> {
        let client = self.client()?;
        match channel {
            ChannelRef::Username(username) => Ok(client
                .resolve_username(username)
                .await
                .context_resolve_username(username)?
                .map(|peer| PeerRef::from(&peer))),
            ChannelRef::Id(_) => {
                let Some(bare) = channel.bare_id() else {
                    return Ok(None);
                };
                // access_hash 0 only works once the session has seen the channel.
                let peer_ref = PeerRef {
                    id: PeerId::channel(bare),
                    auth: PeerAuth::default(),
                };
                let peer = client
                    .resolve_peer(peer_ref)
                    .await
                    .context_resolve_peer(bare)?;
                Ok(Some(PeerRef::from(&peer)))
            }
        }
    }

    async fn find_in_dialogs(
        &mut self,
        channel: &ChannelRef,
    ) -> Result<Option<PeerRef>, BackendError> {
        let client = self.client()?;
        let mut dialogs = client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await.context_dialogs()? {
            let peer = dialog.peer();
            let username = match peer {
                Peer::User(u) => u.username(),
                Peer::Group(g) => g.username(),
                Peer::Channel(c) => c.username(),
            };
            if channel.matches(peer.id().bare_id(), username) {
                return Ok(Some(PeerRef::from(peer)));
            }
        }
        Ok(None)
    }

    fn messages<'a>(&'a mut self, entity: &PeerRef, limit: usize) -> MessageStream<'a, Media> {
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => return futures::stream::once(async move { Err(e) }).boxed(),
        };
        let iter = client.iter_messages(entity.clone());

        futures::stream::unfold((iter, 0usize), move |(mut iter, count)| async move {
            if count >= limit {
                return None;
            }
            match iter.next().await.context_messages() {
                Ok(Some(msg)) => Some((Ok(raw_message(&msg)), (iter, count + 1))),
                Ok(None) => None,
                Err(e) => Some((Err(e), (iter, limit))),
            }
        })
        .boxed()
    }

    async fn message(
        &mut self,
        entity: &PeerRef,
        id: i32,
    ) -> Result<Option<RawMessage<Media>>, BackendError> {
        let client = self.client()?;
        let mut msgs = client
            .get_messages_by_id(entity.clone(), &[id])
            .await
            .context_fetch(id)?;
        Ok(msgs.pop().flatten().map(|msg| raw_message(&msg)))
    }

    async fn download(
        &mut self,
        message: &RawMessage<Media>,
        dest: &Path,
    ) -> Result<u64, BackendError> {
        let media = message.media.as_ref().ok_or_else(|| {
            BackendError::Transport(format!("message {} has no media", message.id))
        })?;
        let client = self.client()?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut download = client.iter_download(media);
        let mut written: u64 = 0;
        while let Some(chunk) = download.next().await.context_download(message.id)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

fn raw_message(msg: &Message) -> RawMessage<Media> {
    let text = msg.text();
    let media = msg.media();
    RawMessage {
        id: msg.id(),
        text: (!text.is_empty()).then(|| text.to_string()),
        file: media.as_ref().and_then(attached_file),
        link_urls: link_urls(msg),
        media,
    }
}

/// Hyperlink targets hidden behind the message text.
fn link_urls(msg: &Message) -> Vec<String> {
    msg.fmt_entities()
        .map(|entities| {
            entities
                .iter()
                .filter_map(|entity| match entity {
                    tl::enums::MessageEntity::TextUrl(e) => Some(e.url.clone()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn attached_file(media: &Media) -> Option<AttachedFile> {
    match media {
        Media::Document(doc) => match &doc.raw.document {
            Some(tl::enums::Document::Document(d)) => {
                let name = d.attributes.iter().find_map(|attr| match attr {
                    tl::enums::DocumentAttribute::Filename(f) => Some(f.file_name.clone()),
                    _ => None,
                });
                Some(AttachedFile {
                    name,
                    size: u64::try_from(d.size).ok(),
                    mime_type: (!d.mime_type.is_empty()).then(|| d.mime_type.clone()),
                })
            }
            _ => None,
        },
        Media::Photo(_) => Some(AttachedFile {
            name: None,
            size: None,
            mime_type: Some("image/jpeg".to_string()),
        }),
        _ => None,
    }
}
