//! Connection and channel-entity lifecycle.
//!
//! A [`Session`] is created once at startup and owned by the worker task; it
//! is never shared between tasks, so the cached entity needs no locking.

use crate::backend::ChannelBackend;
use crate::config::ChannelRef;
use crate::error::{BackendContext, Error, Result};

pub struct Session<B: ChannelBackend> {
    backend: B,
    channel: ChannelRef,
    entity: Option<B::Entity>,
    /// Bumped on every invalidation.
    generation: u64,
}

impl<B: ChannelBackend> Session<B> {
    pub fn new(backend: B, channel: ChannelRef) -> Self {
        Self {
            backend,
            channel,
            entity: None,
            generation: 0,
        }
    }

    pub fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_resolved(&self) -> bool {
        self.entity.is_some()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Connect if needed and return the resolved channel entity.
    /// Cheap when the connection is live and the entity is cached.
    pub async fn ensure_connection(&mut self) -> Result<B::Entity> {
        if !self.backend.is_connected() {
            log::info!("Connecting to Telegram…");
            if let Err(e) = self.backend.connect().await {
                self.invalidate();
                return Err(e).or_connection();
            }
        }

        if let Some(entity) = &self.entity {
            return Ok(entity.clone());
        }

        let entity = self.resolve_entity().await?;
        log::info!("Resolved channel {}", self.channel);
        self.entity = Some(entity.clone());
        Ok(entity)
    }

    async fn resolve_entity(&mut self) -> Result<B::Entity> {
        match self.backend.resolve(&self.channel).await {
            Ok(Some(entity)) => return Ok(entity),
            Ok(None) => log::warn!(
                "Channel {} not found by direct lookup, searching dialogs",
                self.channel
            ),
            Err(e) => log::warn!(
                "Direct lookup of channel {} failed ({}), searching dialogs",
                self.channel,
                e
            ),
        }

        self.backend
            .find_in_dialogs(&self.channel)
            .await
            .or_resolution(&self.channel)?
            .ok_or_else(|| Error::EntityResolution {
                channel: self.channel.to_string(),
                reason: "not found among the account's dialogs".to_string(),
            })
    }

    /// Drop the cached entity so the next call re-resolves it.
    pub fn invalidate(&mut self) {
        if self.entity.take().is_some() {
            log::debug!("Invalidated cached entity for channel {}", self.channel);
        }
        self.generation += 1;
    }

    /// Best-effort disconnect/reconnect after a failed operation.
    pub async fn reset(&mut self) {
        self.invalidate();
        self.backend.disconnect().await;
        if let Err(e) = self.backend.connect().await {
            log::warn!("Reconnect to Telegram failed: {}", e);
        }
    }

    pub async fn shutdown(&mut self) {
        self.entity = None;
        self.backend.disconnect().await;
    }
}
