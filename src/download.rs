//! Materializes a message's media in the download directory.
//!
//! Files are named `<unix-seconds>_<sanitized-name><ext>`. The timestamp is
//! the only uniqueness guarantee, so two downloads of the same message within
//! one second write the same file.

use crate::backend::ChannelBackend;
use crate::error::{BackendContext, BackendError, Error, Result};
use crate::model::{split_extension, AttachedFile, DownloadResult, RawMessage};
use crate::session::Session;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// URL path under which the download directory is served.
pub const FILES_PREFIX: &str = "/files/";
pub const DEFAULT_EXTENSION: &str = ".mp4";

const ILLEGAL_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("video/mp4", ".mp4"),
    ("video/x-matroska", ".mkv"),
    ("video/x-msvideo", ".avi"),
    ("video/avi", ".avi"),
    ("video/webm", ".webm"),
    ("video/quicktime", ".mov"),
    ("application/pdf", ".pdf"),
    ("application/zip", ".zip"),
    ("application/x-rar-compressed", ".rar"),
    ("application/vnd.rar", ".rar"),
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
];

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub dir: PathBuf,
    /// Base URL without trailing slash.
    pub public_url: String,
    pub underscore_spaces: bool,
}

pub struct Downloader {
    options: DownloadOptions,
}

impl Downloader {
    pub fn new(options: DownloadOptions) -> Self {
        Self { options }
    }

    pub fn dir(&self) -> &Path {
        &self.options.dir
    }

    pub async fn download<B: ChannelBackend>(
        &self,
        session: &mut Session<B>,
        message_id: i32,
    ) -> Result<DownloadResult> {
        let entity = session.ensure_connection().await?;

        let message = match session.backend_mut().message(&entity, message_id).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                log::warn!(
                    "Message {} not found in channel {}",
                    message_id,
                    session.channel()
                );
                return Err(Error::MessageNotFound(message_id));
            }
            Err(e) => {
                log::error!(
                    "Fetching message {} from channel {} failed: {}",
                    message_id,
                    session.channel(),
                    e
                );
                session.invalidate();
                return Err(e).or_download(message_id);
            }
        };

        if !message.has_media() {
            return Err(Error::NoMedia(message_id));
        }

        let file_name = file_name_for(
            &message,
            Utc::now().timestamp(),
            self.options.underscore_spaces,
        );
        let path = self.options.dir.join(&file_name);
        tokio::fs::create_dir_all(&self.options.dir)
            .await
            .map_err(BackendError::from)
            .or_download(message_id)?;

        log::info!("Downloading message {} to {}", message_id, path.display());
        if let Err(e) = session.backend_mut().download(&message, &path).await {
            log::error!(
                "Download of message {} from channel {} failed: {}",
                message_id,
                session.channel(),
                e
            );
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                log::debug!("No partial file to remove at {}: {}", path.display(), rm);
            }
            session.invalidate();
            return Err(e).or_download(message_id);
        }

        let size = tokio::fs::metadata(&path)
            .await
            .map(|m| m.len())
            .map_err(BackendError::from)
            .or_download(message_id)?;

        Ok(DownloadResult {
            url: format!("{}{}{}", self.options.public_url, FILES_PREFIX, file_name),
            file_name,
            size,
        })
    }
}

/// Remove characters file systems reject; optionally turn spaces into `_`.
pub fn sanitize(name: &str, underscore_spaces: bool) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    if underscore_spaces {
        cleaned.replace(' ', "_")
    } else {
        cleaned.to_string()
    }
}

/// Known extension of the file name, else one mapped from the MIME type,
/// else [`DEFAULT_EXTENSION`]. Always starts with a dot.
pub fn extension_for(file: Option<&AttachedFile>) -> String {
    let from_name = file
        .and_then(AttachedFile::name)
        .and_then(split_extension)
        .map(|(_, ext)| format!(".{ext}"));
    if let Some(ext) = from_name {
        return ext;
    }

    file.and_then(|f| f.mime_type.as_deref())
        .and_then(|mime| {
            let mime = mime.to_ascii_lowercase();
            MIME_EXTENSIONS
                .iter()
                .find(|(m, _)| *m == mime)
                .map(|(_, ext)| ext.to_string())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// `<timestamp>_<sanitized base><ext>`, without repeating an extension the
/// base already ends with.
pub fn file_name_for<M>(
    message: &RawMessage<M>,
    timestamp: i64,
    underscore_spaces: bool,
) -> String {
    let fallback = format!("media_{}", message.id);
    let base = message
        .file_name()
        .map(|name| sanitize(name, underscore_spaces))
        .filter(|name| !name.is_empty())
        .unwrap_or(fallback);
    let ext = extension_for(message.file.as_ref());

    let mut name = format!("{timestamp}_{base}");
    if !name.to_lowercase().ends_with(&ext) {
        name.push_str(&ext);
    }
    name
}
