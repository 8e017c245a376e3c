//! Values flowing through the search and download pipeline.

use serde::Serialize;

/// File descriptor attached to a channel message (documents, videos, photos).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachedFile {
    pub name: Option<String>,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
}

/// Extensions recognised at the end of an attached file name. Anything else
/// after the last dot (`Batman.Begins.2005`) is part of the name.
const KNOWN_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "webm", "mov", "wmv", "flv", "m4v", "mpg", "mpeg", "ts", "3gp",
    "mp3", "m4a", "flac", "ogg", "wav", "srt", "ass", "sub", "pdf", "epub", "zip", "rar",
    "7z", "iso", "jpg", "jpeg", "png", "gif", "webp",
];

/// Split `name` into stem and lower-cased extension when it ends in a known
/// extension.
pub fn split_extension(name: &str) -> Option<(&str, String)> {
    let (stem, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    (!stem.is_empty() && KNOWN_EXTENSIONS.contains(&ext.as_str())).then_some((stem, ext))
}

impl AttachedFile {
    /// File name with surrounding whitespace removed, if non-empty.
    pub fn name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// A message as read from the channel. `media` is the backend's own handle to
/// the downloadable payload; the pipeline only checks whether it is present.
#[derive(Debug, Clone)]
pub struct RawMessage<M = ()> {
    pub id: i32,
    pub text: Option<String>,
    pub file: Option<AttachedFile>,
    /// Targets of hyperlinks embedded in the text.
    pub link_urls: Vec<String>,
    pub media: Option<M>,
}

impl<M> RawMessage<M> {
    /// Body text, `None` when missing or blank.
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file.as_ref().and_then(AttachedFile::name)
    }

    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }

    /// True when the message carries nothing the extractor can work with.
    pub fn is_blank(&self) -> bool {
        self.body().is_none() && self.file.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Any absolute URL.
    Direct,
    /// A link to one of the known file-hosting services.
    Hosted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadLink {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: LinkKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSummary {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_label: Option<String>,
}

/// Structured metadata for one matched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedRecord {
    pub message_id: i32,
    pub text_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_links: Option<Vec<DownloadLink>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaSummary>,
}

impl ExtractedRecord {
    pub fn new(message_id: i32, text_preview: String) -> Self {
        Self {
            message_id,
            text_preview,
            title: None,
            year: None,
            quality: None,
            format: None,
            size: None,
            language: None,
            subtitle: None,
            download_links: None,
            media: None,
        }
    }
}

/// A media payload written to the download directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadResult {
    pub file_name: String,
    pub size: u64,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_extension() {
        assert_eq!(
            split_extension("Batman.Begins_2005.MP4"),
            Some(("Batman.Begins_2005", "mp4".to_string()))
        );
        assert_eq!(split_extension("Batman.Begins.2005"), None);
        assert_eq!(split_extension("readme.final"), None);
        assert_eq!(split_extension(".mkv"), None);
        assert_eq!(split_extension("Heat"), None);
    }
}
