//! Turns one matched channel message into an [`ExtractedRecord`].
//!
//! Labeled fields are read from the body first; the title and size then fall
//! back, in order, to the attached file, the first meaningful body line and
//! finally a placeholder. Extraction is pure: the same message always yields
//! the same record.

mod fields;
mod links;

use crate::model::{split_extension, ExtractedRecord, MediaSummary, RawMessage};
use fields::FieldPatterns;
use links::LinkPatterns;
use thiserror::Error;

/// Characters of body text kept in the preview.
pub const PREVIEW_CHARS: usize = 200;
/// Maximum characters of a title taken from a body line.
pub const TITLE_CHARS: usize = 60;
pub const NO_TEXT_PREVIEW: &str = "[sin texto]";

/// Lines starting with these are links or decoration, not titles.
const MARKER_PREFIXES: &[&str] = &["http", "👤", "📅", "🔗", "📥", "⬇", "👉"];

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Skip URL/marker lines and very short lines when taking a title from text.
    pub skip_marker_lines: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            skip_marker_lines: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Record(ExtractedRecord),
    /// Nothing worth returning; not an error.
    Empty,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtractError {
    #[error("invalid message id {0}")]
    InvalidMessageId(i32),
}

pub struct Extractor {
    fields: FieldPatterns,
    links: LinkPatterns,
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Result<Self, regex::Error> {
        Ok(Self {
            fields: FieldPatterns::new()?,
            links: LinkPatterns::new()?,
            options,
        })
    }

    pub fn extract<M>(&self, message: &RawMessage<M>) -> Result<Extraction, ExtractError> {
        if message.id <= 0 {
            return Err(ExtractError::InvalidMessageId(message.id));
        }
        if message.is_blank() {
            return Ok(Extraction::Empty);
        }

        let body = message.body();
        let mut record = ExtractedRecord::new(message.id, preview(body));

        if let Some(text) = body {
            self.fields.apply(text, &mut record);
            let links = self.links.find(text);
            if !links.is_empty() {
                record.download_links = Some(links);
            }
        }

        if record.title.is_none() {
            record.title = Some(self.fallback_title(message));
        }

        let file_size = message.file.as_ref().and_then(|f| f.size);
        if record.size.is_none() {
            record.size = file_size.map(size_label);
        }

        record.media = media_summary(message);

        if record.title.is_some() || record.download_links.is_some() {
            Ok(Extraction::Record(record))
        } else {
            Ok(Extraction::Empty)
        }
    }

    fn fallback_title<M>(&self, message: &RawMessage<M>) -> String {
        message
            .file_name()
            .and_then(title_from_file_name)
            .or_else(|| {
                message
                    .body()
                    .and_then(|text| self.title_from_text(text))
            })
            .unwrap_or_else(|| format!("Mensaje #{}", message.id))
    }

    fn title_from_text(&self, text: &str) -> Option<String> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .find(|line| !(self.options.skip_marker_lines && is_marker_line(line)))
            .map(|line| take_chars(line, TITLE_CHARS).trim_end().to_string())
    }
}

fn is_marker_line(line: &str) -> bool {
    line.chars().count() <= 3 || MARKER_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// `Batman.Begins_2005.mp4` → `Batman Begins 2005`.
pub fn title_from_file_name(name: &str) -> Option<String> {
    let stem = split_extension(name).map_or(name, |(stem, _)| stem);
    let title = stem
        .replace(['.', '_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

/// Byte count as megabytes with two decimals.
pub fn size_label(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

fn preview(body: Option<&str>) -> String {
    match body {
        Some(text) if text.chars().count() > PREVIEW_CHARS => {
            format!("{}...", take_chars(text, PREVIEW_CHARS))
        }
        Some(text) => text.to_string(),
        None => NO_TEXT_PREVIEW.to_string(),
    }
}

/// First `max` characters of `s`, on a char boundary.
fn take_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn media_summary<M>(message: &RawMessage<M>) -> Option<MediaSummary> {
    if !message.has_media() && message.file.is_none() {
        return None;
    }
    let file = message.file.as_ref();
    let mime_type = file.and_then(|f| f.mime_type.clone());
    let kind = match (file, mime_type.as_deref()) {
        (Some(f), Some(mime)) if f.name().is_none() && mime.starts_with("image/") => "photo",
        (Some(_), _) => "document",
        (None, _) => "media",
    };
    let size_bytes = file.and_then(|f| f.size);
    Some(MediaSummary {
        kind,
        file_name: message.file_name().map(str::to_string),
        mime_type,
        size_bytes,
        size_label: size_bytes.map(size_label),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttachedFile, LinkKind};

    fn extractor() -> Extractor {
        Extractor::new(ExtractOptions::default()).unwrap()
    }

    fn text(id: i32, body: &str) -> RawMessage {
        RawMessage {
            id,
            text: Some(body.to_string()),
            file: None,
            link_urls: Vec::new(),
            media: None,
        }
    }

    fn with_file(id: i32, body: Option<&str>, name: Option<&str>, size: u64) -> RawMessage {
        RawMessage {
            id,
            text: body.map(str::to_string),
            file: Some(AttachedFile {
                name: name.map(str::to_string),
                size: Some(size),
                mime_type: Some("video/mp4".to_string()),
            }),
            link_urls: Vec::new(),
            media: Some(()),
        }
    }

    fn record(extraction: Result<Extraction, ExtractError>) -> ExtractedRecord {
        match extraction.unwrap() {
            Extraction::Record(r) => r,
            Extraction::Empty => panic!("expected a record"),
        }
    }

    #[test]
    fn test_labeled_title_and_year() {
        let r = record(extractor().extract(&text(7, "Título: Batman Begins\nAño: 2005")));
        assert_eq!(r.message_id, 7);
        assert_eq!(r.title.as_deref(), Some("Batman Begins"));
        assert_eq!(r.year.as_deref(), Some("2005"));
        assert_eq!(r.text_preview, "Título: Batman Begins\nAño: 2005");
        assert_eq!(r.download_links, None);
        assert_eq!(r.media, None);
    }

    #[test]
    fn test_title_from_file_name() {
        let msg = with_file(3, Some("🔗 estreno"), Some("Batman.Begins_2005.mp4"), 1024);
        let r = record(extractor().extract(&msg));
        assert_eq!(r.title.as_deref(), Some("Batman Begins 2005"));
    }

    #[test]
    fn test_file_name_helper() {
        assert_eq!(
            title_from_file_name("The-Dark_Knight.2008.mkv").as_deref(),
            Some("The Dark Knight 2008")
        );
        assert_eq!(title_from_file_name("Heat").as_deref(), Some("Heat"));
        assert_eq!(title_from_file_name("__.mp4"), None);
        assert_eq!(
            title_from_file_name("Batman.Begins.2005").as_deref(),
            Some("Batman Begins 2005")
        );
    }

    #[test]
    fn test_title_from_first_meaningful_line() {
        let body = "https://t.me/canal\n👤 Admin\nok\n\nEl Padrino Parte II\nmás texto";
        let r = record(extractor().extract(&text(5, body)));
        assert_eq!(r.title.as_deref(), Some("El Padrino Parte II"));
    }

    #[test]
    fn test_title_line_truncated() {
        let long = "a".repeat(100);
        let r = record(extractor().extract(&text(5, &long)));
        assert_eq!(r.title.as_ref().map(|t| t.chars().count()), Some(TITLE_CHARS));
    }

    #[test]
    fn test_marker_lines_kept_when_rule_disabled() {
        let ex = Extractor::new(ExtractOptions {
            skip_marker_lines: false,
        })
        .unwrap();
        let r = record(ex.extract(&text(5, "🔗 Enlace\nEl Padrino")));
        assert_eq!(r.title.as_deref(), Some("🔗 Enlace"));
    }

    #[test]
    fn test_placeholder_title() {
        let r = record(extractor().extract(&text(42, "https://example.org/x")));
        assert_eq!(r.title.as_deref(), Some("Mensaje #42"));
        assert_eq!(r.download_links.as_ref().map(Vec::len), Some(1));

        let msg = with_file(43, None, None, 10);
        let r = record(extractor().extract(&msg));
        assert_eq!(r.title.as_deref(), Some("Mensaje #43"));
        assert_eq!(r.text_preview, NO_TEXT_PREVIEW);
    }

    #[test]
    fn test_size_fallback_from_file() {
        let msg = with_file(9, Some("Título: Heat"), Some("heat.mp4"), 1_572_864);
        let r = record(extractor().extract(&msg));
        assert_eq!(r.size.as_deref(), Some("1.50 MB"));
        let media = r.media.unwrap();
        assert_eq!(media.kind, "document");
        assert_eq!(media.file_name.as_deref(), Some("heat.mp4"));
        assert_eq!(media.size_bytes, Some(1_572_864));

        let msg = with_file(9, Some("Tamaño: 2 GB"), Some("heat.mp4"), 1_572_864);
        let r = record(extractor().extract(&msg));
        assert_eq!(r.size.as_deref(), Some("2 GB"));
    }

    #[test]
    fn test_preview_truncated_with_ellipsis() {
        let body = "ñ".repeat(250);
        let r = record(extractor().extract(&text(1, &body)));
        assert!(r.text_preview.ends_with("..."));
        assert_eq!(r.text_preview.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_links_collected() {
        let r = record(extractor().extract(&text(
            1,
            "Película: Alien\nmega.nz/file/abc\nhttps://example.org/alien",
        )));
        let links = r.download_links.unwrap();
        assert_eq!(links[0].url, "https://example.org/alien");
        assert_eq!(links[0].kind, LinkKind::Direct);
        assert_eq!(links[1].url, "https://mega.nz/file/abc");
        assert_eq!(links[1].kind, LinkKind::Hosted);
    }

    #[test]
    fn test_blank_message_is_empty() {
        let msg: RawMessage = RawMessage {
            id: 1,
            text: Some("   ".to_string()),
            file: None,
            link_urls: Vec::new(),
            media: Some(()),
        };
        assert_eq!(extractor().extract(&msg), Ok(Extraction::Empty));
    }

    #[test]
    fn test_invalid_id_is_error() {
        assert_eq!(
            extractor().extract(&text(0, "Título: X")),
            Err(ExtractError::InvalidMessageId(0))
        );
    }

    #[test]
    fn test_extract_is_deterministic() {
        let msg = with_file(11, Some("Calidad: HD\nmega.nz/x"), Some("Up_2009.mkv"), 5000);
        let ex = extractor();
        let first = record(ex.extract(&msg));
        let second = record(ex.extract(&msg));
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
