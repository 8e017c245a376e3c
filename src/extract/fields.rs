//! Labeled fields such as `Título: Batman Begins` or `Year - 2005`.

use crate::model::ExtractedRecord;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Year,
    Quality,
    Format,
    Size,
    Language,
    Subtitle,
}

impl Field {
    /// Label synonyms, Spanish first since that is what the channels post.
    fn labels(self) -> &'static str {
        match self {
            Field::Title => "Título|Titulo|Película|Pelicula|Movie|Title",
            Field::Year => "Año|Ano|Year",
            Field::Quality => "Calidad|Quality",
            Field::Format => "Formato|Format",
            Field::Size => "Tamaño|Tamano|Size",
            Field::Language => "Idioma|Language",
            Field::Subtitle => "Subtítulos|Subtitulos|Subtitles",
        }
    }

    fn value_pattern(self) -> &'static str {
        match self {
            Field::Year => r"([0-9]{4})\b",
            _ => r"([^\r\n]+)",
        }
    }

    fn set(self, record: &mut ExtractedRecord, value: String) {
        let slot = match self {
            Field::Title => &mut record.title,
            Field::Year => &mut record.year,
            Field::Quality => &mut record.quality,
            Field::Format => &mut record.format,
            Field::Size => &mut record.size,
            Field::Language => &mut record.language,
            Field::Subtitle => &mut record.subtitle,
        };
        *slot = Some(value);
    }
}

const FIELDS: [Field; 7] = [
    Field::Title,
    Field::Year,
    Field::Quality,
    Field::Format,
    Field::Size,
    Field::Language,
    Field::Subtitle,
];

pub struct FieldPatterns {
    patterns: Vec<(Field, Regex)>,
}

impl FieldPatterns {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = FIELDS
            .iter()
            .map(|&field| {
                let pattern = format!(
                    r"(?i)\b(?:{})[ \t]*[:\-][ \t]*{}",
                    field.labels(),
                    field.value_pattern()
                );
                Regex::new(&pattern).map(|re| (field, re))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Fill every field whose label occurs in `text`. The first occurrence
    /// with a non-blank value wins; missing fields are left untouched.
    pub fn apply(&self, text: &str, record: &mut ExtractedRecord) {
        for (field, re) in &self.patterns {
            let value = re
                .captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().trim())
                .find(|v| !v.is_empty());
            if let Some(value) = value {
                field.set(record, value.to_string());
            }
        }
    }
}
