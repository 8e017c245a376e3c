//! Query matching over a bounded window of recent channel messages.

use crate::backend::ChannelBackend;
use crate::config::FallbackPolicy;
use crate::error::{Error, Result};
use crate::extract::{Extraction, Extractor};
use crate::model::{ExtractedRecord, RawMessage};
use crate::session::Session;
use futures::StreamExt;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Messages read by the exact-substring pass.
    pub window: usize,
    /// Messages read by the word-subset pass.
    pub fallback_window: usize,
    pub fallback: FallbackPolicy,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            window: 100,
            fallback_window: 300,
            fallback: FallbackPolicy::WhenEmpty,
        }
    }
}

/// Lower-cased, trimmed query; empty queries are rejected.
pub fn normalize_query(query: &str) -> Result<String> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Err(Error::InvalidQuery);
    }
    Ok(query)
}

pub struct Scanner {
    extractor: Extractor,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(extractor: Extractor, options: ScanOptions) -> Self {
        Self { extractor, options }
    }

    /// Search the channel for `query`.
    ///
    /// Only an empty query is an error. Transport failures are logged, the
    /// session is reset for the next request and an empty result is returned;
    /// a scan never yields the partial set collected before the failure.
    pub async fn scan<B: ChannelBackend>(
        &self,
        session: &mut Session<B>,
        query: &str,
    ) -> Result<Vec<ExtractedRecord>> {
        let query = normalize_query(query)?;

        match self.run(session, &query).await {
            Ok(records) => {
                log::info!(
                    "Search {:?} in channel {}: {} result(s)",
                    query,
                    session.channel(),
                    records.len()
                );
                Ok(records)
            }
            Err(e) => {
                log::error!(
                    "Search {:?} in channel {} aborted: {}",
                    query,
                    session.channel(),
                    e
                );
                session.reset().await;
                Ok(Vec::new())
            }
        }
    }

    async fn run<B: ChannelBackend>(
        &self,
        session: &mut Session<B>,
        query: &str,
    ) -> Result<Vec<ExtractedRecord>> {
        let entity = session.ensure_connection().await?;
        let mut results = Vec::new();
        let mut matched = HashSet::new();

        {
            let mut stream = session.backend_mut().messages(&entity, self.options.window);
            while let Some(item) = stream.next().await {
                let message = item.map_err(Error::Connection)?;
                if message.is_blank() {
                    continue;
                }
                let text_hit = message
                    .body()
                    .is_some_and(|t| t.to_lowercase().contains(query));
                let file_hit = message
                    .file_name()
                    .is_some_and(|n| n.to_lowercase().contains(query));
                let link_hits = message
                    .link_urls
                    .iter()
                    .filter(|url| url.to_lowercase().contains(query))
                    .count();
                let hits = usize::from(text_hit) + usize::from(file_hit) + link_hits;
                if hits > 0 {
                    matched.insert(message.id);
                    self.accept(&message, query, hits, &mut results);
                }
            }
        }

        let run_fallback = match self.options.fallback {
            FallbackPolicy::WhenEmpty => results.is_empty(),
            FallbackPolicy::Always => true,
            FallbackPolicy::Never => false,
        };
        if !run_fallback {
            return Ok(results);
        }

        log::debug!(
            "Word search for {:?} over {} messages",
            query,
            self.options.fallback_window
        );
        let words: Vec<&str> = query.split_whitespace().collect();
        let mut stream = session
            .backend_mut()
            .messages(&entity, self.options.fallback_window);
        while let Some(item) = stream.next().await {
            let message = item.map_err(Error::Connection)?;
            if message.is_blank() || matched.contains(&message.id) {
                continue;
            }
            let Some(body) = message.body() else {
                continue;
            };
            let body = body.to_lowercase();
            if words.iter().any(|w| body.contains(w)) {
                self.accept(&message, query, 1, &mut results);
            }
        }

        Ok(results)
    }

    /// Extract `message` and push the record `hits` times.
    fn accept<M>(
        &self,
        message: &RawMessage<M>,
        query: &str,
        hits: usize,
        results: &mut Vec<ExtractedRecord>,
    ) {
        match self.extractor.extract(message) {
            Ok(Extraction::Record(record)) => {
                for _ in 1..hits {
                    results.push(record.clone());
                }
                results.push(record);
            }
            Ok(Extraction::Empty) => {}
            Err(e) => log::warn!(
                "Skipping message {} for query {:?}: {}",
                message.id,
                query,
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{document, linked, text, MockBackend};
    use crate::config::ChannelRef;
    use crate::extract::ExtractOptions;

    fn scanner(fallback: FallbackPolicy) -> Scanner {
        Scanner::new(
            Extractor::new(ExtractOptions::default()).unwrap(),
            ScanOptions {
                fallback,
                ..ScanOptions::default()
            },
        )
    }

    fn session(history: Vec<crate::model::RawMessage<Vec<u8>>>) -> Session<MockBackend> {
        Session::new(MockBackend::new(history), ChannelRef::Id(-1001507924325))
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  BatMan ").unwrap(), "batman");
        assert!(matches!(normalize_query(" \t "), Err(Error::InvalidQuery)));
    }

    #[tokio::test]
    async fn test_batman_scenario() {
        let mut session = session(vec![
            text(3, "Título: Heat\nAño: 1995"),
            text(2, "Título: Batman Begins\nAño: 2005"),
        ]);
        let results = scanner(FallbackPolicy::WhenEmpty)
            .scan(&mut session, "batman")
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message_id, 2);
        assert_eq!(results[0].title.as_deref(), Some("Batman Begins"));
        assert_eq!(results[0].year.as_deref(), Some("2005"));
        assert_eq!(session.backend().calls.windows, vec![100]);
    }

    #[tokio::test]
    async fn test_empty_query_never_touches_backend() {
        let mut session = session(vec![text(1, "Batman")]);
        let err = scanner(FallbackPolicy::WhenEmpty)
            .scan(&mut session, "   ")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidQuery));
        assert_eq!(session.backend().calls.connect, 0);
        assert!(session.backend().calls.windows.is_empty());
    }

    #[tokio::test]
    async fn test_matches_file_name() {
        let mut session = session(vec![document(5, None, "Batman.Begins_2005.mp4", b"x")]);
        let results = scanner(FallbackPolicy::Never)
            .scan(&mut session, "BATMAN.begins")
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title.as_deref(), Some("Batman Begins 2005"));
    }

    #[tokio::test]
    async fn test_text_and_file_hit_not_deduplicated() {
        let mut session = session(vec![document(
            5,
            Some("Batman Begins en HD"),
            "batman.mkv",
            b"x",
        )]);
        let results = scanner(FallbackPolicy::WhenEmpty)
            .scan(&mut session, "batman")
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], results[1]);
    }

    #[tokio::test]
    async fn test_matches_hyperlink_target() {
        let mut session = session(vec![
            linked(6, "Título: Estreno de la semana", "https://mega.nz/file/Batman_Begins"),
            text(5, "Título: Heat"),
        ]);
        let results = scanner(FallbackPolicy::Never)
            .scan(&mut session, "batman")
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message_id, 6);
        assert_eq!(results[0].title.as_deref(), Some("Estreno de la semana"));
    }

    #[tokio::test]
    async fn test_text_and_link_hit_not_deduplicated() {
        let mut session = session(vec![linked(
            6,
            "Título: Batman Begins",
            "https://example.org/batman",
        )]);
        let results = scanner(FallbackPolicy::Never)
            .scan(&mut session, "batman")
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_messages_skipped() {
        let blank = crate::model::RawMessage {
            id: 9,
            text: None,
            file: None,
            link_urls: Vec::new(),
            media: Some(vec![1u8]),
        };
        let mut session = session(vec![blank, text(8, "Título: Batman")]);
        let results = scanner(FallbackPolicy::WhenEmpty)
            .scan(&mut session, "batman")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message_id, 8);
    }

    #[tokio::test]
    async fn test_word_fallback_when_primary_empty() {
        let mut history: Vec<_> = (0..150)
            .map(|i| text(1000 - i, "Título: Relleno"))
            .collect();
        history[120] = text(880, "Título: The Matrix Reloaded");
        let mut session = session(history);

        let results = scanner(FallbackPolicy::WhenEmpty)
            .scan(&mut session, "matrix revolutions")
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message_id, 880);
        assert_eq!(session.backend().calls.windows, vec![100, 300]);
    }

    #[tokio::test]
    async fn test_word_fallback_skipped_when_primary_hits() {
        let mut session = session(vec![
            text(2, "Título: Batman Begins"),
            text(1, "Título: Batman Returns"),
        ]);
        let results = scanner(FallbackPolicy::WhenEmpty)
            .scan(&mut session, "batman begins")
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(session.backend().calls.windows, vec![100]);
    }

    #[tokio::test]
    async fn test_always_policy_appends_new_matches() {
        let mut session = session(vec![
            text(2, "Título: Batman Begins"),
            text(1, "Título: Batman Returns"),
        ]);
        let results = scanner(FallbackPolicy::Always)
            .scan(&mut session, "batman begins")
            .await
            .unwrap();

        let ids: Vec<i32> = results.iter().map(|r| r.message_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_never_policy() {
        let mut session = session(vec![text(1, "Título: Batman Returns")]);
        let results = scanner(FallbackPolicy::Never)
            .scan(&mut session, "batman begins")
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(session.backend().calls.windows, vec![100]);
    }

    #[tokio::test]
    async fn test_transport_error_returns_empty_and_resets() {
        let mut backend = MockBackend::new(vec![
            text(3, "Batman 1"),
            text(2, "Batman 2"),
            text(1, "Batman 3"),
        ]);
        backend.fail_stream_after = Some(2);
        let mut session = Session::new(backend, ChannelRef::Id(-1001507924325));

        let results = scanner(FallbackPolicy::WhenEmpty)
            .scan(&mut session, "batman")
            .await
            .unwrap();

        assert!(results.is_empty());
        assert_eq!(session.backend().calls.disconnect, 1);
        assert_eq!(session.backend().calls.connect, 2);
        assert!(!session.is_resolved());
    }

    #[tokio::test]
    async fn test_connection_failure_returns_empty() {
        let mut backend = MockBackend::new(vec![text(1, "Batman")]);
        backend.fail_connect = true;
        let mut session = Session::new(backend, ChannelRef::Id(-1001507924325));

        let results = scanner(FallbackPolicy::WhenEmpty)
            .scan(&mut session, "batman")
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
