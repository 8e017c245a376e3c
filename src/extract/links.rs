use crate::model::{DownloadLink, LinkKind};
use regex::Regex;
use std::ops::Range;

/// File-hosting services whose links are often posted without a scheme.
pub const KNOWN_HOSTS: &[&str] = &[
    "mega.nz",
    "mediafire.com",
    "drive.google.com",
    "terabox.com",
    "1fichier.com",
    "zippyshare.com",
    "uploaded.net",
    "rapidgator.net",
    "nitroflare.com",
];

pub struct LinkPatterns {
    absolute: Regex,
    hosts: Vec<Regex>,
}

impl LinkPatterns {
    pub fn new() -> Result<Self, regex::Error> {
        let absolute = Regex::new(r"(?i)https?://\S+")?;
        let hosts = KNOWN_HOSTS
            .iter()
            .map(|host| Regex::new(&format!(r"(?i){}/\S+", regex::escape(host))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { absolute, hosts })
    }

    /// Absolute URLs in order of appearance, followed by bare known-host links
    /// normalized to `https://`. A bare match lying inside an absolute URL
    /// already collected is not repeated.
    pub fn find(&self, text: &str) -> Vec<DownloadLink> {
        let mut spans: Vec<Range<usize>> = Vec::new();
        let mut links = Vec::new();

        for m in self.absolute.find_iter(text) {
            spans.push(m.range());
            links.push(DownloadLink {
                url: m.as_str().to_string(),
                kind: kind_of(m.as_str()),
            });
        }

        for re in &self.hosts {
            for m in re.find_iter(text) {
                if spans.iter().any(|s| s.contains(&m.start())) {
                    continue;
                }
                links.push(DownloadLink {
                    url: format!("https://{}", m.as_str()),
                    kind: LinkKind::Hosted,
                });
            }
        }

        links
    }
}

fn kind_of(url: &str) -> LinkKind {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let hosted = KNOWN_HOSTS.iter().any(|known| {
        let known_host = known.split('/').next().unwrap_or(known);
        host == known_host || host.ends_with(&format!(".{known_host}"))
    });
    if hosted {
        LinkKind::Hosted
    } else {
        LinkKind::Direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(text: &str) -> Vec<String> {
        LinkPatterns::new()
            .unwrap()
            .find(text)
            .into_iter()
            .map(|l| l.url)
            .collect()
    }

    #[test]
    fn test_absolute_urls_in_order() {
        let links = LinkPatterns::new()
            .unwrap()
            .find("Ver: https://example.org/a\nDescarga: http://www.mediafire.com/file/x");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://example.org/a");
        assert_eq!(links[0].kind, LinkKind::Direct);
        assert_eq!(links[1].url, "http://www.mediafire.com/file/x");
        assert_eq!(links[1].kind, LinkKind::Hosted);
    }

    #[test]
    fn test_bare_host_gets_scheme() {
        assert_eq!(
            urls("Link: mega.nz/file/abc#key"),
            vec!["https://mega.nz/file/abc#key"]
        );
        assert_eq!(
            urls("drive.google.com/file/d/123/view"),
            vec!["https://drive.google.com/file/d/123/view"]
        );
    }

    #[test]
    fn test_bare_match_inside_absolute_url_not_repeated() {
        assert_eq!(urls("https://mega.nz/file/abc"), vec!["https://mega.nz/file/abc"]);
    }

    #[test]
    fn test_no_links() {
        assert!(urls("Título: Batman Begins\nAño: 2005").is_empty());
        assert!(urls("mega.nz sin ruta").is_empty());
    }
}
