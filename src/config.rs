use crate::download::DownloadOptions;
use crate::error::Error;
use crate::extract::ExtractOptions;
use crate::scan::ScanOptions;
use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";
pub const DEFAULT_CHANNEL: &str = "-1001507924325";

/// Offset between Bot-API style channel ids (`-100…`) and bare MTProto ids.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// The channel searched by this deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// Numeric id, either bare or in `-100…` dialog form.
    Id(i64),
    /// Public username without the leading `@`.
    Username(String),
}

impl ChannelRef {
    /// Bare MTProto id for numeric references.
    pub fn bare_id(&self) -> Option<i64> {
        match self {
            ChannelRef::Id(id) if *id <= -(CHANNEL_ID_OFFSET + 1) => {
                id.checked_neg().map(|id| id - CHANNEL_ID_OFFSET)
            }
            ChannelRef::Id(id) if *id < 0 => id.checked_neg(),
            ChannelRef::Id(id) => Some(*id),
            ChannelRef::Username(_) => None,
        }
    }

    /// Whether a dialog with this id/username is the referenced channel.
    /// Usernames compare case-insensitively.
    pub fn matches(&self, bare_id: i64, username: Option<&str>) -> bool {
        match self {
            ChannelRef::Id(_) => self.bare_id() == Some(bare_id),
            ChannelRef::Username(u) => username.is_some_and(|name| name.eq_ignore_ascii_case(u)),
        }
    }
}

impl FromStr for ChannelRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix("https://t.me/")
            .or_else(|| s.strip_prefix("t.me/"))
            .unwrap_or(s);
        if s.is_empty() {
            return Err("channel reference is empty".to_string());
        }

        let digits = s.strip_prefix('-').unwrap_or(s);
        if digits.chars().all(|c| c.is_ascii_digit()) {
            let id: i64 = s
                .parse()
                .map_err(|e| format!("invalid channel id {s}: {e}"))?;
            if id == i64::MIN {
                return Err(format!("invalid channel id {s}: out of range"));
            }
            return Ok(ChannelRef::Id(id));
        }

        let username = s.strip_prefix('@').unwrap_or(s);
        if username.is_empty()
            || !username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(format!("invalid channel username: {s}"));
        }
        Ok(ChannelRef::Username(username.to_string()))
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Id(id) => write!(f, "{id}"),
            ChannelRef::Username(u) => write!(f, "@{u}"),
        }
    }
}

/// When the word-subset search runs after the exact-substring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FallbackPolicy {
    /// Only when the exact pass found nothing.
    #[default]
    WhenEmpty,
    /// After every exact pass, appending new matches.
    Always,
    /// Never.
    Never,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "chansearch",
    version,
    about = "Search a Telegram channel and serve its media over HTTP"
)]
pub struct Config {
    /// Telegram application id
    #[arg(long, env = "API_ID", default_value_t = 0)]
    pub api_id: i32,

    /// Telegram application hash
    #[arg(long, env = "API_HASH", default_value = "", hide_env_values = true)]
    pub api_hash: String,

    /// Pre-authorized session (base64 of a saved grammers session)
    #[arg(long, env = "SESSION_STRING", hide_env_values = true)]
    pub session_string: Option<String>,

    /// Base URL used to build download links
    #[arg(long, env = "PUBLIC_URL", default_value = DEFAULT_PUBLIC_URL)]
    pub public_url: String,

    /// Channel to search: numeric id (-100…) or @username
    #[arg(long, env = "CHANNEL", default_value = DEFAULT_CHANNEL)]
    pub channel: ChannelRef,

    /// HTTP listening port
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory downloaded media is written to and served from
    #[arg(long, env = "DOWNLOAD_DIR", default_value = "downloads")]
    pub download_dir: PathBuf,

    /// Number of recent messages scanned by the exact search
    #[arg(long, env = "SEARCH_WINDOW", default_value_t = 100)]
    pub search_window: usize,

    /// Number of recent messages scanned by the word search
    #[arg(long, env = "FALLBACK_WINDOW", default_value_t = 300)]
    pub fallback_window: usize,

    /// When to run the word search
    #[arg(long, env = "FALLBACK_POLICY", value_enum, default_value = "when-empty")]
    pub fallback_policy: FallbackPolicy,

    /// Keep spaces in downloaded file names instead of replacing them with `_`
    #[arg(long, env = "KEEP_SPACES", default_value_t = false)]
    pub keep_spaces: bool,

    /// Consider link and marker lines when deriving a title from text
    #[arg(long, env = "NO_SKIP_MARKER_LINES", default_value_t = false)]
    pub no_skip_marker_lines: bool,
}

impl Config {
    /// Check credentials and window sizes; the service cannot run without them.
    pub fn validate(&self) -> Result<(), Error> {
        if self.api_id == 0 {
            return Err(Error::Configuration("API_ID is not set".to_string()));
        }
        if self.api_hash.trim().is_empty() {
            return Err(Error::Configuration("API_HASH is not set".to_string()));
        }
        if self.session().is_none() {
            return Err(Error::Configuration("SESSION_STRING is not set".to_string()));
        }
        if self.search_window == 0 || self.fallback_window == 0 {
            return Err(Error::Configuration(
                "search windows must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn session(&self) -> Option<&str> {
        self.session_string
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn public_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            window: self.search_window,
            fallback_window: self.fallback_window,
            fallback: self.fallback_policy,
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            skip_marker_lines: !self.no_skip_marker_lines,
        }
    }

    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            dir: self.download_dir.clone(),
            public_url: self.public_url().to_string(),
            underscore_spaces: !self.keep_spaces,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["chansearch"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_channel_ref_parsing() {
        assert_eq!(
            "-1001507924325".parse::<ChannelRef>().unwrap(),
            ChannelRef::Id(-1001507924325)
        );
        assert_eq!(
            "@Peliculas_HD".parse::<ChannelRef>().unwrap(),
            ChannelRef::Username("Peliculas_HD".to_string())
        );
        assert_eq!(
            "https://t.me/peliculas".parse::<ChannelRef>().unwrap(),
            ChannelRef::Username("peliculas".to_string())
        );
        assert!("".parse::<ChannelRef>().is_err());
        assert!("@".parse::<ChannelRef>().is_err());
        assert!("bad name!".parse::<ChannelRef>().is_err());
    }

    #[test]
    fn test_bare_id() {
        assert_eq!(ChannelRef::Id(-1001507924325).bare_id(), Some(1507924325));
        assert_eq!(ChannelRef::Id(1507924325).bare_id(), Some(1507924325));
        assert_eq!(ChannelRef::Id(-4242).bare_id(), Some(4242));
        assert_eq!(ChannelRef::Username("x".to_string()).bare_id(), None);
        assert_eq!(ChannelRef::Id(i64::MIN).bare_id(), None);
    }

    #[test]
    fn test_out_of_range_channel_id_rejected() {
        assert!("-9223372036854775808".parse::<ChannelRef>().is_err());
        assert!("-99999999999999999999".parse::<ChannelRef>().is_err());
        let argv = ["chansearch", "--channel", "-9223372036854775808"];
        assert!(Config::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_matches_username_case_insensitive() {
        let channel = ChannelRef::Username("Peliculas".to_string());
        assert!(channel.matches(1, Some("PELICULAS")));
        assert!(!channel.matches(1, Some("peliculas2")));
        assert!(!channel.matches(1, None));

        let channel = ChannelRef::Id(-1001507924325);
        assert!(channel.matches(1507924325, None));
        assert!(!channel.matches(1507924326, Some("peliculas")));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let cfg = parse(&[]);
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));

        let cfg = parse(&["--api-id", "12345", "--api-hash", "abc"]);
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));

        let cfg = parse(&[
            "--api-id",
            "12345",
            "--api-hash",
            "abc",
            "--session-string",
            "AQID",
        ]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_public_url_trimmed() {
        let cfg = parse(&["--public-url", "https://example.org/"]);
        assert_eq!(cfg.public_url(), "https://example.org");
        assert_eq!(cfg.download_options().public_url, "https://example.org");
    }

    #[test]
    fn test_defaults() {
        let cfg = parse(&[]);
        assert_eq!(cfg.channel, ChannelRef::Id(-1001507924325));
        assert_eq!(cfg.port, 8080);
        let scan = cfg.scan_options();
        assert_eq!(scan.window, 100);
        assert_eq!(scan.fallback_window, 300);
        assert_eq!(scan.fallback, FallbackPolicy::WhenEmpty);
        assert!(cfg.extract_options().skip_marker_lines);
        assert!(cfg.download_options().underscore_spaces);
    }
}
