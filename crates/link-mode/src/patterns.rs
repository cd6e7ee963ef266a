//! URL patterns - detection regex, punctuation trimming and `file://` handling

use std::ops::Range;

use log::warn;
use regex::Regex;
use url::Url;

use crate::error::Result;

pub const URL_REGEX: &str = r#"(ipfs:|ipns:|magnet:|mailto:|gemini://|gopher://|https://|http://|news:|file://|git://|ssh:|ftp://)[^\u{0000}-\u{001F}\u{007F}-\u{009F}<>"\s{-}\^⟨⟩`']+"#;

/// Compiled auto-detection pattern.
#[derive(Clone, Debug)]
pub struct UrlPatterns {
    url_regex: Regex,
    trim_punctuation: bool,
}

impl UrlPatterns {
    pub fn new(pattern: &str, trim_punctuation: bool) -> Result<Self> {
        Ok(Self {
            url_regex: Regex::new(pattern)?,
            trim_punctuation,
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(URL_REGEX, true)
    }

    pub fn as_str(&self) -> &str {
        self.url_regex.as_str()
    }

    /// Byte ranges of the leftmost, non-overlapping matches in `text`.
    ///
    /// Each search resumes where the previous match ended. Empty matches,
    /// and matches trimmed down to nothing, are skipped.
    pub fn find_matches<'a>(&'a self, text: &'a str) -> impl Iterator<Item = Range<usize>> + 'a {
        self.url_regex.find_iter(text).filter_map(move |m| {
            let matched = if self.trim_punctuation {
                trim_url_punctuation(m.as_str())
            } else {
                m.as_str()
            };
            (!matched.is_empty()).then(|| m.start()..m.start() + matched.len())
        })
    }
}

/// Strip trailing characters that are almost never part of a URL.
///
/// Closing parentheses are only removed while they outnumber opening ones,
/// so `https://example.com/path(test)` survives intact.
pub fn trim_url_punctuation(url: &str) -> &str {
    let (open_parens, mut close_parens) = url.chars().fold((0, 0), |(opens, closes), c| match c {
        '(' => (opens + 1, closes),
        ')' => (opens, closes + 1),
        _ => (opens, closes),
    });

    let mut trimmed = url;
    while let Some(last_char) = trimmed.chars().last() {
        let should_remove = match last_char {
            '.' | ',' | ':' | ';' => true,
            '(' => true,
            ')' if close_parens > open_parens => {
                close_parens -= 1;
                true
            }
            _ => false,
        };

        if !should_remove {
            break;
        }
        trimmed = &trimmed[..trimmed.len() - last_char.len_utf8()];
    }

    trimmed
}

/// The local path behind a `file://` URI that points at this machine.
///
/// Returns `None` for other schemes, remote hosts and unparsable text, in
/// which case the caller keeps the URI as is.
pub fn local_file_path(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != "file" || !hostname_is_localhost(url.host_str()) {
        return None;
    }

    match urlencoding::decode(url.path()) {
        Ok(path) => Some(path.into_owned()),
        Err(err) => {
            warn!("{uri}: failed to decode file path: {err}");
            None
        }
    }
}

pub fn hostname_is_localhost(host: Option<&str>) -> bool {
    match host {
        None | Some("") | Some("localhost") => true,
        Some(host) => local_hostname().is_some_and(|name| name == host),
    }
}

#[cfg(unix)]
pub fn local_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if ret != 0 {
        return None;
    }

    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..len].to_vec()).ok()
}

#[cfg(not(unix))]
pub fn local_hostname() -> Option<String> {
    None
}
