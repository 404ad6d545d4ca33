//! Sorting relayer failures into rate limits and everything else.

use reqwest::StatusCode;

use crate::relayer::RelayerError;

const RATE_LIMIT_PATTERNS: &[&str] = &["429", "quota exceeded", "Too Many Requests"];
const RESET_PREFIX: &str = "resets in ";
const RESET_SUFFIX: &str = " seconds";
const OBJECT_DUMP_LIMIT: usize = 300;

pub const DIAGNOSTIC_LIMIT: usize = 500;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// `reset_seconds` is 0 when the relayer did not say when the quota resets.
    RateLimited { reset_seconds: u64 },
    Other { diagnostic: String },
}

/// Message, response body and a truncated debug dump, joined into one line.
pub fn diagnostic(err: &RelayerError) -> String {
    let mut text = err.to_string();

    if let Some(data) = err.data() {
        text.push_str(" | data: ");
        text.push_str(data);
    }

    let dump = format!("{err:?}");
    text.push_str(" | obj: ");
    text.push_str(truncate(&dump, OBJECT_DUMP_LIMIT));

    text
}

/// A status code, when present, decides alone. Text is only consulted for errors without one.
pub fn classify(err: &RelayerError) -> Failure {
    match err.status() {
        Some(StatusCode::TOO_MANY_REQUESTS) => Failure::RateLimited {
            reset_seconds: err.data().and_then(reset_seconds).unwrap_or(0),
        },
        Some(_) => Failure::Other {
            diagnostic: diagnostic(err),
        },
        None => {
            let text = message(err);
            if is_rate_limit_text(&text) {
                Failure::RateLimited {
                    reset_seconds: reset_seconds(&text).unwrap_or(0),
                }
            } else {
                Failure::Other {
                    diagnostic: diagnostic(err),
                }
            }
        }
    }
}

/// Message and body without the request URL, which embeds the owner address.
fn message(err: &RelayerError) -> String {
    let mut text = match err {
        RelayerError::Http(e) => match e.url() {
            Some(url) => e.to_string().replace(url.as_str(), ""),
            None => e.to_string(),
        },
        other => other.to_string(),
    };

    if let Some(data) = err.data() {
        text.push(' ');
        text.push_str(data);
    }

    text
}

pub fn is_rate_limit_text(text: &str) -> bool {
    RATE_LIMIT_PATTERNS
        .iter()
        .any(|pattern| text.contains(pattern))
}

/// Extracts `N` from the first "resets in N seconds" in `text`.
pub fn reset_seconds(text: &str) -> Option<u64> {
    text.match_indices(RESET_PREFIX).find_map(|(start, _)| {
        let rest = &text[start + RESET_PREFIX.len()..];
        let digits_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());

        if digits_len == 0 || !rest[digits_len..].starts_with(RESET_SUFFIX) {
            return None;
        }

        rest[..digits_len].parse().ok()
    })
}

/// Longest prefix of `text` with at most `max_chars` characters.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
