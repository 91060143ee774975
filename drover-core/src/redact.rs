//! Credential redaction for anything that may end up in a log line or an
//! error message.
//!
//! Clone and push URLs carry access tokens in their userinfo section
//! (`https://<token>@host/..`, `https://x-access-token:<token>@host/..`,
//! `https://<token>:x-oauth-basic@host/..`). The whole userinfo is replaced,
//! so the redaction does not depend on which of those forms was used.

use std::borrow::Cow;

/// Text substituted for credentials
pub const PLACEHOLDER: &str = "[REDACTED]";

/// Replace the userinfo of every URL found in `text` with [`PLACEHOLDER`].
pub fn redact_urls(text: &str) -> Cow<'_, str> {
    if !text.contains("://") {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut changed = false;

    while let Some(scheme_end) = rest.find("://") {
        let authority_start = scheme_end + 3;
        out.push_str(&rest[..authority_start]);

        let tail = &rest[authority_start..];
        let authority_len = tail
            .find(|c: char| matches!(c, '/' | '?' | '#' | '\'' | '"' | '`') || c.is_whitespace())
            .unwrap_or(tail.len());
        let authority = &tail[..authority_len];

        match authority.rfind('@') {
            Some(at) => {
                out.push_str(PLACEHOLDER);
                out.push_str(&authority[at..]);
                changed = true;
            }
            None => out.push_str(authority),
        }

        rest = &tail[authority_len..];
    }
    out.push_str(rest);

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(text)
    }
}

/// Redact URL userinfo and every literal occurrence of `secret`.
pub fn redact_secret<'a>(text: &'a str, secret: Option<&str>) -> Cow<'a, str> {
    let redacted = redact_urls(text);
    match secret {
        Some(secret) if !secret.is_empty() && redacted.contains(secret) => {
            Cow::Owned(redacted.replace(secret, PLACEHOLDER))
        }
        _ => redacted,
    }
}
