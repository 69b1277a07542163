//! Log redaction.
//!
//! Scrubs national identity numbers, session secrets and tokens, and bearer
//! credentials from strings before they are logged.

use regex::Regex;
use std::sync::LazyLock;

// PNOEE-30303039914, PNOLV-010101-10006
static SEMANTICS_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PNO([A-Z]{2})-(?:\d{11}|\d{6}-\d{5})").unwrap());
static NATIONAL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{11}|\d{6}-\d{5})\b").unwrap());
static SECRET_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)("?(?:session_?secret|session_?token|auth_?code)"?\s*[:=]\s*"?)[A-Za-z0-9+/_\-]+=*"#)
        .unwrap()
});
static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9\-\._~+/]+=*").unwrap());

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = SEMANTICS_ID_RE.replace_all(input, "PNO$1-[REDACTED_ID]");
    let redacted = NATIONAL_ID_RE.replace_all(&redacted, "[REDACTED_ID]");
    let redacted = SECRET_FIELD_RE.replace_all(&redacted, "${1}[REDACTED_SECRET]");
    let redacted = BEARER_RE.replace_all(&redacted, "[REDACTED_TOKEN]");
    redacted.into_owned()
}
