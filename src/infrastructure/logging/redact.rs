//! Secret masking for provider error text.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

struct Patterns {
    google_key: Regex,
    openai_key: Regex,
    bearer: Regex,
    key_param: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                google_key: Regex::new(r"AIza[0-9A-Za-z_\-]{20,}").ok()?,
                openai_key: Regex::new(r"\b(?:sk|gsk)-[A-Za-z0-9_\-]{16,}").ok()?,
                bearer: Regex::new(r"(?i)bearer\s+[A-Za-z0-9_\-\.=]+").ok()?,
                key_param: Regex::new(r#"(?i)\b(api[_-]?key|key|token)(["']?\s*[:=]\s*["']?)[A-Za-z0-9_\-\.]{12,}"#)
                    .ok()?,
            })
        })
        .as_ref()
}

/// Mask API keys and bearer tokens before text reaches a log line or an error.
pub fn redact_secrets(text: &str) -> String {
    let Some(p) = patterns() else {
        return text.to_string();
    };
    let out: Cow<'_, str> = p.google_key.replace_all(text, "[REDACTED]");
    let out = p.openai_key.replace_all(&out, "[REDACTED]").into_owned();
    let out = p.bearer.replace_all(&out, "Bearer [REDACTED]").into_owned();
    p.key_param.replace_all(&out, "${1}${2}[REDACTED]").into_owned()
}
