use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use tracing_subscriber::fmt::MakeWriter;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("static regex");
    static ref BEARER_RE: Regex = Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+").expect("static regex");
    static ref SK_KEY_RE: Regex = Regex::new(r"sk-[A-Za-z0-9_-]{8,}").expect("static regex");
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RedactionLevel {
    Strict,  // Production - secrets, emails and all conversation text
    Normal,  // Development - secrets and emails
    Minimal, // Debug - only known secret keys
}

impl Default for RedactionLevel {
    fn default() -> Self {
        match std::env::var("REDACTION_LEVEL")
            .unwrap_or_else(|_| "normal".to_string())
            .to_lowercase()
            .as_str()
        {
            "strict" => RedactionLevel::Strict,
            "minimal" => RedactionLevel::Minimal,
            _ => RedactionLevel::Normal,
        }
    }
}

fn is_secret_key(k_lower: &str) -> bool {
    k_lower.contains("key")
        || k_lower.contains("token")
        || k_lower.contains("secret")
        || k_lower.contains("password")
        || k_lower == "authorization"
        || k_lower == "cookie"
}

/// Scrubs free text: bearer tokens and API keys always, emails unless `Minimal`.
pub fn redact_text(s: &str, level: RedactionLevel) -> String {
    let s = BEARER_RE.replace_all(s, "Bearer [REDACTED]");
    let s = SK_KEY_RE.replace_all(&s, "[REDACTED-KEY]");
    if level == RedactionLevel::Minimal {
        return s.into_owned();
    }
    EMAIL_RE.replace_all(&s, "[REDACTED-EMAIL]").into_owned()
}

pub fn redact_value(v: &mut Value, level: RedactionLevel) {
    match v {
        Value::Object(map) => {
            for (k, val) in map.iter_mut() {
                let k_lower = k.to_lowercase();

                if is_secret_key(&k_lower) {
                    *val = Value::String("[REDACTED]".to_string());
                    continue;
                }

                if level == RedactionLevel::Strict
                    && (k_lower == "content" || k_lower == "message" || k_lower == "payload")
                    && val.is_string()
                {
                    *val = Value::String("[REDACTED-STRICT]".to_string());
                    continue;
                }

                redact_value(val, level);
            }
        }
        Value::Array(arr) => {
            for val in arr {
                redact_value(val, level);
            }
        }
        Value::String(s) => {
            *s = redact_text(s, level);
        }
        _ => {}
    }
}

/// Log sink wrapper that scrubs secrets and emails from every formatted line.
pub struct RedactingWriter<W: Write> {
    inner: W,
    level: RedactionLevel,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let input = String::from_utf8_lossy(buf);
        let redacted = redact_text(&input, self.level);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    level: RedactionLevel,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M, level: RedactionLevel) -> Self {
        Self { inner, level }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            level: self.level,
        }
    }
}
