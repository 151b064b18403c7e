use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Anti-forgery token attached to every mutating request as `X-CSRFToken`.
///
/// Scrubbed from memory on drop; `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CsrfToken(String);

impl CsrfToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Extract the token from page markup.
    ///
    /// Looks for `<meta name="csrf-token" content="…">` first, then falls back
    /// to a hidden `<input name="csrf_token" value="…">`. Empty values are
    /// treated as absent.
    pub fn from_page(html: &str) -> Option<Self> {
        static META_RE: OnceLock<Regex> = OnceLock::new();
        static INPUT_RE: OnceLock<Regex> = OnceLock::new();
        let meta = META_RE.get_or_init(|| {
            Regex::new(r#"(?is)<meta\b[^>]*\bname\s*=\s*["']csrf-token["'][^>]*>"#).unwrap()
        });
        let input = INPUT_RE.get_or_init(|| {
            Regex::new(r#"(?is)<input\b[^>]*\bname\s*=\s*["']csrf_token["'][^>]*>"#).unwrap()
        });

        meta.find_iter(html)
            .find_map(|tag| attribute(tag.as_str(), "content"))
            .or_else(|| {
                input
                    .find_iter(html)
                    .find_map(|tag| attribute(tag.as_str(), "value"))
            })
            .map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfToken(<redacted>)")
    }
}

/// Authenticated server session cookie (`Cookie` header value).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionCookie(String);

impl SessionCookie {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionCookie(<redacted>)")
    }
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"(?i)\b{}\s*=\s*["']([^"']*)["']"#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    let value = re.captures(tag)?.get(1)?.as_str().trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
