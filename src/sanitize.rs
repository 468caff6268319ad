//! Adversarial-markup sanitization for user-authored text.
//!
//! A fixed, ordered pipeline of independent text passes applied to any
//! comment text destined for a job's prompt or configuration. The order is a
//! contract: numeric-entity normalization runs last so an encoded pattern
//! cannot be smuggled past an earlier pass and only reappear in plain form
//! afterwards. Decoded markup and markdown syntax characters stay dropped
//! for the same reason.

use once_cell::sync::Lazy;
use regex::Regex;

type PassFn = fn(&str) -> String;

/// The sanitization pipeline. Passes run in declaration order.
#[derive(Clone)]
pub struct SanitizePipeline {
    passes: &'static [(&'static str, PassFn)],
}

const STANDARD_PASSES: &[(&str, PassFn)] = &[
    ("strip_comments", strip_comments),
    ("strip_invisible", strip_invisible),
    ("collapse_image_alt", collapse_image_alt),
    ("strip_link_titles", strip_link_titles),
    ("strip_hidden_attributes", strip_hidden_attributes),
    ("decode_numeric_entities", decode_numeric_entities),
];

impl SanitizePipeline {
    pub fn standard() -> Self {
        Self {
            passes: STANDARD_PASSES,
        }
    }

    /// Run every pass in order over `input`.
    pub fn apply(&self, input: &str) -> String {
        let mut text = input.to_string();
        for (name, pass) in self.passes {
            let before = text.len();
            text = pass(&text);
            if text.len() != before {
                tracing::trace!(pass = %name, before, after = text.len(), "sanitize pass rewrote text");
            }
        }
        text
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

static HTML_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?(?:-->|\z)").unwrap());

/// Pass 1: strip block/HTML-style comments, including unterminated ones.
fn strip_comments(input: &str) -> String {
    HTML_COMMENT_RE.replace_all(input, "").into_owned()
}

/// Pass 2: strip zero-width and other invisible control characters. Plain
/// whitespace (newline, carriage return, tab) survives.
fn strip_invisible(input: &str) -> String {
    input.chars().filter(|c| !is_invisible(*c)).collect()
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}' // zero-width space/joiners, direction marks
            | '\u{202A}'..='\u{202E}' // bidi embedding overrides
            | '\u{2060}'..='\u{2064}' // word joiner, invisible operators
            | '\u{2066}'..='\u{2069}' // bidi isolates
            | '\u{FEFF}' // byte order mark
            | '\u{00AD}' // soft hyphen
    ) || (c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}

static IMAGE_ALT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]").unwrap());

/// Pass 3: collapse markdown image alt text to empty.
fn collapse_image_alt(input: &str) -> String {
    IMAGE_ALT_RE.replace_all(input, "![]").into_owned()
}

static LINK_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[([^\]]*)\]\(\s*([^)\s]*)\s+(?:"[^"]*"|'[^']*')\s*\)"#).unwrap()
});

/// Pass 4: strip markdown link titles: `[text](url "title")` -> `[text](url)`.
fn strip_link_titles(input: &str) -> String {
    LINK_TITLE_RE.replace_all(input, "[$1]($2)").into_owned()
}

static HIDDEN_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+(?:alt|title|aria-label|placeholder|data-[\w-]*)\s*=\s*(?:"[^"]*"|'[^']*')"#)
        .unwrap()
});

/// Pass 5: strip attributes commonly used to hide instructions from any
/// embedded markup.
fn strip_hidden_attributes(input: &str) -> String {
    HIDDEN_ATTR_RE.replace_all(input, "").into_owned()
}

static DECIMAL_ENTITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#([0-9]{1,7});").unwrap());
static HEX_ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#[xX]([0-9a-fA-F]{1,6});").unwrap());

/// Pass 6 (always last): normalize numeric character references to printable
/// ASCII. Everything else is dropped, as is any character that could
/// re-introduce syntax the earlier passes removed: a decoded `!` in front of
/// a link would re-form an image, a decoded `"` would re-form a link title.
fn decode_numeric_entities(input: &str) -> String {
    let step = DECIMAL_ENTITY_RE.replace_all(input, |caps: &regex::Captures<'_>| {
        decode_codepoint(caps[1].parse::<u32>().ok())
    });
    HEX_ENTITY_RE
        .replace_all(&step, |caps: &regex::Captures<'_>| {
            decode_codepoint(u32::from_str_radix(&caps[1], 16).ok())
        })
        .into_owned()
}

fn decode_codepoint(cp: Option<u32>) -> String {
    match cp {
        Some(cp @ 0x20..=0x7E) => {
            let c = cp as u8 as char;
            if is_syntax_char(c) {
                String::new()
            } else {
                c.to_string()
            }
        }
        _ => String::new(),
    }
}

// Any character that could complete markup the earlier passes strip: HTML
// delimiters, the markdown image/link punctuation, and the quote/equals
// characters that carry titles and attributes.
fn is_syntax_char(c: char) -> bool {
    matches!(
        c,
        '<' | '>' | '&' | '!' | '[' | ']' | '(' | ')' | '"' | '\'' | '='
    )
}
