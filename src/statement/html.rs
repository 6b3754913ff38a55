use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use regex::{Captures, Regex};

use crate::print_warning;

static RE_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)charset\s*=\s*["']?([\w:.-]+)"#).expect("Failed to create regex pattern for charset")
});

static RE_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z][a-zA-Z0-9]*);").expect("Failed to create regex pattern for entity")
});

/// How many bytes from the start of the document are searched for the charset declaration.
const HEADER_LENGTH: usize = 1024;

const NON_BREAKING_SPACE: char = '\u{a0}';

static NAMED_ENTITIES: [(&str, char); 17] = [
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", NON_BREAKING_SPACE),
    ("shy", '\u{ad}'),
    ("auml", 'ä'),
    ("ouml", 'ö'),
    ("uuml", 'ü'),
    ("Auml", 'Ä'),
    ("Ouml", 'Ö'),
    ("Uuml", 'Ü'),
    ("szlig", 'ß'),
    ("euro", '€'),
    ("sect", '§'),
    ("eacute", 'é'),
];

/// Read an HTML document and decode it to UTF-8 using the declared charset.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_document(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read document: {}", path.display()))?;
    Ok(decode_document(&bytes))
}

/// Decode raw document bytes. Documents without a charset declaration are treated as UTF-8.
#[must_use]
pub fn decode_document(bytes: &[u8]) -> String {
    let header = String::from_utf8_lossy(&bytes[..bytes.len().min(HEADER_LENGTH)]);
    let encoding = RE_CHARSET
        .captures(&header)
        .and_then(|caps| caps.get(1))
        .and_then(|label| Encoding::for_label(label.as_str().as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        print_warning!("Warning: Decoding errors occurred ({})", encoding.name());
    }
    text.into_owned()
}

/// Replace HTML character references with the characters they stand for.
/// Unknown named references are left as they are.
///
/// ```rust
/// use kontoauszug_tools::statement::unescape_html;
///
/// assert_eq!(unescape_html("M&#252;ller &amp; S&ouml;hne"), "Müller & Söhne");
/// assert_eq!(unescape_html("&unknown;"), "&unknown;");
/// ```
#[must_use]
pub fn unescape_html(text: &str) -> String {
    RE_ENTITY
        .replace_all(text, |caps: &Captures| {
            decode_entity(&caps[1]).map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

/// Unescape text and turn non-breaking spaces into regular spaces.
#[must_use]
pub fn html_to_text(text: &str) -> String {
    unescape_html(text).replace(NON_BREAKING_SPACE, " ")
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(number) = entity.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        char::from_u32(code)
    } else {
        NAMED_ENTITIES
            .iter()
            .find(|(name, _)| *name == entity)
            .map(|(_, c)| *c)
    }
}
