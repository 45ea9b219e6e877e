//! Response directive protocol.
//!
//! Every model reply ends with a bracketed emotion word, optionally followed by
//! a costume tag: `...본문[행복][복장:수영복]`. This module extracts both and
//! produces the clean text shown to the user.
//!
//! A bracketed group is `[`, then the shortest run of characters up to `]`
//! that does not cross a line break. Groups are found left to right and never
//! overlap.
//!
//! The emotion is read from the *first* group in the text, the costume from
//! the first `[복장:...]` group anywhere. Replies must therefore keep the
//! emotion tag ahead of the costume tag and carry no other brackets before it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker that opens a costume group, without the leading `[`.
pub const COSTUME_MARKER: &str = "복장:";

/// Costume key that always resolves, even when absent from a costume table.
pub const DEFAULT_COSTUME: &str = "기본";

/// Fallback emotion for characters that do not configure one.
pub const DEFAULT_FALLBACK_EMOTION: &str = "평온";

// ── Keys ───────────────────────────────────────────────────

/// Lowercase, trimmed, non-empty emotion key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmotionKey(String);

impl EmotionKey {
    pub fn new(raw: &str) -> Option<Self> {
        normalize(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EmotionKey {
    fn default() -> Self {
        Self(DEFAULT_FALLBACK_EMOTION.to_string())
    }
}

/// Lowercase, trimmed, non-empty costume key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CostumeKey(String);

impl CostumeKey {
    pub fn new(raw: &str) -> Option<Self> {
        normalize(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_COSTUME
    }
}

impl Default for CostumeKey {
    fn default() -> Self {
        Self(DEFAULT_COSTUME.to_string())
    }
}

fn normalize(raw: &str) -> Option<String> {
    let key = raw.trim().to_lowercase();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

macro_rules! key_conversions {
    ($ty:ident, $what:literal) => {
        impl TryFrom<String> for $ty {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                $ty::new(&value).ok_or_else(|| format!("{} key must not be blank", $what))
            }
        }

        impl From<$ty> for String {
            fn from(key: $ty) -> String {
                key.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

key_conversions!(EmotionKey, "emotion");
key_conversions!(CostumeKey, "costume");

// ── Directive ──────────────────────────────────────────────

/// Presentation directive carried by one model reply. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDirective {
    pub emotion: EmotionKey,
    pub costume: CostumeKey,
}

pub fn parse_directive(
    text: &str,
    fallback_emotion: &EmotionKey,
    default_costume: &CostumeKey,
) -> ResponseDirective {
    ResponseDirective {
        emotion: extract_emotion(text, fallback_emotion),
        costume: extract_costume(text, default_costume),
    }
}

/// Emotion from the first bracketed group, or `fallback`.
pub fn extract_emotion(text: &str, fallback: &EmotionKey) -> EmotionKey {
    let Some((start, end)) = bracket_groups(text).next() else {
        return fallback.clone();
    };
    let content = &text[start + 1..end - 1];
    // Anything after a nested `[` is not part of the emotion word.
    let head = content.split('[').next().unwrap_or_default();
    if head.contains(COSTUME_MARKER) {
        return fallback.clone();
    }
    EmotionKey::new(head).unwrap_or_else(|| fallback.clone())
}

/// Key of the first `[복장:...]` group, or `default`.
pub fn extract_costume(text: &str, default: &CostumeKey) -> CostumeKey {
    let opener = format!("[{}", COSTUME_MARKER);
    let mut from = 0;
    while let Some(offset) = text[from..].find(&opener) {
        let key_start = from + offset + opener.len();
        if let Some(close) = group_close(&text[key_start..]) {
            return CostumeKey::new(&text[key_start..key_start + close])
                .unwrap_or_else(|| default.clone());
        }
        from += offset + 1;
    }
    default.clone()
}

/// Remove every bracketed group and trim. Idempotent.
pub fn strip_tags(text: &str) -> String {
    let mut clean = String::with_capacity(text.len());
    let mut last = 0;
    for (start, end) in bracket_groups(text) {
        clean.push_str(&text[last..start]);
        last = end;
    }
    clean.push_str(&text[last..]);
    clean.trim().to_string()
}

/// Byte offset of the `]` closing a group whose content starts at `rest`,
/// or `None` if a line break comes first.
fn group_close(rest: &str) -> Option<usize> {
    let pos = rest.find(|c: char| c == ']' || c == '\n')?;
    (rest.as_bytes()[pos] == b']').then_some(pos)
}

/// Byte ranges `[start, end)` of bracketed groups, brackets included.
fn bracket_groups(text: &str) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mut from = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = text[from..].find('[') {
            let open = from + offset;
            match group_close(&text[open + 1..]) {
                Some(close) => {
                    let end = open + 1 + close + 1;
                    from = end;
                    return Some((open, end));
                }
                None => from = open + 1,
            }
        }
        None
    })
}
