//! Composite content keys.
//!
//! A [`ContentKey`] identifies one physical piece of attached content: the
//! hosting channel, the post that carries it, and the platform's stable
//! unique id for the file. The same key drives the cache filename, the URL
//! path segment and the signing input, so the three can never drift apart.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub channel: String,
    pub post_id: i64,
    pub unique_id: String,
}

impl ContentKey {
    pub fn new(channel: impl Into<String>, post_id: i64, unique_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            post_id,
            unique_id: unique_id.into(),
        }
    }

    /// Path segment used in generated content URLs; also the exact string
    /// the signing service signs and verifies.
    pub fn reference_path(&self) -> String {
        format!("{}/{}/{}", self.channel, self.post_id, self.unique_id)
    }

    /// Deterministic filename stem for the cached file.
    ///
    /// Components are sanitized so a hostile handle or unique id cannot
    /// traverse out of the cache directory. Channel handles are
    /// case-insensitive on the platform and get slugified; unique ids keep
    /// their case because lowercasing would collide distinct files.
    pub fn file_stem(&self) -> String {
        format!(
            "{}-{}-{}",
            slug::slugify(&self.channel),
            self.post_id,
            sanitize_component(&self.unique_id)
        )
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.channel, self.post_id, self.unique_id)
    }
}

fn sanitize_component(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if out.is_empty() {
        out.push('-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_path_joins_components() {
        let key = ContentKey::new("durov", 42, "AgADBAAD");
        assert_eq!(key.reference_path(), "durov/42/AgADBAAD");
    }

    #[test]
    fn file_stem_is_traversal_safe() {
        let key = ContentKey::new("../etc", 7, "a/b\\c");
        let stem = key.file_stem();
        assert!(!stem.contains('/'));
        assert!(!stem.contains('\\'));
        assert!(!stem.contains(".."));
    }

    #[test]
    fn file_stem_preserves_unique_id_case() {
        let lower = ContentKey::new("chan", 1, "abcd");
        let upper = ContentKey::new("chan", 1, "ABCD");
        assert_ne!(lower.file_stem(), upper.file_stem());
    }

    #[test]
    fn equal_keys_share_one_stem() {
        let a = ContentKey::new("chan", 1, "uid");
        let b = ContentKey::new("chan", 1, "uid");
        assert_eq!(a, b);
        assert_eq!(a.file_stem(), b.file_stem());
    }
}
