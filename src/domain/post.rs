//! Rendered post value and classification flags.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Immutable output of one render pass. Produced fresh on every call and
/// never mutated afterwards; `title` is guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPost {
    pub channel: String,
    pub post_id: i64,
    /// Publication time, epoch seconds.
    pub timestamp: i64,
    pub plain_text: String,
    pub html: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_group_id: Option<String>,
    pub flags: BTreeSet<PostFlag>,
}

/// Short moderation/filtering tags. The set is order-insensitive; the
/// serialized form is sorted by the `BTreeSet` container.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PostFlag {
    Fwd,
    Video,
    NoImage,
    Sticker,
    Poll,
    Stream,
    Donat,
    Advert,
    Paywall,
    Clownpoo,
    Link,
    OnlyLink,
    Mention,
    HidChannel,
    ForeignChannel,
}

impl PostFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            PostFlag::Fwd => "fwd",
            PostFlag::Video => "video",
            PostFlag::NoImage => "no_image",
            PostFlag::Sticker => "sticker",
            PostFlag::Poll => "poll",
            PostFlag::Stream => "stream",
            PostFlag::Donat => "donat",
            PostFlag::Advert => "advert",
            PostFlag::Paywall => "paywall",
            PostFlag::Clownpoo => "clownpoo",
            PostFlag::Link => "link",
            PostFlag::OnlyLink => "only_link",
            PostFlag::Mention => "mention",
            PostFlag::HidChannel => "hid_channel",
            PostFlag::ForeignChannel => "foreign_channel",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_names_match_serde_form() {
        let json = serde_json::to_string(&PostFlag::ForeignChannel).expect("serialize");
        assert_eq!(json, "\"foreign_channel\"");
        assert_eq!(PostFlag::ForeignChannel.as_str(), "foreign_channel");
    }

    #[test]
    fn flag_set_serializes_sorted() {
        let mut flags = BTreeSet::new();
        flags.insert(PostFlag::Poll);
        flags.insert(PostFlag::Fwd);
        let json = serde_json::to_string(&flags).expect("serialize");
        assert_eq!(json, "[\"fwd\",\"poll\"]");
    }
}
