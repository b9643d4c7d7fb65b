//! Classification flag extraction.
//!
//! Flags are an order-insensitive set computed from message attributes for
//! moderation and feed-filtering UIs. Keyword sets, the mockery-reaction
//! policy and the platform domain are configuration data, not literals here.

use std::collections::BTreeSet;

use url::Url;

use crate::domain::message::{Message, MessageContent};
use crate::domain::post::PostFlag;

use super::RenderPolicy;
use super::html::find_urls;

pub(super) fn extract_flags(message: &Message, policy: &RenderPolicy) -> BTreeSet<PostFlag> {
    let mut flags = BTreeSet::new();

    if matches!(message.content, MessageContent::Service(_)) {
        return flags;
    }

    if message.forward.is_some() {
        flags.insert(PostFlag::Fwd);
    }
    if matches!(message.content, MessageContent::Sticker(_)) {
        flags.insert(PostFlag::Sticker);
    }
    if matches!(message.content, MessageContent::Poll(_)) {
        flags.insert(PostFlag::Poll);
    }
    if matches!(message.content, MessageContent::Video(_))
        && message.text.chars().count() < policy.video_caption_max
    {
        flags.insert(PostFlag::Video);
    }
    if !message.content.is_visual() {
        flags.insert(PostFlag::NoImage);
    }

    let lower = message.text.to_lowercase();
    for (keywords, flag) in [
        (&policy.keywords.stream, PostFlag::Stream),
        (&policy.keywords.donat, PostFlag::Donat),
        (&policy.keywords.advert, PostFlag::Advert),
        (&policy.keywords.paywall, PostFlag::Paywall),
    ] {
        if keywords
            .iter()
            .any(|keyword| lower.contains(keyword.to_lowercase().as_str()))
        {
            flags.insert(flag);
        }
    }

    if message.reactions.iter().any(|reaction| {
        reaction.count >= policy.mockery_min_count
            && policy.mockery_emoji.iter().any(|e| e == &reaction.emoji)
    }) {
        flags.insert(PostFlag::Clownpoo);
    }

    if has_mention(&message.text) {
        flags.insert(PostFlag::Mention);
    }

    let trimmed = message.text.trim();
    let url_ranges = find_urls(trimmed);
    let urls: Vec<&str> = url_ranges.iter().map(|r| &trimmed[r.clone()]).collect();

    if trimmed.is_empty() && message.link_preview.is_some() {
        flags.insert(PostFlag::OnlyLink);
    } else if urls.len() == 1 && urls[0] == trimmed {
        flags.insert(PostFlag::OnlyLink);
    }

    for raw in &urls {
        let Ok(url) = Url::parse(raw) else { continue };
        let Some(host) = url.host_str() else { continue };
        if host.eq_ignore_ascii_case(&policy.platform_domain) {
            if let Some(flag) = classify_platform_link(&url, &message.channel) {
                flags.insert(flag);
            }
        } else {
            flags.insert(PostFlag::Link);
        }
    }

    flags
}

/// Classify an on-platform link: invite-style links are hidden channels,
/// ordinary and boost links pointing away from the hosting channel are
/// foreign. A boost link without a channel suffix is neither.
fn classify_platform_link(url: &Url, host_channel: &str) -> Option<PostFlag> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|parts| parts.collect())
        .unwrap_or_default();
    let first = segments.first().copied().filter(|s| !s.is_empty())?;

    if first.starts_with('+') || first.eq_ignore_ascii_case("joinchat") || first == "c" {
        return Some(PostFlag::HidChannel);
    }

    let handle = if first.eq_ignore_ascii_case("boost") {
        segments.get(1).copied().filter(|s| !s.is_empty())?
    } else {
        first
    };

    if handle.eq_ignore_ascii_case(host_channel) {
        None
    } else {
        Some(PostFlag::ForeignChannel)
    }
}

/// An `@handle` at a word start.
fn has_mention(text: &str) -> bool {
    let mut prev: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '@'
            && prev.is_none_or(|p| !p.is_alphanumeric())
            && chars
                .peek()
                .is_some_and(|next| next.is_ascii_alphanumeric() || *next == '_')
        {
            return true;
        }
        prev = Some(c);
    }
    false
}
