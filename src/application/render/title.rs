//! Title derivation.
//!
//! Priority chain: service-event label, then the first text line (URL- and
//! tag-stripped, word-boundary truncated), then a media-type label, then a
//! link-preview label, then the generic fallback. The result is never empty.

use crate::domain::message::{Message, MessageContent};

use super::RenderPolicy;
use super::html::{find_urls, strip_tags};

pub(super) const UNKNOWN_POST: &str = "Unknown Post";
const WEB_LINK: &str = "🔗 Web link";

pub(super) fn derive_title(message: &Message, policy: &RenderPolicy) -> String {
    if let MessageContent::Service(event) = &message.content {
        return event.label().to_string();
    }

    if message.text.chars().count() >= policy.title_text_floor
        && let Some(title) = title_from_text(&message.text, policy.title_max_chars)
    {
        return title;
    }

    if let Some(label) = media_label(&message.content) {
        return label;
    }

    if let Some(preview) = &message.link_preview {
        return match preview
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            Some(title) => format!("🔗 {title}"),
            None => WEB_LINK.to_string(),
        };
    }

    // A bare URL with no preview at all still reads as a web link.
    if is_bare_url(&message.text) {
        return WEB_LINK.to_string();
    }

    UNKNOWN_POST.to_string()
}

/// First non-blank line, URLs removed, tags stripped, truncated at the last
/// word boundary before `max_chars` (mid-word only when no boundary exists),
/// cut at the first sentence-ending period, trailing `. , ; :` and dot runs
/// dropped while `!`/`?` survive. `None` when nothing readable remains.
fn title_from_text(text: &str, max_chars: usize) -> Option<String> {
    let line = text.lines().find(|line| !line.trim().is_empty())?;
    let line = strip_urls(line);
    let line = strip_tags(&line);
    if line.is_empty() {
        return None;
    }

    let mut chars: Vec<char> = line.chars().collect();
    if let Some(cut) = sentence_end(&chars) {
        chars.truncate(cut);
    }
    if chars.len() > max_chars {
        let boundary = chars[..=max_chars]
            .iter()
            .rposition(|c| c.is_whitespace())
            .unwrap_or(max_chars);
        chars.truncate(boundary);
    }
    while let Some(&last) = chars.last() {
        if matches!(last, '.' | ',' | ';' | ':') || last.is_whitespace() {
            chars.pop();
        } else {
            break;
        }
    }

    let title: String = chars.into_iter().collect();
    (!title.is_empty()).then_some(title)
}

/// Index of the first period that ends a sentence: followed by whitespace or
/// end of line, and not part of a dot run.
fn sentence_end(chars: &[char]) -> Option<usize> {
    (0..chars.len()).find(|&i| {
        chars[i] == '.'
            && (i == 0 || chars[i - 1] != '.')
            && chars.get(i + 1).is_none_or(|next| next.is_whitespace())
    })
}

fn strip_urls(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut cursor = 0;
    for range in find_urls(line) {
        out.push_str(&line[cursor..range.start]);
        cursor = range.end;
    }
    out.push_str(&line[cursor..]);
    out
}

fn is_bare_url(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let ranges = find_urls(trimmed);
    ranges.len() == 1 && &trimmed[ranges[0].clone()] == trimmed
}

/// Media-type label for posts with no usable text.
pub(super) fn media_label(content: &MessageContent) -> Option<String> {
    let label = match content {
        MessageContent::Photo(_) => "📷 Photo",
        MessageContent::Video(_) => "📹 Video",
        MessageContent::Animation(_) => "🎞 GIF",
        MessageContent::Audio(_) => "🎵 Audio",
        MessageContent::Voice(_) => "🎤 Voice message",
        MessageContent::VideoNote(_) => "📱 Video message",
        MessageContent::Sticker(_) => "🎭 Sticker",
        MessageContent::Poll(_) => "📊 Poll",
        MessageContent::Document(item) => {
            let pdf = item
                .mime_type
                .as_deref()
                .is_some_and(|mime| mime.eq_ignore_ascii_case("application/pdf"));
            if pdf { "📕 PDF Document" } else { "📄 Document" }
        }
        MessageContent::Text
        | MessageContent::Service(_)
        | MessageContent::Unsupported => return None,
    };
    Some(label.to_string())
}

/// Generic labels never win a media group's representative-title vote.
pub fn is_generic_label(title: &str) -> bool {
    matches!(
        title,
        "📷 Photo"
            | "📹 Video"
            | "🎞 GIF"
            | "🎵 Audio"
            | "🎤 Voice message"
            | "📱 Video message"
            | "🎭 Sticker"
            | "📊 Poll"
            | "📕 PDF Document"
            | "📄 Document"
            | WEB_LINK
            | UNKNOWN_POST
    )
}
