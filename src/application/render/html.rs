//! HTML body assembly.
//!
//! Everything here is plain string building: escape first, then compose.
//! Sub-block builders that can fail return `Result` so the pipeline can
//! degrade to an omitted block instead of failing the whole render.

use std::fmt::Write as _;
use std::ops::Range;

use crate::domain::message::{
    ForwardOrigin, LinkPreview, MediaItem, Message, MessageContent, PollBlock, ReplyRef,
};

use super::RenderPolicy;

/// Fixed separator between footer fields.
pub(super) const SPACER: &str = "&nbsp;&nbsp;·&nbsp;&nbsp;";

const REPLY_EXCERPT_MAX: usize = 100;

pub(super) fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Drop tags, collapse whitespace. Used for title derivation and excerpts.
pub(super) fn strip_tags(input: &str) -> String {
    let mut text = String::with_capacity(input.len());
    let mut in_tag = false;
    let mut last_was_space = false;

    for ch in input.chars() {
        match ch {
            '<' => {
                in_tag = true;
            }
            '>' => {
                in_tag = false;
                last_was_space = false;
            }
            _ if in_tag => {}
            c if c.is_whitespace() => {
                if !last_was_space && !text.is_empty() {
                    text.push(' ');
                }
                last_was_space = true;
            }
            c => {
                text.push(c);
                last_was_space = false;
            }
        }
    }

    text.trim().to_string()
}

/// Byte ranges of bare `http(s)://` URLs in plain text.
pub(super) fn find_urls(text: &str) -> Vec<Range<usize>> {
    let lower = text.to_ascii_lowercase();
    let bytes = text.as_bytes();
    let mut ranges = Vec::new();
    let mut search_from = 0;

    while let Some(offset) = lower[search_from..].find("http") {
        let start = search_from + offset;
        let rest = &lower[start..];
        let scheme_len = if rest.starts_with("https://") {
            8
        } else if rest.starts_with("http://") {
            7
        } else {
            search_from = start + 4;
            continue;
        };

        let mut end = start + scheme_len;
        while end < bytes.len() {
            let ch = text[end..].chars().next().expect("char at boundary");
            if ch.is_whitespace() || ch == '<' || ch == '>' || ch == '"' {
                break;
            }
            end += ch.len_utf8();
        }
        while end > start + scheme_len {
            let last = text[..end].chars().next_back().expect("char before end");
            if matches!(last, '.' | ',' | ';' | ':' | '!' | '?' | ')' | '(' | '\'') {
                end -= last.len_utf8();
            } else {
                break;
            }
        }
        if end > start + scheme_len {
            ranges.push(start..end);
        }
        search_from = end.max(start + scheme_len);
    }

    ranges
}

/// Escaped rich-text body: bare URLs become anchors, newlines become breaks.
pub(super) fn text_block(raw: &str) -> String {
    let mut inner = String::with_capacity(raw.len());
    let mut cursor = 0;

    for range in find_urls(raw) {
        push_plain(&mut inner, &raw[cursor..range.start]);
        let escaped = escape_html(&raw[range.clone()]);
        let _ = write!(inner, "<a href=\"{escaped}\">{escaped}</a>");
        cursor = range.end;
    }
    push_plain(&mut inner, &raw[cursor..]);

    format!("<div class=\"text\">{inner}</div>")
}

fn push_plain(out: &mut String, segment: &str) {
    out.push_str(&escape_html(segment).replace('\n', "<br>"));
}

/// One-line "Forwarded from X" annotation. A linked channel wins over a
/// display name; a fully hidden sender gets the anonymous label.
pub(super) fn forward_block(origin: &ForwardOrigin, platform_domain: &str) -> String {
    let source = match (&origin.channel_handle, &origin.display_name) {
        (Some(handle), _) => {
            let name = origin.display_name.as_deref().unwrap_or(handle.as_str());
            format!(
                "<a href=\"https://{}/{}\">{}</a>",
                escape_html(platform_domain),
                escape_html(handle),
                escape_html(name)
            )
        }
        (None, Some(name)) => escape_html(name),
        (None, None) => "anonymous sender".to_string(),
    };
    format!("<div class=\"forwarded\">Forwarded from {source}</div>")
}

pub(super) fn reply_block(reply: &ReplyRef) -> String {
    let excerpt = reply
        .excerpt
        .as_deref()
        .map(|text| {
            let cut: String = text.chars().take(REPLY_EXCERPT_MAX).collect();
            format!(": {}", escape_html(cut.trim()))
        })
        .unwrap_or_default();
    format!(
        "<div class=\"reply\">Reply to #{}{excerpt}</div>",
        reply.post_id
    )
}

pub(super) fn poll_block(poll: &PollBlock) -> Result<String, std::fmt::Error> {
    let mut block = String::new();
    write!(
        block,
        "<div class=\"poll\"><b>📊 {}</b><ol>",
        escape_html(&poll.question)
    )?;
    for option in &poll.options {
        write!(block, "<li>{}</li>", escape_html(option))?;
    }
    write!(block, "</ol></div>")?;
    Ok(block)
}

/// Signed media embed, bounded to the policy's boxes.
pub(super) fn media_embed(content: &MessageContent, url: &str, policy: &RenderPolicy) -> String {
    let url = escape_html(url);
    match content {
        MessageContent::Photo(item) | MessageContent::Sticker(item) => {
            format!("<img src=\"{url}\"{}>", size_attrs(item, policy.media_box))
        }
        MessageContent::Video(item) | MessageContent::VideoNote(item) => format!(
            "<video controls src=\"{url}\"{}></video>",
            size_attrs(item, policy.media_box)
        ),
        MessageContent::Animation(item) => format!(
            "<video autoplay loop muted playsinline src=\"{url}\"{}></video>",
            size_attrs(item, policy.media_box)
        ),
        MessageContent::Audio(_) | MessageContent::Voice(_) => format!(
            "<audio controls src=\"{url}\" style=\"width:{}px;max-width:100%\"></audio>",
            policy.audio_width
        ),
        MessageContent::Document(item) => {
            let name = item
                .file_name
                .as_deref()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or("file");
            format!(
                "<div class=\"document\">📎 <a href=\"{url}\">{}</a></div>",
                escape_html(name)
            )
        }
        MessageContent::Text
        | MessageContent::Poll(_)
        | MessageContent::Service(_)
        | MessageContent::Unsupported => String::new(),
    }
}

fn size_attrs(item: &MediaItem, bounding_box: u32) -> String {
    match (item.width, item.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => {
            let (width, height) = fit_box(width, height, bounding_box);
            format!(" width=\"{width}\" height=\"{height}\"")
        }
        _ => format!(" style=\"max-width:{bounding_box}px;max-height:{bounding_box}px\""),
    }
}

fn fit_box(width: u32, height: u32, bounding_box: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= bounding_box {
        return (width, height);
    }
    let scaled_w = (u64::from(width) * u64::from(bounding_box) / u64::from(longest)) as u32;
    let scaled_h = (u64::from(height) * u64::from(bounding_box) / u64::from(longest)) as u32;
    (scaled_w.max(1), scaled_h.max(1))
}

/// Link-preview card: clickable thumbnail plus titled link and description.
pub(super) fn preview_embed(
    preview: &LinkPreview,
    thumb_url: Option<&str>,
) -> Result<String, std::fmt::Error> {
    let mut block = String::new();
    let href = escape_html(&preview.url);
    write!(block, "<div class=\"linkpreview\">")?;
    if let Some(thumb) = thumb_url {
        write!(
            block,
            "<a href=\"{href}\"><img src=\"{}\" class=\"thumb\"></a>",
            escape_html(thumb)
        )?;
    }
    match preview.title.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(title) => write!(
            block,
            "<b><a href=\"{href}\">{}</a></b>",
            escape_html(title.trim())
        )?,
        None => write!(block, "<a href=\"{href}\">{href}</a>")?,
    }
    if let Some(description) = preview
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
    {
        write!(block, "<br>{}", escape_html(description.trim()))?;
    }
    write!(block, "</div>")?;
    Ok(block)
}

/// Reactions, view count and the two fixed action links, one line.
pub(super) fn footer_block(
    message: &Message,
    policy: &RenderPolicy,
) -> Result<String, std::fmt::Error> {
    let mut fields = Vec::new();

    let reactions: Vec<String> = message
        .reactions
        .iter()
        .filter(|reaction| reaction.count > 0)
        .map(|reaction| format!("{} {}", escape_html(&reaction.emoji), reaction.count))
        .collect();
    if !reactions.is_empty() {
        fields.push(reactions.join(" "));
    }
    if let Some(views) = message.views {
        fields.push(format!("👁 {views}"));
    }
    fields.push(format!(
        "<a href=\"tg://resolve?domain={}&amp;post={}\">open in app</a>",
        escape_html(&message.channel),
        message.id
    ));
    fields.push(format!(
        "<a href=\"https://{}/{}/{}\">open on web</a>",
        escape_html(&policy.platform_domain),
        escape_html(&message.channel),
        message.id
    ));

    let mut footer = String::new();
    write!(footer, "<div class=\"footer\">{}</div>", fields.join(SPACER))?;
    Ok(footer)
}

/// Outer document wrapper, suppressed for `naked` renders.
pub(super) fn wrap_document(inner: &str) -> String {
    format!("<article class=\"post\">{inner}</article>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::Reaction;

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            escape_html("<b>\"a&b\"</b>"),
            "&lt;b&gt;&quot;a&amp;b&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn find_urls_extracts_and_trims() {
        let text = "see https://example.com/page, then http://other.org.";
        let urls: Vec<&str> = find_urls(text).into_iter().map(|r| &text[r]).collect();
        assert_eq!(urls, vec!["https://example.com/page", "http://other.org"]);
    }

    #[test]
    fn find_urls_ignores_bare_scheme() {
        assert!(find_urls("https:// is not a link").is_empty());
        assert!(find_urls("plain text").is_empty());
    }

    #[test]
    fn text_block_autolinks_and_escapes() {
        let block = text_block("look <here> https://example.com/a?b=1&c=2 now");
        assert!(block.contains("&lt;here&gt;"));
        assert!(
            block.contains("<a href=\"https://example.com/a?b=1&amp;c=2\">"),
            "anchor missing in {block}"
        );
    }

    #[test]
    fn text_block_converts_newlines() {
        assert!(text_block("one\ntwo").contains("one<br>two"));
    }

    #[test]
    fn poll_block_lists_options() {
        let block = poll_block(&PollBlock {
            question: "Best crab?".to_string(),
            options: vec!["Red".to_string(), "Blue".to_string()],
        })
        .expect("poll block");
        assert!(block.contains("Best crab?"));
        assert!(block.contains("<li>Red</li><li>Blue</li>"));
    }

    #[test]
    fn forward_block_prefers_linked_handle() {
        let block = forward_block(
            &ForwardOrigin {
                channel_handle: Some("source".to_string()),
                display_name: Some("Source Channel".to_string()),
            },
            "t.me",
        );
        assert!(block.contains("https://t.me/source"));
        assert!(block.contains("Source Channel"));

        let anonymous = forward_block(
            &ForwardOrigin {
                channel_handle: None,
                display_name: None,
            },
            "t.me",
        );
        assert!(anonymous.contains("anonymous sender"));
    }

    #[test]
    fn reply_excerpt_is_capped() {
        let long = "x".repeat(300);
        let block = reply_block(&ReplyRef {
            post_id: 9,
            excerpt: Some(long),
        });
        assert!(block.contains("Reply to #9: "));
        assert!(block.len() < 200);
    }

    #[test]
    fn fit_box_scales_down_only() {
        assert_eq!(fit_box(1200, 800, 600), (600, 400));
        assert_eq!(fit_box(400, 300, 600), (400, 300));
        assert_eq!(fit_box(800, 1600, 600), (300, 600));
    }

    #[test]
    fn footer_joins_fields_with_spacer() {
        let message = Message {
            channel: "chan".to_string(),
            id: 5,
            date: 0,
            author: None,
            views: Some(120),
            media_group_id: None,
            text: String::new(),
            forward: None,
            reply_to: None,
            link_preview: None,
            reactions: vec![Reaction {
                emoji: "👍".to_string(),
                count: 4,
            }],
            content: MessageContent::Text,
        };
        let policy = RenderPolicy::default();
        let footer = footer_block(&message, &policy).expect("footer");
        assert!(footer.contains("👍 4"));
        assert!(footer.contains("👁 120"));
        assert!(footer.contains("open in app"));
        assert!(footer.contains("open on web"));
        assert_eq!(footer.matches(SPACER).count(), 3);
    }
}
