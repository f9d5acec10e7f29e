//! Telegram post link parsing.

use std::sync::LazyLock;

use regex::Regex;

use crate::telegram::ChatRef;

/// Private channel links: `t.me/c/<internal id>/<message id>`
static PRIVATE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"t\.me/c/(\d+)/(\d+)").expect("valid regex"));

/// Public links: `t.me/<username>/<message id>`
static PUBLIC_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"t\.me/([^/\s]+)/(\d+)").expect("valid regex"));

/// Parse a post link anywhere in `text` into the source chat and message id.
///
/// Numeric chat segments are internal channel ids and get the `-100` prefix
/// the Bot API uses for channels and supergroups.
pub fn parse_link(text: &str) -> Option<(ChatRef, i32)> {
    for pattern in [&*PRIVATE_LINK, &*PUBLIC_LINK] {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let chat = &caps[1];
        let message_id: i32 = caps[2].parse().ok()?;

        let chat = if chat.bytes().all(|b| b.is_ascii_digit()) {
            ChatRef::Id(format!("-100{}", chat).parse().ok()?)
        } else {
            ChatRef::Username(chat.to_string())
        };
        return Some((chat, message_id));
    }
    None
}
