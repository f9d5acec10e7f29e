//! Text rules applied to file names and captions.

use crate::config::TELEGRAM_CAPTION_LIMIT;

/// Apply replacement pairs in order, then strip every remove word, then trim.
pub fn apply_rules(text: &str, replace: &[(String, String)], remove: &[String]) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = text.to_string();
    for (old, new) in replace {
        if !old.is_empty() {
            out = out.replace(old.as_str(), new);
        }
    }
    for word in remove {
        if !word.is_empty() {
            out = out.replace(word.as_str(), "");
        }
    }
    out.trim().to_string()
}

/// Replace the base of `original` with `base`, keeping its extension.
///
/// The extension is whatever follows the last `.`; names without a dot
/// take `base` as-is.
pub fn rename_file(original: &str, base: &str) -> String {
    match original.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!("{}.{}", base, ext),
        _ => base.to_string(),
    }
}

/// Truncate to at most `limit` characters on a char boundary
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Caption for a relayed file: the custom caption if set, otherwise the
/// source caption, with rules applied and clipped to Telegram's limit.
pub fn build_caption(
    source: &str,
    custom: Option<&str>,
    replace: &[(String, String)],
    remove: &[String],
) -> String {
    let base = custom.unwrap_or(source);
    let caption = apply_rules(base, replace, remove);
    truncate_chars(&caption, TELEGRAM_CAPTION_LIMIT).to_string()
}
