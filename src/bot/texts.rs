//! Message texts and inline keyboards.
//!
//! All texts are Telegram HTML. Anything that came from a user goes through
//! [`escape`] first.

use crate::config::LimitsConfig;
use crate::queue::BatchCounts;
use crate::relay::truncate_chars;
use crate::store::UserSettings;
use crate::telegram::InlineKeyboardMarkup;

/// Characters of a custom caption shown in the settings summary
const CAPTION_PREVIEW_CHARS: usize = 30;

/// Escape text for Telegram's HTML parse mode
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn footer(brand: &str) -> String {
    format!("<b>Powered by {}</b>", escape(brand))
}

fn plan_label(premium: bool) -> &'static str {
    if premium {
        "💎 Premium"
    } else {
        "⚪ Free"
    }
}

// =============================================================================
// Keyboards
// =============================================================================

pub fn main_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::column(&[
        ("📝 Commands", "help"),
        ("⚙️ Settings", "settings_menu"),
        ("💎 My Plan", "myplan"),
    ])
}

pub fn settings_keyboard(with_back: bool) -> InlineKeyboardMarkup {
    let mut buttons = vec![
        ("📌 Set Chat ID", "set_chatid"),
        ("✏️ Set Rename", "set_rename"),
        ("💬 Set Caption", "set_caption"),
        ("🖼 Set Thumbnail", "set_thumbnail"),
        ("🔄 Replace Words", "replace_words"),
        ("🗑 Remove Words", "remove_words"),
        ("🔄 Reset All", "reset_settings"),
    ];
    if with_back {
        buttons.push(("🔙 Back", "back"));
    }
    InlineKeyboardMarkup::column(&buttons)
}

/// Single "Back" button returning to the callback `target`
pub fn back_keyboard(target: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::column(&[("🔙 Back", target)])
}

// =============================================================================
// Menus
// =============================================================================

pub fn welcome(premium: bool, brand: &str) -> String {
    format!(
        "<b>SAVE {brand} 🔥</b>\n\n\
         Hiii! 👋 Welcome!\n\n\
         ✳️ Send /batch and a post link from any public channel or group, \
         and I will copy the posts into your chat. For private ones, use /login.\n\n\
         ✳️ Rename files, rewrite captions and add your own thumbnail with /settings.\n\n\
         <b>Your Status:</b> {status}\n\n\
         Type /help to see all the magic! ✨\n\n\
         {footer}",
        brand = escape(brand),
        status = plan_label(premium),
        footer = footer(brand),
    )
}

pub fn main_menu(premium: bool, brand: &str) -> String {
    format!(
        "<b>SAVE {} 🔥</b>\n\n<b>Your Status:</b> {}\n\nChoose an option:",
        escape(brand),
        plan_label(premium)
    )
}

/// Full command overview shown by the "Commands" button
pub fn help_overview(brand: &str) -> String {
    format!(
        "📝 <b>Bot Commands Overview:</b>\n\n\
         <b>Basic Commands:</b>\n\
         /start - Start the bot\n\
         /help - Show commands\n\
         /batch - Bulk extraction\n\
         /cancel - Cancel ongoing batch\n\
         /login - Login for private channels\n\
         /logout - Logout from bot\n\n\
         <b>Settings:</b>\n\
         /settings - Configure all settings\n\
         • Set Chat ID\n\
         • Set Rename format\n\
         • Set Caption\n\
         • Set Thumbnail\n\
         • Replace/Remove words\n\
         • Reset settings\n\n\
         <b>Premium:</b>\n\
         /myplan - Your current plan\n\
         /plan - Available plans\n\n\
         <b>Admin:</b>\n\
         /add userID - Add premium\n\
         /rem userID - Remove premium\n\
         /stats - Bot statistics\n\n\
         {}",
        footer(brand)
    )
}

/// Short command list for /help
pub fn help_short(brand: &str) -> String {
    format!(
        "📝 <b>Commands:</b>\n\n\
         /start - Start bot\n\
         /batch - Extract files\n\
         /settings - Configure\n\
         /myplan - Check plan\n\
         /cancel - Cancel batch\n\
         /login - Login\n\
         /help - This message\n\n\
         {}",
        footer(brand)
    )
}

// =============================================================================
// Settings
// =============================================================================

fn settings_lines(settings: &UserSettings) -> String {
    let chat = settings
        .chat_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "Not set".to_string());
    let rename = settings.rename.as_deref().unwrap_or("Default");
    let caption = match settings.caption.as_deref() {
        Some(caption) => format!("{}...", truncate_chars(caption, CAPTION_PREVIEW_CHARS)),
        None => "Default".to_string(),
    };
    let thumbnail = if settings.thumbnail.is_some() {
        "Set"
    } else {
        "Not set"
    };

    format!(
        "📌 Chat ID: <code>{}</code>\n\
         ✏️ Rename: <code>{}</code>\n\
         💬 Caption: <code>{}</code>\n\
         🖼 Thumbnail: <code>{}</code>\n\
         🔄 Replace Rules: <code>{}</code>\n\
         🗑 Remove Words: <code>{}</code>",
        chat,
        escape(rename),
        escape(&caption),
        thumbnail,
        settings.replace_words.len(),
        settings.remove_words.len()
    )
}

/// Settings summary shown by the "Settings" button
pub fn settings_menu(settings: &UserSettings) -> String {
    format!(
        "⚙️ <b>Your Settings:</b>\n\n{}\n\n<b>Choose an option:</b>",
        settings_lines(settings)
    )
}

/// Settings summary for /settings, which also accepts a chat id directly
pub fn settings_command(settings: &UserSettings) -> String {
    format!(
        "⚙️ <b>Customize and Configure your settings ...</b>\n\n\
         <b>Current Settings:</b>\n{}\n\n\
         <b>Send me the ID of that chat:</b>\n\
         Example: <code>-1001234567890</code>\n\n\
         Or use buttons below:",
        settings_lines(settings)
    )
}

pub const ASK_CHAT_ID: &str = "<b>Send me the chat ID:</b>\n\nExample: <code>-1001234567890</code>";
pub const ASK_RENAME: &str = "<b>Send me the rename format:</b>\n\nExample: <code>MyChannel_Video</code>";
pub const ASK_CAPTION: &str = "<b>Send me the custom caption:</b>";
pub const ASK_THUMBNAIL: &str = "<b>Send me the thumbnail image:</b>";
pub const ASK_REPLACE: &str =
    "<b>Send in format:</b> <code>old|new</code>\n\nExample: <code>Copyright|Free</code>";
pub const ASK_REMOVE: &str =
    "<b>Send words to remove (comma separated):</b>\n\nExample: <code>Copyright, Paid</code>";
pub const SETTINGS_RESET: &str = "✅ <b>All settings reset!</b>";

pub fn chat_id_set(chat_id: i64) -> String {
    format!("✅ <b>Chat ID set!</b>\n\nTarget: <code>{}</code>", chat_id)
}

pub fn chat_id_set_direct(chat_id: i64) -> String {
    format!(
        "✅ <b>Chat ID set successfully!</b>\n\n\
         Target: <code>{}</code>\n\n\
         Now you can use /batch to start extraction!",
        chat_id
    )
}

pub const INVALID_CHAT_ID: &str = "❌ Invalid chat ID!";
pub const INVALID_CHAT_ID_DIRECT: &str =
    "❌ Invalid chat ID! Send a valid number like: <code>-1001234567890</code>";

pub fn rename_set(rename: &str) -> String {
    format!("✅ <b>Rename set:</b> <code>{}</code>", escape(rename))
}

pub const CAPTION_SET: &str = "✅ <b>Caption set!</b>";
pub const THUMBNAIL_SET: &str = "✅ <b>Thumbnail set!</b>";
pub const THUMBNAIL_EXPECTED: &str = "❌ Please send an image to use as thumbnail.";

pub fn replace_rule_added(old: &str, new: &str) -> String {
    format!(
        "✅ <b>Replace rule added!</b>\n\n<code>{}</code> → <code>{}</code>",
        escape(old),
        escape(new)
    )
}

pub const REPLACE_FORMAT: &str = "❌ Use format: <code>old|new</code>";

pub fn remove_words_added(count: usize) -> String {
    format!("✅ <b>Added {} words to remove!</b>", count)
}

// =============================================================================
// Plans
// =============================================================================

/// Plan details shown by the "My Plan" button
pub fn plan_details(premium: bool, limits: &LimitsConfig) -> String {
    if premium {
        format!(
            "💎 <b>Premium Plan Active</b>\n\n\
             ✅ Batch limit: {}\n✅ Fast speed\n✅ Priority queue\n✅ All features",
            limits.premium_batch
        )
    } else {
        format!(
            "⚪ <b>Free Plan</b>\n\n• Batch limit: {}\n• Standard speed\n\n💎 Upgrade: /plan",
            limits.free_batch
        )
    }
}

/// Reply to /myplan
pub fn my_plan(premium: bool, limits: &LimitsConfig) -> String {
    if premium {
        format!(
            "💎 <b>Premium Active</b>\n\n✅ Batch: {}\n✅ Fast speed\n✅ All features",
            limits.premium_batch
        )
    } else {
        format!(
            "⚪ <b>Free Plan</b>\n\n• Batch: {}\n• Standard speed\n\n💎 /plan",
            limits.free_batch
        )
    }
}

/// Reply to /plan
pub fn plans(limits: &LimitsConfig) -> String {
    format!(
        "💎 <b>Available Plans</b>\n\n\
         ⚪ <b>Free</b>\n• Batch limit: {}\n\n\
         💎 <b>Premium</b>\n• Batch limit: {}\n• All features\n\n\
         Contact the bot owner to upgrade.",
        limits.free_batch, limits.premium_batch
    )
}

// =============================================================================
// Admin
// =============================================================================

pub fn premium_added(user_id: i64) -> String {
    format!("✅ <b>User {} added to premium!</b>", user_id)
}

pub fn premium_removed(user_id: i64) -> String {
    format!("✅ <b>User {} removed!</b>", user_id)
}

pub fn premium_owner_kept(user_id: i64) -> String {
    format!("⚠️ <b>User {} is the owner and stays premium.</b>", user_id)
}

pub fn stats(users: usize, premium: usize, logged: usize, queued: usize, active: usize) -> String {
    format!(
        "📊 <b>Bot Statistics:</b>\n\n\
         👥 Users: <b>{}</b>\n\
         💎 Premium: <b>{}</b>\n\
         🔐 Logged: <b>{}</b>\n\
         📥 Queue: <b>{}</b>\n\
         ⚡ Active: <b>{}</b>",
        users, premium, logged, queued, active
    )
}

// =============================================================================
// Login
// =============================================================================

pub const LOGIN_UNAVAILABLE: &str = "⚠️ Login is not enabled on this bot.";
pub const ASK_PHONE: &str = "🔐 <b>Login to Access Private Channels</b>\n\n\
     <b>Step 1:</b> Send your phone number\n\
     Example: <code>+919876543210</code>";
pub const PHONE_FORMAT: &str = "❌ Send phone with country code: <code>+919876543210</code>";
pub const CODE_SENT: &str = "📱 <b>OTP sent!</b>\n\n\
     <b>Step 2:</b> Send OTP in spaced format\n\
     Example: <code>1 2 3 4 5</code>";
pub const ASK_PASSWORD: &str = "🔐 <b>2FA Required</b>\n\n<b>Step 3:</b> Send 2FA password";
pub const INVALID_CODE: &str = "❌ Invalid OTP! Try /login again.";
pub const LOGIN_SUCCESS: &str = "✅ <b>Login successful!</b>";
pub const LOGIN_SUCCESS_2FA: &str = "✅ <b>Login successful with 2FA!</b>";
pub const LOGGED_OUT: &str = "✅ <b>Logged out!</b>";
pub const NOT_LOGGED_IN: &str = "⚠️ Not logged in.";

pub fn login_error(error: &str) -> String {
    format!("❌ Error: {}", escape(error))
}

pub fn invalid_password(error: &str) -> String {
    format!("❌ Invalid password: {}", escape(error))
}

// =============================================================================
// Batch
// =============================================================================

pub const SET_TARGET_FIRST: &str = "⚠️ <b>First set target chat:</b> /settings";
pub const ASK_START_LINK: &str = "<b>Please send the start link.</b>\n\nMaximum tries: 3";
pub const INVALID_LINK: &str = "❌ Invalid Telegram link!";
pub const INVALID_NUMBER: &str = "❌ Invalid number!";

pub fn ask_count(limit: u32) -> String {
    format!("<b>How many messages?</b>\nMax limit: <b>{}</b>", limit)
}

pub fn over_limit(limit: u32) -> String {
    format!("❌ Max limit: <b>{}</b>\n\n💎 Upgrade: /plan", limit)
}

pub fn cancelled(removed: usize) -> String {
    format!("✅ <b>Cancelled! Removed {} tasks.</b>", removed)
}

pub fn queue_full(brand: &str) -> String {
    format!(
        "⚠️ <b>The queue is full right now.</b>\n\nPlease try again later.\n\n{}",
        footer(brand)
    )
}

/// Live batch status; shows the running transfer if there is one
pub fn batch_status(
    processed: usize,
    total: usize,
    progress: Option<&str>,
    queued: usize,
    brand: &str,
) -> String {
    match progress {
        Some(progress) => format!(
            "<b>Batch process started ⚡</b>\nProcessing: {}/{}\n\n{}\n\n{}",
            processed,
            total,
            escape(progress),
            footer(brand)
        ),
        None => format!(
            "<b>Batch process started ⚡</b>\nProcessing: {}/{}\nQueue: {}\n\n{}",
            processed,
            total,
            queued,
            footer(brand)
        ),
    }
}

pub fn batch_finished(counts: &BatchCounts, target_chat: i64, brand: &str) -> String {
    let mut text = format!(
        "✅ <b>Batch completed!</b>\n\n\
         Total: <b>{}</b>\n\
         Success: <b>{}</b>\n\
         Failed: <b>{}</b>\n",
        counts.total, counts.succeeded, counts.failed
    );
    if counts.cancelled > 0 {
        text.push_str(&format!("Cancelled: <b>{}</b>\n", counts.cancelled));
    }
    text.push_str(&format!(
        "\nFiles uploaded to: <code>{}</code>\n\n{}",
        target_chat,
        footer(brand)
    ));
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>&\"x\"</b>"), "&lt;b&gt;&amp;&quot;x&quot;&lt;/b&gt;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_settings_summary_defaults() {
        let text = settings_menu(&UserSettings::default());
        assert!(text.contains("Chat ID: <code>Not set</code>"));
        assert!(text.contains("Rename: <code>Default</code>"));
        assert!(text.contains("Caption: <code>Default</code>"));
        assert!(text.contains("Thumbnail: <code>Not set</code>"));
        assert!(text.contains("Replace Rules: <code>0</code>"));
    }

    #[test]
    fn test_settings_summary_escapes_and_clips_caption() {
        let settings = UserSettings {
            chat_id: Some(-1001),
            caption: Some(format!("<i>{}", "x".repeat(50))),
            ..Default::default()
        };
        let text = settings_command(&settings);
        assert!(text.contains("<code>-1001</code>"));
        assert!(text.contains("&lt;i&gt;"));
        assert!(!text.contains(&"x".repeat(40)));
    }

    #[test]
    fn test_settings_keyboard_back_button() {
        assert_eq!(settings_keyboard(false).inline_keyboard.len(), 7);
        let with_back = settings_keyboard(true);
        assert_eq!(with_back.inline_keyboard.len(), 8);
        assert_eq!(with_back.inline_keyboard[7][0].callback_data, "back");
    }

    #[test]
    fn test_batch_finished_mentions_cancelled_only_when_present() {
        let counts = BatchCounts {
            total: 3,
            succeeded: 2,
            failed: 1,
            cancelled: 0,
        };
        let text = batch_finished(&counts, -100, "RATNA");
        assert!(text.contains("Success: <b>2</b>"));
        assert!(!text.contains("Cancelled"));

        let counts = BatchCounts { cancelled: 1, ..counts };
        assert!(batch_finished(&counts, -100, "RATNA").contains("Cancelled: <b>1</b>"));
    }

    #[test]
    fn test_login_errors_are_escaped() {
        assert_eq!(login_error("<PHONE_NUMBER_INVALID>"), "❌ Error: &lt;PHONE_NUMBER_INVALID&gt;");
        assert!(stats(4, 2, 1, 0, 0).contains("Logged: <b>1</b>"));
    }

    #[test]
    fn test_plan_texts_use_configured_limits() {
        let limits = LimitsConfig {
            free_batch: 5,
            premium_batch: 500,
        };
        assert!(my_plan(false, &limits).contains("Batch: 5"));
        assert!(plan_details(true, &limits).contains("Batch limit: 500"));
    }
}
