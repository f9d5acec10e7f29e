//! Bot API object types.
//!
//! Only the fields the relay reads are modelled; serde ignores the rest.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// Envelope wrapping every Bot API response
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i32>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    /// Seconds to wait before repeating a flood-limited request
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
}

/// Metadata shared by documents, videos, audio, animations and voice notes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FileMeta {
    pub file_id: String,
    pub file_unique_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_unique_id: String,
    pub width: u32,
    pub height: u32,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Message {
    pub message_id: i32,
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub date: i64,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub document: Option<FileMeta>,
    pub video: Option<FileMeta>,
    pub audio: Option<FileMeta>,
    pub animation: Option<FileMeta>,
    pub voice: Option<FileMeta>,
    pub video_note: Option<FileMeta>,
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub has_protected_content: bool,
}

/// Kind of media attached to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Document,
    Video,
    Audio,
    Animation,
    Voice,
    VideoNote,
    Photo,
}

/// Borrowed view of the media attached to a message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaRef<'a> {
    pub kind: MediaKind,
    pub file_id: &'a str,
    pub file_name: Option<&'a str>,
    pub file_size: Option<u64>,
}

impl Message {
    /// The media attached to this message, if any.
    ///
    /// Animations also carry a `document` field, so they are checked first.
    pub fn media(&self) -> Option<MediaRef<'_>> {
        if let Some(meta) = &self.animation {
            return Some(media_ref(MediaKind::Animation, meta));
        }
        if let Some(meta) = &self.document {
            return Some(media_ref(MediaKind::Document, meta));
        }
        if let Some(meta) = &self.video {
            return Some(media_ref(MediaKind::Video, meta));
        }
        if let Some(meta) = &self.audio {
            return Some(media_ref(MediaKind::Audio, meta));
        }
        if let Some(meta) = &self.voice {
            return Some(media_ref(MediaKind::Voice, meta));
        }
        if let Some(meta) = &self.video_note {
            return Some(media_ref(MediaKind::VideoNote, meta));
        }
        self.photo
            .as_ref()
            .and_then(|sizes| sizes.iter().max_by_key(|s| s.width * s.height))
            .map(|size| MediaRef {
                kind: MediaKind::Photo,
                file_id: size.file_id.as_str(),
                file_name: None,
                file_size: size.file_size,
            })
    }

    /// Caption of a media message, or the text of a plain one
    pub fn caption_or_text(&self) -> &str {
        self.caption
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or("")
    }
}

fn media_ref(kind: MediaKind, meta: &FileMeta) -> MediaRef<'_> {
    MediaRef {
        kind,
        file_id: meta.file_id.as_str(),
        file_name: meta.file_name.as_deref(),
        file_size: meta.file_size,
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

/// Result of getFile
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct File {
    pub file_id: String,
    pub file_unique_id: String,
    pub file_size: Option<u64>,
    pub file_path: Option<String>,
}

/// Result of copyMessage
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct MessageId {
    pub message_id: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    pub fn new(command: &str, description: &str) -> Self {
        Self {
            command: command.to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardMarkup {
    /// Build a keyboard with one button per row
    pub fn column(buttons: &[(&str, &str)]) -> Self {
        Self {
            inline_keyboard: buttons
                .iter()
                .map(|(text, data)| {
                    vec![InlineKeyboardButton {
                        text: text.to_string(),
                        callback_data: data.to_string(),
                    }]
                })
                .collect(),
        }
    }
}

/// A chat addressed either by numeric id or by public username
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatRef {
    Id(i64),
    Username(String),
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{}", id),
            ChatRef::Username(name) => write!(f, "@{}", name),
        }
    }
}

/// The Bot API accepts either an integer id or an "@username" string.
impl Serialize for ChatRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ChatRef::Id(id) => serializer.serialize_i64(*id),
            ChatRef::Username(name) => serializer.serialize_str(&format!("@{}", name)),
        }
    }
}

/// A file to upload as a document
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub data: Vec<u8>,
    pub caption: Option<String>,
    pub thumbnail: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_json(extra: &str) -> String {
        format!(
            r#"{{"message_id": 5, "chat": {{"id": -1001, "type": "channel"}}, "date": 0{}}}"#,
            extra
        )
    }

    #[test]
    fn test_document_media_exposes_file_name() {
        let msg: Message = serde_json::from_str(&message_json(
            r#", "document": {"file_id": "F1", "file_unique_id": "U1", "file_name": "a.pdf", "file_size": 10}"#,
        ))
        .unwrap();

        let media = msg.media().unwrap();
        assert_eq!(media.kind, MediaKind::Document);
        assert_eq!(media.file_id, "F1");
        assert_eq!(media.file_name, Some("a.pdf"));
        assert_eq!(media.file_size, Some(10));
    }

    #[test]
    fn test_animation_wins_over_document() {
        let msg: Message = serde_json::from_str(&message_json(
            r#", "animation": {"file_id": "A", "file_unique_id": "UA"},
                "document": {"file_id": "D", "file_unique_id": "UD"}"#,
        ))
        .unwrap();
        assert_eq!(msg.media().unwrap().kind, MediaKind::Animation);
    }

    #[test]
    fn test_photo_media_uses_largest_size() {
        let msg: Message = serde_json::from_str(&message_json(
            r#", "photo": [
                {"file_id": "small", "file_unique_id": "s", "width": 90, "height": 90},
                {"file_id": "big", "file_unique_id": "b", "width": 1280, "height": 720}
            ]"#,
        ))
        .unwrap();
        let media = msg.media().unwrap();
        assert_eq!(media.kind, MediaKind::Photo);
        assert_eq!(media.file_id, "big");
    }

    #[test]
    fn test_text_message_has_no_media() {
        let msg: Message = serde_json::from_str(&message_json(r#", "text": "hello""#)).unwrap();
        assert!(msg.media().is_none());
        assert_eq!(msg.caption_or_text(), "hello");
    }

    #[test]
    fn test_chat_ref_serializes_for_bot_api() {
        assert_eq!(
            serde_json::to_string(&ChatRef::Id(-100123)).unwrap(),
            "-100123"
        );
        assert_eq!(
            serde_json::to_string(&ChatRef::Username("news".into())).unwrap(),
            "\"@news\""
        );
    }
}
