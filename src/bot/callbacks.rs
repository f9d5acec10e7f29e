//! Inline button handlers

use crate::store::PendingInput;
use crate::telegram::{CallbackQuery, InlineKeyboardMarkup, TelegramError};

use super::texts;
use super::Bot;

impl Bot {
    pub(super) async fn handle_callback(&self, query: CallbackQuery) -> Result<(), TelegramError> {
        if let Err(e) = self.api.answer_callback_query(&query.id).await {
            tracing::debug!(error = %e, "Failed to answer callback query");
        }

        let (Some(data), Some(message)) = (query.data.as_deref(), query.message.as_ref()) else {
            return Ok(());
        };
        let user_id = query.from.id;
        let chat_id = message.chat.id;
        let message_id = message.message_id;
        tracing::debug!(user_id, data, "Callback received");

        let brand = &self.settings.brand_name;
        let (text, keyboard): (String, InlineKeyboardMarkup) = match data {
            "help" => (texts::help_overview(brand), texts::back_keyboard("back")),
            "back" => {
                self.store
                    .update(user_id, |record| record.pending_input = None)
                    .await;
                let premium = self.store.is_premium(user_id).await;
                (texts::main_menu(premium, brand), texts::main_menu_keyboard())
            }
            "settings_menu" => {
                // Leaving a prompt abandons it
                let settings = self
                    .store
                    .update(user_id, |record| {
                        record.pending_input = None;
                        record.settings.clone()
                    })
                    .await;
                (texts::settings_menu(&settings), texts::settings_keyboard(true))
            }
            "myplan" => {
                let premium = self.store.is_premium(user_id).await;
                (
                    texts::plan_details(premium, &self.settings.limits),
                    texts::back_keyboard("back"),
                )
            }
            "reset_settings" => {
                self.store
                    .update(user_id, |record| {
                        record.settings.reset();
                        record.pending_input = None;
                    })
                    .await;
                tracing::info!(user_id, "Settings reset");
                (
                    texts::SETTINGS_RESET.to_string(),
                    texts::back_keyboard("settings_menu"),
                )
            }
            other => {
                let Some((input, prompt)) = input_prompt(other) else {
                    tracing::debug!(user_id, data = other, "Unknown callback");
                    return Ok(());
                };
                self.store
                    .update(user_id, |record| record.pending_input = Some(input))
                    .await;
                (prompt.to_string(), texts::back_keyboard("settings_menu"))
            }
        };

        self.api
            .edit_message_text(chat_id, message_id, &text, Some(keyboard))
            .await
    }
}

/// Input requested by a settings button, with its prompt
fn input_prompt(data: &str) -> Option<(PendingInput, &'static str)> {
    let prompt = match data {
        "set_chatid" => (PendingInput::ChatId, texts::ASK_CHAT_ID),
        "set_rename" => (PendingInput::Rename, texts::ASK_RENAME),
        "set_caption" => (PendingInput::Caption, texts::ASK_CAPTION),
        "set_thumbnail" => (PendingInput::Thumbnail, texts::ASK_THUMBNAIL),
        "replace_words" => (PendingInput::ReplaceRule, texts::ASK_REPLACE),
        "remove_words" => (PendingInput::RemoveWords, texts::ASK_REMOVE),
        _ => return None,
    };
    Some(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_prompt_routes_settings_buttons() {
        assert_eq!(
            input_prompt("set_thumbnail").map(|(input, _)| input),
            Some(PendingInput::Thumbnail)
        );
        assert_eq!(
            input_prompt("remove_words").map(|(input, _)| input),
            Some(PendingInput::RemoveWords)
        );
        assert!(input_prompt("unknown").is_none());
    }
}
