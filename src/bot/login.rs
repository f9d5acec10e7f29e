//! /login and /logout: connecting a user's own Telegram account

use crate::account::{AccountError, SignIn};
use crate::store::LoginStep;
use crate::telegram::TelegramError;

use super::texts;
use super::Bot;

/// Login codes are sent spaced out (`1 2 3 4 5`) because Telegram expires a
/// code that is forwarded verbatim through a chat
fn normalize_code(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

impl Bot {
    pub(super) async fn start_login(&self, user_id: i64, chat_id: i64) -> Result<(), TelegramError> {
        if self.accounts.is_none() {
            self.reply(chat_id, texts::LOGIN_UNAVAILABLE, None).await?;
            return Ok(());
        }

        self.store
            .update(user_id, |record| {
                record.login_step = Some(LoginStep::AwaitingPhone);
                record.pending_input = None;
                record.batch_step = None;
            })
            .await;
        self.reply(chat_id, texts::ASK_PHONE, None).await?;
        Ok(())
    }

    pub(super) async fn logout(&self, user_id: i64, chat_id: i64) -> Result<(), TelegramError> {
        let text = if self.store.remove_session(user_id).await {
            tracing::info!(user_id, "Account logged out");
            texts::LOGGED_OUT
        } else {
            texts::NOT_LOGGED_IN
        };
        self.reply(chat_id, text, None).await?;
        Ok(())
    }

    /// Answer to the login step `step`
    pub(super) async fn handle_login_input(
        &self,
        user_id: i64,
        chat_id: i64,
        step: LoginStep,
        text: &str,
    ) -> Result<(), TelegramError> {
        let Some(accounts) = &self.accounts else {
            self.set_login_step(user_id, None).await;
            return Ok(());
        };

        let (next, reply) = match step {
            LoginStep::AwaitingPhone => {
                if !text.starts_with('+') {
                    self.reply(chat_id, texts::PHONE_FORMAT, None).await?;
                    return Ok(());
                }
                match accounts.request_code(user_id, text).await {
                    Ok(()) => (Some(LoginStep::AwaitingCode), texts::CODE_SENT.to_string()),
                    Err(e) => {
                        tracing::warn!(user_id, error = %e, "Login code request failed");
                        (None, texts::login_error(&e.to_string()))
                    }
                }
            }
            LoginStep::AwaitingCode => {
                match accounts.submit_code(user_id, &normalize_code(text)).await {
                    Ok(SignIn::Complete(session)) => {
                        self.store.save_session(user_id, session).await;
                        tracing::info!(user_id, "Account logged in");
                        (None, texts::LOGIN_SUCCESS.to_string())
                    }
                    Ok(SignIn::PasswordRequired) => (
                        Some(LoginStep::AwaitingPassword),
                        texts::ASK_PASSWORD.to_string(),
                    ),
                    Err(AccountError::InvalidCode) => (None, texts::INVALID_CODE.to_string()),
                    Err(e) => {
                        tracing::warn!(user_id, error = %e, "Login failed");
                        (None, texts::login_error(&e.to_string()))
                    }
                }
            }
            LoginStep::AwaitingPassword => match accounts.submit_password(user_id, text).await {
                Ok(session) => {
                    self.store.save_session(user_id, session).await;
                    tracing::info!(user_id, "Account logged in with 2FA");
                    (None, texts::LOGIN_SUCCESS_2FA.to_string())
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "2FA login failed");
                    (None, texts::invalid_password(&e.to_string()))
                }
            },
        };

        self.set_login_step(user_id, next).await;
        self.reply(chat_id, &reply, None).await?;
        Ok(())
    }

    async fn set_login_step(&self, user_id: i64, step: Option<LoginStep>) {
        self.store
            .update(user_id, |record| record.login_step = step)
            .await;
    }
}
