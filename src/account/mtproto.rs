//! MTProto account access through grammers

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures::StreamExt;
use grammers_client::types::{Downloadable, LoginToken, Media, PackedChat, PasswordToken};
use grammers_client::{Client, Config, InitParams, SignInError};
use grammers_session::Session;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::config::AccountConfig;
use crate::telegram::ChatRef;

use super::{AccountApi, AccountError, AccountMedia, AccountPost, SignIn};

/// Offset between Bot API channel ids (`-100<id>`) and MTProto channel ids
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

enum LoginStage {
    Code(LoginToken),
    Password(PasswordToken),
}

/// A login waiting for the user's next answer
struct PendingLogin {
    client: Client,
    stage: LoginStage,
}

/// [`AccountApi`] backed by grammers MTProto clients
pub struct MtprotoAccounts {
    api_id: i32,
    api_hash: String,
    pending: Mutex<HashMap<i64, PendingLogin>>,
}

fn remote(e: impl std::fmt::Display) -> AccountError {
    AccountError::Remote(e.to_string())
}

/// MTProto id of a chat given its Bot API id
fn bare_chat_id(id: i64) -> i64 {
    if id <= -CHANNEL_ID_OFFSET {
        -(id + CHANNEL_ID_OFFSET)
    } else {
        id.abs()
    }
}

fn encode_session(client: &Client) -> String {
    STANDARD.encode(client.session().save())
}

fn decode_session(session: &str) -> Result<Session, AccountError> {
    let bytes = STANDARD
        .decode(session)
        .map_err(|e| AccountError::InvalidSession(e.to_string()))?;
    Session::load(&bytes).map_err(|e| AccountError::InvalidSession(e.to_string()))
}

impl MtprotoAccounts {
    pub fn new(config: &AccountConfig) -> Self {
        Self {
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    async fn connect(&self, session: Session) -> Result<Client, AccountError> {
        Client::connect(Config {
            session,
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(remote)
    }

    async fn take_pending(&self, user_id: i64) -> Result<PendingLogin, AccountError> {
        self.pending
            .lock()
            .await
            .remove(&user_id)
            .ok_or(AccountError::NoLogin)
    }

    /// Resolve a chat the account can read.
    ///
    /// Channels referenced by id need an access hash, which only the
    /// account's own dialogs provide.
    async fn resolve(client: &Client, chat: &ChatRef) -> Result<PackedChat, AccountError> {
        match chat {
            ChatRef::Username(name) => client
                .resolve_username(name)
                .await
                .map_err(remote)?
                .map(|resolved| resolved.pack())
                .ok_or_else(|| AccountError::ChatNotFound(chat.clone())),
            ChatRef::Id(id) => {
                let wanted = bare_chat_id(*id);
                let mut dialogs = client.iter_dialogs();
                while let Some(dialog) = dialogs.next().await.map_err(remote)? {
                    if dialog.chat().id() == wanted {
                        return Ok(dialog.chat().pack());
                    }
                }
                Err(AccountError::ChatNotFound(chat.clone()))
            }
        }
    }
}

#[async_trait]
impl AccountApi for MtprotoAccounts {
    #[instrument(skip(self, phone))]
    async fn request_code(&self, user_id: i64, phone: &str) -> Result<(), AccountError> {
        let client = self.connect(Session::new()).await?;
        let token = client.request_login_code(phone).await.map_err(remote)?;
        self.pending.lock().await.insert(
            user_id,
            PendingLogin {
                client,
                stage: LoginStage::Code(token),
            },
        );
        debug!("Login code sent");
        Ok(())
    }

    #[instrument(skip(self, code))]
    async fn submit_code(&self, user_id: i64, code: &str) -> Result<SignIn, AccountError> {
        let PendingLogin { client, stage } = self.take_pending(user_id).await?;
        let LoginStage::Code(token) = stage else {
            return Err(AccountError::NoLogin);
        };

        match client.sign_in(&token, code).await {
            Ok(_) => Ok(SignIn::Complete(encode_session(&client))),
            Err(SignInError::PasswordRequired(password_token)) => {
                self.pending.lock().await.insert(
                    user_id,
                    PendingLogin {
                        client,
                        stage: LoginStage::Password(password_token),
                    },
                );
                Ok(SignIn::PasswordRequired)
            }
            Err(SignInError::InvalidCode) => Err(AccountError::InvalidCode),
            Err(e) => Err(remote(e)),
        }
    }

    #[instrument(skip(self, password))]
    async fn submit_password(&self, user_id: i64, password: &str) -> Result<String, AccountError> {
        let PendingLogin { client, stage } = self.take_pending(user_id).await?;
        let LoginStage::Password(token) = stage else {
            return Err(AccountError::NoLogin);
        };

        match client.check_password(token, password.as_bytes()).await {
            Ok(_) => Ok(encode_session(&client)),
            Err(SignInError::InvalidPassword) => Err(AccountError::InvalidPassword),
            Err(e) => Err(remote(e)),
        }
    }

    async fn abandon_login(&self, user_id: i64) {
        self.pending.lock().await.remove(&user_id);
    }

    #[instrument(skip(self, session))]
    async fn fetch_post(
        &self,
        session: &str,
        chat: &ChatRef,
        message_id: i32,
    ) -> Result<AccountPost, AccountError> {
        let client = self.connect(decode_session(session)?).await?;
        if !client.is_authorized().await.map_err(remote)? {
            return Err(AccountError::Unauthorized);
        }

        let packed = Self::resolve(&client, chat).await?;
        let message = client
            .get_messages_by_id(packed, &[message_id])
            .await
            .map_err(remote)?
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| AccountError::MessageNotFound {
                chat: chat.clone(),
                message_id,
            })?;

        let caption = message.text().to_string();
        let Some(media) = message.media() else {
            return Ok(AccountPost {
                caption,
                media: None,
            });
        };

        let (file_name, size) = match &media {
            Media::Document(document) => {
                let name = document.name();
                (
                    (!name.is_empty()).then(|| name.to_string()),
                    u64::try_from(document.size()).unwrap_or(0),
                )
            }
            _ => (None, 0),
        };

        // The iterator owns a client handle, so the connection lives as long
        // as the stream does
        let chunks = client.iter_download(&Downloadable::Media(media));
        let content = futures::stream::unfold(Some(chunks), |state| async move {
            let mut chunks = state?;
            match chunks.next().await {
                Ok(Some(chunk)) => Some((Ok(Bytes::from(chunk)), Some(chunks))),
                Ok(None) => None,
                Err(e) => Some((Err(remote(e)), None)),
            }
        })
        .boxed();

        Ok(AccountPost {
            caption,
            media: Some(AccountMedia {
                file_name,
                size,
                content,
            }),
        })
    }
}
