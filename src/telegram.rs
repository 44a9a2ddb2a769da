// src/telegram.rs

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Outbound messaging primitives used by the bot and the dispatcher.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Identity check for the configured bot token.
    async fn get_me(&self) -> Result<BotInfo, TelegramError>;

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<SentMessage, TelegramError>;

    async fn set_webhook(&self, url: &str, secret_token: Option<&str>)
        -> Result<bool, TelegramError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// The Bot API answered `ok: false`. Display is the provider's description.
    #[error("{description}")]
    Api {
        code: Option<i64>,
        description: String,
    },
    #[error("request failed: {0}")]
    Transport(reqwest::Error),
    #[error("unexpected response (HTTP {status}): {detail}")]
    Malformed { status: u16, detail: String },
}

/// Only legacy Markdown is produced; see `services::messages::escape_markdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    Markdown,
}

/* -------------------------
   Wire types
--------------------------*/

/// Raw `{ok, result | description}` envelope as sent by the Bot API.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

/// Envelope after boundary conversion.
#[derive(Debug, PartialEq)]
pub enum ApiResult<T> {
    Ok(T),
    Err {
        code: Option<i64>,
        description: String,
    },
}

impl<T> Envelope<T> {
    fn into_result(self) -> ApiResult<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => ApiResult::Ok(result),
            (true, None) => ApiResult::Err {
                code: self.error_code,
                description: "response marked ok without a result".to_string(),
            },
            (false, _) => ApiResult::Err {
                code: self.error_code,
                description: self
                    .description
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInfo {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
    pub chat: Chat,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

/// Inbound update posted to the webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub date: i64,
    pub text: Option<String>,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
}

#[derive(Serialize)]
struct SetWebhookRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_token: Option<&'a str>,
    allowed_updates: &'a [&'a str],
}

/* -------------------------
   HTTP client
--------------------------*/

/// Bot API client. The token is part of every URL, so request errors are
/// stripped of their URL before they leave this module.
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TelegramError::Transport(e.without_url()))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn get<T: DeserializeOwned>(&self, method: &str) -> Result<T, TelegramError> {
        let resp = self
            .http
            .get(self.method_url(method))
            .send()
            .await
            .map_err(|e| TelegramError::Transport(e.without_url()))?;

        Self::read_envelope(resp).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, TelegramError> {
        let resp = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| TelegramError::Transport(e.without_url()))?;

        Self::read_envelope(resp).await
    }

    async fn read_envelope<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, TelegramError> {
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TelegramError::Transport(e.without_url()))?;

        let envelope: Envelope<T> =
            serde_json::from_slice(&bytes).map_err(|e| TelegramError::Malformed {
                status: status.as_u16(),
                detail: e.to_string(),
            })?;

        match envelope.into_result() {
            ApiResult::Ok(v) if status.is_success() => Ok(v),
            ApiResult::Ok(_) => Err(TelegramError::Malformed {
                status: status.as_u16(),
                detail: "non-success status with ok envelope".to_string(),
            }),
            ApiResult::Err { code, description } => Err(TelegramError::Api { code, description }),
        }
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn get_me(&self) -> Result<BotInfo, TelegramError> {
        self.get("getMe").await
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<SentMessage, TelegramError> {
        let body = SendMessageRequest {
            chat_id,
            text,
            parse_mode,
        };
        self.post("sendMessage", &body).await
    }

    async fn set_webhook(
        &self,
        url: &str,
        secret_token: Option<&str>,
    ) -> Result<bool, TelegramError> {
        let body = SetWebhookRequest {
            url,
            secret_token,
            allowed_updates: &["message"],
        };
        self.post("setWebhook", &body).await
    }
}
