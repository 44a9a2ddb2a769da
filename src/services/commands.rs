// src/services/commands.rs

use crate::db::Store;
use crate::models::{Branding, NotificationStatus};
use crate::phone;
use crate::services::{connection, directory, messages};
use crate::telegram::{IncomingMessage, Messenger, ParseMode};

/// How many recent notifications `/status` summarizes.
pub const STATUS_WINDOW: i64 = 10;

#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// `/start` with the second space-separated token, if any.
    Start(Option<&'a str>),
    Help,
    Status,
    Stop,
    Unknown,
}

pub fn parse(text: &str) -> Command<'_> {
    let text = text.trim();

    if text.starts_with("/start") {
        return Command::Start(text.split(' ').nth(1));
    }

    match text {
        "/help" => Command::Help,
        "/status" => Command::Status,
        "/stop" => Command::Stop,
        _ => Command::Unknown,
    }
}

/// Chat protocol over one inbound message. Holds no state of its own;
/// everything persistent goes through the store.
pub struct CommandInterpreter<'a> {
    pub store: &'a dyn Store,
    pub messenger: &'a dyn Messenger,
    pub branding: &'a Branding,
}

impl CommandInterpreter<'_> {
    /// Runs the command carried by `msg` and sends the reply.
    /// Messages without text are ignored. Never fails: errors end up in the
    /// log and, where possible, in the reply.
    pub async fn handle(&self, msg: &IncomingMessage) {
        let Some(text) = msg.text.as_deref() else {
            return;
        };

        let chat_id = msg.chat.id.to_string();
        let username = msg.from.as_ref().and_then(|u| u.username.as_deref());
        tracing::info!(
            chat_id = %chat_id,
            sender = msg.from.as_ref().map(|u| u.id),
            "inbound chat message"
        );

        let reply = self.respond(&chat_id, username, text).await;

        if let Err(e) = self
            .messenger
            .send_message(&chat_id, &reply, Some(ParseMode::Markdown))
            .await
        {
            tracing::error!(chat_id = %chat_id, error = %e, "failed to send reply");
        }
    }

    /// Applies the command and returns the reply text.
    pub async fn respond(&self, chat_id: &str, username: Option<&str>, text: &str) -> String {
        match parse(text) {
            Command::Start(arg) => self.start(chat_id, username, arg).await,
            Command::Help => messages::help(self.branding),
            Command::Status => self.status(chat_id).await,
            Command::Stop => self.stop(chat_id).await,
            Command::Unknown => messages::COMMAND_MENU.to_string(),
        }
    }

    async fn start(&self, chat_id: &str, username: Option<&str>, arg: Option<&str>) -> String {
        let Some(phone_arg) = arg else {
            return messages::welcome(self.branding);
        };

        if !phone::is_start_argument_valid(phone_arg) {
            return messages::INVALID_PHONE.to_string();
        }

        // Matching is on the raw argument. Surface the cases where the
        // normalized form would differ.
        if phone::normalize(phone_arg) != phone_arg {
            tracing::warn!(chat_id, "/start argument is not in normalized form");
        }

        let patient = match directory::find_by_phone(self.store, phone_arg).await {
            Ok(Some(p)) => p,
            Ok(None) => return messages::PHONE_NOT_FOUND.to_string(),
            Err(_) => return messages::GENERIC_FAILURE.to_string(),
        };

        match connection::connect(self.store, &patient, chat_id, username).await {
            Ok(updated) => messages::connected(&updated.full_name),
            Err(e) => {
                tracing::error!(patient_id = %patient.id, error = %e, "connect failed");
                messages::CONNECT_FAILED.to_string()
            }
        }
    }

    async fn status(&self, chat_id: &str) -> String {
        let patient = match directory::find_by_chat(self.store, chat_id).await {
            Ok(Some(p)) => p,
            Ok(None) => return messages::STATUS_NOT_CONNECTED.to_string(),
            Err(_) => return messages::STATUS_FAILED.to_string(),
        };

        let recent = match self.store.recent_notifications(patient.id, STATUS_WINDOW).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(patient_id = %patient.id, error = %e, "status read failed");
                return messages::STATUS_FAILED.to_string();
            }
        };

        let delivered = recent
            .iter()
            .filter(|n| n.status == NotificationStatus::Delivered)
            .count();

        messages::status(&patient, recent.len(), delivered)
    }

    async fn stop(&self, chat_id: &str) -> String {
        let patient = match directory::find_by_chat(self.store, chat_id).await {
            Ok(Some(p)) => p,
            Ok(None) => return messages::STOP_NOT_CONNECTED.to_string(),
            Err(_) => return messages::GENERIC_FAILURE.to_string(),
        };

        match connection::disconnect(self.store, &patient).await {
            Ok(_) => messages::DISCONNECTED.to_string(),
            Err(e) => {
                tracing::error!(patient_id = %patient.id, error = %e, "disconnect failed");
                messages::DISCONNECT_FAILED.to_string()
            }
        }
    }
}
