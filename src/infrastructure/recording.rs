use crate::domain::chat::{
    CallbackId, ChatId, ChatInfo, Incoming, Markup, MemberStatus, MessageId, MessageRef, Press,
    UserId, UserInfo,
};
use crate::domain::ports::{QrImage, QrRenderer, Transport};
use crate::error::{BotError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Everything the bot pushed out through the transport, in order.
///
/// Serialized as JSON lines by the replay harness; inspected directly by
/// the integration tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Outbound {
    Message {
        chat: ChatId,
        id: MessageId,
        text: String,
        markup: Markup,
    },
    Photo {
        chat: ChatId,
        id: MessageId,
        caption: String,
        payload: String,
        markup: Markup,
    },
    EditText {
        chat: ChatId,
        message: MessageId,
        text: String,
        markup: Markup,
    },
    EditCaption {
        chat: ChatId,
        message: MessageId,
        caption: String,
    },
    EditMedia {
        chat: ChatId,
        message: MessageId,
        caption: String,
        payload: String,
        markup: Markup,
    },
    ClearMarkup {
        chat: ChatId,
        message: MessageId,
    },
    Delete {
        chat: ChatId,
        message: MessageId,
    },
    CallbackAnswer {
        callback: CallbackId,
        text: Option<String>,
        alert: bool,
    },
    Copy {
        to: ChatId,
        id: MessageId,
        from_chat: ChatId,
        message: MessageId,
        reply_to: Option<MessageId>,
    },
}

#[derive(Default)]
struct TransportState {
    outbox: Vec<Outbound>,
    queued: HashMap<UserId, VecDeque<Incoming>>,
    users: HashMap<UserId, UserInfo>,
    usernames: HashMap<String, UserId>,
    chats: HashMap<ChatId, ChatInfo>,
    chat_handles: HashMap<String, ChatId>,
    memberships: HashMap<(ChatId, UserId), MemberStatus>,
    unreachable: HashSet<ChatId>,
    next_message_id: i64,
}

impl TransportState {
    fn reachable(&self, chat: ChatId) -> Result<()> {
        if self.unreachable.contains(&chat) {
            Err(BotError::Transport(format!("chat {chat} unreachable")))
        } else {
            Ok(())
        }
    }

    fn allocate(&mut self, chat: ChatId) -> MessageRef {
        self.next_message_id += 1;
        MessageRef {
            chat,
            id: MessageId(self.next_message_id),
        }
    }
}

/// Transport double backing both the replay harness and the tests.
///
/// Inbound traffic is scripted through `queue_message`; outbound calls are
/// recorded verbatim. Chats marked unreachable make every call targeting
/// them fail, which is how the per-recipient failure-isolation paths get
/// exercised.
#[derive(Default, Clone)]
pub struct RecordingTransport {
    state: Arc<RwLock<TransportState>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_user(&self, info: UserInfo) {
        let mut state = self.state.write().await;
        if let Some(username) = &info.username {
            state.usernames.insert(username.clone(), info.id);
        }
        state.users.insert(info.id, info);
    }

    pub async fn register_chat(&self, info: ChatInfo) {
        let mut state = self.state.write().await;
        if let Some(username) = &info.username {
            state.chat_handles.insert(username.clone(), info.id);
        }
        state.chats.insert(info.id, info);
    }

    pub async fn set_member(&self, chat: ChatId, user: UserId, status: MemberStatus) {
        self.state
            .write()
            .await
            .memberships
            .insert((chat, user), status);
    }

    pub async fn make_unreachable(&self, chat: ChatId) {
        self.state.write().await.unreachable.insert(chat);
    }

    /// Queues a message to be returned by `next_message_from`.
    pub async fn queue_message(&self, incoming: Incoming) {
        self.state
            .write()
            .await
            .queued
            .entry(incoming.from)
            .or_default()
            .push_back(incoming);
    }

    pub async fn outbox(&self) -> Vec<Outbound> {
        self.state.read().await.outbox.clone()
    }

    pub async fn drain(&self) -> Vec<Outbound> {
        std::mem::take(&mut self.state.write().await.outbox)
    }

    /// Text of every plain message sent to `chat`, in order.
    pub async fn texts_to(&self, chat: ChatId) -> Vec<String> {
        self.state
            .read()
            .await
            .outbox
            .iter()
            .filter_map(|out| match out {
                Outbound::Message { chat: c, text, .. } if *c == chat => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Callback payloads from every keyboard sent or edited into `chat`.
    pub async fn callback_data_to(&self, chat: ChatId) -> Vec<String> {
        let state = self.state.read().await;
        let mut data = Vec::new();
        for out in &state.outbox {
            let (c, markup) = match out {
                Outbound::Message { chat, markup, .. }
                | Outbound::Photo { chat, markup, .. }
                | Outbound::EditText { chat, markup, .. }
                | Outbound::EditMedia { chat, markup, .. } => (chat, markup),
                _ => continue,
            };
            if *c != chat {
                continue;
            }
            if let Markup::Inline(keyboard) = markup {
                for row in &keyboard.rows {
                    for button in row {
                        if let Press::Callback(payload) = &button.press {
                            data.push(payload.clone());
                        }
                    }
                }
            }
        }
        data
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, chat: ChatId, text: &str, markup: Markup) -> Result<MessageRef> {
        let mut state = self.state.write().await;
        state.reachable(chat)?;
        let message = state.allocate(chat);
        state.outbox.push(Outbound::Message {
            chat,
            id: message.id,
            text: text.to_string(),
            markup,
        });
        Ok(message)
    }

    async fn send_photo(
        &self,
        chat: ChatId,
        image: &QrImage,
        caption: &str,
        markup: Markup,
    ) -> Result<MessageRef> {
        let mut state = self.state.write().await;
        state.reachable(chat)?;
        let message = state.allocate(chat);
        state.outbox.push(Outbound::Photo {
            chat,
            id: message.id,
            caption: caption.to_string(),
            payload: String::from_utf8_lossy(&image.0).into_owned(),
            markup,
        });
        Ok(message)
    }

    async fn edit_text(&self, message: &MessageRef, text: &str, markup: Markup) -> Result<()> {
        let mut state = self.state.write().await;
        state.reachable(message.chat)?;
        state.outbox.push(Outbound::EditText {
            chat: message.chat,
            message: message.id,
            text: text.to_string(),
            markup,
        });
        Ok(())
    }

    async fn edit_caption(&self, message: &MessageRef, caption: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.reachable(message.chat)?;
        state.outbox.push(Outbound::EditCaption {
            chat: message.chat,
            message: message.id,
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn edit_media(
        &self,
        message: &MessageRef,
        image: &QrImage,
        caption: &str,
        markup: Markup,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.reachable(message.chat)?;
        state.outbox.push(Outbound::EditMedia {
            chat: message.chat,
            message: message.id,
            caption: caption.to_string(),
            payload: String::from_utf8_lossy(&image.0).into_owned(),
            markup,
        });
        Ok(())
    }

    async fn clear_markup(&self, message: &MessageRef) -> Result<()> {
        let mut state = self.state.write().await;
        state.reachable(message.chat)?;
        state.outbox.push(Outbound::ClearMarkup {
            chat: message.chat,
            message: message.id,
        });
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<()> {
        let mut state = self.state.write().await;
        state.reachable(message.chat)?;
        state.outbox.push(Outbound::Delete {
            chat: message.chat,
            message: message.id,
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback: &CallbackId,
        text: Option<&str>,
        alert: bool,
    ) -> Result<()> {
        self.state.write().await.outbox.push(Outbound::CallbackAnswer {
            callback: callback.clone(),
            text: text.map(str::to_string),
            alert,
        });
        Ok(())
    }

    async fn copy_message(
        &self,
        to: ChatId,
        source: &MessageRef,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef> {
        let mut state = self.state.write().await;
        state.reachable(to)?;
        let message = state.allocate(to);
        state.outbox.push(Outbound::Copy {
            to,
            id: message.id,
            from_chat: source.chat,
            message: source.id,
            reply_to,
        });
        Ok(message)
    }

    async fn next_message_from(
        &self,
        user: UserId,
        _timeout: Duration,
    ) -> Result<Option<Incoming>> {
        // Scripted: an empty queue stands in for the window elapsing.
        let mut state = self.state.write().await;
        Ok(state.queued.get_mut(&user).and_then(VecDeque::pop_front))
    }

    async fn user_info(&self, user: UserId) -> Result<UserInfo> {
        self.state
            .read()
            .await
            .users
            .get(&user)
            .cloned()
            .ok_or_else(|| BotError::Transport(format!("unknown user {user}")))
    }

    async fn chat_info(&self, chat: ChatId) -> Result<ChatInfo> {
        self.state
            .read()
            .await
            .chats
            .get(&chat)
            .cloned()
            .ok_or_else(|| BotError::Transport(format!("unknown chat {chat}")))
    }

    async fn member_status(&self, chat: ChatId, user: UserId) -> Result<MemberStatus> {
        self.state
            .read()
            .await
            .memberships
            .get(&(chat, user))
            .copied()
            .ok_or_else(|| BotError::Transport(format!("no membership info for {user} in {chat}")))
    }

    async fn create_invite_link(&self, chat: ChatId) -> Result<String> {
        let state = self.state.read().await;
        state.reachable(chat)?;
        Ok(format!("https://t.me/joinchat/{}", chat.0.unsigned_abs()))
    }

    async fn resolve_username(&self, handle: &str) -> Result<Option<UserId>> {
        let handle = handle.trim_start_matches('@');
        Ok(self.state.read().await.usernames.get(handle).copied())
    }

    async fn resolve_chat(&self, handle: &str) -> Result<Option<ChatInfo>> {
        let state = self.state.read().await;
        if let Ok(id) = handle.parse::<i64>() {
            return Ok(state.chats.get(&ChatId(id)).cloned());
        }
        let handle = handle.trim_start_matches('@');
        Ok(state
            .chat_handles
            .get(handle)
            .and_then(|id| state.chats.get(id))
            .cloned())
    }
}

/// Hands the QR payload through as bytes.
///
/// Real deployments plug a rasterizer here; the core and the replay
/// transcript only care about the payload string.
#[derive(Default, Clone, Copy)]
pub struct PassthroughQr;

impl QrRenderer for PassthroughQr {
    fn render(&self, payload: &str) -> Result<QrImage> {
        Ok(QrImage(payload.as_bytes().to_vec()))
    }
}
