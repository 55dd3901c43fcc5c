use crate::domain::chat::{
    CallbackId, ChatId, ChatInfo, Incoming, Markup, MemberStatus, MessageId, MessageRef, UserId,
    UserInfo,
};
use crate::domain::money::{Amount, Balance};
use crate::domain::payment::{FundRequest, RequestState, Token};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rendered QR image, opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImage(pub Vec<u8>);

/// Renders an arbitrary payload string into a scannable image.
///
/// Rasterization itself is a deployment concern; the core only hands the
/// payload over and attaches whatever comes back to a photo message.
pub trait QrRenderer: Send + Sync {
    fn render(&self, payload: &str) -> Result<QrImage>;
}

/// The chat platform, reduced to the calls the workflows actually make.
///
/// Every method suspends and every method can fail on its own; callers
/// decide per call site whether a failure is swallowed, reported, or both.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, chat: ChatId, text: &str, markup: Markup) -> Result<MessageRef>;
    async fn send_photo(
        &self,
        chat: ChatId,
        image: &QrImage,
        caption: &str,
        markup: Markup,
    ) -> Result<MessageRef>;
    async fn edit_text(&self, message: &MessageRef, text: &str, markup: Markup) -> Result<()>;
    async fn edit_caption(&self, message: &MessageRef, caption: &str) -> Result<()>;
    async fn edit_media(
        &self,
        message: &MessageRef,
        image: &QrImage,
        caption: &str,
        markup: Markup,
    ) -> Result<()>;
    async fn clear_markup(&self, message: &MessageRef) -> Result<()>;
    async fn delete_message(&self, message: &MessageRef) -> Result<()>;
    /// Acknowledges a button press, optionally with a toast or blocking alert.
    async fn answer_callback(
        &self,
        callback: &CallbackId,
        text: Option<&str>,
        alert: bool,
    ) -> Result<()>;
    /// Re-sends an existing message into another chat, media included.
    async fn copy_message(
        &self,
        to: ChatId,
        source: &MessageRef,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef>;
    /// Waits for the next message from `user`; `Ok(None)` means the window
    /// elapsed without one.
    async fn next_message_from(&self, user: UserId, timeout: Duration) -> Result<Option<Incoming>>;
    async fn user_info(&self, user: UserId) -> Result<UserInfo>;
    async fn chat_info(&self, chat: ChatId) -> Result<ChatInfo>;
    async fn member_status(&self, chat: ChatId, user: UserId) -> Result<MemberStatus>;
    async fn create_invite_link(&self, chat: ChatId) -> Result<String>;
    /// Resolves `@handle` (or bare handle) to a user id, if the platform
    /// knows it.
    async fn resolve_username(&self, handle: &str) -> Result<Option<UserId>>;
    /// Resolves a channel handle or numeric id string to a chat.
    async fn resolve_chat(&self, handle: &str) -> Result<Option<ChatInfo>>;
}

/// Named id-sets kept in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSet {
    Admins,
    ForceSub,
}

/// Free-form settings kept in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    Welcome,
    Stock,
    UpiId,
}

impl SettingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Stock => "stock",
            Self::UpiId => "upi_id",
        }
    }
}

/// Compact per-user view for the admin `/user` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDetails {
    pub id: UserId,
    pub username: Option<String>,
    pub banned: bool,
    pub balance: Balance,
}

/// The remote user/balance/settings document store.
///
/// All writes are upserts; `credit` must be atomic at the store level.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn upsert_user(&self, id: UserId, username: Option<&str>) -> Result<()>;
    async fn user_exists(&self, id: UserId) -> Result<bool>;
    async fn user_details(&self, id: UserId) -> Result<Option<UserDetails>>;
    async fn user_count(&self) -> Result<usize>;
    async fn all_users(&self) -> Result<Vec<UserId>>;

    async fn set_banned(&self, id: UserId, banned: bool) -> Result<()>;
    async fn is_banned(&self, id: UserId) -> Result<bool>;

    async fn balance(&self, id: UserId) -> Result<Balance>;
    async fn set_balance(&self, id: UserId, balance: Balance) -> Result<()>;
    /// Atomically adds `amount` and returns the new balance.
    async fn credit(&self, id: UserId, amount: Amount) -> Result<Balance>;
    /// Atomically subtracts `amount`, flooring at zero, and returns the new
    /// balance.
    async fn debit_floor(&self, id: UserId, amount: Amount) -> Result<Balance>;

    async fn setting(&self, key: SettingKey) -> Result<Option<String>>;
    async fn set_setting(&self, key: SettingKey, value: &str) -> Result<()>;

    async fn add_member(&self, set: IdSet, id: i64) -> Result<()>;
    async fn remove_member(&self, set: IdSet, id: i64) -> Result<()>;
    async fn members(&self, set: IdSet) -> Result<Vec<i64>>;
    async fn contains(&self, set: IdSet, id: i64) -> Result<bool>;
}

/// In-place edit applied to a live fund request under the store's lock.
pub type Mutator = Box<dyn FnOnce(&mut FundRequest) + Send>;

/// Ephemeral token-correlated state for fund requests.
///
/// Process-local by design: a restart drops every in-flight request. The
/// compare-and-swap/compare-and-delete operations are the only way to move
/// a request between states, which is what makes "exactly one admin
/// decision wins" hold without any locking in the workflow itself.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a new record and returns its freshly generated token.
    async fn create(&self, request: FundRequest) -> Token;
    async fn get(&self, token: &Token) -> Option<FundRequest>;
    /// Applies `mutate` to the live record and returns the updated copy;
    /// `None` when the token is gone (expired and unknown look the same).
    async fn update(&self, token: &Token, mutate: Mutator) -> Option<FundRequest>;
    /// Compare-and-swap: applies `mutate` and moves the record from
    /// `expected` to `next` in one step, or does nothing.
    async fn advance(
        &self,
        token: &Token,
        expected: RequestState,
        next: RequestState,
        mutate: Mutator,
    ) -> Option<FundRequest>;
    /// Compare-and-delete: removes and returns the record only if it is
    /// still in `expected`. At most one concurrent caller gets it.
    async fn take_if(&self, token: &Token, expected: RequestState) -> Option<FundRequest>;
    async fn delete(&self, token: &Token) -> Option<FundRequest>;
}

/// Key of a message the bot relayed into an admin's chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkKey {
    pub chat: ChatId,
    pub message: MessageId,
}

impl LinkKey {
    pub fn of(message: &MessageRef) -> Self {
        Self {
            chat: message.chat,
            message: message.id,
        }
    }
}

/// Maps relayed messages back to their original sender so a plain reply in
/// an admin chat can be routed over a transport with no session concept.
#[async_trait]
pub trait ReplyDirectory: Send + Sync {
    async fn link(&self, key: LinkKey, requester: UserId);
    /// `None` means "not a tracked relay"; the caller must stay silent.
    async fn resolve(&self, key: &LinkKey) -> Option<UserId>;
}
