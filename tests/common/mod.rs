#![allow(dead_code)]

use paydesk::application::router::Router;
use paydesk::domain::action::CallbackAction;
use paydesk::domain::chat::{
    CallbackEvent, CallbackId, ChatId, Incoming, MessageId, MessageRef, Update, UserId, UserInfo,
};
use paydesk::domain::money::{Amount, Balance};
use paydesk::domain::payment::Token;
use paydesk::domain::ports::{
    Directory, IdSet, QrRenderer, ReplyDirectory, SessionStore, SettingKey, Transport, UserDetails,
};
use paydesk::error::{BotError, Result};
use paydesk::infrastructure::in_memory::{
    InMemoryDirectory, InMemoryReplyLinks, InMemorySessions,
};
use paydesk::infrastructure::recording::{Outbound, PassthroughQr, RecordingTransport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Everything a test needs to drive the bot end to end.
pub struct World {
    pub transport: Arc<RecordingTransport>,
    pub directory: Arc<InMemoryDirectory>,
    pub sessions: Arc<InMemorySessions>,
    pub links: Arc<InMemoryReplyLinks>,
    pub router: Router,
}

impl World {
    pub fn new() -> Self {
        let transport = Arc::new(RecordingTransport::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let sessions = Arc::new(InMemorySessions::new());
        let links = Arc::new(InMemoryReplyLinks::new());
        let router = Router::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&directory) as Arc<dyn Directory>,
            Arc::clone(&sessions) as Arc<dyn SessionStore>,
            Arc::clone(&links) as Arc<dyn ReplyDirectory>,
            Arc::new(PassthroughQr) as Arc<dyn QrRenderer>,
        );
        Self {
            transport,
            directory,
            sessions,
            links,
            router,
        }
    }

    pub async fn seed_admin(&self, id: i64) {
        self.directory.add_member(IdSet::Admins, id).await.unwrap();
    }

    pub async fn seed_upi(&self, upi: &str) {
        self.directory
            .set_setting(SettingKey::UpiId, upi)
            .await
            .unwrap();
    }

    pub async fn register_user(&self, id: i64, username: Option<&str>, first_name: &str) {
        self.transport
            .register_user(UserInfo {
                id: UserId(id),
                username: username.map(str::to_string),
                first_name: first_name.to_string(),
                last_name: None,
            })
            .await;
        self.directory
            .upsert_user(UserId(id), username)
            .await
            .unwrap();
    }

    /// Sends a plain text message through the router.
    pub async fn send(&self, chat: i64, from: i64, text: &str) {
        self.router
            .handle(Update::Message(message(chat, from, text)))
            .await;
    }

    /// Sends a reply message through the router.
    pub async fn send_reply(
        &self,
        chat: i64,
        from: i64,
        text: &str,
        reply_to: i64,
        reply_to_user: Option<i64>,
    ) {
        let mut msg = message(chat, from, text);
        msg.reply_to = Some(MessageId(reply_to));
        msg.reply_to_user = reply_to_user.map(UserId);
        self.router.handle(Update::Message(msg)).await;
    }

    /// Presses an inline button through the router.
    pub async fn press(&self, from: i64, chat: i64, message_id: i64, data: &str) {
        self.router
            .handle(Update::Callback(CallbackEvent {
                id: CallbackId(format!("cb-{from}-{message_id}")),
                from: UserId(from),
                message: MessageRef {
                    chat: ChatId(chat),
                    id: MessageId(message_id),
                },
                data: data.to_string(),
            }))
            .await;
    }

    pub async fn outbox(&self) -> Vec<Outbound> {
        self.transport.outbox().await
    }

    pub async fn texts_to(&self, chat: i64) -> Vec<String> {
        self.transport.texts_to(ChatId(chat)).await
    }

    pub async fn balance_of(&self, user: i64) -> Balance {
        self.directory.balance(UserId(user)).await.unwrap()
    }

    /// The latest photo message sent to `chat`: (message id, caption, payload).
    pub async fn last_photo(&self, chat: i64) -> Option<(i64, String, String)> {
        self.outbox().await.into_iter().rev().find_map(|out| match out {
            Outbound::Photo {
                chat: c,
                id,
                caption,
                payload,
                ..
            } if c == ChatId(chat) => Some((id.0, caption, payload)),
            _ => None,
        })
    }

    /// The fund token from the newest Paid button sent to `chat`.
    pub async fn fund_token(&self, chat: i64) -> Option<Token> {
        let data = self.transport.callback_data_to(ChatId(chat)).await;
        data.into_iter().rev().find_map(|payload| {
            match CallbackAction::parse(&payload) {
                Some(CallbackAction::FundPaid(token)) => Some(token),
                _ => None,
            }
        })
    }

    /// The newest admin review message in `chat`: (message id, accept token).
    pub async fn review_message(&self, chat: i64) -> Option<(i64, Token)> {
        self.outbox().await.into_iter().rev().find_map(|out| match out {
            Outbound::Message {
                chat: c,
                id,
                markup: paydesk::domain::chat::Markup::Inline(keyboard),
                ..
            } if c == ChatId(chat) => keyboard.callback_data().iter().find_map(|data| {
                match CallbackAction::parse(data) {
                    Some(CallbackAction::FundAccept(token)) => Some((id.0, token)),
                    _ => None,
                }
            }),
            _ => None,
        })
    }

    /// Every callback answer recorded so far: (text, alert).
    pub async fn callback_answers(&self) -> Vec<(Option<String>, bool)> {
        self.outbox()
            .await
            .into_iter()
            .filter_map(|out| match out {
                Outbound::CallbackAnswer { text, alert, .. } => Some((text, alert)),
                _ => None,
            })
            .collect()
    }

    /// Queues `text` as the user's next awaited message.
    pub async fn queue_reply(&self, user: i64, text: &str) {
        self.transport
            .queue_message(Incoming {
                chat: ChatId(user),
                from: UserId(user),
                id: MessageId(9_000 + user),
                text: Some(text.to_string()),
                reply_to: None,
                reply_to_user: None,
            })
            .await;
    }
}

/// Wires a router over a custom directory port; returns the pieces the
/// test needs to drive and observe it.
pub fn router_with_directory(
    directory: Arc<dyn Directory>,
) -> (Router, Arc<RecordingTransport>, Arc<InMemorySessions>) {
    let transport = Arc::new(RecordingTransport::new());
    let sessions = Arc::new(InMemorySessions::new());
    let router = Router::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        directory,
        Arc::clone(&sessions) as Arc<dyn SessionStore>,
        Arc::new(InMemoryReplyLinks::new()) as Arc<dyn ReplyDirectory>,
        Arc::new(PassthroughQr) as Arc<dyn QrRenderer>,
    );
    (router, transport, sessions)
}

pub fn message(chat: i64, from: i64, text: &str) -> Incoming {
    // Message ids from tests live in their own range so they never collide
    // with transport-allocated ids.
    static NEXT: std::sync::atomic::AtomicI64 = std::sync::atomic::AtomicI64::new(50_000);
    Incoming {
        chat: ChatId(chat),
        from: UserId(from),
        id: MessageId(NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed)),
        text: Some(text.to_string()),
        reply_to: None,
        reply_to_user: None,
    }
}

/// Directory wrapper whose `credit` can be told to fail once, for the
/// approved-but-not-credited path.
pub struct FlakyDirectory {
    inner: InMemoryDirectory,
    fail_credit: AtomicBool,
}

impl FlakyDirectory {
    pub fn new() -> Self {
        Self {
            inner: InMemoryDirectory::new(),
            fail_credit: AtomicBool::new(false),
        }
    }

    pub fn fail_next_credit(&self) {
        self.fail_credit.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Directory for FlakyDirectory {
    async fn upsert_user(&self, id: UserId, username: Option<&str>) -> Result<()> {
        self.inner.upsert_user(id, username).await
    }
    async fn user_exists(&self, id: UserId) -> Result<bool> {
        self.inner.user_exists(id).await
    }
    async fn user_details(&self, id: UserId) -> Result<Option<UserDetails>> {
        self.inner.user_details(id).await
    }
    async fn user_count(&self) -> Result<usize> {
        self.inner.user_count().await
    }
    async fn all_users(&self) -> Result<Vec<UserId>> {
        self.inner.all_users().await
    }
    async fn set_banned(&self, id: UserId, banned: bool) -> Result<()> {
        self.inner.set_banned(id, banned).await
    }
    async fn is_banned(&self, id: UserId) -> Result<bool> {
        self.inner.is_banned(id).await
    }
    async fn balance(&self, id: UserId) -> Result<Balance> {
        self.inner.balance(id).await
    }
    async fn set_balance(&self, id: UserId, balance: Balance) -> Result<()> {
        self.inner.set_balance(id, balance).await
    }
    async fn credit(&self, id: UserId, amount: Amount) -> Result<Balance> {
        if self.fail_credit.swap(false, Ordering::SeqCst) {
            return Err(BotError::Storage("simulated outage".to_string()));
        }
        self.inner.credit(id, amount).await
    }
    async fn debit_floor(&self, id: UserId, amount: Amount) -> Result<Balance> {
        self.inner.debit_floor(id, amount).await
    }
    async fn setting(&self, key: SettingKey) -> Result<Option<String>> {
        self.inner.setting(key).await
    }
    async fn set_setting(&self, key: SettingKey, value: &str) -> Result<()> {
        self.inner.set_setting(key, value).await
    }
    async fn add_member(&self, set: IdSet, id: i64) -> Result<()> {
        self.inner.add_member(set, id).await
    }
    async fn remove_member(&self, set: IdSet, id: i64) -> Result<()> {
        self.inner.remove_member(set, id).await
    }
    async fn members(&self, set: IdSet) -> Result<Vec<i64>> {
        self.inner.members(set).await
    }
    async fn contains(&self, set: IdSet, id: i64) -> Result<bool> {
        self.inner.contains(set, id).await
    }
}
