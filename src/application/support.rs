use crate::domain::action::CallbackAction;
use crate::domain::chat::{
    Button, CallbackEvent, ChatId, Incoming, InlineKeyboard, Markup, MessageRef, UserId, UserInfo,
};
use crate::domain::ports::{Directory, IdSet, LinkKey, ReplyDirectory, Transport};
use crate::error::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

/// How long a reply-button press waits for the admin's message.
const REPLY_WINDOW: Duration = Duration::from_secs(120);

const SUPPORT_ACTIVE_TEXT: &str = "🆘 Support mode is on.\n\
     Send any message and an admin will reply here.\n\n\
     Tap Close to leave support mode.";

fn keyboard_active() -> InlineKeyboard {
    InlineKeyboard::new().row(vec![Button::callback(
        "🔴 Close",
        CallbackAction::SupportClose.encode(),
    )])
}

fn keyboard_reopen() -> InlineKeyboard {
    InlineKeyboard::new().row(vec![
        Button::callback("🆘 Reply to Support", CallbackAction::SupportOpen.encode()),
        Button::callback("🔴 Close", CallbackAction::SupportClose.encode()),
    ])
}

/// User-to-admin messaging relay.
///
/// The transport has no conversation concept, so every message relayed into
/// an admin chat is linked back to its sender in the reply directory; an
/// admin answering with a plain reply (or the Reply button) is routed to
/// the right user from that link. Support mode itself is process-local
/// state and is lost on restart, like the fund-request sessions.
pub struct SupportDesk {
    transport: Arc<dyn Transport>,
    directory: Arc<dyn Directory>,
    links: Arc<dyn ReplyDirectory>,
    active: RwLock<HashSet<UserId>>,
}

impl SupportDesk {
    pub fn new(
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
        links: Arc<dyn ReplyDirectory>,
    ) -> Self {
        Self {
            transport,
            directory,
            links,
            active: RwLock::new(HashSet::new()),
        }
    }

    pub async fn is_active(&self, user: UserId) -> bool {
        self.active.read().await.contains(&user)
    }

    async fn activate(&self, user: UserId) {
        self.active.write().await.insert(user);
    }

    async fn deactivate(&self, user: UserId) {
        self.active.write().await.remove(&user);
    }

    /// `/support`
    pub async fn open_via_command(&self, msg: &Incoming) -> Result<()> {
        self.activate(msg.from).await;
        self.transport
            .send_message(
                msg.chat,
                SUPPORT_ACTIVE_TEXT,
                Markup::Inline(keyboard_active()),
            )
            .await?;
        Ok(())
    }

    pub async fn on_open(&self, event: &CallbackEvent) -> Result<()> {
        self.activate(event.from).await;
        let markup = Markup::Inline(keyboard_active());
        let edited = self
            .transport
            .edit_text(&event.message, SUPPORT_ACTIVE_TEXT, markup.clone())
            .await;
        if edited.is_err() {
            let _ = self
                .transport
                .send_message(event.message.chat, SUPPORT_ACTIVE_TEXT, markup)
                .await;
        }
        let _ = self
            .transport
            .answer_callback(&event.id, Some("Support mode enabled."), false)
            .await;
        Ok(())
    }

    pub async fn on_close(&self, event: &CallbackEvent) -> Result<()> {
        self.deactivate(event.from).await;
        let closed = "✅ Support mode closed.";
        if self
            .transport
            .edit_text(&event.message, closed, Markup::None)
            .await
            .is_err()
        {
            let _ = self
                .transport
                .send_message(event.message.chat, closed, Markup::None)
                .await;
        }
        let _ = self
            .transport
            .answer_callback(&event.id, Some("Closed."), false)
            .await;
        Ok(())
    }

    /// Relays a support-mode message to every admin: a header identifying
    /// the sender, then a copy of the message as a reply to it. Both
    /// outbound ids are linked so either can be replied to.
    pub async fn relay_from_user(&self, msg: &Incoming) -> Result<()> {
        let admins = match self.directory.members(IdSet::Admins).await {
            Ok(admins) => admins,
            Err(err) => {
                warn!(error = %err, "could not load admin list");
                return Ok(());
            }
        };

        let who = self.transport.user_info(msg.from).await.ok();
        let name = who
            .as_ref()
            .map(UserInfo::full_name)
            .unwrap_or_else(|| "No Name".to_string());
        let handle = who
            .as_ref()
            .map(UserInfo::handle)
            .unwrap_or_else(|| "(no username)".to_string());
        let header = format!(
            "📩 Support message\n\
             From: {name} {handle}\n\
             User id: {id}",
            id = msg.from,
        );
        let keyboard = InlineKeyboard::new().row(vec![Button::callback(
            "✉️ Reply",
            CallbackAction::SupportReply(msg.from).encode(),
        )]);
        let source = MessageRef {
            chat: msg.chat,
            id: msg.id,
        };

        for admin in admins {
            let chat = ChatId(admin);
            let header_ref = match self
                .transport
                .send_message(chat, &header, Markup::Inline(keyboard.clone()))
                .await
            {
                Ok(sent) => sent,
                Err(err) => {
                    // Delivery failures are isolated per admin.
                    warn!(admin, error = %err, "failed to relay support message");
                    continue;
                }
            };
            self.links.link(LinkKey::of(&header_ref), msg.from).await;

            match self
                .transport
                .copy_message(chat, &source, Some(header_ref.id))
                .await
            {
                Ok(copy_ref) => self.links.link(LinkKey::of(&copy_ref), msg.from).await,
                Err(err) => warn!(admin, error = %err, "failed to copy support message"),
            }
        }

        if msg.text.is_some() {
            let _ = self
                .transport
                .send_message(
                    msg.chat,
                    "📨 Sent to support. Please wait for a reply.",
                    Markup::None,
                )
                .await;
        }
        Ok(())
    }

    /// An admin replied to something in their chat. Returns `false` when the
    /// replied-to message is not a tracked relay, in which case the caller
    /// must stay silent; not every reply is support traffic.
    pub async fn route_admin_reply(&self, msg: &Incoming) -> Result<bool> {
        let Some(reply_to) = msg.reply_to else {
            return Ok(false);
        };
        let key = LinkKey {
            chat: msg.chat,
            message: reply_to,
        };
        let Some(user) = self.links.resolve(&key).await else {
            return Ok(false);
        };

        let source = MessageRef {
            chat: msg.chat,
            id: msg.id,
        };
        self.deliver_to_user(user, &source, msg.chat).await;
        Ok(true)
    }

    /// Reply button on a relayed message: wait for the admin's next message
    /// and forward it to the target user.
    pub async fn on_reply_button(&self, event: &CallbackEvent, target: UserId) -> Result<()> {
        let _ = self
            .transport
            .answer_callback(&event.id, Some("Send your reply now."), false)
            .await;

        let Some(reply) = self
            .transport
            .next_message_from(event.from, REPLY_WINDOW)
            .await?
        else {
            let _ = self
                .transport
                .send_message(
                    event.message.chat,
                    "⏳ Timed out waiting for your reply.",
                    Markup::None,
                )
                .await;
            return Ok(());
        };

        let source = MessageRef {
            chat: reply.chat,
            id: reply.id,
        };
        self.deliver_to_user(target, &source, event.message.chat)
            .await;
        Ok(())
    }

    async fn deliver_to_user(&self, user: UserId, source: &MessageRef, admin_chat: ChatId) {
        // Keep the conversation open so the user can answer right away.
        self.activate(user).await;

        let chat = ChatId::from(user);
        match self.transport.copy_message(chat, source, None).await {
            Ok(_) => {
                let _ = self
                    .transport
                    .send_message(
                        chat,
                        "👨‍💼 An admin replied. You can respond below.",
                        Markup::Inline(keyboard_reopen()),
                    )
                    .await;
                let _ = self
                    .transport
                    .send_message(admin_chat, "✅ Sent to user.", Markup::None)
                    .await;
            }
            Err(err) => {
                warn!(%user, error = %err, "failed to deliver admin reply");
                let _ = self
                    .transport
                    .send_message(admin_chat, "❌ Failed to deliver to user.", Markup::None)
                    .await;
            }
        }
    }
}
