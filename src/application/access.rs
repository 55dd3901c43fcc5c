use crate::domain::action::{
    CallbackAction, MENU_ADD_FUNDS, MENU_BUY_DIAMONDS, MENU_CHECK_BALANCE, MENU_HOW_TO_USE,
    MENU_STOCK,
};
use crate::domain::chat::{
    Button, CallbackEvent, ChatId, Incoming, InlineKeyboard, Markup, MenuKeyboard, UserId,
};
use crate::domain::ports::{Directory, IdSet, SettingKey, Transport};
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, warn};

const BANNED_TEXT: &str = "🚫 You are banned from using this bot. Please contact an admin.";
const LOCKED_TEXT: &str = "🚪 Access locked — join to use the bot.\n\n\
     Please join the required channel(s) below. After joining, tap Try Again.";
const STILL_LOCKED_TEXT: &str = "⏳ Still locked — you haven't joined all required channel(s) yet.\n\n\
     Join them below, then tap Try Again.";
const DEFAULT_WELCOME: &str = "🔥 Welcome to the shop! Use the menu below to get started.";
const DEFAULT_STOCK: &str = "📦 Stock list is being updated. Check back soon.";
const HOW_TO_USE_TEXT: &str = "ℹ️ How to use this bot\n\
     1. Tap ADD FUNDS and pay the QR code shown.\n\
     2. Tap Paid — an admin confirms your payment and your balance is credited.\n\
     3. Check STOCK for what's available and place your order through support.\n\
     4. CHECK BALANCE shows your current funds at any time.";

fn main_menu() -> MenuKeyboard {
    MenuKeyboard {
        rows: vec![
            vec![MENU_ADD_FUNDS.to_string()],
            vec![MENU_BUY_DIAMONDS.to_string(), MENU_CHECK_BALANCE.to_string()],
            vec![MENU_HOW_TO_USE.to_string(), MENU_STOCK.to_string()],
        ],
    }
}

/// `/start` bootstrap, ban gate and the force-subscribe membership gate.
pub struct AccessGate {
    transport: Arc<dyn Transport>,
    directory: Arc<dyn Directory>,
}

impl AccessGate {
    pub fn new(transport: Arc<dyn Transport>, directory: Arc<dyn Directory>) -> Self {
        Self {
            transport,
            directory,
        }
    }

    pub async fn on_start(&self, msg: &Incoming) -> Result<()> {
        let user = msg.from;

        if !self.directory.user_exists(user).await? {
            let username = self
                .transport
                .user_info(user)
                .await
                .ok()
                .and_then(|info| info.username);
            self.directory
                .upsert_user(user, username.as_deref())
                .await?;
            info!(%user, "user added");
        }

        if self.directory.is_banned(user).await? {
            self.transport
                .send_message(msg.chat, BANNED_TEXT, Markup::None)
                .await?;
            return Ok(());
        }

        let missing = self.missing_channels(user).await?;
        if !missing.is_empty() {
            let keyboard = self.join_keyboard(&missing).await;
            self.transport
                .send_message(msg.chat, LOCKED_TEXT, Markup::Inline(keyboard))
                .await?;
            return Ok(());
        }

        self.welcome(msg.chat, user).await
    }

    /// Try Again: re-check membership and either refresh the locked notice
    /// in place or let the user through.
    pub async fn on_retry(&self, event: &CallbackEvent) -> Result<()> {
        let _ = self
            .transport
            .answer_callback(&event.id, Some("Re-checking…"), false)
            .await;

        let missing = self.missing_channels(event.from).await?;
        if !missing.is_empty() {
            let markup = Markup::Inline(self.join_keyboard(&missing).await);
            if self
                .transport
                .edit_text(&event.message, STILL_LOCKED_TEXT, markup.clone())
                .await
                .is_err()
            {
                let _ = self
                    .transport
                    .send_message(event.message.chat, STILL_LOCKED_TEXT, markup)
                    .await;
            }
            return Ok(());
        }

        let verified = "✅ You're verified. Welcome!";
        if self
            .transport
            .edit_text(&event.message, verified, Markup::None)
            .await
            .is_err()
        {
            let _ = self
                .transport
                .send_message(event.message.chat, verified, Markup::None)
                .await;
        }
        self.welcome(event.message.chat, event.from).await
    }

    pub async fn show_balance(&self, msg: &Incoming) -> Result<()> {
        let balance = self.directory.balance(msg.from).await?;
        self.transport
            .send_message(msg.chat, &format!("💰 Your balance: {balance}"), Markup::None)
            .await?;
        Ok(())
    }

    pub async fn show_stock(&self, msg: &Incoming, buying: bool) -> Result<()> {
        let mut text = self
            .directory
            .setting(SettingKey::Stock)
            .await?
            .unwrap_or_else(|| DEFAULT_STOCK.to_string());
        if buying {
            text.push_str("\n\nAdd funds first, then place your order through support.");
        }
        self.transport
            .send_message(msg.chat, &text, Markup::None)
            .await?;
        Ok(())
    }

    pub async fn show_help(&self, msg: &Incoming) -> Result<()> {
        self.transport
            .send_message(msg.chat, HOW_TO_USE_TEXT, Markup::None)
            .await?;
        Ok(())
    }

    async fn welcome(&self, chat: ChatId, user: UserId) -> Result<()> {
        let name = self
            .transport
            .user_info(user)
            .await
            .ok()
            .and_then(|info| info.username)
            .unwrap_or_else(|| "there".to_string());
        let body = self
            .directory
            .setting(SettingKey::Welcome)
            .await?
            .unwrap_or_else(|| DEFAULT_WELCOME.to_string());
        let text = format!("❤️ Hey {name}!\n{body}");
        self.transport
            .send_message(chat, &text, Markup::Menu(main_menu()))
            .await?;
        Ok(())
    }

    /// Force-sub channels the user has not verifiably joined. A failed
    /// lookup counts as not joined: access requires explicit success.
    async fn missing_channels(&self, user: UserId) -> Result<Vec<ChatId>> {
        let mut missing = Vec::new();
        for id in self.directory.members(IdSet::ForceSub).await? {
            let chat = ChatId(id);
            match self.transport.member_status(chat, user).await {
                Ok(status) if status.joined() => {}
                Ok(_) => missing.push(chat),
                Err(err) => {
                    warn!(%chat, error = %err, "membership check failed");
                    missing.push(chat);
                }
            }
        }
        Ok(missing)
    }

    /// Join buttons two per row, then Try Again.
    async fn join_keyboard(&self, missing: &[ChatId]) -> InlineKeyboard {
        let mut keyboard = InlineKeyboard::new();
        let mut row = Vec::new();

        for &chat in missing {
            let (title, link) = match self.transport.chat_info(chat).await {
                Ok(info) => {
                    let link = match &info.username {
                        Some(handle) => format!("https://t.me/{handle}"),
                        None => self
                            .transport
                            .create_invite_link(chat)
                            .await
                            .unwrap_or_else(|_| "https://t.me/".to_string()),
                    };
                    (info.label(), link)
                }
                Err(_) => (format!("Channel {chat}"), "https://t.me/".to_string()),
            };
            row.push(Button::url(format!("➕ Join {title}"), link));
            if row.len() == 2 {
                keyboard.rows.push(std::mem::take(&mut row));
            }
        }
        if !row.is_empty() {
            keyboard.rows.push(row);
        }
        keyboard.rows.push(vec![Button::callback(
            "🔁 Try Again",
            CallbackAction::AccessRetry.encode(),
        )]);
        keyboard
    }
}
