use crate::domain::action::Command;
use crate::domain::chat::{ChatId, Incoming, Markup, UserId};
use crate::domain::money::Amount;
use crate::domain::payment::UpiId;
use crate::domain::ports::{Directory, IdSet, SettingKey, Transport};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Pause between broadcast sends to stay under flood limits.
const BROADCAST_THROTTLE: Duration = Duration::from_millis(50);

fn preview(text: &str) -> String {
    if text.chars().count() <= 60 {
        text.to_string()
    } else {
        let cut: String = text.chars().take(60).collect();
        format!("{cut}…")
    }
}

/// The operator command surface: admins, bans, balances, settings,
/// force-sub channels, broadcast.
pub struct AdminConsole {
    transport: Arc<dyn Transport>,
    directory: Arc<dyn Directory>,
}

impl AdminConsole {
    pub fn new(transport: Arc<dyn Transport>, directory: Arc<dyn Directory>) -> Self {
        Self {
            transport,
            directory,
        }
    }

    /// Dispatches an admin command. Non-admins get a refusal regardless of
    /// the command.
    pub async fn handle(&self, command: &Command, msg: &Incoming) -> Result<()> {
        if !self.directory.contains(IdSet::Admins, msg.from.0).await? {
            return self.reply(msg, "⛔ Admins only.").await;
        }

        match command {
            Command::AdminPanel => self.panel(msg).await,
            Command::AddAdmin { target } => {
                let Some(target) = self.resolve_target(msg, target.as_deref()).await else {
                    return self
                        .reply(msg, "Usage: /addadmin [id|@user] (or reply)")
                        .await;
                };
                self.directory.add_member(IdSet::Admins, target.0).await?;
                info!(%target, by = %msg.from, "admin added");
                self.reply(msg, &format!("✅ Added admin: {target}")).await
            }
            Command::DelAdmin { target } => {
                let Some(target) = self.resolve_target(msg, target.as_deref()).await else {
                    return self
                        .reply(msg, "Usage: /deladmin [id|@user] (or reply)")
                        .await;
                };
                self.directory
                    .remove_member(IdSet::Admins, target.0)
                    .await?;
                self.reply(msg, &format!("✅ Removed admin: {target}")).await
            }
            Command::Admins => {
                let admins = self.directory.members(IdSet::Admins).await?;
                if admins.is_empty() {
                    return self.reply(msg, "No admins set.").await;
                }
                let lines: Vec<String> = admins.iter().map(|id| format!("• {id}")).collect();
                self.reply(msg, &format!("👑 Admins\n{}", lines.join("\n")))
                    .await
            }
            Command::Ban { target } => {
                let Some(target) = self.resolve_target(msg, target.as_deref()).await else {
                    return self.reply(msg, "Usage: /ban [id|@user] (or reply)").await;
                };
                self.directory.set_banned(target, true).await?;
                self.reply(msg, &format!("🚫 Banned {target}")).await
            }
            Command::Unban { target } => {
                let Some(target) = self.resolve_target(msg, target.as_deref()).await else {
                    return self.reply(msg, "Usage: /unban [id|@user] (or reply)").await;
                };
                self.directory.set_banned(target, false).await?;
                self.reply(msg, &format!("✅ Unbanned {target}")).await
            }
            Command::User { target } => {
                let Some(target) = self.resolve_target(msg, target.as_deref()).await else {
                    return self.reply(msg, "Usage: /user [id|@user] (or reply)").await;
                };
                match self.directory.user_details(target).await? {
                    Some(details) => {
                        let is_admin = self.directory.contains(IdSet::Admins, target.0).await?;
                        let text = format!(
                            "👤 User details\n\
                             • id: {id}\n\
                             • username: {username}\n\
                             • banned: {banned}\n\
                             • admin: {is_admin}\n\
                             • balance: {balance}",
                            id = details.id,
                            username = details.username.as_deref().unwrap_or("(none)"),
                            banned = details.banned,
                            balance = details.balance,
                        );
                        self.reply(msg, &text).await
                    }
                    None => self.reply(msg, "❌ No such user.").await,
                }
            }
            Command::BalanceOf { target } => {
                let Some(target) = self.resolve_target(msg, target.as_deref()).await else {
                    return self
                        .reply(msg, "Usage: /balance [id|@user] (or reply)")
                        .await;
                };
                let balance = self.directory.balance(target).await?;
                self.reply(msg, &format!("💰 Balance of {target}: {balance}"))
                    .await
            }
            Command::AddBal { target, amount } => {
                let Some((target, amount)) = self.target_and_amount(msg, target, amount).await?
                else {
                    return Ok(());
                };
                self.directory.credit(target, amount).await?;
                self.reply(msg, &format!("✅ Added {amount} to {target}."))
                    .await
            }
            Command::RemBal { target, amount } => {
                let Some((target, amount)) = self.target_and_amount(msg, target, amount).await?
                else {
                    return Ok(());
                };
                self.directory.debit_floor(target, amount).await?;
                self.reply(msg, &format!("✅ Removed {amount} from {target}."))
                    .await
            }
            Command::SetWelcome { text } => {
                let Some(text) = text else {
                    return self.reply(msg, "Usage: /setwelcome Your welcome text…").await;
                };
                self.directory.set_setting(SettingKey::Welcome, text).await?;
                self.reply(msg, "✅ Updated welcome message.").await
            }
            Command::GetWelcome => {
                let text = self
                    .directory
                    .setting(SettingKey::Welcome)
                    .await?
                    .unwrap_or_else(|| "(not set)".to_string());
                self.reply(msg, &format!("📜 Welcome:\n{text}")).await
            }
            Command::SetStock { text } => {
                let Some(text) = text else {
                    return self.reply(msg, "Usage: /setstock Your stock text…").await;
                };
                self.directory.set_setting(SettingKey::Stock, text).await?;
                self.reply(msg, "✅ Updated stock message.").await
            }
            Command::GetStock => {
                let text = self
                    .directory
                    .setting(SettingKey::Stock)
                    .await?
                    .unwrap_or_else(|| "(not set)".to_string());
                self.reply(msg, &format!("📦 Stock:\n{text}")).await
            }
            Command::SetUpiId { value } => {
                let parsed = value.as_deref().map(UpiId::parse);
                let Some(Ok(upi)) = parsed else {
                    return self.reply(msg, "Usage: /setupiid name@bank").await;
                };
                self.directory
                    .set_setting(SettingKey::UpiId, upi.as_str())
                    .await?;
                self.reply(msg, &format!("✅ UPI set to {upi}")).await
            }
            Command::GetUpi => {
                let value = self
                    .directory
                    .setting(SettingKey::UpiId)
                    .await?
                    .unwrap_or_else(|| "(not set)".to_string());
                self.reply(msg, &format!("💳 UPI: {value}")).await
            }
            Command::FsubAdd { target } => {
                let Some(target) = target else {
                    return self.reply(msg, "Usage: /fsub_add [@channel | id]").await;
                };
                let Some(chat) = self.transport.resolve_chat(target).await? else {
                    return self.reply(msg, "❌ Could not resolve channel.").await;
                };
                self.directory
                    .add_member(IdSet::ForceSub, chat.id.0)
                    .await?;
                self.reply(
                    msg,
                    &format!("✅ Added force-sub: {} ({})", chat.label(), chat.id),
                )
                .await
            }
            Command::FsubDel { target } => {
                let Some(target) = target else {
                    return self.reply(msg, "Usage: /fsub_del [@channel | id]").await;
                };
                // A raw id is removable even when the chat no longer resolves.
                let (id, label) = if let Ok(raw) = target.parse::<i64>() {
                    (raw, "Channel".to_string())
                } else {
                    match self.transport.resolve_chat(target).await? {
                        Some(chat) => (chat.id.0, chat.label()),
                        None => return self.reply(msg, "❌ Could not resolve channel.").await,
                    }
                };
                self.directory.remove_member(IdSet::ForceSub, id).await?;
                self.reply(msg, &format!("🗑️ Removed force-sub: {label} ({id})"))
                    .await
            }
            Command::FsubList => {
                let channels = self.directory.members(IdSet::ForceSub).await?;
                if channels.is_empty() {
                    return self.reply(msg, "No force-sub channels set.").await;
                }
                let mut lines = Vec::new();
                for id in channels {
                    match self.transport.chat_info(ChatId(id)).await {
                        Ok(info) => lines.push(format!("• {} — {id}", info.label())),
                        Err(_) => lines.push(format!("• {id}")),
                    }
                }
                self.reply(
                    msg,
                    &format!("📢 Force-sub channels\n{}", lines.join("\n")),
                )
                .await
            }
            Command::Broadcast { text } => {
                let Some(text) = text else {
                    return self.reply(msg, "Usage: /broadcast Your message…").await;
                };
                self.broadcast(msg, text).await
            }
            // Routed elsewhere; listed so the match stays exhaustive.
            Command::Start | Command::Support | Command::AddFunds { .. } => Ok(()),
        }
    }

    async fn broadcast(&self, msg: &Incoming, text: &str) -> Result<()> {
        self.reply(msg, "📣 Broadcast started… (this can take a while)")
            .await?;

        let mut sent = 0usize;
        let mut failed = 0usize;
        for user in self.directory.all_users().await? {
            match self
                .transport
                .send_message(ChatId::from(user), text, Markup::None)
                .await
            {
                Ok(_) => sent += 1,
                Err(_) => failed += 1,
            }
            tokio::time::sleep(BROADCAST_THROTTLE).await;
        }

        info!(sent, failed, "broadcast finished");
        self.reply(
            msg,
            &format!("✅ Broadcast finished.\n• Sent: {sent}\n• Failed: {failed}"),
        )
        .await
    }

    async fn panel(&self, msg: &Incoming) -> Result<()> {
        let users = self.directory.user_count().await?;
        let admins = self.directory.members(IdSet::Admins).await?.len();
        let fsubs = self.directory.members(IdSet::ForceSub).await?.len();
        let upi = self
            .directory
            .setting(SettingKey::UpiId)
            .await?
            .unwrap_or_else(|| "(not set)".to_string());
        let welcome = self
            .directory
            .setting(SettingKey::Welcome)
            .await?
            .unwrap_or_default();
        let stock = self
            .directory
            .setting(SettingKey::Stock)
            .await?
            .unwrap_or_default();

        let text = format!(
            "🛠️ Admin panel\n\
             • Users: {users}\n\
             • Admins: {admins}\n\
             • Force-subs: {fsubs}\n\
             • UPI: {upi}\n\
             • Welcome: {welcome}\n\
             • Stock: {stock}\n\n\
             👑 Admins\n\
             /addadmin [id|@user] — add admin\n\
             /deladmin [id|@user] — remove admin\n\
             /admins — list admins\n\n\
             🚫 Users\n\
             /ban [id|@user] — ban user\n\
             /unban [id|@user] — unban user\n\
             /user [id|@user] — show user details\n\n\
             💰 Balances\n\
             /balance [id|@user] — show balance\n\
             /addbal [id|@user] amount — add balance\n\
             /rembal [id|@user] amount — remove balance (floors at 0)\n\n\
             ⚙️ Settings\n\
             /setwelcome text… | /getwelcome\n\
             /setstock text… | /getstock\n\
             /setupiid name@bank | /getupi\n\n\
             📢 Force-sub\n\
             /fsub_add [@channel|id] | /fsub_del [@channel|id] | /fsub_list\n\n\
             📣 /broadcast Your message…",
            welcome = preview(&welcome),
            stock = preview(&stock),
        );
        self.reply(msg, &text).await
    }

    /// Resolves the command target: the replied-to sender first, then a
    /// numeric id, then a username through the transport.
    async fn resolve_target(&self, msg: &Incoming, arg: Option<&str>) -> Option<UserId> {
        if let Some(user) = msg.reply_to_user {
            return Some(user);
        }
        let arg = arg?.trim();
        if let Ok(id) = arg.parse::<i64>() {
            return Some(UserId(id));
        }
        self.transport.resolve_username(arg).await.ok().flatten()
    }

    async fn target_and_amount(
        &self,
        msg: &Incoming,
        target: &Option<String>,
        amount: &Option<String>,
    ) -> Result<Option<(UserId, Amount)>> {
        let Some(target) = self.resolve_target(msg, target.as_deref()).await else {
            self.reply(msg, "❌ Invalid user.").await?;
            return Ok(None);
        };
        let amount = match amount.as_deref().map(str::parse::<Amount>) {
            Some(Ok(amount)) => amount,
            _ => {
                self.reply(msg, "❌ Amount must be a positive number.").await?;
                return Ok(None);
            }
        };
        Ok(Some((target, amount)))
    }

    async fn reply(&self, msg: &Incoming, text: &str) -> Result<()> {
        self.transport
            .send_message(msg.chat, text, Markup::None)
            .await?;
        Ok(())
    }
}
