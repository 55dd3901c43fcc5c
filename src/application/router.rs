use crate::application::access::AccessGate;
use crate::application::admin::AdminConsole;
use crate::application::funds::{FundsWorkflow, Verdict};
use crate::application::support::SupportDesk;
use crate::domain::action::{CallbackAction, Command, MenuChoice};
use crate::domain::chat::{CallbackEvent, Incoming, Update, UserId};
use crate::domain::ports::{
    Directory, IdSet, QrRenderer, ReplyDirectory, SessionStore, Transport,
};
use crate::error::Result;
use std::sync::Arc;
use tracing::warn;

/// Routes every inbound update to the owning workflow.
///
/// Inbound payloads are parsed into the closed grammars exactly once, here;
/// everything past this point dispatches on enums. This is also the error
/// boundary: a failing handler is logged and the next update proceeds as if
/// nothing happened.
pub struct Router {
    transport: Arc<dyn Transport>,
    directory: Arc<dyn Directory>,
    pub funds: FundsWorkflow,
    pub support: SupportDesk,
    pub access: AccessGate,
    pub admin: AdminConsole,
}

impl Router {
    pub fn new(
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
        sessions: Arc<dyn SessionStore>,
        links: Arc<dyn ReplyDirectory>,
        qr: Arc<dyn QrRenderer>,
    ) -> Self {
        Self {
            funds: FundsWorkflow::new(
                Arc::clone(&transport),
                Arc::clone(&directory),
                sessions,
                qr,
            ),
            support: SupportDesk::new(Arc::clone(&transport), Arc::clone(&directory), links),
            access: AccessGate::new(Arc::clone(&transport), Arc::clone(&directory)),
            admin: AdminConsole::new(Arc::clone(&transport), Arc::clone(&directory)),
            transport,
            directory,
        }
    }

    /// Top-level entry point; never lets one bad update poison the loop.
    pub async fn handle(&self, update: Update) {
        let outcome = match update {
            Update::Message(msg) => self.on_message(msg).await,
            Update::Callback(event) => self.on_callback(event).await,
        };
        if let Err(err) = outcome {
            warn!(error = %err, "update handling failed");
        }
    }

    async fn on_message(&self, msg: Incoming) -> Result<()> {
        let text = msg.text.clone().unwrap_or_default();

        if let Some(command) = Command::parse(&text) {
            return match command {
                Command::Start => self.access.on_start(&msg).await,
                Command::Support => self.support.open_via_command(&msg).await,
                Command::AddFunds { amount } => {
                    self.funds
                        .open_from_command(msg.chat, amount.as_deref())
                        .await
                }
                other => self.admin.handle(&other, &msg).await,
            };
        }

        if let Some(choice) = MenuChoice::from_label(&text) {
            return match choice {
                MenuChoice::AddFunds => self.funds.prompt_and_open(msg.chat, msg.from).await,
                MenuChoice::CheckBalance => self.access.show_balance(&msg).await,
                MenuChoice::Stock => self.access.show_stock(&msg, false).await,
                MenuChoice::BuyDiamonds => self.access.show_stock(&msg, true).await,
                MenuChoice::HowToUse => self.access.show_help(&msg).await,
            };
        }

        // An admin answering a relayed support message takes precedence;
        // an untracked reply falls through silently.
        if msg.reply_to.is_some()
            && self.is_admin(msg.from).await
            && self.support.route_admin_reply(&msg).await?
        {
            return Ok(());
        }

        if self.support.is_active(msg.from).await {
            return self.support.relay_from_user(&msg).await;
        }

        Ok(())
    }

    async fn on_callback(&self, event: CallbackEvent) -> Result<()> {
        let Some(action) = CallbackAction::parse(&event.data) else {
            // Not one of ours; drop it.
            return Ok(());
        };

        match action {
            CallbackAction::FundPaid(token) => self.funds.on_paid(&event, &token).await,
            CallbackAction::FundNewQr(token) => self.funds.on_new_qr(&event, &token).await,
            CallbackAction::FundAccept(token) => {
                if !self.is_admin(event.from).await {
                    return self.deny(&event).await;
                }
                self.funds.on_decision(&event, &token, Verdict::Accept).await
            }
            CallbackAction::FundReject(token) => {
                if !self.is_admin(event.from).await {
                    return self.deny(&event).await;
                }
                self.funds.on_decision(&event, &token, Verdict::Reject).await
            }
            CallbackAction::SupportOpen => self.support.on_open(&event).await,
            CallbackAction::SupportClose => self.support.on_close(&event).await,
            CallbackAction::SupportReply(target) => {
                if !self.is_admin(event.from).await {
                    return self.deny(&event).await;
                }
                self.support.on_reply_button(&event, target).await
            }
            CallbackAction::AccessRetry => self.access.on_retry(&event).await,
        }
    }

    async fn is_admin(&self, user: UserId) -> bool {
        self.directory
            .contains(IdSet::Admins, user.0)
            .await
            .unwrap_or(false)
    }

    async fn deny(&self, event: &CallbackEvent) -> Result<()> {
        self.transport
            .answer_callback(&event.id, Some("⛔ Admins only."), true)
            .await
    }
}
