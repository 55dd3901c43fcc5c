use crate::domain::action::CallbackAction;
use crate::domain::chat::{
    Button, CallbackEvent, ChatId, InlineKeyboard, Markup, UserId, UserInfo,
};
use crate::domain::money::Amount;
use crate::domain::payment::{FundRequest, PayId, RequestState, Token, UpiId, upi_link};
use crate::domain::ports::{Directory, IdSet, QrRenderer, SessionStore, SettingKey, Transport};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How long the ADD FUNDS prompt waits for an amount.
const AMOUNT_WINDOW: Duration = Duration::from_secs(120);

const AMOUNT_PROMPT: &str = "💳 How much would you like to add?\n\
     Send a number like 199, or /skip to pay an amount of your choice.";
const AMOUNT_USAGE: &str =
    "❌ That doesn't look like an amount. Send a positive number like 199, or /skip.";
const AMOUNT_TIMEOUT: &str = "⏳ Timed out waiting for an amount. Tap ADD FUNDS to try again.";
const NOT_CONFIGURED: &str = "❌ Payments are not set up yet. Please try again later.";
const QR_FAILED: &str = "❌ Could not generate a QR code right now. Please try again.";
const SESSION_EXPIRED: &str = "This session has expired. Please run ADD FUNDS again.";
const DECISION_STALE: &str = "This request has expired or was already handled.";

/// An admin's decision on a pending fund request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
}

fn caption(pay_id: &PayId) -> String {
    format!(
        "Scan the QR code and complete the payment.\n\
         Then tap Paid — your funds are credited after review.\n\n\
         Ref: {pay_id}"
    )
}

fn payment_keyboard(token: &Token) -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![Button::callback(
            "✅ Paid",
            CallbackAction::FundPaid(token.clone()).encode(),
        )])
        .row(vec![Button::callback(
            "🔄 New QR",
            CallbackAction::FundNewQr(token.clone()).encode(),
        )])
}

/// The fund-request workflow: QR issuance, self-reported payment, admin
/// review, balance crediting.
///
/// Review is out-of-band and human; nothing here talks to a payment
/// gateway. Crediting is best-effort: a failed credit never rolls back an
/// accepted request, it only changes what the user is told.
pub struct FundsWorkflow {
    transport: Arc<dyn Transport>,
    directory: Arc<dyn Directory>,
    sessions: Arc<dyn SessionStore>,
    qr: Arc<dyn QrRenderer>,
}

impl FundsWorkflow {
    pub fn new(
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
        sessions: Arc<dyn SessionStore>,
        qr: Arc<dyn QrRenderer>,
    ) -> Self {
        Self {
            transport,
            directory,
            sessions,
            qr,
        }
    }

    /// Menu path: ask for an amount, wait for the user's next message, then
    /// open a request. A timeout or a bad amount leaves nothing behind.
    pub async fn prompt_and_open(&self, chat: ChatId, user: UserId) -> Result<()> {
        self.transport
            .send_message(chat, AMOUNT_PROMPT, Markup::None)
            .await?;

        let Some(reply) = self.transport.next_message_from(user, AMOUNT_WINDOW).await? else {
            self.transport
                .send_message(chat, AMOUNT_TIMEOUT, Markup::None)
                .await?;
            return Ok(());
        };

        let text = reply.text.unwrap_or_default();
        let text = text.trim();
        if text.eq_ignore_ascii_case("/skip") {
            return self.open(chat, None).await;
        }
        match text.parse::<Amount>() {
            Ok(amount) => self.open(chat, Some(amount)).await,
            Err(_) => {
                self.transport
                    .send_message(chat, AMOUNT_USAGE, Markup::None)
                    .await?;
                Ok(())
            }
        }
    }

    /// Command path: `/addfunds [amount]`.
    pub async fn open_from_command(&self, chat: ChatId, raw_amount: Option<&str>) -> Result<()> {
        let amount = match raw_amount {
            None => None,
            Some(raw) => match raw.parse::<Amount>() {
                Ok(amount) => Some(amount),
                Err(_) => {
                    self.transport
                        .send_message(chat, "Usage: /addfunds [amount]", Markup::None)
                        .await?;
                    return Ok(());
                }
            },
        };
        self.open(chat, amount).await
    }

    /// Issues a fresh fund request and presents the QR with its controls.
    pub async fn open(&self, chat: ChatId, amount: Option<Amount>) -> Result<()> {
        let Some(upi_id) = self.configured_upi().await else {
            self.transport
                .send_message(chat, NOT_CONFIGURED, Markup::None)
                .await?;
            return Ok(());
        };

        let request = FundRequest::issued(upi_id, amount);
        let link = upi_link(&request.upi_id, &request.pay_id, request.amount);
        let image = match self.qr.render(&link) {
            Ok(image) => image,
            Err(err) => {
                warn!(error = %err, "QR rendering failed");
                self.transport
                    .send_message(chat, QR_FAILED, Markup::None)
                    .await?;
                return Ok(());
            }
        };

        let text = caption(&request.pay_id);
        let token = self.sessions.create(request).await;
        self.transport
            .send_photo(
                chat,
                &image,
                &text,
                Markup::Inline(payment_keyboard(&token)),
            )
            .await?;
        info!(%chat, "fund request issued");
        Ok(())
    }

    /// "New QR": regenerate only the pay id, keep token, destination and
    /// amount, and swap the message media in place.
    pub async fn on_new_qr(&self, event: &CallbackEvent, token: &Token) -> Result<()> {
        let updated = self
            .sessions
            .advance(
                token,
                RequestState::Issued,
                RequestState::Issued,
                Box::new(FundRequest::regenerate_pay_id),
            )
            .await;
        let Some(request) = updated else {
            return self.expired(event).await;
        };

        let link = upi_link(&request.upi_id, &request.pay_id, request.amount);
        let image = match self.qr.render(&link) {
            Ok(image) => image,
            Err(err) => {
                warn!(error = %err, "QR rendering failed");
                return self
                    .transport
                    .answer_callback(&event.id, Some(QR_FAILED), true)
                    .await;
            }
        };

        let text = caption(&request.pay_id);
        let markup = Markup::Inline(payment_keyboard(token));
        let edited = self
            .transport
            .edit_media(&event.message, &image, &text, markup.clone())
            .await;
        if edited.is_err() {
            // Some messages cannot be edited in place; fall back to a fresh photo.
            let _ = self
                .transport
                .send_photo(event.message.chat, &image, &text, markup)
                .await;
        }
        let _ = self
            .transport
            .answer_callback(
                &event.id,
                Some("Generated a new QR with a new reference."),
                false,
            )
            .await;
        Ok(())
    }

    /// "Paid": move to review, freeze the payment message, fan out to every
    /// admin with Accept/Reject controls.
    pub async fn on_paid(&self, event: &CallbackEvent, token: &Token) -> Result<()> {
        let user = event.from;
        let advanced = self
            .sessions
            .advance(
                token,
                RequestState::Issued,
                RequestState::AwaitingReview,
                Box::new(move |request: &mut FundRequest| request.requester = Some(user)),
            )
            .await;
        let Some(request) = advanced else {
            return self.expired(event).await;
        };

        let frozen = format!("{}\n\n⏳ Verifying payment…", caption(&request.pay_id));
        let _ = self.transport.edit_caption(&event.message, &frozen).await;
        let _ = self.transport.clear_markup(&event.message).await;
        let _ = self
            .transport
            .answer_callback(
                &event.id,
                Some("Thanks — we'll notify you once it's confirmed."),
                false,
            )
            .await;

        self.notify_admins(token, &request, user).await;
        Ok(())
    }

    /// Accept/Reject. The compare-and-delete on the session store is what
    /// makes exactly one of two racing decisions win; the loser is told the
    /// request is stale and triggers nothing.
    pub async fn on_decision(
        &self,
        event: &CallbackEvent,
        token: &Token,
        verdict: Verdict,
    ) -> Result<()> {
        let Some(request) = self
            .sessions
            .take_if(token, RequestState::AwaitingReview)
            .await
        else {
            return self.stale(event).await;
        };

        match verdict {
            Verdict::Accept => {
                let _ = self
                    .transport
                    .answer_callback(&event.id, Some("Approved."), false)
                    .await;
                self.settle_accept(&request).await;
            }
            Verdict::Reject => {
                let _ = self
                    .transport
                    .answer_callback(&event.id, Some("Rejected."), false)
                    .await;
                self.settle_reject(&request).await;
            }
        }

        // Rewrite the deciding admin's copy; the other admins' copies stay
        // and their late clicks get the stale alert.
        let label = match verdict {
            Verdict::Accept => "✅ Approved",
            Verdict::Reject => "❌ Rejected",
        };
        let who = request
            .requester
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let summary = format!("{label}\nRef: {}\nUser id: {who}", request.pay_id);
        let _ = self
            .transport
            .edit_text(&event.message, &summary, Markup::None)
            .await;
        info!(pay_id = %request.pay_id, ?verdict, "fund request settled");
        Ok(())
    }

    async fn settle_accept(&self, request: &FundRequest) {
        let Some(user) = request.requester else {
            warn!(pay_id = %request.pay_id, "accepted request has no requester on file");
            return;
        };
        let chat = ChatId::from(user);

        let note = match request.amount {
            Some(amount) => match self.directory.credit(user, amount).await {
                Ok(balance) => {
                    format!("✅ Payment confirmed. Credited: {amount}. Your balance is now {balance}.")
                }
                Err(err) => {
                    // Deliberately not retried and not rolled back; the
                    // request stays accepted and the user is told the credit
                    // is still on its way.
                    warn!(%user, error = %err, "balance credit failed after acceptance");
                    "✅ Payment approved, but your balance isn't updated yet. \
                     It will be credited shortly."
                        .to_string()
                }
            },
            None => "✅ Payment approved. Your balance will reflect it shortly.".to_string(),
        };
        if let Err(err) = self.transport.send_message(chat, &note, Markup::None).await {
            warn!(%user, error = %err, "could not deliver acceptance notice");
        }
    }

    async fn settle_reject(&self, request: &FundRequest) {
        let Some(user) = request.requester else {
            return;
        };
        let keyboard = InlineKeyboard::new().row(vec![Button::callback(
            "🆘 Open Support",
            CallbackAction::SupportOpen.encode(),
        )]);
        let note = "❌ We couldn't verify this payment. \
                    If you think this is a mistake, contact support.";
        if let Err(err) = self
            .transport
            .send_message(ChatId::from(user), note, Markup::Inline(keyboard))
            .await
        {
            warn!(%user, error = %err, "could not deliver rejection notice");
        }
    }

    async fn notify_admins(&self, token: &Token, request: &FundRequest, user: UserId) {
        let admins = match self.directory.members(IdSet::Admins).await {
            Ok(admins) => admins,
            Err(err) => {
                warn!(error = %err, "could not load admin list");
                return;
            }
        };
        if admins.is_empty() {
            warn!("no admins configured; fund request parked in review");
            return;
        }

        let who = self.transport.user_info(user).await.ok();
        let name = who
            .as_ref()
            .map(UserInfo::full_name)
            .unwrap_or_else(|| "No Name".to_string());
        let handle = who
            .as_ref()
            .map(UserInfo::handle)
            .unwrap_or_else(|| "(no username)".to_string());
        let amount = request
            .amount
            .map(|a| a.to_string())
            .unwrap_or_else(|| "user's choice".to_string());
        let text = format!(
            "💸 New fund request\n\
             From: {name} {handle}\n\
             User id: {user}\n\
             Amount: {amount}\n\
             Ref: {pay_id}",
            pay_id = request.pay_id,
        );
        let keyboard = InlineKeyboard::new().row(vec![
            Button::callback("✅ Accept", CallbackAction::FundAccept(token.clone()).encode()),
            Button::callback("❌ Reject", CallbackAction::FundReject(token.clone()).encode()),
        ]);

        for admin in admins {
            let chat = ChatId(admin);
            // One unreachable admin must not silence the rest.
            if let Err(err) = self
                .transport
                .send_message(chat, &text, Markup::Inline(keyboard.clone()))
                .await
            {
                warn!(admin, error = %err, "failed to notify admin of fund request");
            }
        }
    }

    async fn configured_upi(&self) -> Option<UpiId> {
        let raw = self.directory.setting(SettingKey::UpiId).await.ok()??;
        UpiId::parse(&raw).ok()
    }

    async fn expired(&self, event: &CallbackEvent) -> Result<()> {
        self.transport
            .answer_callback(&event.id, Some(SESSION_EXPIRED), true)
            .await
    }

    async fn stale(&self, event: &CallbackEvent) -> Result<()> {
        self.transport
            .answer_callback(&event.id, Some(DECISION_STALE), true)
            .await
    }
}
