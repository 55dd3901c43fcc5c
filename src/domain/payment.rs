use crate::domain::chat::UserId;
use crate::domain::money::Amount;
use crate::error::BotError;
use rand::rngs::OsRng;
use rand::{Rng, distributions::Alphanumeric};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static UPI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.\-_]{2,}@[A-Za-z0-9]{2,}$").unwrap());

/// Unguessable correlation key for a fund request.
///
/// 16 mixed-case alphanumeric characters drawn from the OS RNG, about 95
/// bits, enough that collisions and guessing are not practical concerns for
/// the lifetime of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token(String);

impl Token {
    pub fn generate() -> Self {
        let raw: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        Self(raw)
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const PAY_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Human-shown payment reference, embedded in the UPI link and the caption.
///
/// Regenerable without discarding the request: a "new QR" swaps the pay id
/// while the token and destination stay fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayId(String);

impl PayId {
    pub fn generate() -> Self {
        let raw: String = (0..16)
            .map(|_| PAY_ID_ALPHABET[OsRng.gen_range(0..PAY_ID_ALPHABET.len())] as char)
            .collect();
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A syntactically valid UPI destination, e.g. `name@bank`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpiId(String);

impl UpiId {
    pub fn parse(raw: &str) -> Result<Self, BotError> {
        let raw = raw.trim();
        if UPI_RE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(BotError::Validation(format!("not a valid UPI id: {raw}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builds the `upi://pay` deep link encoded into the QR image.
///
/// The pay id rides along as both transaction reference (`tr`) and note
/// (`tn`) so an operator can match a bank statement line to a request.
pub fn upi_link(upi: &UpiId, pay_id: &PayId, amount: Option<Amount>) -> String {
    let mut link = format!(
        "upi://pay?pa={upi}&pn=Payment&cu=INR&tr={pay_id}&tn={pay_id}",
        upi = upi.as_str(),
        pay_id = pay_id.as_str(),
    );
    if let Some(amount) = amount {
        link.push_str(&format!("&am={:.2}", amount.value()));
    }
    link
}

/// Where a live fund request sits in its lifecycle.
///
/// Terminal outcomes (accepted, rejected) are not states of the record: the
/// record is deleted on the terminal transition, and a missing token is
/// reported as expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Issued,
    AwaitingReview,
}

/// Ephemeral, in-memory record of one fund request.
///
/// Lives only in the session store, keyed by its [`Token`]; a process
/// restart drops every in-flight request by design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundRequest {
    pub upi_id: UpiId,
    pub pay_id: PayId,
    pub amount: Option<Amount>,
    /// Filled in once the user taps "Paid".
    pub requester: Option<UserId>,
    pub state: RequestState,
}

impl FundRequest {
    pub fn issued(upi_id: UpiId, amount: Option<Amount>) -> Self {
        Self {
            upi_id,
            pay_id: PayId::generate(),
            amount,
            requester: None,
            state: RequestState::Issued,
        }
    }

    /// Swaps in a fresh pay id; destination and amount carry over.
    pub fn regenerate_pay_id(&mut self) {
        self.pay_id = PayId::generate();
    }
}
