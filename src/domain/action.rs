use crate::domain::chat::UserId;
use crate::domain::payment::Token;
use std::fmt;

/// Everything an inline button in this bot can ask for.
///
/// Button payloads travel as `<domain>:<action>[:<token-or-id>]` strings;
/// they are parsed into this closed enum exactly once, at the dispatch
/// boundary, and matched exhaustively from then on. Payloads that do not
/// parse belong to nobody and are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// User claims the QR has been paid.
    FundPaid(Token),
    /// User wants a fresh QR (new pay id, same request).
    FundNewQr(Token),
    /// Admin approves a pending fund request.
    FundAccept(Token),
    /// Admin rejects a pending fund request.
    FundReject(Token),
    SupportOpen,
    SupportClose,
    /// Admin asks to message the given user from a relayed support message.
    SupportReply(UserId),
    /// Re-run the force-subscribe membership check.
    AccessRetry,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, ':');
        let domain = parts.next()?;
        let action = parts.next()?;
        let arg = parts.next();

        match (domain, action, arg) {
            ("fund", "paid", Some(t)) => Some(Self::FundPaid(Token::new(t))),
            ("fund", "newqr", Some(t)) => Some(Self::FundNewQr(Token::new(t))),
            ("fund", "accept", Some(t)) => Some(Self::FundAccept(Token::new(t))),
            ("fund", "reject", Some(t)) => Some(Self::FundReject(Token::new(t))),
            ("support", "open", None) => Some(Self::SupportOpen),
            ("support", "close", None) => Some(Self::SupportClose),
            ("support", "reply", Some(id)) => id.parse().ok().map(|n| Self::SupportReply(UserId(n))),
            ("access", "retry", None) => Some(Self::AccessRetry),
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FundPaid(t) => write!(f, "fund:paid:{t}"),
            Self::FundNewQr(t) => write!(f, "fund:newqr:{t}"),
            Self::FundAccept(t) => write!(f, "fund:accept:{t}"),
            Self::FundReject(t) => write!(f, "fund:reject:{t}"),
            Self::SupportOpen => write!(f, "support:open"),
            Self::SupportClose => write!(f, "support:close"),
            Self::SupportReply(u) => write!(f, "support:reply:{u}"),
            Self::AccessRetry => write!(f, "access:retry"),
        }
    }
}

/// Slash commands the bot understands, arguments included.
///
/// Arguments stay raw strings here; each handler validates them against its
/// own usage line so a bad argument answers with the right hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Support,
    AddFunds { amount: Option<String> },
    AdminPanel,
    AddAdmin { target: Option<String> },
    DelAdmin { target: Option<String> },
    Admins,
    Ban { target: Option<String> },
    Unban { target: Option<String> },
    User { target: Option<String> },
    BalanceOf { target: Option<String> },
    AddBal { target: Option<String>, amount: Option<String> },
    RemBal { target: Option<String>, amount: Option<String> },
    SetWelcome { text: Option<String> },
    GetWelcome,
    SetStock { text: Option<String> },
    GetStock,
    SetUpiId { value: Option<String> },
    GetUpi,
    FsubAdd { target: Option<String> },
    FsubDel { target: Option<String> },
    FsubList,
    Broadcast { text: Option<String> },
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;

        let (word, tail) = match rest.split_once(char::is_whitespace) {
            Some((word, tail)) => (word, tail.trim()),
            None => (rest, ""),
        };
        // Commands may arrive suffixed with the bot's handle: `/start@SomeBot`.
        let word = word.split('@').next().unwrap_or(word).to_ascii_lowercase();

        let arg = || {
            tail.split_whitespace()
                .next()
                .map(str::to_string)
        };
        let two_args = || {
            let mut parts = tail.split_whitespace();
            (
                parts.next().map(str::to_string),
                parts.next().map(str::to_string),
            )
        };
        let text_arg = || (!tail.is_empty()).then(|| tail.to_string());

        let command = match word.as_str() {
            "start" => Self::Start,
            "support" => Self::Support,
            "addfunds" => Self::AddFunds { amount: arg() },
            "adminpanel" => Self::AdminPanel,
            "addadmin" => Self::AddAdmin { target: arg() },
            "deladmin" => Self::DelAdmin { target: arg() },
            "admins" => Self::Admins,
            "ban" => Self::Ban { target: arg() },
            "unban" => Self::Unban { target: arg() },
            "user" => Self::User { target: arg() },
            "balance" => Self::BalanceOf { target: arg() },
            "addbal" => {
                let (target, amount) = two_args();
                Self::AddBal { target, amount }
            }
            "rembal" => {
                let (target, amount) = two_args();
                Self::RemBal { target, amount }
            }
            "setwelcome" => Self::SetWelcome { text: text_arg() },
            "getwelcome" => Self::GetWelcome,
            "setstock" => Self::SetStock { text: text_arg() },
            "getstock" => Self::GetStock,
            "setupiid" => Self::SetUpiId { value: arg() },
            "getupi" => Self::GetUpi,
            "fsub_add" => Self::FsubAdd { target: arg() },
            "fsub_del" => Self::FsubDel { target: arg() },
            "fsub_list" => Self::FsubList,
            "broadcast" => Self::Broadcast { text: text_arg() },
            _ => return None,
        };
        Some(command)
    }
}

pub const MENU_ADD_FUNDS: &str = "ADD FUNDS";
pub const MENU_BUY_DIAMONDS: &str = "BUY DIAMONDS";
pub const MENU_CHECK_BALANCE: &str = "CHECK BALANCE";
pub const MENU_HOW_TO_USE: &str = "HOW TO USE";
pub const MENU_STOCK: &str = "STOCK";

/// Taps on the persistent reply menu arrive as plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    AddFunds,
    BuyDiamonds,
    CheckBalance,
    HowToUse,
    Stock,
}

impl MenuChoice {
    pub fn from_label(text: &str) -> Option<Self> {
        match text.trim() {
            MENU_ADD_FUNDS => Some(Self::AddFunds),
            MENU_BUY_DIAMONDS => Some(Self::BuyDiamonds),
            MENU_CHECK_BALANCE => Some(Self::CheckBalance),
            MENU_HOW_TO_USE => Some(Self::HowToUse),
            MENU_STOCK => Some(Self::Stock),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_round_trip() {
        let actions = [
            CallbackAction::FundPaid(Token::new("AbC123")),
            CallbackAction::FundAccept(Token::new("t0")),
            CallbackAction::SupportReply(UserId(42)),
            CallbackAction::SupportOpen,
            CallbackAction::AccessRetry,
        ];
        for action in actions {
            assert_eq!(CallbackAction::parse(&action.encode()), Some(action));
        }
    }

    #[test]
    fn callback_rejects_foreign_payloads() {
        assert_eq!(CallbackAction::parse(""), None);
        assert_eq!(CallbackAction::parse("fund:paid"), None);
        assert_eq!(CallbackAction::parse("fund:unknown:t"), None);
        assert_eq!(CallbackAction::parse("support:reply:notanumber"), None);
        assert_eq!(CallbackAction::parse("other:bot:data"), None);
    }

    #[test]
    fn command_parsing_with_arguments() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/start@PaydeskBot"), Some(Command::Start));
        assert_eq!(
            Command::parse("/addbal 42 199.5"),
            Some(Command::AddBal {
                target: Some("42".to_string()),
                amount: Some("199.5".to_string()),
            })
        );
        assert_eq!(
            Command::parse("/setwelcome Hello there, welcome!"),
            Some(Command::SetWelcome {
                text: Some("Hello there, welcome!".to_string()),
            })
        );
        assert_eq!(Command::parse("/ban"), Some(Command::Ban { target: None }));
        assert_eq!(Command::parse("not a command"), None);
        assert_eq!(Command::parse("/frobnicate"), None);
    }

    #[test]
    fn menu_labels() {
        assert_eq!(
            MenuChoice::from_label(" ADD FUNDS "),
            Some(MenuChoice::AddFunds)
        );
        assert_eq!(MenuChoice::from_label("add funds"), None);
    }
}
