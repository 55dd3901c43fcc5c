use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a user account on the chat platform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct UserId(pub i64);

/// Identity of a chat (private conversation, group or channel).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ChatId(pub i64);

/// Identity of a message within a chat.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct MessageId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// A private conversation shares its id with the user it belongs to.
impl From<UserId> for ChatId {
    fn from(user: UserId) -> Self {
        Self(user.0)
    }
}

/// Fully-qualified reference to a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat: ChatId,
    pub id: MessageId,
}

/// Opaque id used to acknowledge an interactive button press.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackId(pub String);

/// Compact profile as the transport reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl UserInfo {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        }
    }

    pub fn handle(&self) -> String {
        match &self.username {
            Some(name) => format!("@{name}"),
            None => "(no username)".to_string(),
        }
    }
}

/// Compact chat descriptor as the transport reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: ChatId,
    pub title: Option<String>,
    pub username: Option<String>,
}

impl ChatInfo {
    pub fn label(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        if let Some(name) = &self.username {
            return format!("@{name}");
        }
        format!("Channel {}", self.id)
    }
}

/// Membership of a user in a channel, as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Member,
    Administrator,
    Owner,
    Left,
}

impl MemberStatus {
    pub fn joined(self) -> bool {
        !matches!(self, MemberStatus::Left)
    }
}

/// One interactive button attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub press: Press,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Press {
    /// Carries an encoded [`CallbackAction`](crate::domain::action::CallbackAction).
    Callback(String),
    Url(String),
}

impl Button {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            press: Press::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            press: Press::Url(url.into()),
        }
    }
}

/// Inline keyboard rendered under a message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<Button>>,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    /// Every callback payload in the keyboard, in reading order.
    pub fn callback_data(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .filter_map(|b| match &b.press {
                Press::Callback(data) => Some(data.as_str()),
                Press::Url(_) => None,
            })
            .collect()
    }
}

/// Persistent reply menu shown next to the input field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MenuKeyboard {
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Markup {
    None,
    Inline(InlineKeyboard),
    Menu(MenuKeyboard),
}

/// An inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incoming {
    pub chat: ChatId,
    pub from: UserId,
    pub id: MessageId,
    pub text: Option<String>,
    pub reply_to: Option<MessageId>,
    /// Sender of the replied-to message, when the platform includes it.
    pub reply_to_user: Option<UserId>,
}

/// An inbound button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub id: CallbackId,
    pub from: UserId,
    pub message: MessageRef,
    pub data: String,
}

/// Everything the dispatcher can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Message(Incoming),
    Callback(CallbackEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_info_fallbacks() {
        let info = UserInfo {
            id: UserId(7),
            username: None,
            first_name: "Ada".to_string(),
            last_name: None,
        };
        assert_eq!(info.full_name(), "Ada");
        assert_eq!(info.handle(), "(no username)");
    }

    #[test]
    fn chat_label_prefers_title() {
        let chat = ChatInfo {
            id: ChatId(-100),
            title: Some("Deals".to_string()),
            username: Some("deals".to_string()),
        };
        assert_eq!(chat.label(), "Deals");

        let bare = ChatInfo {
            id: ChatId(-100),
            title: None,
            username: None,
        };
        assert_eq!(bare.label(), "Channel -100");
    }

    #[test]
    fn keyboard_collects_callback_data() {
        let keyboard = InlineKeyboard::new()
            .row(vec![
                Button::callback("Yes", "x:yes"),
                Button::url("Docs", "https://example.com"),
            ])
            .row(vec![Button::callback("No", "x:no")]);
        assert_eq!(keyboard.callback_data(), vec!["x:yes", "x:no"]);
    }
}
