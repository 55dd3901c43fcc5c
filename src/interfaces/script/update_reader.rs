use crate::domain::chat::MemberStatus;
use crate::error::{BotError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

/// One line of a session script.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// Seed an admin id.
    Admin { id: i64 },
    /// Seed a settings value; `key` is `welcome`, `stock` or `upi_id`.
    Setting { key: String, value: String },
    /// Seed a user's starting balance.
    Balance { user: i64, amount: Decimal },
    /// Register a user profile with the transport and the directory.
    User {
        id: i64,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        first_name: Option<String>,
        #[serde(default)]
        last_name: Option<String>,
    },
    /// Register a channel with the transport.
    Channel {
        id: i64,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        username: Option<String>,
    },
    /// Record a membership the transport should report.
    Member {
        chat: i64,
        user: i64,
        status: MemberStatus,
    },
    /// Seed a force-subscribe channel id.
    ForceSub { chat: i64 },
    /// Queue a message to satisfy an awaited conversational prompt.
    Reply { user: i64, text: String },
    /// Deliver a chat message update.
    Message {
        chat: i64,
        from: i64,
        #[serde(default)]
        id: Option<i64>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        reply_to: Option<i64>,
        #[serde(default)]
        reply_to_user: Option<i64>,
    },
    /// Deliver a button press update.
    Callback {
        from: i64,
        chat: i64,
        message: i64,
        data: String,
        #[serde(default)]
        id: Option<String>,
    },
}

/// Streams script events from a JSON-lines source.
///
/// Blank lines and `#` comments are skipped so fixture scripts can be
/// annotated.
pub struct UpdateReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> UpdateReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Lazily reads and deserializes events, one line at a time.
    pub fn events(self) -> impl Iterator<Item = Result<ScriptEvent>> {
        self.reader.lines().filter_map(|line| match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    None
                } else {
                    Some(serde_json::from_str(trimmed).map_err(BotError::from))
                }
            }
            Err(err) => Some(Err(BotError::from(err))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_a_valid_stream() {
        let data = "\
{\"kind\": \"admin\", \"id\": 10}\n\
# seed the destination\n\
{\"kind\": \"setting\", \"key\": \"upi_id\", \"value\": \"m@fam\"}\n\
\n\
{\"kind\": \"message\", \"chat\": 1, \"from\": 1, \"text\": \"/start\"}\n";
        let events: Vec<_> = UpdateReader::new(data.as_bytes()).events().collect();

        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            ScriptEvent::Admin { id: 10 }
        ));
        match events[2].as_ref().unwrap() {
            ScriptEvent::Message { chat, text, .. } => {
                assert_eq!(*chat, 1);
                assert_eq!(text.as_deref(), Some("/start"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn malformed_line_surfaces_as_error() {
        let data = "{\"kind\": \"unheard_of\"}\n";
        let events: Vec<_> = UpdateReader::new(data.as_bytes()).events().collect();
        assert!(events[0].is_err());
    }
}
