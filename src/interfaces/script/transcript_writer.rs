use crate::error::Result;
use crate::infrastructure::recording::Outbound;
use std::io::Write;

/// Writes the recorded outbound traffic as JSON lines.
pub struct TranscriptWriter<W: Write> {
    out: W,
}

impl<W: Write> TranscriptWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_event(&mut self, event: &Outbound) -> Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn write_all(&mut self, events: &[Outbound]) -> Result<()> {
        for event in events {
            self.write_event(event)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chat::{ChatId, Markup, MessageId};

    #[test]
    fn writes_json_lines() {
        let mut buffer = Vec::new();
        let mut writer = TranscriptWriter::new(&mut buffer);
        writer
            .write_all(&[Outbound::Message {
                chat: ChatId(1),
                id: MessageId(2),
                text: "hello".to_string(),
                markup: Markup::None,
            }])
            .unwrap();

        let line = String::from_utf8(buffer).unwrap();
        assert!(line.contains("\"event\":\"message\""));
        assert!(line.contains("\"text\":\"hello\""));
        assert!(line.ends_with('\n'));
    }
}
