//! Newline-delimited JSON framing for the streamed insight.
//!
//! Each record is one line: `{"type":"reasoning"|"content","content":"..."}`
//! or `{"type":"phase_change"}`. Records may be split across transport
//! chunks; records with an unrecognized `type` are skipped.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One streamed insight event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InsightEvent {
    Reasoning { content: String },
    Content { content: String },
    PhaseChange,
}

impl InsightEvent {
    pub fn reasoning(text: impl Into<String>) -> Self {
        InsightEvent::Reasoning {
            content: text.into(),
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        InsightEvent::Content {
            content: text.into(),
        }
    }
}

/// Decoding view that tolerates unknown record types.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireRecord {
    Reasoning {
        #[serde(default)]
        content: String,
    },
    Content {
        #[serde(default)]
        content: String,
    },
    PhaseChange,
    #[serde(other)]
    Unknown,
}

impl From<WireRecord> for Option<InsightEvent> {
    fn from(record: WireRecord) -> Self {
        match record {
            WireRecord::Reasoning { content } => Some(InsightEvent::Reasoning { content }),
            WireRecord::Content { content } => Some(InsightEvent::Content { content }),
            WireRecord::PhaseChange => Some(InsightEvent::PhaseChange),
            WireRecord::Unknown => None,
        }
    }
}

/// Serialize one event as a complete NDJSON line, trailing newline included.
pub fn encode_line(event: &InsightEvent) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

/// Incremental NDJSON decoder.
///
/// Bytes are buffered until a newline so multi-byte characters and JSON
/// records split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<InsightEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final record that was not newline-terminated.
    pub fn finish(&mut self) -> Option<InsightEvent> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(line: &[u8]) -> Option<InsightEvent> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_slice::<WireRecord>(line) {
        Ok(record) => record.into(),
        Err(e) => {
            warn!(error = %e, "Skipping malformed insight record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_shapes() {
        assert_eq!(
            encode_line(&InsightEvent::reasoning("hmm")).unwrap(),
            "{\"type\":\"reasoning\",\"content\":\"hmm\"}\n"
        );
        assert_eq!(
            encode_line(&InsightEvent::PhaseChange).unwrap(),
            "{\"type\":\"phase_change\"}\n"
        );
    }

    #[test]
    fn test_decode_record_split_across_chunks() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(b"{\"type\":\"cont").is_empty());
        let events = decoder.push(b"ent\",\"content\":\"Caffeine\"}\n{\"type\":\"phase");
        assert_eq!(events, vec![InsightEvent::content("Caffeine")]);
        let events = decoder.push(b"_change\"}\n");
        assert_eq!(events, vec![InsightEvent::PhaseChange]);
    }

    #[test]
    fn test_decode_split_multibyte_character() {
        let line = encode_line(&InsightEvent::content("睡眠")).unwrap();
        let bytes = line.as_bytes();
        // Split inside the first CJK character.
        let cut = line.find('睡').unwrap() + 1;
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(&bytes[..cut]).is_empty());
        assert_eq!(
            decoder.push(&bytes[cut..]),
            vec![InsightEvent::content("睡眠")]
        );
    }

    #[test]
    fn test_decode_ignores_unknown_and_malformed() {
        let mut decoder = NdjsonDecoder::new();
        let events = decoder.push(
            b"{\"type\":\"heartbeat\"}\nnot json\n\n{\"type\":\"reasoning\",\"content\":\"x\"}\n",
        );
        assert_eq!(events, vec![InsightEvent::reasoning("x")]);
    }

    #[test]
    fn test_finish_flushes_unterminated_record() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(b"{\"type\":\"content\",\"content\":\"end\"}").is_empty());
        assert_eq!(decoder.finish(), Some(InsightEvent::content("end")));
        assert_eq!(decoder.finish(), None);
    }
}
