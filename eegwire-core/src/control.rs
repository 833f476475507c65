use tracing::{trace, warn};

use crate::protocol::CONTROL_TERMINATOR;

/// Longest message buffered before a terminator must have appeared.
pub const MAX_CONTROL_MESSAGE: usize = 4096;

/// Rebuilds control responses split across several notifications.
///
/// Each chunk starts with a byte count followed by that many ASCII bytes.
/// A response is complete when a chunk ends with `}`.
#[derive(Debug, Default, Clone)]
pub struct ControlReassembler {
    buffer: String,
}

impl ControlReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, payload: &[u8]) -> Option<String> {
        let (&count, body) = payload.split_first()?;
        let end = usize::from(count).min(body.len());
        if end < usize::from(count) {
            trace!(count, available = body.len(), "Control chunk shorter than its count");
        }

        let mut last = None;
        for byte in body[..end].iter().copied().filter(u8::is_ascii) {
            self.buffer.push(char::from(byte));
            last = Some(byte);
        }

        if last == Some(CONTROL_TERMINATOR) {
            return Some(std::mem::take(&mut self.buffer));
        }

        if self.buffer.len() > MAX_CONTROL_MESSAGE {
            warn!(
                buffered = self.buffer.len(),
                "Control message never terminated, discarding"
            );
            self.buffer.clear();
        }

        None
    }

    /// Text received since the last complete message.
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode;

    #[test]
    fn joins_chunks_until_terminator() {
        let mut reassembler = ControlReassembler::new();

        assert_eq!(reassembler.submit(b"\x05hello"), None);
        assert_eq!(
            reassembler.submit(b"\x07{\"a\":1}"),
            Some("hello{\"a\":1}".to_string())
        );
        assert_eq!(reassembler.pending(), "");
    }

    #[test]
    fn ignores_padding_past_count() {
        let mut reassembler = ControlReassembler::new();

        let message = reassembler.submit(b"\x02{}zzzzzzzzzzzzzzzz");

        assert_eq!(message.as_deref(), Some("{}"));
    }

    #[test]
    fn empty_payload_is_ignored() {
        let mut reassembler = ControlReassembler::new();
        reassembler.submit(b"\x01{");

        assert_eq!(reassembler.submit(&[]), None);
        assert_eq!(reassembler.pending(), "{");
    }

    #[test]
    fn count_is_clamped_and_non_ascii_dropped() {
        let mut reassembler = ControlReassembler::new();

        let message = reassembler.submit(&[9, b'{', 0xC3, b'x', b'}']);

        assert_eq!(message.as_deref(), Some("{x}"));
    }

    #[test]
    fn brace_inside_chunk_does_not_terminate() {
        let mut reassembler = ControlReassembler::new();

        assert_eq!(reassembler.submit(b"\x03}ab"), None);
        assert_eq!(reassembler.pending(), "}ab");
    }

    #[test]
    fn reassembles_encoded_message() {
        let message = r#"{"hn":"Muse-7A2C","sn":"2031-CNTT-7A2C","bp":83,"rc":0}"#;
        let mut reassembler = ControlReassembler::new();

        let outputs: Vec<String> = encode::control(message)
            .unwrap()
            .iter()
            .filter_map(|chunk| reassembler.submit(chunk))
            .collect();

        assert_eq!(outputs, vec![message.to_string()]);
    }

    #[test]
    fn unterminated_overflow_is_discarded() {
        let mut reassembler = ControlReassembler::new();
        let chunk = [&[19u8][..], &[b'a'; 19]].concat();

        for _ in 0..=MAX_CONTROL_MESSAGE / 19 {
            reassembler.submit(&chunk);
        }

        assert!(reassembler.pending().len() <= MAX_CONTROL_MESSAGE);
    }
}
