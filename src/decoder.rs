use crate::protocol::StreamFrame;

/// Incremental decoder for the line-oriented `event:` / `data:` wire format.
///
/// Chunks arrive with no alignment guarantees: a frame, a line, or even a
/// single UTF-8 character may be split across reads. Three layers of state
/// carry over between `feed` calls: undecoded trailing bytes, the partial
/// line after the last newline, and the current frame's accumulators.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    line_buf: String,
    event: String,
    data: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one chunk and returns every frame completed by it, in wire
    /// order. Incomplete trailing input is retained, never discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.pending.extend_from_slice(chunk);
        let text = self.take_decodable_text();
        self.line_buf.push_str(&text);

        let mut frames = Vec::new();
        while let Some(newline) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=newline).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            if let Some(rest) = line.strip_prefix("event:") {
                self.event = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("data:") {
                // Last write wins when a frame carries several data lines.
                self.data = rest.trim().to_string();
            } else if line.is_empty() {
                if !self.event.is_empty() && !self.data.is_empty() {
                    frames.push(StreamFrame {
                        event: std::mem::take(&mut self.event),
                        data: std::mem::take(&mut self.data),
                    });
                } else {
                    // Half-empty frames (keep-alives, comments) are dropped.
                    self.event.clear();
                    self.data.clear();
                }
            }
            // Any other line is a comment or unknown field; ignored.
        }
        frames
    }

    /// Decodes the longest usable prefix of the pending bytes. A trailing
    /// incomplete UTF-8 sequence stays pending for the next chunk; invalid
    /// bytes mid-stream become U+FFFD rather than killing the stream.
    fn take_decodable_text(&mut self) -> String {
        let mut out = String::new();
        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_up_to = consumed + err.valid_up_to();
                    out.push_str(
                        std::str::from_utf8(&self.pending[consumed..valid_up_to])
                            .unwrap_or_default(),
                    );
                    match err.error_len() {
                        Some(bad) => {
                            out.push('\u{FFFD}');
                            consumed = valid_up_to + bad;
                        }
                        None => {
                            // Incomplete sequence at the end of the chunk.
                            consumed = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> StreamFrame {
        StreamFrame {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    fn feed_all(decoder: &mut FrameDecoder, chunks: &[&[u8]]) -> Vec<StreamFrame> {
        chunks
            .iter()
            .flat_map(|chunk| decoder.feed(chunk))
            .collect()
    }

    #[test]
    fn single_chunk_single_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"event: status\ndata: {\"phase\":\"start\"}\n\n");
        assert_eq!(frames, vec![frame("status", "{\"phase\":\"start\"}")]);
    }

    #[test]
    fn frame_split_mid_data_line() {
        let mut decoder = FrameDecoder::new();
        let chunks: Vec<&[u8]> = vec![b"event: done\ndata: {\"succ", b"ess\":true}\n\n"];
        let frames = feed_all(&mut decoder, &chunks);
        assert_eq!(frames, vec![frame("done", "{\"success\":true}")]);
    }

    #[test]
    fn chunking_invariance_byte_at_a_time() {
        let wire = b"event: status\ndata: {\"phase\":\"a\"}\n\nevent: ai_chunk\ndata: {\"content\":\"hi\"}\n\nevent: done\ndata: {\"success\":true}\n\n";

        let mut whole = FrameDecoder::new();
        let expected = whole.feed(wire);
        assert_eq!(expected.len(), 3);

        let mut trickle = FrameDecoder::new();
        let mut got = Vec::new();
        for byte in wire.iter() {
            got.extend(trickle.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let wire = "event: ai_chunk\ndata: {\"content\":\"héllo\"}\n\n".as_bytes();
        // Split inside the two-byte encoding of 'é'.
        let split = wire
            .iter()
            .position(|&b| b == 0xC3)
            .expect("multibyte start byte")
            + 1;

        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &[&wire[..split], &wire[split..]]);
        assert_eq!(frames, vec![frame("ai_chunk", "{\"content\":\"héllo\"}")]);
    }

    #[test]
    fn event_without_data_is_dropped() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"event: ping\n\nevent: done\ndata: {}\n\n");
        assert_eq!(frames, vec![frame("done", "{}")]);
    }

    #[test]
    fn data_without_event_is_dropped() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: {\"orphan\":true}\n\n").is_empty());
    }

    #[test]
    fn last_data_line_wins() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"event: data\ndata: {\"v\":1}\ndata: {\"v\":2}\n\n");
        assert_eq!(frames, vec![frame("data", "{\"v\":2}")]);
    }

    #[test]
    fn crlf_line_endings_accepted() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"event: done\r\ndata: {\"success\":true}\r\n\r\n");
        assert_eq!(frames, vec![frame("done", "{\"success\":true}")]);
    }

    #[test]
    fn comment_lines_ignored() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b": keep-alive\nevent: done\n: another\ndata: {}\n\n");
        assert_eq!(frames, vec![frame("done", "{}")]);
    }

    #[test]
    fn trailing_partial_frame_is_not_emitted() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"event: done\ndata: {\"success\":true}\n").is_empty());
        // The blank line arrives later and completes the frame.
        assert_eq!(
            decoder.feed(b"\n"),
            vec![frame("done", "{\"success\":true}")]
        );
    }

    #[test]
    fn frame_accumulators_carry_across_many_chunks() {
        let mut decoder = FrameDecoder::new();
        let chunks: Vec<&[u8]> =
            vec![b"event:", b" status\n", b"data:", b" {\"phase\":\"x\"}\n", b"\n"];
        let frames = feed_all(&mut decoder, &chunks);
        assert_eq!(frames, vec![frame("status", "{\"phase\":\"x\"}")]);
    }

    #[test]
    fn invalid_bytes_are_replaced_not_fatal() {
        let mut decoder = FrameDecoder::new();
        let mut wire = b"event: ai_chunk\ndata: {\"content\":\"a".to_vec();
        wire.push(0xFF);
        wire.extend_from_slice(b"b\"}\n\nevent: done\ndata: {}\n\n");
        let frames = decoder.feed(&wire);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], frame("done", "{}"));
    }
}
