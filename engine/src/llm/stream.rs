//! Incremental decoding of streamed HTTP bodies
//!
//! Anthropic streams Server-Sent Events and Ollama streams newline-delimited
//! JSON. Both arrive as arbitrary byte chunks, so lines (and multi-byte
//! characters) can be split across chunk boundaries.

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::{LLMError, Result, TextStream};

/// Splits a byte stream into complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line it finishes.
    ///
    /// Trailing `\r` is stripped; invalid UTF-8 is replaced lossily once the
    /// whole line is available.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Return whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

/// A single dispatched Server-Sent Event
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SseEvent {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// Joined `data:` lines
    pub data: String,
}

/// Line-oriented SSE parser
///
/// Feed it lines from a [`LineBuffer`]; an empty line dispatches the
/// event accumulated so far. Comment lines and unknown fields are ignored.
#[derive(Debug, Default)]
pub struct SseParser {
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one line, returning an event when the line ends one
    pub fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    /// Dispatch a final event that was not followed by a blank line
    pub fn flush(&mut self) -> Option<SseEvent> {
        self.dispatch()
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() && self.event.is_none() {
            return None;
        }
        let event = SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        };
        Some(event)
    }
}

/// What a line decoder made of one unit of input
pub enum Decoded {
    /// A reply fragment to hand to the caller
    Text(String),
    /// Nothing to emit for this unit
    Skip,
    /// The provider signalled the end of the reply
    Done,
}

/// Turn a raw byte stream into a [`TextStream`] using a per-line decoder.
///
/// The decoder sees every complete line, including a trailing partial
/// line once the body ends. Empty fragments are dropped. The stream ends
/// at the first `Done`, the first error, or the end of the body.
pub fn decode_lines<S, F>(body: S, decode: F) -> TextStream
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
    F: FnMut(&str) -> Result<Decoded> + Send + 'static,
{
    struct State<S, F> {
        body: std::pin::Pin<Box<S>>,
        lines: LineBuffer,
        ready: std::collections::VecDeque<String>,
        decode: F,
        finished: bool,
    }

    let state = State {
        body: Box::pin(body),
        lines: LineBuffer::new(),
        ready: std::collections::VecDeque::new(),
        decode,
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                match (state.decode)(&line) {
                    Ok(Decoded::Text(text)) if !text.is_empty() => {
                        return Some((Ok(text), state));
                    }
                    Ok(Decoded::Text(_)) | Ok(Decoded::Skip) => continue,
                    Ok(Decoded::Done) => return None,
                    Err(e) => {
                        state.finished = true;
                        state.ready.clear();
                        return Some((Err(e), state));
                    }
                }
            }

            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.lines.push(&chunk);
                    state.ready.extend(lines);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(LLMError::NetworkError(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    state.ready.extend(state.lines.finish());
                    // A blank line lets SSE decoders dispatch a final unterminated event
                    state.ready.push_back(String::new());
                }
            }
        }
    });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_splits_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: hel").is_empty());
        assert_eq!(buf.push(b"lo\r\ndata: x\n"), vec!["data: hello", "data: x"]);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_line_buffer_keeps_split_utf8_intact() {
        let text = "caf\u{e9}\n".as_bytes();
        let mut buf = LineBuffer::new();
        assert!(buf.push(&text[..4]).is_empty());
        assert_eq!(buf.push(&text[4..]), vec!["caf\u{e9}"]);
    }

    #[test]
    fn test_line_buffer_finish_returns_tail() {
        let mut buf = LineBuffer::new();
        buf.push(b"{\"done\":true}");
        assert_eq!(buf.finish().as_deref(), Some("{\"done\":true}"));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_sse_parser_dispatches_on_blank_line() {
        let mut parser = SseParser::new();
        assert!(parser.process_line("event: content_block_delta").is_none());
        assert!(parser.process_line("data: {\"a\":1}").is_none());

        let event = parser.process_line("").unwrap();
        assert_eq!(event.event.as_deref(), Some("content_block_delta"));
        assert_eq!(event.data, "{\"a\":1}");

        // Nothing pending
        assert!(parser.process_line("").is_none());
    }

    #[test]
    fn test_sse_parser_ignores_comments_and_joins_data() {
        let mut parser = SseParser::new();
        parser.process_line(": keep-alive");
        parser.process_line("data: one");
        parser.process_line("data:two");
        parser.process_line("id: 7");

        let event = parser.flush().unwrap();
        assert_eq!(event.event, None);
        assert_eq!(event.data, "one\ntwo");
    }

    #[tokio::test]
    async fn test_decode_lines_stops_at_done() {
        let chunks: Vec<std::result::Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"a\nb\n")),
            Ok(Bytes::from_static(b"stop\nc\n")),
        ];
        let stream = decode_lines(futures::stream::iter(chunks), |line| {
            Ok(match line {
                "" => Decoded::Skip,
                "stop" => Decoded::Done,
                other => Decoded::Text(other.to_uppercase()),
            })
        });

        let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_decode_lines_surfaces_decoder_error_once() {
        let chunks: Vec<std::result::Result<Bytes, reqwest::Error>> =
            vec![Ok(Bytes::from_static(b"ok\nbad\nlater\n"))];
        let stream = decode_lines(futures::stream::iter(chunks), |line| match line {
            "bad" => Err(LLMError::ParseError("bad line".into())),
            "" => Ok(Decoded::Skip),
            other => Ok(Decoded::Text(other.to_string())),
        });

        let items: Vec<Result<String>> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "ok");
        assert!(items[1].is_err());
    }
}
