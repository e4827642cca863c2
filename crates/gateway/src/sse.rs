//! Frame decoder for the chat stream.
//!
//! Wire format: frames separated by `\n\n`, each of the form
//! `data: {"content": "..."}` or `data: {"error": "..."}`. Blocks without the
//! `data: ` prefix and objects with neither field are skipped; a prefixed
//! block whose body is not JSON ends the stream as [`StreamFrame::Malformed`].

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use shared::GatewayError;

use crate::ByteStream;

const DELIMITER: &[u8] = b"\n\n";
const DATA_PREFIX: &str = "data: ";

/// One decoded unit of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Next piece of the reply text.
    Content(String),
    /// Backend-reported failure. Always the last frame of a stream.
    Error(String),
    /// A `data: ` block whose body failed to parse. Also terminal.
    Malformed(String),
}

impl StreamFrame {
    /// Error and malformed frames end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Error(_) | StreamFrame::Malformed(_))
    }
}

/// Incremental parser that carries incomplete frames across chunk boundaries.
///
/// The carry buffer holds raw bytes, so a multi-byte character split between
/// two chunks is decoded only once both halves have arrived.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    terminated: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a terminal frame has been produced; further input is ignored.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Feed raw bytes. Returns the frames completed by this chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        if self.terminated {
            return frames;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(boundary) = find_delimiter(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..boundary + DELIMITER.len()).collect();
            for frame in decode_block(&block[..boundary]) {
                let terminal = frame.is_terminal();
                frames.push(frame);
                if terminal {
                    self.terminated = true;
                    self.buffer.clear();
                    return frames;
                }
            }
        }

        frames
    }

    /// Signal end of input. Any incomplete trailing fragment is dropped;
    /// returns how many bytes were discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len();
        if discarded > 0 {
            tracing::debug!(bytes = discarded, "discarding incomplete trailing frame");
        }
        self.buffer.clear();
        discarded
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}

fn decode_block(block: &[u8]) -> Vec<StreamFrame> {
    let text = String::from_utf8_lossy(block);
    let text = text.trim_start_matches(['\r', '\n']);

    let Some(body) = text.strip_prefix(DATA_PREFIX) else {
        tracing::debug!(frame = %text, "skipping frame without data prefix");
        return Vec::new();
    };

    let payload = match serde_json::from_str::<Value>(body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "malformed frame body");
            return vec![StreamFrame::Malformed(e.to_string())];
        }
    };

    // non-object JSON and non-string fields carry nothing to show
    let field = |name: &str| {
        payload
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let mut frames = Vec::with_capacity(2);
    if let Some(content) = field("content") {
        frames.push(StreamFrame::Content(content));
    }
    if let Some(error) = field("error") {
        frames.push(StreamFrame::Error(error));
    }
    frames
}

struct FrameState {
    source: Option<ByteStream>,
    parser: FrameParser,
    pending: VecDeque<StreamFrame>,
}

/// Lazily decode a byte stream into frames.
///
/// The sequence ends when the source completes, right after a terminal frame,
/// or after yielding a transport failure. Reaching a terminal frame drops the
/// source immediately instead of draining it, as does dropping the returned
/// stream.
pub fn frames(source: ByteStream) -> BoxStream<'static, Result<StreamFrame, GatewayError>> {
    let state = FrameState {
        source: Some(source),
        parser: FrameParser::new(),
        pending: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }
            let source = state.source.as_mut()?;
            match source.next().await {
                Some(Ok(chunk)) => {
                    state.pending.extend(state.parser.feed(&chunk));
                    if state.parser.is_terminated() {
                        state.source = None;
                    }
                }
                Some(Err(e)) => {
                    state.source = None;
                    return Some((Err(e), state));
                }
                None => {
                    state.parser.finish();
                    state.source = None;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn chunks(parts: &[&str]) -> ByteStream {
        let owned: Vec<Result<Vec<u8>, GatewayError>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned).boxed()
    }

    #[test]
    fn test_basic_frames() {
        let mut parser = FrameParser::new();
        let frames = parser.feed(b"data: {\"content\":\"Hi\"}\n\ndata: {\"content\":\" there\"}\n\n");
        assert_eq!(
            frames,
            vec![
                StreamFrame::Content("Hi".into()),
                StreamFrame::Content(" there".into())
            ]
        );
    }

    #[test]
    fn test_split_across_chunks() {
        let mut parser = FrameParser::new();
        assert!(parser.feed(b"data: {\"content\":\"Hel").is_empty());
        let frames = parser.feed(b"lo\"}\n\n");
        assert_eq!(frames, vec![StreamFrame::Content("Hello".into())]);
    }

    #[test]
    fn test_delimiter_split_across_chunks() {
        let mut parser = FrameParser::new();
        assert!(parser.feed(b"data: {\"content\":\"a\"}\n").is_empty());
        assert_eq!(parser.feed(b"\n"), vec![StreamFrame::Content("a".into())]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let encoded = "data: {\"content\":\"caf\u{e9} \u{1f9e0}\"}\n\n".as_bytes().to_vec();
        // split inside the four-byte emoji
        let cut = encoded.len() - 6;
        let mut parser = FrameParser::new();
        assert!(parser.feed(&encoded[..cut]).is_empty());
        assert_eq!(
            parser.feed(&encoded[cut..]),
            vec![StreamFrame::Content("caf\u{e9} \u{1f9e0}".into())]
        );
    }

    #[test]
    fn test_unprefixed_and_empty_frames_are_skipped() {
        let mut parser = FrameParser::new();
        let frames = parser.feed(
            b": keep-alive\n\nevent: ping\n\ndata: {}\n\ndata: {\"content\":\"\"}\n\ndata: [1, 2]\n\ndata: {\"content\":\"ok\"}\n\n",
        );
        assert_eq!(frames, vec![StreamFrame::Content("ok".into())]);
    }

    #[test]
    fn test_unparseable_body_terminates() {
        let mut parser = FrameParser::new();
        let frames = parser.feed(
            b"data: {\"content\":\"A\"}\n\ndata: not json\n\ndata: {\"content\":\"B\"}\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], StreamFrame::Content("A".into()));
        assert!(matches!(frames[1], StreamFrame::Malformed(_)));
        assert!(parser.is_terminated());
    }

    #[test]
    fn test_error_frame_terminates() {
        let mut parser = FrameParser::new();
        let frames = parser.feed(
            b"data: {\"content\":\"A\"}\n\ndata: {\"error\":\"X\"}\n\ndata: {\"content\":\"C\"}\n\n",
        );
        assert_eq!(
            frames,
            vec![StreamFrame::Content("A".into()), StreamFrame::Error("X".into())]
        );
        assert!(parser.is_terminated());
        assert!(parser.feed(b"data: {\"content\":\"D\"}\n\n").is_empty());
    }

    #[test]
    fn test_content_before_error_in_same_frame() {
        let mut parser = FrameParser::new();
        let frames = parser.feed(b"data: {\"content\":\"tail\",\"error\":\"boom\"}\n\n");
        assert_eq!(
            frames,
            vec![
                StreamFrame::Content("tail".into()),
                StreamFrame::Error("boom".into())
            ]
        );
    }

    #[test]
    fn test_finish_discards_fragment() {
        let mut parser = FrameParser::new();
        assert!(parser.feed(b"data: {\"content\":\"cut of").is_empty());
        assert_eq!(parser.finish(), 24);
        assert_eq!(parser.finish(), 0);
    }

    #[tokio::test]
    async fn test_frames_stream_over_chunks() {
        let source = chunks(&["data: {\"content\":\"Hel", "lo\"}\n\n", "data: {\"content\":\"!\"}\n\ndata: {\"con"]);
        let collected: Vec<_> = frames(source).collect().await;
        assert_eq!(
            collected,
            vec![
                Ok(StreamFrame::Content("Hello".into())),
                Ok(StreamFrame::Content("!".into()))
            ]
        );
    }

    #[tokio::test]
    async fn test_frames_stream_surfaces_transport_failure() {
        let parts: Vec<Result<Vec<u8>, GatewayError>> = vec![
            Ok(b"data: {\"content\":\"A\"}\n\n".to_vec()),
            Err(GatewayError::Transport("connection reset".into())),
            Ok(b"data: {\"content\":\"B\"}\n\n".to_vec()),
        ];
        let collected: Vec<_> = frames(stream::iter(parts).boxed()).collect().await;
        assert_eq!(
            collected,
            vec![
                Ok(StreamFrame::Content("A".into())),
                Err(GatewayError::Transport("connection reset".into()))
            ]
        );
    }

    #[tokio::test]
    async fn test_error_frame_releases_source_without_draining() {
        let drained = Arc::new(AtomicBool::new(false));
        let flag = drained.clone();
        let head = stream::iter(vec![Ok(b"data: {\"error\":\"X\"}\n\n".to_vec())]);
        // the tail is only polled if the parser keeps reading past the error
        let tail = stream::once(async move {
            flag.store(true, Ordering::SeqCst);
            Ok(b"data: {\"content\":\"C\"}\n\n".to_vec())
        });
        let source: ByteStream = head.chain(tail).boxed();

        let collected: Vec<_> = frames(source).collect().await;
        assert_eq!(collected, vec![Ok(StreamFrame::Error("X".into()))]);
        assert!(!drained.load(Ordering::SeqCst));
    }
}
