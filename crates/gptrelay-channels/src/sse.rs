//! Server-sent-event decoding for upstream replies.
//!
//! Only `data:` fields matter here; comments, `event:` and `id:` lines are
//! dropped. Each `data:` line is reported as one payload, which matches
//! how chat-completions backends emit one JSON object per line.

use async_stream::stream;
use bytes::BytesMut;
use futures::StreamExt;

use gptrelay_transport::ByteStream;

use crate::error::SessionError;
use crate::session::FragmentStream;

/// Incremental line splitter for an SSE body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the `data:` payloads completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(line_end) = find_newline(&self.buf) {
            let line = self.buf.split_to(line_end);
            if let Some(data) = data_payload(&line) {
                out.push(data);
            }
        }
        out
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = self.buf.split();
        data_payload(&line)
    }
}

fn find_newline(buf: &BytesMut) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}

fn data_payload(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(['\r', '\n']);
    let data = text.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.is_empty() {
        return None;
    }
    Some(data.to_string())
}

/// Turn a raw upstream body into its sequence of `data:` payloads.
pub fn data_events(mut body: ByteStream) -> FragmentStream {
    stream! {
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for payload in decoder.push(&bytes) {
                        yield Ok(payload);
                    }
                }
                Err(e) => {
                    yield Err(SessionError::from(e));
                    return;
                }
            }
        }
        if let Some(payload) = decoder.finish() {
            yield Ok(payload);
        }
    }
    .boxed()
}
