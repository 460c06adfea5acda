//! Server-sent event decoding for push-stream replies.

use futures::{Stream, StreamExt};
use serde_json::Value;

/// Incremental decoder that turns an SSE byte stream into JSON payloads.
#[derive(Debug, Default)]
pub(super) struct EventDecoder {
    buffer: String,
}

impl EventDecoder {
    /// Feeds a chunk and returns every complete event payload it finished.
    ///
    /// Events whose `data:` lines are not valid JSON are skipped.
    pub(super) fn feed(&mut self, chunk: &str) -> Vec<Value> {
        self.buffer.push_str(&chunk.replace("\r\n", "\n"));
        let mut payloads = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..boundary + 2).collect();
            if let Some(payload) = decode_block(&block) {
                payloads.push(payload);
            }
        }
        payloads
    }
}

fn decode_block(block: &str) -> Option<Value> {
    let data = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect::<Vec<_>>()
        .join("\n");
    if data.is_empty() {
        return None;
    }
    serde_json::from_str(&data).ok()
}

/// Reads events until one satisfies `is_reply`.
///
/// Returns `Ok(None)` when the stream ends first.
pub(super) async fn first_matching<S, B, E>(
    stream: S,
    is_reply: impl Fn(&Value) -> bool,
) -> Result<Option<Value>, E>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = EventDecoder::default();
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        let text = String::from_utf8_lossy(bytes.as_ref());
        if let Some(reply) = decoder.feed(&text).into_iter().find(|event| is_reply(event)) {
            return Ok(Some(reply));
        }
    }
    Ok(None)
}
