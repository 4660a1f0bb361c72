//! Server-sent event decoding for streamed completions.
//!
//! Both providers stream `data: {json}` lines. The byte stream is buffered
//! until a newline, each `data:` payload is decoded and handed to a
//! provider-specific extractor. `[DONE]` ends the stream early.

use std::collections::VecDeque;
use std::fmt::Display;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::trace;

use crate::completion::TextStream;
use crate::error::LlmError;

/// Pulls the text delta out of one decoded event, if it carries any.
pub(crate) type DeltaExtractor = fn(&Value) -> Option<String>;

/// OpenAI chat completion chunk: `choices[0].delta.content`
pub(crate) fn openai_delta(event: &Value) -> Option<String> {
    event
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Anthropic messages stream: `content_block_delta` events
pub(crate) fn anthropic_delta(event: &Value) -> Option<String> {
    if event.get("type").and_then(Value::as_str) != Some("content_block_delta") {
        return None;
    }
    event
        .pointer("/delta/text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

struct SseState<S> {
    source: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

impl<S> SseState<S> {
    fn take_lines(&mut self, extract: DeltaExtractor) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line, extract);
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &[u8], extract: DeltaExtractor) {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(payload) = line.strip_prefix("data:") else {
            return;
        };
        let payload = payload.trim_start();

        if payload == "[DONE]" {
            self.finished = true;
            return;
        }
        if payload.is_empty() {
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(event) => {
                if let Some(text) = extract(&event).filter(|t| !t.is_empty()) {
                    self.pending.push_back(Ok(text));
                }
            }
            Err(e) => {
                trace!(payload, "Undecodable stream event");
                self.pending.push_back(Err(LlmError::Parse(e.to_string())));
                self.finished = true;
            }
        }
    }
}

/// Turn a raw byte stream into a stream of text deltas.
pub(crate) fn text_stream<S, B, E>(source: S, extract: DeltaExtractor) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        source,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let stream = futures::stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.source.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.take_lines(extract);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(LlmError::Api(e.to_string())), state));
                }
                None => {
                    // Flush a final line that lacks its newline
                    if !state.buffer.is_empty() {
                        let rest = std::mem::take(&mut state.buffer);
                        state.handle_line(&rest, extract);
                    }
                    state.finished = true;
                }
            }
        }
    });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(chunks: &[&str]) -> impl Stream<Item = Result<Vec<u8>, String>> + Unpin + Send {
        let items: Vec<Result<Vec<u8>, String>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        futures::stream::iter(items)
    }

    async fn collect(stream: TextStream) -> Vec<Result<String, LlmError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_openai_chunks_split_across_reads() {
        let stream = text_stream(
            source(&[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Twelve \"}}]}\n\ndata: {\"cho",
                "ices\":[{\"delta\":{\"content\":\"years.\"}}]}\n\n",
                "data: [DONE]\n\n",
            ]),
            openai_delta,
        );
        let items: Vec<String> = collect(stream).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(items, vec!["Twelve ", "years."]);
    }

    #[tokio::test]
    async fn test_anthropic_ignores_non_delta_events() {
        let stream = text_stream(
            source(&[
                "event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
                "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi.\"}}\n\n",
                "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
            ]),
            anthropic_delta,
        );
        let items: Vec<String> = collect(stream).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(items, vec!["Hi."]);
    }

    #[tokio::test]
    async fn test_done_stops_reading() {
        let stream = text_stream(
            source(&[
                "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: [DONE]\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n",
            ]),
            openai_delta,
        );
        let items: Vec<String> = collect(stream).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(items, vec!["a"]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let stream = text_stream(
            source(&["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"]),
            openai_delta,
        );
        let items: Vec<String> = collect(stream).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(items, vec!["tail"]);
    }

    #[tokio::test]
    async fn test_transport_and_parse_errors_end_stream() {
        let items: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n".to_vec()),
            Err("connection reset".to_string()),
        ];
        let results = collect(text_stream(futures::stream::iter(items), openai_delta)).await;
        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(LlmError::Api(_))));

        let results = collect(text_stream(source(&["data: {not json\n"]), openai_delta)).await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(LlmError::Parse(_))));
    }
}
