//! Generic SSE (Server-Sent Events) line parser.
//!
//! Converts a `reqwest::Response` body into a `Stream<Item = SseEvent>`.

use std::fmt::Display;
use std::pin::Pin;

use futures::Stream;
use tokio_stream::StreamExt;

use crate::ProviderError;

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Parse a reqwest response body as an SSE stream.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<SseEvent, ProviderError>> + Send {
    parse_sse_bytes(response.bytes_stream())
}

/// Parse any byte-chunk stream as SSE. Lines may be split across chunks.
pub fn parse_sse_bytes<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseEvent, ProviderError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    futures::stream::unfold(
        SseState {
            byte_stream: Box::pin(byte_stream),
            buffer: String::new(),
            current_event: None,
            current_data: Vec::new(),
            current_id: None,
        },
        |mut state| async move {
            loop {
                if let Some(newline_pos) = state.buffer.find('\n') {
                    let line = state.buffer[..newline_pos].trim_end_matches('\r').to_string();
                    state.buffer.drain(..=newline_pos);
                    if let Some(event) = state.feed_line(&line) {
                        return Some((Ok(event), state));
                    }
                    continue;
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&chunk));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(ProviderError::Stream(format!("SSE stream error: {e}"))),
                            state,
                        ));
                    }
                    None => {
                        // Stream ended. Flush a final unterminated line, then
                        // dispatch any remaining data.
                        let rest = std::mem::take(&mut state.buffer);
                        let line = rest.trim_end_matches('\r');
                        if !line.is_empty() {
                            state.feed_line(line);
                        }
                        return state.take_event().map(|event| (Ok(event), state));
                    }
                }
            }
        },
    )
}

struct SseState<E> {
    byte_stream: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, E>> + Send>>,
    buffer: String,
    current_event: Option<String>,
    current_data: Vec<String>,
    current_id: Option<String>,
}

impl<E> SseState<E> {
    /// Apply one line; an empty line dispatches the pending event.
    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.take_event();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("event:") {
            self.current_event = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.current_data.push(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            self.current_id = Some(value.trim_start().to_string());
        }
        None
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            return None;
        }
        let event = SseEvent {
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
            id: self.current_id.take(),
        };
        self.current_data.clear();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<bytes::Bytes, String>> + Send {
        futures::stream::iter(
            parts
                .iter()
                .map(|p| Ok(bytes::Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_events_split_across_chunks() {
        let stream = parse_sse_bytes(chunks(&[
            "data: {\"a\":",
            "1}\n\n: keep-alive\n",
            "event: done\ndata: [DONE]\n\n",
        ]));
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
        let first = events[0].as_ref().unwrap();
        assert_eq!(first.data, "{\"a\":1}");
        let second = events[1].as_ref().unwrap();
        assert_eq!(second.event.as_deref(), Some("done"));
        assert_eq!(second.data, "[DONE]");
    }

    #[tokio::test]
    async fn test_multiline_data_and_trailing_event() {
        let stream = parse_sse_bytes(chunks(&["id: 7\r\ndata: one\r\ndata: two"]));
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.data, "one\ntwo");
        assert_eq!(event.id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_transport_error_becomes_stream_error() {
        let stream = parse_sse_bytes(futures::stream::iter(vec![Err::<bytes::Bytes, _>(
            "connection reset".to_string(),
        )]));
        let events: Vec<_> = stream.collect().await;
        assert!(matches!(events[0], Err(ProviderError::Stream(_))));
    }
}
