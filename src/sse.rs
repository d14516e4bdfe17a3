//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! The Gemini API streams `streamGenerateContent?alt=sse` as a sequence of
//! `data: <json>` frames separated by blank lines.  This module turns the raw
//! byte stream into a stream of [`GenerateContentResponse`] chunks.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::error::ErrorResponse;
use crate::observability::STREAM_BYTES;
use crate::{Error, GenerateContentResponse, Result};

/// Process a stream of bytes into a stream of response chunks.
///
/// Frames may be split across reads, lines may end in CRLF, and a multi-byte
/// character may straddle two reads.  Comment and keep-alive frames produce no
/// item.  An `{"error": ...}` frame produces an `Err` item.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<GenerateContentResponse>> + Send
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send + 'static,
{
    stream::unfold(SseState::new(byte_stream), |mut state| async move {
        loop {
            // First drain complete frames already in the buffer
            if let Some((event, remaining)) = extract_event(&state.buffer) {
                state.buffer = remaining;
                match event {
                    Some(event) => return Some((event, state)),
                    None => continue,
                }
            }
            if state.done {
                return None;
            }

            // Read more data
            match state.stream.next().await {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    state.pending.extend_from_slice(&bytes);
                    match take_utf8(&mut state.pending) {
                        Ok(text) => state.buffer.extend(text.chars().filter(|c| *c != '\r')),
                        Err(e) => {
                            state.done = true;
                            return Some((Err(e), state));
                        }
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    // End of stream
                    state.done = true;
                    if !state.pending.is_empty() {
                        state.pending.clear();
                        return Some((
                            Err(Error::encoding(
                                "Stream ended inside a UTF-8 sequence",
                                None,
                            )),
                            state,
                        ));
                    }
                    if !state.buffer.trim().is_empty() {
                        // A final frame without its terminating blank line.
                        state.buffer.push_str("\n\n");
                        continue;
                    }
                    return None;
                }
            }
        }
    })
}

struct SseState<S> {
    stream: S,
    pending: Vec<u8>,
    buffer: String,
    done: bool,
}

impl<S> SseState<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            pending: Vec::new(),
            buffer: String::new(),
            done: false,
        }
    }
}

/// Move the longest valid UTF-8 prefix out of `pending`.
///
/// An incomplete trailing sequence stays in `pending` for the next read; an
/// invalid sequence is an error.
fn take_utf8(pending: &mut Vec<u8>) -> Result<String> {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_owned();
            pending.clear();
            Ok(text)
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = std::str::from_utf8(&pending[..valid])?.to_owned();
            pending.drain(..valid);
            Ok(text)
        }
        Err(e) => Err(Error::encoding(
            format!("Invalid UTF-8 in stream: {e}"),
            Some(Box::new(e)),
        )),
    }
}

/// Extract a complete SSE frame from a buffer string.
///
/// Returns `None` when no complete frame is buffered.  Otherwise returns the
/// parsed frame (itself `None` for frames without data) and the rest of the
/// buffer.
fn extract_event(buffer: &str) -> Option<(Option<Result<GenerateContentResponse>>, String)> {
    let (event_text, rest) = buffer.split_once("\n\n")?;
    let rest = rest.to_string();

    let mut data: Option<String> = None;
    for line in event_text.lines() {
        let Some(value) = line.strip_prefix("data:") else {
            // `event:`, `id:`, `retry:` and `:` comments carry nothing we use.
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match data.as_mut() {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    match data {
        Some(data) if !data.trim().is_empty() => Some((Some(parse_payload(&data)), rest)),
        _ => Some((None, rest)),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Failure(ErrorResponse),
    Chunk(GenerateContentResponse),
}

fn parse_payload(data: &str) -> Result<GenerateContentResponse> {
    match serde_json::from_str::<StreamPayload>(data) {
        Ok(StreamPayload::Chunk(chunk)) => Ok(chunk),
        Ok(StreamPayload::Failure(failure)) => Err(failure.into_error(500, None)),
        Err(e) => Err(Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    const HEL: &str = r#"data: {"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"}]}}]}"#;
    const LO: &str = r#"data: {"candidates":[{"content":{"role":"model","parts":[{"text":"lo"}]}}]}"#;

    async fn collect(chunks: Vec<Vec<u8>>) -> Vec<Result<GenerateContentResponse>> {
        let stream = stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))));
        process_sse(stream).collect().await
    }

    #[tokio::test]
    async fn parse_single_chunk() {
        let events = collect(vec![format!("{HEL}\n\n").into_bytes()]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().text().as_deref(), Some("Hel"));
    }

    #[tokio::test]
    async fn parse_multiple_chunks_with_crlf() {
        let events = collect(vec![format!("{HEL}\r\n\r\n{LO}\r\n\r\n").into_bytes()]).await;
        let texts: Vec<_> = events
            .into_iter()
            .map(|e| e.unwrap().text().unwrap())
            .collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn handle_split_event() {
        let frame = format!("{HEL}\n\n").into_bytes();
        let (first, second) = frame.split_at(17);
        let events = collect(vec![first.to_vec(), second.to_vec()]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().text().as_deref(), Some("Hel"));
    }

    #[tokio::test]
    async fn handle_split_utf8_character() {
        let frame = r#"data: {"candidates":[{"content":{"parts":[{"text":"héllo"}]}}]}"#.to_string()
            + "\n\n";
        let bytes = frame.into_bytes();
        let split = bytes.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let events = collect(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().text().as_deref(), Some("héllo"));
    }

    #[tokio::test]
    async fn skip_comments_and_keepalives() {
        let events = collect(vec![format!(": keep-alive\n\n\n\n{LO}\n\n").into_bytes()]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().text().as_deref(), Some("lo"));
    }

    #[tokio::test]
    async fn trailing_frame_without_blank_line() {
        let events = collect(vec![format!("{HEL}\n").into_bytes()]).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[tokio::test]
    async fn handle_malformed_json() {
        let events = collect(vec![b"data: {not json\n\n".to_vec()]).await;
        assert_eq!(events.len(), 1);
        let err = events[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("Failed to parse event JSON"));
    }

    #[tokio::test]
    async fn error_payload_becomes_error() {
        let frame = br#"data: {"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#;
        let mut bytes = frame.to_vec();
        bytes.extend_from_slice(b"\n\n");
        let events = collect(vec![bytes]).await;
        let err = events[0].as_ref().unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(err.message(), "The model is overloaded.");
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_error() {
        let events = collect(vec![vec![b'd', b'a', 0xff, 0xfe, b'\n', b'\n']]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(Error::Encoding { .. })));
    }

    #[tokio::test]
    async fn chunk_without_text_is_passed_through() {
        let events = collect(vec![
            br#"data: {"usageMetadata":{"totalTokenCount":3}}"#.to_vec(),
            b"\n\n".to_vec(),
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().text(), None);
    }
}
