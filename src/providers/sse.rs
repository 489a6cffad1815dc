//! Server-sent event framing for streamed completions
//!
//! OpenAI-compatible APIs stream `data: {json}` lines terminated by a blank
//! line, ending with `data: [DONE]`. Network chunks do not respect line
//! boundaries, so bytes are buffered until a full line is available.

use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::{DeltaStream, ProviderError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk and return every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final line that arrived without a trailing newline
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(line: &[u8]) -> Option<SseEvent> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = String::from_utf8_lossy(line);
    let data = line.strip_prefix("data:")?.trim_start();

    if data == "[DONE]" {
        Some(SseEvent::Done)
    } else if data.is_empty() {
        None
    } else {
        Some(SseEvent::Data(data.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's text delta from one event payload
fn parse_delta(data: &str) -> Result<Option<String>, ProviderError> {
    let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse stream chunk: {} - Data: {}", e, data))
    })?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}

/// Turn a raw SSE byte stream into a stream of non-empty text deltas.
///
/// The stream ends after `[DONE]` or when the body ends. A transport error or
/// an unparseable event is yielded once as `Err` and ends the stream.
pub fn decode_deltas<S, B, E>(bytes: S) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ProviderError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = SseDecoder::default();
        let mut done = false;

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };

            for event in decoder.push(chunk.as_ref()) {
                match event {
                    SseEvent::Done => {
                        done = true;
                        break;
                    }
                    SseEvent::Data(data) => match parse_delta(&data) {
                        Ok(Some(text)) => {
                            yield Ok(text);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                }
            }

            if done {
                break;
            }
        }

        if !done {
            if let Some(SseEvent::Data(data)) = decoder.finish() {
                match parse_delta(&data) {
                    Ok(Some(text)) => {
                        yield Ok(text);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_decoder_reassembles_split_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let events = decoder.push(b":1}\r\n\r\ndata: [DONE]\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{\"a\":1}".into()), SseEvent::Done]
        );
    }

    #[test]
    fn test_decoder_ignores_comments_and_fields() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\nevent: message\nid: 7\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_role_only_delta_skipped() {
        let data = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_delta(data).unwrap(), None);
    }

    #[tokio::test]
    async fn test_decode_deltas_in_order() {
        let body = format!("{}{}{}data: [DONE]\n\n", event("Hel"), event("lo"), event(""));
        let (a, b) = body.split_at(17);
        let chunks = vec![
            Ok::<_, ProviderError>(a.as_bytes().to_vec()),
            Ok(b.as_bytes().to_vec()),
        ];

        let deltas: Vec<String> = decode_deltas(stream::iter(chunks))
            .map(|d| d.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn test_nothing_after_done() {
        let body = format!("{}data: [DONE]\n\n{}", event("a"), event("ignored"));
        let chunks = vec![Ok::<_, ProviderError>(body.into_bytes())];

        let deltas: Vec<String> = decode_deltas(stream::iter(chunks))
            .map(|d| d.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let chunks = vec![
            Ok(event("partial").into_bytes()),
            Err(ProviderError::InvalidResponse("connection reset".into())),
            Ok(event("never").into_bytes()),
        ];

        let items: Vec<Result<String, ProviderError>> =
            decode_deltas(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_error_payload_is_an_error() {
        let chunks = vec![Ok::<_, ProviderError>(
            b"data: {\"error\":{\"message\":\"rate limited\"}}\n\n".to_vec(),
        )];

        let items: Vec<Result<String, ProviderError>> =
            decode_deltas(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
