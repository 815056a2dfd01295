// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE parsing for streamed chat completions.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use mnemo_core::MnemoError;

use crate::types::ChatCompletionChunk;

/// One parsed server-sent event.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(ChatCompletionChunk),
    /// The `[DONE]` sentinel.
    Done,
}

/// Turns a streaming response body into typed events.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, MnemoError>> + Send>> {
    let events = response.bytes_stream().eventsource().map(|result| match result {
        Ok(event) => parse_event_data(&event.data),
        Err(e) => Err(MnemoError::provider(format!("SSE stream error: {e}"))),
    });
    Box::pin(events)
}

/// Parses the `data:` payload of one event.
pub fn parse_event_data(data: &str) -> Result<StreamEvent, MnemoError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(StreamEvent::Done);
    }
    serde_json::from_str::<ChatCompletionChunk>(data)
        .map(StreamEvent::Chunk)
        .map_err(|e| MnemoError::Provider {
            message: format!("failed to parse stream chunk: {e}"),
            source: Some(Box::new(e)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_sentinel() {
        assert!(matches!(parse_event_data("[DONE]"), Ok(StreamEvent::Done)));
    }

    #[test]
    fn content_delta() {
        let event =
            parse_event_data(r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#).unwrap();
        match event {
            StreamEvent::Chunk(chunk) => {
                assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
            }
            StreamEvent::Done => panic!("expected a chunk"),
        }
    }

    #[test]
    fn malformed_data_is_a_provider_error() {
        let err = parse_event_data("{not json").unwrap_err();
        assert!(err.to_string().contains("failed to parse stream chunk"));
    }

    #[tokio::test]
    async fn parses_served_event_stream() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let response = reqwest::get(server.uri()).await.unwrap();
        let events: Vec<_> = parse_sse_stream(response).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Ok(StreamEvent::Done)));
    }
}
