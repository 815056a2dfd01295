// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parser for Anthropic Messages API streaming responses.
//!
//! Converts a reqwest response byte stream into typed [`StreamEvent`] variants
//! using the `eventsource-stream` crate for SSE protocol compliance.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use mnemo_core::MnemoError;
use serde::de::DeserializeOwned;

use crate::types::{
    ApiErrorResponse, SseContentBlockDelta, SseContentBlockStart, SseContentBlockStop,
    SseMessageDelta, SseMessageStart,
};

/// Typed SSE events from the Anthropic streaming protocol.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    MessageStart(SseMessageStart),
    ContentBlockStart(SseContentBlockStart),
    ContentBlockDelta(SseContentBlockDelta),
    ContentBlockStop(SseContentBlockStop),
    /// Stop reason and output usage.
    MessageDelta(SseMessageDelta),
    MessageStop,
    Ping,
    Error(ApiErrorResponse),
}

/// Parses a streaming response into typed events.
///
/// Unknown event names are skipped.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, MnemoError>> + Send>> {
    let events = response
        .bytes_stream()
        .eventsource()
        .filter_map(|result| async move {
            match result {
                Ok(event) => parse_event(&event.event, &event.data),
                Err(e) => Some(Err(MnemoError::provider(format!("SSE stream error: {e}")))),
            }
        });
    Box::pin(events)
}

/// Decodes one event by name; `None` for unknown names.
pub fn parse_event(name: &str, data: &str) -> Option<Result<StreamEvent, MnemoError>> {
    let parsed = match name {
        "message_start" => decode(name, data).map(StreamEvent::MessageStart),
        "content_block_start" => decode(name, data).map(StreamEvent::ContentBlockStart),
        "content_block_delta" => decode(name, data).map(StreamEvent::ContentBlockDelta),
        "content_block_stop" => decode(name, data).map(StreamEvent::ContentBlockStop),
        "message_delta" => decode(name, data).map(StreamEvent::MessageDelta),
        "message_stop" => Ok(StreamEvent::MessageStop),
        "ping" => Ok(StreamEvent::Ping),
        "error" => decode(name, data).map(StreamEvent::Error),
        _ => return None,
    };
    Some(parsed)
}

fn decode<T: DeserializeOwned>(name: &str, data: &str) -> Result<T, MnemoError> {
    serde_json::from_str(data).map_err(|e| MnemoError::Provider {
        message: format!("failed to parse {name}: {e}"),
        source: Some(Box::new(e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SseDelta;

    async fn mock_sse_response(sse_text: &str) -> reqwest::Response {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_text.to_string()),
            )
            .mount(&server)
            .await;

        reqwest::get(server.uri()).await.unwrap()
    }

    #[tokio::test]
    async fn parse_content_block_delta() {
        let sse = "event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);

        match stream.next().await.unwrap().unwrap() {
            StreamEvent::ContentBlockDelta(delta) => match delta.delta {
                SseDelta::TextDelta { ref text } => assert_eq!(text, "Hello"),
                other => panic!("expected TextDelta, got {other:?}"),
            },
            other => panic!("expected ContentBlockDelta, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_events_are_skipped() {
        let sse = "event: unknown_future_event\ndata: {\"foo\":\"bar\"}\n\nevent: message_stop\ndata: {}\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);
        assert!(matches!(
            stream.next().await.unwrap().unwrap(),
            StreamEvent::MessageStop
        ));
    }

    #[test]
    fn parse_message_delta_with_usage() {
        let event = parse_event(
            "message_delta",
            r#"{"delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":25}}"#,
        )
        .unwrap()
        .unwrap();
        match event {
            StreamEvent::MessageDelta(md) => {
                assert_eq!(md.delta.stop_reason.as_deref(), Some("end_turn"));
                assert_eq!(md.usage.unwrap().output_tokens, 25);
            }
            other => panic!("expected MessageDelta, got {other:?}"),
        }
    }

    #[test]
    fn parse_error_event() {
        let event = parse_event(
            "error",
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        )
        .unwrap()
        .unwrap();
        match event {
            StreamEvent::Error(err) => assert_eq!(err.error.type_, "overloaded_error"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_names_the_event() {
        let err = parse_event("content_block_start", "{").unwrap().unwrap_err();
        assert!(err.to_string().contains("content_block_start"));
        assert!(parse_event("ping", "{}").unwrap().is_ok());
    }
}
