use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use geochat_core::config::LlmConfig;
use geochat_core::domain::message::Message;

use crate::llm::{ChatRequest, LlmClient, LlmError, StructuredRequest, TextStream};

/// Client for the OpenAI chat completions API and compatible servers.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    request_timeout: Duration,
}

impl OpenAiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_timeout: timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete_structured(&self, request: StructuredRequest) -> Result<Value, LlmError> {
        let body = structured_body(&request);
        debug!(
            event_name = "llm.structured.request",
            model = %request.model,
            schema = %request.schema_name,
            "sending structured completion"
        );

        let response = self
            .authorize(self.http.post(self.endpoint()))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let payload: Value = response.json().await?;
        structured_content(&payload)
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, LlmError> {
        let body = chat_body(&request);
        debug!(event_name = "llm.stream.request", model = %request.model, "starting stream");

        let response =
            self.authorize(self.http.post(self.endpoint())).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        Ok(sse_text_stream(response.bytes_stream().boxed()))
    }
}

fn wire_messages(system: Option<&str>, messages: &[Message]) -> Vec<Value> {
    system
        .map(|content| json!({ "role": "system", "content": content }))
        .into_iter()
        .chain(
            messages
                .iter()
                .map(|message| json!({ "role": message.role.as_str(), "content": message.content })),
        )
        .collect()
}

pub(crate) fn structured_body(request: &StructuredRequest) -> Value {
    json!({
        "model": request.model,
        "temperature": 0,
        "messages": wire_messages(Some(&request.system), &request.messages),
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": request.schema_name,
                "strict": true,
                "schema": request.schema,
            }
        }
    })
}

pub(crate) fn chat_body(request: &ChatRequest) -> Value {
    json!({
        "model": request.model,
        "messages": wire_messages(None, &request.messages),
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "stream": true,
    })
}

/// Pulls the schema-constrained JSON document out of a completion payload.
pub(crate) fn structured_content(payload: &Value) -> Result<Value, LlmError> {
    let content = payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::Decode("completion has no message content".to_string()))?;

    serde_json::from_str(content).map_err(|e| LlmError::Decode(e.to_string()))
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Delta(String),
    Done,
}

/// Line-oriented decoder for `text/event-stream` chunks. Chunks may split
/// lines (and UTF-8 sequences) at arbitrary byte offsets.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, LlmError> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&line)? {
                events.push(event);
            }
        }

        Ok(events)
    }

    pub(crate) fn finish(&mut self) -> Result<Option<SseEvent>, LlmError> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(raw: &[u8]) -> Result<Option<SseEvent>, LlmError> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: Value = serde_json::from_str(data).map_err(|e| LlmError::Decode(e.to_string()))?;
    if let Some(error) = chunk.get("error") {
        return Err(LlmError::Decode(format!("stream reported error: {error}")));
    }

    let delta = chunk.pointer("/choices/0/delta/content").and_then(Value::as_str).unwrap_or("");
    if delta.is_empty() {
        Ok(None)
    } else {
        Ok(Some(SseEvent::Delta(delta.to_string())))
    }
}

struct SseState {
    upstream: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl SseState {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Delta(text) => self.pending.push_back(text),
                SseEvent::Done => {
                    self.finished = true;
                    break;
                }
            }
        }
    }
}

fn sse_text_stream(upstream: BoxStream<'static, reqwest::Result<Bytes>>) -> TextStream {
    let state =
        SseState { upstream, decoder: SseDecoder::default(), pending: VecDeque::new(), finished: false };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(delta) = state.pending.pop_front() {
                return Some((Ok(delta), state));
            }
            if state.finished {
                return None;
            }

            match state.upstream.next().await {
                Some(Ok(chunk)) => match state.decoder.push(&chunk) {
                    Ok(events) => state.absorb(events),
                    Err(error) => {
                        state.finished = true;
                        return Some((Err(error), state));
                    }
                },
                Some(Err(error)) => {
                    state.finished = true;
                    return Some((Err(LlmError::from(error)), state));
                }
                None => {
                    state.finished = true;
                    match state.decoder.finish() {
                        Ok(Some(SseEvent::Delta(text))) => state.pending.push_back(text),
                        Ok(_) => {}
                        Err(error) => return Some((Err(error), state)),
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use futures::stream::{self, StreamExt};
    use serde_json::json;

    use geochat_core::domain::message::Message;

    use super::{chat_body, structured_body, structured_content, SseDecoder, SseEvent};
    use crate::llm::{ChatRequest, LlmError, StructuredRequest};

    #[test]
    fn structured_body_uses_strict_json_schema() {
        let body = structured_body(&StructuredRequest {
            model: "gpt-4o-mini".to_string(),
            system: "extract".to_string(),
            messages: vec![Message::user("France")],
            schema_name: "preference_extraction".to_string(),
            schema: json!({ "type": "object" }),
        });

        assert_eq!(body["temperature"], 0);
        assert_eq!(body["messages"][0], json!({ "role": "system", "content": "extract" }));
        assert_eq!(body["messages"][1], json!({ "role": "user", "content": "France" }));
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(body["response_format"]["json_schema"]["name"], "preference_extraction");
    }

    #[test]
    fn chat_body_requests_streaming() {
        let body = chat_body(&ChatRequest {
            model: "gpt-4.1".to_string(),
            messages: vec![Message::system("be helpful"), Message::user("Where is Lima?")],
            temperature: 0.7,
            max_tokens: 500,
        });

        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn structured_content_parses_embedded_json() {
        let payload = json!({
            "choices": [{ "message": { "content": "{\"isUpdatingUserPreferences\":true}" } }]
        });

        let value = structured_content(&payload).expect("content");
        assert_eq!(value["isUpdatingUserPreferences"], true);

        let missing = structured_content(&json!({ "choices": [] }));
        assert!(matches!(missing, Err(LlmError::Decode(_))));
    }

    #[test]
    fn decoder_handles_split_lines_and_done() {
        let mut decoder = SseDecoder::default();

        let first = decoder
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi")
            .expect("first chunk");
        assert_eq!(first, vec![SseEvent::Delta("Hel".to_string())]);

        let second = decoder
            .push(b"ces\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n: keep-alive\n\ndata: [DONE]\n\n")
            .expect("second chunk");
        assert_eq!(second, vec![SseEvent::Delta("lo".to_string()), SseEvent::Done]);
    }

    #[test]
    fn decoder_skips_role_only_deltas() {
        let mut decoder = SseDecoder::default();
        let events = decoder
            .push(b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n")
            .expect("chunk");
        assert!(events.is_empty());
    }

    #[test]
    fn decoder_surfaces_stream_errors() {
        let mut decoder = SseDecoder::default();
        let result = decoder.push(b"data: {\"error\":{\"message\":\"overloaded\"}}\n");
        assert!(matches!(result, Err(LlmError::Decode(_))));
    }

    #[tokio::test]
    async fn text_stream_stops_at_done() {
        let chunks: Vec<reqwest::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"Paris\"}}]}\n")),
            Ok(bytes::Bytes::from_static(b"data: [DONE]\n")),
            Ok(bytes::Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n")),
        ];

        let deltas: Vec<String> = super::sse_text_stream(stream::iter(chunks).boxed())
            .map(|item| item.expect("delta"))
            .collect()
            .await;

        assert_eq!(deltas, vec!["Paris".to_string()]);
    }
}
