use crate::providers::{ChatMessage, LlmProvider, LlmRequest, TextStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use recap_common::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

pub const PROVIDER_ID: &str = "openai-compatible";

/// Upper bound on how much of a non-2xx response body is kept in the error.
const ERROR_BODY_LIMIT: usize = 512;

/// Streaming client for any `/chat/completions` endpoint that speaks the
/// OpenAI SSE dialect (SiliconFlow, vLLM, OpenAI itself).
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    async fn stream_completion(&self, request: &LlmRequest) -> Result<TextStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = StreamRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamHttp {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        Ok(Box::pin(SseParser::new(response.bytes_stream())))
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        let response = self.client.get(&url).bearer_auth(&self.api_key).send().await;

        match response {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) => {
                debug!("health check against {url} failed: {e}");
                Ok(false)
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::Connection(e.to_string())
}

fn truncate_body(mut body: String) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        return body;
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body.truncate(end);
    body.push_str("...");
    body
}

#[derive(Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

// Stream Response Types
#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    /// Set by providers that report failures inside a 200 stream.
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

type DeltaField = fn(&StreamDelta) -> Option<&str>;

fn delta_content(delta: &StreamDelta) -> Option<&str> {
    delta.content.as_deref()
}

fn delta_reasoning(delta: &StreamDelta) -> Option<&str> {
    delta.reasoning_content.as_deref()
}

/// Delta fields that may carry text, in priority order. The first one with a
/// non-empty value wins.
const FRAGMENT_FIELDS: &[(&str, DeltaField)] = &[
    ("content", delta_content),
    ("reasoning_content", delta_reasoning),
];

/// What a single SSE line contributes to the stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseLine {
    /// Blank lines, comments, and non-data fields.
    Ignored,
    /// The `[DONE]` terminator.
    Done,
    /// A parsed chunk, carrying a fragment when one of the known fields had text.
    Data(Option<String>),
    /// A `data:` payload that was not valid chunk JSON.
    Malformed(String),
    /// An `{"error": ...}` object sent in place of a chunk.
    UpstreamError(String),
}

pub(crate) fn parse_line(line: &str) -> SseLine {
    let Some(payload) = line.strip_prefix("data:") else {
        return SseLine::Ignored;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(StreamChunk {
            error: Some(error), ..
        }) => SseLine::UpstreamError(error_message(&error)),
        Ok(chunk) => SseLine::Data(extract_fragment(&chunk)),
        Err(e) => SseLine::Malformed(e.to_string()),
    }
}

fn error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

fn extract_fragment(chunk: &StreamChunk) -> Option<String> {
    let delta = &chunk.choices.first()?.delta;
    FRAGMENT_FIELDS
        .iter()
        .find_map(|(_, field)| field(delta).filter(|text| !text.is_empty()))
        .map(str::to_string)
}

// Stream Parser
struct SseParser {
    stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: Vec<u8>,
    queue: VecDeque<Result<String>>,
    saw_data: bool,
    finished: bool,
}

impl SseParser {
    fn new(stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static) -> Self {
        Self {
            stream: Box::pin(stream),
            buffer: Vec::new(),
            queue: VecDeque::new(),
            saw_data: false,
            finished: false,
        }
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line[..pos]);
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }

    fn handle_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        match parse_line(line.trim_end_matches('\r')) {
            SseLine::Ignored => {}
            SseLine::Done => self.finished = true,
            SseLine::Malformed(e) => debug!("skipping malformed stream line: {e}"),
            SseLine::UpstreamError(message) => {
                self.finished = true;
                self.queue.push_back(Err(Error::Protocol(format!(
                    "upstream reported an error: {message}"
                ))));
            }
            // Role-only and empty chunks do not count as output.
            SseLine::Data(None) => {}
            SseLine::Data(Some(fragment)) => {
                self.saw_data = true;
                self.queue.push_back(Ok(fragment));
            }
        }
    }

    fn finish_without_terminator(&mut self) {
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            self.handle_line(&rest);
        }
        if self.finished {
            return;
        }
        self.finished = true;
        if !self.saw_data {
            self.queue.push_back(Err(Error::Protocol(
                "stream closed without [DONE] and without text".into(),
            )));
        }
    }
}

impl Stream for SseParser {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Poll::Ready(Some(item));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.buffer.extend_from_slice(&chunk);
                    self.drain_lines();
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(transport_error(e))));
                }
                Poll::Ready(None) => self.finish_without_terminator(),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
