//! Completion client for the external LLM provider.
//!
//! Exactly one provider is active per process: the native Mistral API, or
//! an OpenAI-compatible endpoint (e.g. OpenRouter). Selection happens once
//! when the client is built from config; having neither credential set is
//! only an error on the first completion call, not at startup.
//!
//! Both call paths share request construction. [`CompletionClient::complete`]
//! buffers the whole answer; [`CompletionClient::complete_streaming`] opens
//! one network session and yields incremental text fragments as they
//! arrive. The provider pushes `data: `-prefixed frames whose payload is a
//! JSON object carrying a delta text field; frames that fail to parse are
//! protocol noise and are skipped, and the `[DONE]` frame terminates the
//! stream cleanly. Concatenating every yielded fragment reproduces exactly
//! what the buffered call would have returned.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::Result;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::config::LlmConfig;
use crate::error::AnalyzeError;
use crate::prompt::ChatMessage;

/// The active provider, decided once at configuration time.
#[derive(Debug, Clone)]
enum Provider {
    Mistral {
        base_url: String,
        api_key: String,
        model: String,
    },
    OpenAiCompatible {
        base_url: String,
        api_key: String,
        model: String,
    },
}

impl Provider {
    /// Mistral credentials win; the OpenAI-compatible route needs all three
    /// of key, base URL and model to be usable.
    fn select(config: &LlmConfig) -> Option<Self> {
        if let Some(key) = &config.mistral.api_key {
            return Some(Self::Mistral {
                base_url: config.mistral.base_url.clone(),
                api_key: key.clone(),
                model: config.mistral.model.clone(),
            });
        }
        match (
            &config.openai.api_key,
            &config.openai.base_url,
            &config.openai.model,
        ) {
            (Some(key), Some(base), Some(model)) => Some(Self::OpenAiCompatible {
                base_url: base.clone(),
                api_key: key.clone(),
                model: model.clone(),
            }),
            _ => None,
        }
    }

    fn chat_url(&self) -> String {
        let base = match self {
            Self::Mistral { base_url, .. } | Self::OpenAiCompatible { base_url, .. } => base_url,
        };
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    fn api_key(&self) -> &str {
        match self {
            Self::Mistral { api_key, .. } | Self::OpenAiCompatible { api_key, .. } => api_key,
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::Mistral { model, .. } | Self::OpenAiCompatible { model, .. } => model,
        }
    }
}

/// Client for the chat-completions endpoint of the configured provider.
pub struct CompletionClient {
    http: reqwest::Client,
    provider: Option<Provider>,
}

impl CompletionClient {
    /// Build the client. The HTTP timeout bounds each completion call
    /// end-to-end; there is no automatic retry.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let provider = Provider::select(config);
        if let Some(p) = &provider {
            tracing::info!(model = p.model(), "completion provider selected");
        } else {
            tracing::warn!("no completion provider configured — completion calls will fail");
        }
        Ok(Self { http, provider })
    }

    /// Whether a provider credential set was configured.
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&Provider, AnalyzeError> {
        self.provider.as_ref().ok_or(AnalyzeError::NoProvider)
    }

    fn payload(
        provider: &Provider,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
        stream: bool,
    ) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "model": provider.model(),
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        if stream {
            payload["stream"] = serde_json::Value::Bool(true);
        }
        payload
    }

    /// Buffered completion: returns the full message content.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, AnalyzeError> {
        let provider = self.provider()?;
        let payload = Self::payload(provider, messages, temperature, max_tokens, false);

        let response = self
            .http
            .post(provider.chat_url())
            .bearer_auth(provider.api_key())
            .json(&payload)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;

        let body: serde_json::Value = response.json().await.map_err(request_error)?;
        message_content(&body).ok_or(AnalyzeError::UnexpectedResponse)
    }

    /// Streaming completion: opens one network session and yields text
    /// fragments in arrival order. The sequence is finite and not
    /// restartable; it ends on the provider's terminal frame or when the
    /// connection closes. Dropping the stream closes the session.
    pub async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<CompletionStream, AnalyzeError> {
        let provider = self.provider()?;
        let payload = Self::payload(provider, messages, temperature, max_tokens, true);

        let response = self
            .http
            .post(provider.chat_url())
            .bearer_auth(provider.api_key())
            .json(&payload)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;

        let (tx, rx) = mpsc::channel::<Result<String, AnalyzeError>>(32);

        tokio::spawn(async move {
            let mut lines = LineBuffer::default();
            let mut frames = response.bytes_stream();

            while let Some(next) = frames.next().await {
                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(request_error(e))).await;
                        return;
                    }
                };
                lines.push(&chunk);
                while let Some(line) = lines.next_line() {
                    match parse_sse_line(&line) {
                        SseEvent::Delta(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                // Receiver gone — abandon the session.
                                return;
                            }
                        }
                        SseEvent::Done => return,
                        SseEvent::Noise => {}
                    }
                }
            }
        });

        Ok(CompletionStream { rx })
    }
}

/// Lazy sequence of completion text fragments for one request.
pub struct CompletionStream {
    rx: mpsc::Receiver<Result<String, AnalyzeError>>,
}

impl CompletionStream {
    /// Receive the next fragment, or `None` when the stream has ended.
    pub async fn recv(&mut self) -> Option<Result<String, AnalyzeError>> {
        self.rx.recv().await
    }
}

impl Stream for CompletionStream {
    type Item = Result<String, AnalyzeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Map a reqwest failure onto the request error taxonomy.
fn request_error(e: reqwest::Error) -> AnalyzeError {
    if e.is_timeout() {
        AnalyzeError::Timeout
    } else {
        AnalyzeError::Network(e.to_string())
    }
}

/// Walk `choices[0].message.content` out of a buffered response body.
fn message_content(body: &serde_json::Value) -> Option<String> {
    body.get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
}

/// One parsed server-push line.
#[derive(Debug, PartialEq)]
enum SseEvent {
    /// Incremental text delta.
    Delta(String),
    /// Terminal frame — end of stream, not a parse failure.
    Done,
    /// Anything else: keep-alives, unparseable payloads, empty deltas.
    Noise,
}

/// Parse one line of the push protocol. Only `data: `-prefixed lines carry
/// frames; payloads that are not valid JSON are noise, never errors.
fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data: ") else {
        return SseEvent::Noise;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let Ok(frame) = serde_json::from_str::<serde_json::Value>(data) else {
        return SseEvent::Noise;
    };
    frame
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|c| c.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| SseEvent::Delta(s.to_string()))
        .unwrap_or(SseEvent::Noise)
}

/// Incremental line splitter over the raw byte stream. Network chunks can
/// split lines (and multi-byte characters) anywhere; buffering bytes and
/// cutting at `\n` keeps both intact.
#[derive(Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete line, without the trailing `\n`/`\r\n`.
    fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop(); // '\n'
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::prompt::build_messages;

    fn mistral_config() -> LlmConfig {
        let mut config = LlmConfig::default();
        config.mistral.api_key = Some("test-key".into());
        config
    }

    fn openai_config() -> LlmConfig {
        let mut config = LlmConfig::default();
        config.openai.api_key = Some("test-key".into());
        config.openai.base_url = Some("https://openrouter.ai/api/v1".into());
        config.openai.model = Some("mistralai/mistral-large-latest".into());
        config
    }

    #[test]
    fn selects_mistral_when_key_present() {
        let provider = Provider::select(&mistral_config()).unwrap();
        assert_eq!(
            provider.chat_url(),
            "https://api.mistral.ai/v1/chat/completions"
        );
        assert_eq!(provider.model(), "mistral-large-latest");
    }

    #[test]
    fn selects_openai_compatible_as_fallback() {
        let provider = Provider::select(&openai_config()).unwrap();
        assert_eq!(
            provider.chat_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(provider.model(), "mistralai/mistral-large-latest");
    }

    #[test]
    fn mistral_wins_when_both_are_configured() {
        let mut config = openai_config();
        config.mistral.api_key = Some("mistral-key".into());
        let provider = Provider::select(&config).unwrap();
        assert_eq!(provider.api_key(), "mistral-key");
    }

    #[test]
    fn openai_route_requires_all_three_fields() {
        let mut config = openai_config();
        config.openai.model = None;
        assert!(Provider::select(&config).is_none());
    }

    #[test]
    fn no_credentials_selects_nothing() {
        assert!(Provider::select(&LlmConfig::default()).is_none());
    }

    #[test]
    fn missing_provider_errors_at_first_use_not_construction() {
        let client = CompletionClient::new(&LlmConfig::default()).unwrap();
        assert!(!client.has_provider());
        assert!(matches!(
            client.provider().unwrap_err(),
            AnalyzeError::NoProvider
        ));
    }

    #[test]
    fn payload_shape_matches_chat_completions() {
        let provider = Provider::select(&mistral_config()).unwrap();
        let messages = build_messages("Hoste 5 dager", "R05 | Hoste | component:1 | chapter:R");
        let payload = CompletionClient::payload(&provider, &messages, 0.2, 800, false);

        assert_eq!(payload["model"], "mistral-large-latest");
        assert_eq!(payload["temperature"], 0.2);
        assert_eq!(payload["max_tokens"], 800);
        assert_eq!(payload["messages"].as_array().unwrap().len(), 2);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["role"], "user");
        assert!(payload.get("stream").is_none());

        let streaming = CompletionClient::payload(&provider, &messages, 0.2, 800, true);
        assert_eq!(streaming["stream"], true);
    }

    #[test]
    fn message_content_walks_buffered_response() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "{\"top_k\":[]}"}}]
        });
        assert_eq!(message_content(&body).as_deref(), Some("{\"top_k\":[]}"));

        assert_eq!(message_content(&serde_json::json!({})), None);
        assert_eq!(message_content(&serde_json::json!({"choices": []})), None);
    }

    fn delta_frame(text: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    #[test]
    fn parses_delta_frames() {
        assert_eq!(
            parse_sse_line(&delta_frame("{\"top_k\"")),
            SseEvent::Delta("{\"top_k\"".into())
        );
    }

    #[test]
    fn done_frame_terminates_not_errors() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
    }

    #[test]
    fn malformed_payload_is_noise() {
        assert_eq!(parse_sse_line("data: {not json"), SseEvent::Noise);
        assert_eq!(parse_sse_line("data: "), SseEvent::Noise);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Noise);
        assert_eq!(parse_sse_line(""), SseEvent::Noise);
        // valid JSON without a delta text field
        assert_eq!(
            parse_sse_line("data: {\"choices\":[{\"delta\":{}}]}"),
            SseEvent::Noise
        );
        // empty delta carries no text
        assert_eq!(
            parse_sse_line("data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}"),
            SseEvent::Noise
        );
    }

    #[test]
    fn line_buffer_reassembles_split_lines() {
        let mut lines = LineBuffer::default();
        lines.push(b"data: hel");
        assert!(lines.next_line().is_none());
        lines.push(b"lo\r\ndata: world\n");
        assert_eq!(lines.next_line().as_deref(), Some("data: hello"));
        assert_eq!(lines.next_line().as_deref(), Some("data: world"));
        assert!(lines.next_line().is_none());
    }

    #[test]
    fn line_buffer_keeps_multibyte_chars_intact() {
        let mut lines = LineBuffer::default();
        let text = "data: sår hals\n".as_bytes();
        // split inside the two-byte 'å'
        let split = text.iter().position(|&b| b == 0xc3).unwrap() + 1;
        lines.push(&text[..split]);
        assert!(lines.next_line().is_none());
        lines.push(&text[split..]);
        assert_eq!(lines.next_line().as_deref(), Some("data: sår hals"));
    }

    /// Streaming/buffered equivalence at the protocol level: the deltas
    /// recovered from a frame sequence concatenate to exactly the text the
    /// buffered variant would return, regardless of how the network chunks
    /// the bytes.
    #[test]
    fn concatenated_deltas_equal_buffered_text() {
        let full = "{\"top_k\":[{\"code\":\"R05\",\"title\":\"Hoste\"}],\"notes\":\"ØLI\"}";
        let pieces = ["{\"top_k\":[{\"code\":\"R05\",", "\"title\":\"Hoste\"}],", "\"notes\":\"ØLI\"}"];
        assert_eq!(pieces.concat(), full);

        let mut wire = String::new();
        for piece in pieces {
            wire.push_str(&delta_frame(piece));
            wire.push('\n');
        }
        wire.push_str("data: [DONE]\n");

        // feed the wire bytes in awkward 7-byte chunks
        let mut lines = LineBuffer::default();
        let mut out = String::new();
        let mut done = false;
        for chunk in wire.as_bytes().chunks(7) {
            lines.push(chunk);
            while let Some(line) = lines.next_line() {
                match parse_sse_line(&line) {
                    SseEvent::Delta(text) => out.push_str(&text),
                    SseEvent::Done => done = true,
                    SseEvent::Noise => {}
                }
            }
        }

        assert!(done);
        assert_eq!(out, full);
    }

    /// Two delta frames then the terminal frame, in order.
    #[test]
    fn delta_delta_done_sequence() {
        let mut lines = LineBuffer::default();
        lines.push(delta_frame("{").as_bytes());
        lines.push(b"\n");
        lines.push(delta_frame("\"top_k\":[]}").as_bytes());
        lines.push(b"\ndata: [DONE]\n");

        let mut events = Vec::new();
        while let Some(line) = lines.next_line() {
            events.push(parse_sse_line(&line));
        }
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("{".into()),
                SseEvent::Delta("\"top_k\":[]}".into()),
                SseEvent::Done,
            ]
        );
    }
}
