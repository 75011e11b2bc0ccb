use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::AppConfig;
use crate::errors::{GridClawError, GridClawResult};
use crate::llm::provider::{ChunkStream, LlmProvider};
use crate::llm::sse_parser::{self, SseLineBuffer};
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunk, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Each call builds a fresh client, so callers never share connection state.
    pub fn from_config(id: &str, config: &AppConfig) -> Self {
        Self::new(id.to_string(), config.llm.api_base.clone(), config.api_key())
    }

    fn request_body(&self, messages: &[ChatMessage], cfg: &CallConfig) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
        });
        if let Some(max_tokens) = cfg.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    async fn send(&self, body: &serde_json::Value) -> GridClawResult<reqwest::Response> {
        tracing::debug!(
            body = %sanitize_for_log(body),
            "request body (sanitized, base64 omitted)"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(GridClawError::LlmProvider(format!("{}: {}", status, err_body)));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        cfg: &CallConfig,
    ) -> GridClawResult<ChunkStream> {
        let mut body = self.request_body(&messages, cfg);
        body["stream"] = serde_json::json!(true);

        tracing::debug!(provider = %self.id, model = %cfg.model, "opening LLM stream");
        let response = self.send(&body).await?;
        Ok(sse_chunks(response))
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        cfg: &CallConfig,
    ) -> GridClawResult<LlmResponse> {
        let mut body = self.request_body(&messages, cfg);
        body["stream"] = serde_json::json!(false);

        tracing::debug!(provider = %self.id, model = %cfg.model, "sending LLM request");
        let response = self.send(&body).await?;
        let json: serde_json::Value = response.json().await?;

        let message = &json["choices"][0]["message"];
        let content = message["content"].as_str().unwrap_or("").to_string();
        let reasoning = message["reasoning_content"].as_str().unwrap_or("").to_string();

        tracing::info!(content_len = content.len(), "LLM JSON response received");

        Ok(LlmResponse { content, reasoning })
    }
}

struct SseState {
    bytes: futures_util::stream::BoxStream<'static, reqwest::Result<Vec<u8>>>,
    lines: SseLineBuffer,
    ready: VecDeque<GridClawResult<StreamChunk>>,
    finished: bool,
}

/// Turn an SSE HTTP response into a stream of parsed chunks.
///
/// The response body is owned by the stream, so dropping the stream aborts
/// the transfer.
fn sse_chunks(response: reqwest::Response) -> ChunkStream {
    let state = SseState {
        bytes: response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
        lines: SseLineBuffer::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(bytes)) => {
                    for line in st.lines.push(&bytes) {
                        queue_line(&mut st, &line);
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.ready.push_back(Err(GridClawError::Http(e)));
                }
                None => {
                    st.finished = true;
                    if let Some(line) = st.lines.finish() {
                        queue_line(&mut st, &line);
                    }
                }
            }
        }
    })
    .boxed()
}

fn queue_line(st: &mut SseState, line: &str) {
    match sse_parser::parse_sse_line(line) {
        Ok(chunks) => {
            for chunk in chunks {
                if chunk.kind == StreamChunkKind::Done {
                    st.finished = true;
                }
                st.ready.push_back(Ok(chunk));
            }
        }
        Err(GridClawError::SseParsing(e)) => {
            tracing::debug!("SSE parse skipped: {e}");
        }
        Err(e) => {
            st.finished = true;
            st.ready.push_back(Err(e));
        }
    }
}

/// Clone the body with image payloads replaced, for logging only.
fn sanitize_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            if let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) {
                for part in parts {
                    if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                        if let Some(url) = part.get_mut("image_url").and_then(|u| u.get_mut("url")) {
                            *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                        }
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}
