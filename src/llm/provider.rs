use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::errors::GridClawResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunk};

/// Incremental response fragments. Dropping the stream closes the request.
pub type ChunkStream = BoxStream<'static, GridClawResult<StreamChunk>>;

/// Unified LLM provider trait. The step loop streams through it, the memory
/// summarizer uses the one-shot `chat` call.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (used in logs).
    fn name(&self) -> &str;

    /// Opens a streamed completion. The caller may drop the stream before it ends.
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        cfg: &CallConfig,
    ) -> GridClawResult<ChunkStream>;

    /// Non-streaming completion.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig)
        -> GridClawResult<LlmResponse>;
}
