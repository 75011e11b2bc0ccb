use async_trait::async_trait;

use crate::config::AppConfig;
use crate::errors::{GridClawError, GridClawResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::{CallConfig, ChatMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryLevel {
    /// Raw steps folded into one paragraph.
    Short,
    /// Step summaries folded into one overview.
    Long,
}

/// Folds a plain-text transcript into a single summary string.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, level: SummaryLevel, transcript: &str) -> GridClawResult<String>;
}

/// Summaries through a dedicated, non-streaming chat client.
pub struct LlmSummarizer {
    provider: Box<dyn LlmProvider>,
    model: String,
    temperature: f64,
    short_max_tokens: u32,
    long_max_tokens: u32,
}

impl LlmSummarizer {
    pub fn new(provider: Box<dyn LlmProvider>, config: &AppConfig) -> Self {
        let summary = &config.llm.summary;
        Self {
            provider,
            model: summary.model.clone().unwrap_or_else(|| config.llm.model.clone()),
            temperature: summary.temperature.unwrap_or(config.llm.temperature),
            short_max_tokens: summary.short_max_tokens,
            long_max_tokens: summary.long_max_tokens,
        }
    }

    /// Owns its own HTTP client, separate from the step loop's.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Box::new(OpenAiCompatibleProvider::from_config("summarizer", config)),
            config,
        )
    }

    fn prompt(level: SummaryLevel, transcript: &str) -> Vec<ChatMessage> {
        let (system, instruction) = match level {
            SummaryLevel::Short => (
                "You summarize interaction records of a desktop automation agent.",
                "Condense the following interaction record into one concise paragraph \
                 describing which actions were taken and what their results were:",
            ),
            SummaryLevel::Long => (
                "You maintain the long-term memory of a desktop automation agent.",
                "Condense the following history summaries into one high-level overview. \
                 Keep the overall plan, goals that are still open and any unresolved errors:",
            ),
        };
        vec![
            ChatMessage::text("system", system),
            ChatMessage::text("user", format!("{instruction}\n{transcript}")),
        ]
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, level: SummaryLevel, transcript: &str) -> GridClawResult<String> {
        let cfg = CallConfig {
            model: self.model.clone(),
            stream: false,
            temperature: self.temperature,
            max_tokens: Some(match level {
                SummaryLevel::Short => self.short_max_tokens,
                SummaryLevel::Long => self.long_max_tokens,
            }),
        };
        let response = self
            .provider
            .chat(Self::prompt(level, transcript), &cfg)
            .await?;

        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(GridClawError::Memory("summarizer returned an empty summary".into()));
        }
        Ok(summary.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ChunkStream;
    use crate::llm::types::{LlmResponse, MessageContent};
    use std::sync::{Arc, Mutex};

    struct CannedProvider {
        reply: String,
        seen: Arc<Mutex<Vec<(Vec<ChatMessage>, Option<u32>)>>>,
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn stream_chat(&self, _: Vec<ChatMessage>, _: &CallConfig) -> GridClawResult<ChunkStream> {
            Err(GridClawError::LlmProvider("not used".into()))
        }

        async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> GridClawResult<LlmResponse> {
            self.seen.lock().unwrap().push((messages, cfg.max_tokens));
            Ok(LlmResponse {
                content: self.reply.clone(),
                reasoning: String::new(),
            })
        }
    }

    fn summarizer(reply: &str) -> (LlmSummarizer, Arc<Mutex<Vec<(Vec<ChatMessage>, Option<u32>)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider = CannedProvider {
            reply: reply.to_string(),
            seen: seen.clone(),
        };
        (LlmSummarizer::new(Box::new(provider), &crate::config::test_config()), seen)
    }

    #[tokio::test]
    async fn tier_selects_token_budget() {
        let (s, seen) = summarizer("  clicked save  ");
        assert_eq!(s.summarize(SummaryLevel::Short, "user: hi").await.unwrap(), "clicked save");
        s.summarize(SummaryLevel::Long, "History Summary: x").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1, Some(200));
        assert_eq!(seen[1].1, Some(300));
        match &seen[0].0[1].content {
            MessageContent::Text(t) => assert!(t.ends_with("user: hi")),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_summary_is_an_error() {
        let (s, _) = summarizer("   ");
        assert!(s.summarize(SummaryLevel::Short, "x").await.is_err());
    }
}
