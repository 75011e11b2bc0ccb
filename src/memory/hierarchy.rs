//! Three-tier conversation memory.
//!
//!   fixed: system prompt + initial task, exactly two turns, never touched
//!   long : `History Summary:` / `Long Term Memory:` system turns
//!   short: raw step turns, text only
//!
//! When short reaches `max_short_memory` its oldest `compression_ratio` turns
//! are folded into one long-tier summary; when long then reaches
//! `max_long_memory` its oldest entries are folded again and the result is
//! placed at the head of the long tier. A failed summary puts everything back.

use crate::agent_engine::history::SessionLog;
use crate::config::MemoryConfig;
use crate::memory::summarizer::{SummaryLevel, Summarizer};
use crate::memory::turn::{ConversationTurn, ImageAttachment, Role, TurnContent};

pub const SHORT_SUMMARY_PREFIX: &str = "History Summary: ";
pub const LONG_SUMMARY_PREFIX: &str = "Long Term Memory: ";

pub struct HierarchicalMemory {
    fixed: [ConversationTurn; 2],
    long: Vec<ConversationTurn>,
    short: Vec<ConversationTurn>,
    config: MemoryConfig,
    summarizer: Box<dyn Summarizer>,
    log: Option<SessionLog>,
}

impl HierarchicalMemory {
    pub fn new(
        system_prompt: impl Into<String>,
        task: impl Into<String>,
        config: MemoryConfig,
        summarizer: Box<dyn Summarizer>,
        log: Option<SessionLog>,
    ) -> Self {
        let fixed = [
            ConversationTurn::text(Role::System, system_prompt),
            ConversationTurn::text(Role::User, task),
        ];
        if let Some(log) = &log {
            for turn in &fixed {
                log.record("fixed", turn);
            }
        }
        Self {
            fixed,
            long: Vec::new(),
            short: Vec::new(),
            config,
            summarizer,
            log,
        }
    }

    pub fn fixed(&self) -> &[ConversationTurn] {
        &self.fixed
    }

    pub fn long(&self) -> &[ConversationTurn] {
        &self.long
    }

    pub fn short(&self) -> &[ConversationTurn] {
        &self.short
    }

    fn record(&self, tier: &str, turn: &ConversationTurn) {
        if let Some(log) = &self.log {
            log.record(tier, turn);
        }
    }

    /// Append a step turn. Images are dropped; only the text is remembered.
    pub async fn add_step(&mut self, role: Role, content: TurnContent) {
        let text = match content {
            TurnContent::Text(t) => t,
            TurnContent::WithImages { text, .. } => text,
        };
        let turn = ConversationTurn::text(role, text);
        self.record("short", &turn);
        self.short.push(turn);

        if self.short.len() >= self.config.max_short_memory && self.compress_short().await {
            if self.long.len() >= self.config.max_long_memory {
                self.compress_long().await;
            }
        }
    }

    /// Fold the oldest short turns into one long-tier summary.
    /// Returns false (with the tier restored) when summarization fails.
    pub async fn compress_short(&mut self) -> bool {
        let n = self.config.compression_ratio.min(self.short.len());
        if n == 0 {
            return false;
        }
        let batch: Vec<ConversationTurn> = self.short.drain(..n).collect();
        let transcript = batch
            .iter()
            .map(ConversationTurn::render_plain)
            .collect::<Vec<_>>()
            .join("\n");

        match self.summarizer.summarize(SummaryLevel::Short, &transcript).await {
            Ok(summary) => {
                let turn = ConversationTurn::text(Role::System, format!("{SHORT_SUMMARY_PREFIX}{summary}"));
                self.record("long", &turn);
                self.long.push(turn);
                tracing::info!(
                    folded = n,
                    short = self.short.len(),
                    long = self.long.len(),
                    "short-term memory compressed"
                );
                true
            }
            Err(e) => {
                self.short.splice(0..0, batch);
                tracing::warn!(short = self.short.len(), "short-term compression failed, keeping raw turns: {e}");
                false
            }
        }
    }

    /// Fold the oldest long-tier entries into one overview at the head of the tier.
    pub async fn compress_long(&mut self) -> bool {
        let n = self.config.compression_ratio.min(self.long.len());
        if n == 0 {
            return false;
        }
        let batch: Vec<ConversationTurn> = self.long.drain(..n).collect();
        let transcript = batch
            .iter()
            .map(|t| t.text_content())
            .collect::<Vec<_>>()
            .join("\n");

        match self.summarizer.summarize(SummaryLevel::Long, &transcript).await {
            Ok(summary) => {
                let turn = ConversationTurn::text(Role::System, format!("{LONG_SUMMARY_PREFIX}{summary}"));
                self.record("long", &turn);
                self.long.insert(0, turn);
                tracing::info!(folded = n, long = self.long.len(), "long-term memory compressed");
                true
            }
            Err(e) => {
                self.long.splice(0..0, batch);
                tracing::warn!(long = self.long.len(), "long-term compression failed, keeping summaries: {e}");
                false
            }
        }
    }

    /// fixed ++ long ++ short ++ one new user turn carrying `query` and, when
    /// given, the global and local views.
    pub fn full_context(
        &self,
        query: &str,
        images: Option<[ImageAttachment; 2]>,
    ) -> Vec<ConversationTurn> {
        let query_turn = match images {
            Some(images) => ConversationTurn::with_images(Role::User, query, images.into()),
            None => ConversationTurn::text(Role::User, query),
        };
        self.record("query", &query_turn);

        let mut turns = Vec::with_capacity(self.fixed.len() + self.long.len() + self.short.len() + 1);
        turns.extend_from_slice(&self.fixed);
        turns.extend_from_slice(&self.long);
        turns.extend_from_slice(&self.short);
        turns.push(query_turn);
        turns
    }
}
