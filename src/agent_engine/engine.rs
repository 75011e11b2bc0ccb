use std::path::PathBuf;

use futures_util::StreamExt;

use crate::agent_engine::history::SessionLog;
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::prompt::{system_prompt, STEP_QUERY};
use crate::agent_engine::repair::parse_action_block;
use crate::agent_engine::scanner::ActionBlockScanner;
use crate::agent_engine::state::{
    StepPhase, StepResult, StopReason, MAX_STEPS_SENTINEL, TASK_COMPLETED_SENTINEL,
};
use crate::config::{AppConfig, CompletionProtocol};
use crate::display::DisplayHandle;
use crate::errors::{GridClawError, GridClawResult};
use crate::executor::dispatcher::dispatch;
use crate::executor::input::{EnigoInjector, InputInjector};
use crate::executor::resolver::{ActionKind, ActionResolver};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::{CallConfig, ChatMessage, StreamChunkKind};
use crate::memory::hierarchy::HierarchicalMemory;
use crate::memory::summarizer::{LlmSummarizer, Summarizer};
use crate::memory::turn::{ConversationTurn, Role};
use crate::perception::guard::{CaptureGuard, DisplaySuppressGuard};
use crate::perception::pipeline::{encode_views, Perceiver};
use crate::perception::screenshot::{primary_geometry, ScreenSource, XcapScreen};
use crate::perception::types::CoordinateMap;

const NO_BLOCK_FEEDBACK: &str = "Error: No valid <action> block found in response.";

/// Collaborators the engine drives. `from_config` wires the real ones.
pub struct EngineParts {
    pub provider: Box<dyn LlmProvider>,
    pub summarizer: Box<dyn Summarizer>,
    pub screen: Box<dyn ScreenSource>,
    pub guard: Box<dyn CaptureGuard>,
    pub injector: Box<dyn InputInjector>,
    pub session_log: Option<SessionLog>,
    pub display: DisplayHandle,
}

/// Text of one streamed reply, cut at the first action block.
struct Reply {
    text: String,
    block: Option<String>,
    fault: Option<GridClawError>,
}

pub struct AgentEngine {
    phase: StepPhase,
    loop_ctrl: LoopController,
    perceiver: Perceiver,
    memory: HierarchicalMemory,
    provider: Box<dyn LlmProvider>,
    call_cfg: CallConfig,
    injector: Box<dyn InputInjector>,
    protocol: CompletionProtocol,
    display: DisplayHandle,
}

impl AgentEngine {
    pub fn new(config: &AppConfig, task: &str, parts: EngineParts) -> GridClawResult<Self> {
        let mut perceiver = Perceiver::new(parts.screen, parts.guard, &config.vision)?;
        if config.runtime.debug_mode {
            let dir = config.runtime.debug_dir.clone().unwrap_or_else(default_debug_dir);
            tracing::info!(dir = %dir.display(), "debug archive enabled");
            perceiver = perceiver.with_debug_dir(dir);
        }

        let protocol = config.runtime.completion_protocol;
        let memory = HierarchicalMemory::new(
            system_prompt(&config.vision, protocol),
            task,
            config.memory.clone(),
            parts.summarizer,
            parts.session_log,
        );

        Ok(Self {
            phase: StepPhase::Idle,
            loop_ctrl: LoopController::new(config.runtime.max_steps),
            perceiver,
            memory,
            provider: parts.provider,
            call_cfg: CallConfig {
                model: config.llm.model.clone(),
                stream: true,
                temperature: config.llm.temperature,
                max_tokens: Some(config.llm.max_tokens),
            },
            injector: parts.injector,
            protocol,
            display: parts.display,
        })
    }

    /// Real screen, real input, HTTP model client.
    pub fn from_config(config: &AppConfig, task: &str, display: DisplayHandle) -> GridClawResult<Self> {
        let geometry = primary_geometry().unwrap_or_else(|e| {
            tracing::warn!("monitor geometry unavailable, assuming scale 1: {e}");
            Default::default()
        });
        let session_log = config
            .runtime
            .session_log
            .then(|| SessionLog::new(config.runtime.session_dir.as_deref()));
        if let Some(log) = &session_log {
            display.log(format!("Session log: {}", log.path().display()));
        }

        let parts = EngineParts {
            provider: Box::new(OpenAiCompatibleProvider::from_config("reasoning", config)),
            summarizer: Box::new(LlmSummarizer::from_config(config)),
            screen: Box::new(XcapScreen::new()?),
            guard: Box::new(DisplaySuppressGuard::new(display.clone())),
            injector: Box::new(EnigoInjector::new(geometry)?),
            session_log,
            display,
        };
        Self::new(config, task, parts)
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn memory(&self) -> &HierarchicalMemory {
        &self.memory
    }

    pub fn steps_taken(&self) -> u32 {
        self.loop_ctrl.steps_taken()
    }

    /// Step until a terminal result.
    pub async fn run(&mut self) -> StepResult {
        loop {
            let result = self.step().await;
            if result.is_terminal() {
                tracing::info!(steps = self.loop_ctrl.steps_taken(), reason = ?result.terminal, "task finished");
                self.display.log(format!("Finished: {}", result.feedback));
                return result;
            }
        }
    }

    /// One perceive → reason → act → record cycle.
    pub async fn step(&mut self) -> StepResult {
        // ── Budget ────────────────────────────────────────────────────────
        let Some(n) = self.loop_ctrl.begin_step() else {
            tracing::info!(max_steps = self.loop_ctrl.max_steps(), "step budget exhausted");
            self.phase = StepPhase::Stopped {
                reason: StopReason::MaxSteps,
            };
            return StepResult::stopped(MAX_STEPS_SENTINEL.into(), StopReason::MaxSteps);
        };
        tracing::info!(step = n, max_steps = self.loop_ctrl.max_steps(), "step started");
        self.display.banner(format!("Step {n}/{}", self.loop_ctrl.max_steps()));

        // ── Perceiving ────────────────────────────────────────────────────
        self.phase = StepPhase::Perceiving;
        let views = self.perceiver.perceive();
        if views.degraded {
            self.display.log("Screen capture failed, continuing with a blank frame.");
        }
        self.injector.calibrate(views.geometry);
        let images = match encode_views(&views) {
            Ok(images) => Some(images),
            Err(e) => {
                tracing::warn!("view encoding failed, sending text only: {e}");
                None
            }
        };
        let messages: Vec<ChatMessage> = self
            .memory
            .full_context(STEP_QUERY, images)
            .iter()
            .map(ConversationTurn::to_chat_message)
            .collect();

        // ── Reasoning ─────────────────────────────────────────────────────
        self.phase = StepPhase::Reasoning;
        let reply = self.reason(messages).await;

        // ── Parsing / Resolving ───────────────────────────────────────────
        let (feedback, kind) = match (&reply.fault, reply.block.as_deref()) {
            (Some(e), _) => {
                tracing::error!(step = n, error = %e, "model inference failed");
                (format!("Error during model inference: {e}"), None)
            }
            (None, None) => {
                tracing::warn!(step = n, "reply carried no action block");
                (NO_BLOCK_FEEDBACK.to_string(), None)
            }
            (None, Some(block)) => self.act(block, &views.map),
        };
        self.display.log(format!("Feedback: {feedback}"));

        // ── Recording ─────────────────────────────────────────────────────
        self.phase = StepPhase::Recording;
        self.memory.add_step(Role::Assistant, reply.text.into()).await;
        self.memory
            .add_step(Role::User, format!("Execution Result: {feedback}").into())
            .await;

        if self.is_completion(kind, &feedback) {
            self.phase = StepPhase::Stopped {
                reason: StopReason::Completed,
            };
            return StepResult::stopped(feedback, StopReason::Completed);
        }
        StepResult::running(feedback)
    }

    /// Stream the reply until the first action block closes, then drop the stream.
    async fn reason(&mut self, messages: Vec<ChatMessage>) -> Reply {
        let mut stream = match self.provider.stream_chat(messages, &self.call_cfg).await {
            Ok(s) => s,
            Err(e) => {
                return Reply {
                    text: String::new(),
                    block: None,
                    fault: Some(e),
                }
            }
        };

        let mut scanner = ActionBlockScanner::new();
        let mut fault = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => match chunk.kind {
                    StreamChunkKind::Content => {
                        self.display.fragment(chunk.content.as_str());
                        if scanner.push(&chunk.content).is_some() {
                            tracing::debug!(provider = self.provider.name(), "action block closed, dropping stream");
                            break;
                        }
                    }
                    StreamChunkKind::Reasoning => {
                        tracing::trace!(len = chunk.content.len(), "reasoning fragment");
                    }
                    StreamChunkKind::Done => break,
                },
                Err(e) => {
                    fault = Some(e);
                    break;
                }
            }
        }
        drop(stream);
        self.display.end_stream();

        let (text, block) = scanner.into_parts();
        Reply { text, block, fault }
    }

    /// Parse, resolve and dispatch one action block.
    fn act(&mut self, block: &str, map: &CoordinateMap) -> (String, Option<ActionKind>) {
        self.phase = StepPhase::Parsing;
        let value = match parse_action_block(block) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "action block unparseable");
                return (format!("Error parsing or executing action: {e}. Raw block: {block}"), None);
            }
        };

        self.phase = StepPhase::Resolving;
        match ActionResolver::resolve(&value, map) {
            Ok(intent) => {
                let kind = intent.kind();
                (dispatch(&intent, self.injector.as_mut()), Some(kind))
            }
            Err(fault) => {
                tracing::warn!(%fault, "action could not be resolved");
                (fault.to_string(), None)
            }
        }
    }

    fn is_completion(&self, kind: Option<ActionKind>, feedback: &str) -> bool {
        let by_action = kind == Some(ActionKind::FinalAnswer);
        let by_sentinel = feedback.contains(TASK_COMPLETED_SENTINEL);
        match self.protocol {
            CompletionProtocol::FinalAnswerAction => by_action,
            CompletionProtocol::FeedbackSentinel => by_sentinel,
            CompletionProtocol::Either => by_action || by_sentinel,
        }
    }
}

fn default_debug_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("gridclaw").join("debug"))
        .unwrap_or_else(|| PathBuf::from("debug"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::executor::dispatcher::tests::RecordingInjector;
    use crate::llm::provider::ChunkStream;
    use crate::llm::types::{LlmResponse, StreamChunk};
    use crate::memory::summarizer::SummaryLevel;
    use crate::perception::guard::NoopGuard;
    use crate::perception::types::ScreenCapture;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays one scripted list of fragments per call and counts how many
    /// fragments the engine actually pulled.
    struct ScriptedProvider {
        scripts: Mutex<VecDeque<Result<Vec<String>, String>>>,
        pulled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream_chat(
            &self,
            _messages: Vec<ChatMessage>,
            _cfg: &CallConfig,
        ) -> GridClawResult<ChunkStream> {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec!["nothing to do".into()]));
            let fragments = script.map_err(GridClawError::LlmProvider)?;
            let pulled = self.pulled.clone();
            let stream = futures_util::stream::iter(fragments).map(move |content| {
                pulled.fetch_add(1, Ordering::SeqCst);
                Ok::<_, GridClawError>(StreamChunk {
                    kind: StreamChunkKind::Content,
                    content,
                })
            });
            Ok(stream.boxed())
        }

        async fn chat(&self, _messages: Vec<ChatMessage>, _cfg: &CallConfig) -> GridClawResult<LlmResponse> {
            Err(GridClawError::LlmProvider("not used".into()))
        }
    }

    struct FixedSummarizer;

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _level: SummaryLevel, _transcript: &str) -> GridClawResult<String> {
            Ok("summary".into())
        }
    }

    struct BlankScreen;

    impl ScreenSource for BlankScreen {
        fn capture(&mut self) -> GridClawResult<ScreenCapture> {
            Ok(ScreenCapture::blank(1000, 800))
        }
    }

    struct Harness {
        engine: AgentEngine,
        injector_log: Arc<Mutex<Vec<String>>>,
        pulled: Arc<AtomicUsize>,
    }

    fn harness(config: &AppConfig, scripts: Vec<Result<Vec<&str>, &str>>) -> Harness {
        let scripts = scripts
            .into_iter()
            .map(|s| {
                s.map(|frags| frags.into_iter().map(String::from).collect())
                    .map_err(String::from)
            })
            .collect();
        let pulled = Arc::new(AtomicUsize::new(0));
        let injector = RecordingInjector::default();
        let injector_log = injector.log.clone();
        let (display, _rx) = DisplayHandle::channel();
        let parts = EngineParts {
            provider: Box::new(ScriptedProvider {
                scripts: Mutex::new(scripts),
                pulled: pulled.clone(),
            }),
            summarizer: Box::new(FixedSummarizer),
            screen: Box::new(BlankScreen),
            guard: Box::new(NoopGuard),
            injector: Box::new(injector),
            session_log: None,
            display,
        };
        Harness {
            engine: AgentEngine::new(config, "open the settings", parts).unwrap(),
            injector_log,
            pulled,
        }
    }

    fn last_short(engine: &AgentEngine) -> &str {
        engine.memory().short().last().unwrap().text_content()
    }

    #[tokio::test]
    async fn unknown_point_id_is_fed_back() {
        let mut h = harness(
            &test_config(),
            vec![Ok(vec![r#"<action>{"action_type": "move", "point_id": "G-99-99"}</action>"#])],
        );
        let result = h.engine.step().await;
        assert!(!result.is_terminal());
        assert!(result.feedback.contains("Unknown point id 'G-99-99'"));
        assert_eq!(h.engine.memory().short().len(), 2);
        assert!(last_short(&h.engine).starts_with("Execution Result: Error: Unknown point id"));
        assert!(h.injector_log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_step_budget_stops_before_perceiving() {
        let mut config = test_config();
        config.runtime.max_steps = 0;
        let mut h = harness(&config, vec![]);
        let result = h.engine.step().await;
        assert_eq!(result.feedback, MAX_STEPS_SENTINEL);
        assert_eq!(result.terminal, Some(StopReason::MaxSteps));
        assert!(h.engine.memory().short().is_empty());
        assert_eq!(h.pulled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reply_without_block_is_recorded() {
        let mut h = harness(&test_config(), vec![Ok(vec!["I am ", "not sure."])]);
        let result = h.engine.step().await;
        assert_eq!(result.feedback, NO_BLOCK_FEEDBACK);
        let short = h.engine.memory().short();
        assert_eq!(short[0].text_content(), "I am not sure.");
        assert_eq!(short[1].text_content(), format!("Execution Result: {NO_BLOCK_FEEDBACK}"));
    }

    #[tokio::test]
    async fn stream_is_dropped_after_the_block() {
        let mut h = harness(
            &test_config(),
            vec![Ok(vec![
                "Target found. <action>{\"action_type\": \"move\", ",
                "\"point_id\": \"g-5-3\"}</action>",
                " and then another <action>{}</action>",
                "tail",
            ])],
        );
        let result = h.engine.step().await;
        assert_eq!(h.pulled.load(Ordering::SeqCst), 2);
        assert_eq!(result.feedback, "Action move to G-05-03 (500, 300) executed.");
        assert_eq!(*h.injector_log.lock().unwrap(), vec!["move 500,300"]);
        assert!(h.engine.memory().short()[0].text_content().ends_with("</action>"));
    }

    #[tokio::test]
    async fn final_answer_ends_the_run() {
        let mut h = harness(
            &test_config(),
            vec![
                Ok(vec![r#"<action>{"action_type": "click"}</action>"#]),
                Ok(vec![r#"<action>{"action_type": "final_answer", "answer": "opened"}</action>"#]),
            ],
        );
        let result = h.engine.run().await;
        assert_eq!(result.terminal, Some(StopReason::Completed));
        assert_eq!(result.feedback, "[Task Completed] opened");
        assert_eq!(h.engine.steps_taken(), 2);
        assert_eq!(
            h.engine.phase(),
            StepPhase::Stopped {
                reason: StopReason::Completed
            }
        );
    }

    #[tokio::test]
    async fn sentinel_in_feedback_obeys_protocol() {
        let reply = r#"<action>{"action_type": "type", "text": "[Task Completed]"}</action>"#;

        let mut config = test_config();
        config.runtime.completion_protocol = CompletionProtocol::FeedbackSentinel;
        let mut h = harness(&config, vec![Ok(vec![reply])]);
        assert_eq!(h.engine.step().await.terminal, Some(StopReason::Completed));

        config.runtime.completion_protocol = CompletionProtocol::FinalAnswerAction;
        let mut h = harness(&config, vec![Ok(vec![reply])]);
        assert!(!h.engine.step().await.is_terminal());
    }

    #[tokio::test]
    async fn run_stops_at_the_step_budget() {
        let mut config = test_config();
        config.runtime.max_steps = 2;
        let mut h = harness(&config, vec![]);
        let result = h.engine.run().await;
        assert_eq!(result.terminal, Some(StopReason::MaxSteps));
        assert_eq!(h.engine.steps_taken(), 2);
        assert_eq!(h.engine.memory().short().len(), 4);
    }

    #[tokio::test]
    async fn provider_failure_is_not_fatal() {
        let mut h = harness(&test_config(), vec![Err("connection refused")]);
        let result = h.engine.step().await;
        assert!(!result.is_terminal());
        assert!(result.feedback.starts_with("Error during model inference:"));
        assert!(result.feedback.contains("connection refused"));
        assert_eq!(h.engine.memory().short().len(), 2);
    }
}
