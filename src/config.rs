use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{GridClawError, GridClawResult};

/// Environment variable consulted when `llm.api_key` is absent from config.toml.
pub const API_KEY_ENV: &str = "GRIDCLAW_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub kill_switch: KillSwitchConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Full chat-completions URL, e.g. `https://api.openai.com/v1/chat/completions`.
    pub api_base: String,
    pub model: String,
    /// Optional API key stored in config.toml (falls back to env var GRIDCLAW_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Caps the reasoning reply; the action block normally arrives well before it.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Overrides used by the memory summarizer.
    #[serde(default)]
    pub summary: SummaryRoleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRoleConfig {
    /// Model name for summarization. Falls back to `llm.model`.
    pub model: Option<String>,
    pub temperature: Option<f64>,
    #[serde(default = "default_short_summary_tokens")]
    pub short_max_tokens: u32,
    #[serde(default = "default_long_summary_tokens")]
    pub long_max_tokens: u32,
}

impl Default for SummaryRoleConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: None,
            short_max_tokens: default_short_summary_tokens(),
            long_max_tokens: default_long_summary_tokens(),
        }
    }
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_short_summary_tokens() -> u32 {
    200
}

fn default_long_summary_tokens() -> u32 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Global grid line spacing, in pixels.
    pub grid_step: u32,
    /// Local (cursor crop) grid line spacing, in pixels.
    pub local_grid_step: u32,
    /// Side length of the cursor-centred crop.
    pub crop_size: u32,
    /// Named colour ("red", "blue", …) or `#rrggbb`.
    pub grid_color: String,
    pub grid_width: u32,
    pub mouse_color: String,
    pub mouse_width: u32,
    /// Border added around each view to hold the index labels.
    pub label_margin: u32,
    pub fallback_width: u32,
    pub fallback_height: u32,
    /// Pause after the capture guard is entered, before grabbing the screen.
    pub capture_settle_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            grid_step: 100,
            local_grid_step: 30,
            crop_size: 500,
            grid_color: "red".into(),
            grid_width: 1,
            mouse_color: "blue".into(),
            mouse_width: 5,
            label_margin: 24,
            fallback_width: 1920,
            fallback_height: 1080,
            capture_settle_ms: 500,
        }
    }
}

/// How the loop recognises that the model considers the task done.
///
/// Older prompt revisions signalled completion through free text in the
/// execution feedback, newer ones through a dedicated `final_answer` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionProtocol {
    FinalAnswerAction,
    FeedbackSentinel,
    Either,
}

impl Default for CompletionProtocol {
    fn default() -> Self {
        CompletionProtocol::Either
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Max steps per task to prevent infinite loops.
    pub max_steps: u32,
    /// Archive every global/local view as PNG.
    pub debug_mode: bool,
    pub completion_protocol: CompletionProtocol,
    pub debug_dir: Option<PathBuf>,
    /// Directory for the JSONL session log; `None` uses the platform data dir.
    pub session_dir: Option<PathBuf>,
    /// Disable the JSONL session log entirely.
    pub session_log: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            debug_mode: false,
            completion_protocol: CompletionProtocol::default(),
            debug_dir: None,
            session_dir: None,
            session_log: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_short_memory: usize,
    pub max_long_memory: usize,
    /// Number of oldest entries folded into one summary per compression.
    pub compression_ratio: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_short_memory: 10,
            max_long_memory: 10,
            compression_ratio: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KillSwitchConfig {
    /// Hotkey accepted by `global_hotkey::hotkey::HotKey::from_str`.
    pub hotkey: String,
    pub presses: u32,
    pub window_ms: u64,
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            hotkey: "Escape".into(),
            presses: 3,
            window_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub tick_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { tick_ms: 100 }
    }
}

impl AppConfig {
    /// Rejects values that would stall the loop or the memory compressor.
    pub fn validate(&self) -> GridClawResult<()> {
        let v = &self.vision;
        if v.grid_step == 0 || v.local_grid_step == 0 || v.crop_size == 0 {
            return Err(GridClawError::Config(
                "vision.grid_step, vision.local_grid_step and vision.crop_size must be > 0".into(),
            ));
        }
        if v.fallback_width == 0 || v.fallback_height == 0 {
            return Err(GridClawError::Config("vision fallback size must be > 0".into()));
        }
        if self.runtime.max_steps == 0 {
            return Err(GridClawError::Config("runtime.max_steps must be > 0".into()));
        }
        let m = &self.memory;
        if m.compression_ratio == 0 {
            return Err(GridClawError::Config("memory.compression_ratio must be > 0".into()));
        }
        if m.max_short_memory == 0 || m.max_long_memory == 0 {
            return Err(GridClawError::Config(
                "memory.max_short_memory and memory.max_long_memory must be > 0".into(),
            ));
        }
        if self.kill_switch.presses == 0 {
            return Err(GridClawError::Config("kill_switch.presses must be > 0".into()));
        }
        if self.display.tick_ms == 0 {
            return Err(GridClawError::Config("display.tick_ms must be > 0".into()));
        }
        if self.llm.api_base.trim().is_empty() || self.llm.model.trim().is_empty() {
            return Err(GridClawError::Config("llm.api_base and llm.model are required".into()));
        }
        Ok(())
    }

    /// API key from config.toml, else from the environment (after `.env` is loaded).
    pub fn api_key(&self) -> String {
        self.llm
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .unwrap_or_default()
    }
}

fn resolve_config_path() -> GridClawResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(GridClawError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn parse_config(content: &str) -> GridClawResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load from an explicit path, or search the default locations.
pub fn load_config(path: Option<&Path>) -> GridClawResult<AppConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => resolve_config_path()?,
    };
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), model = %config.llm.model, "config loaded");
    Ok(config)
}

/// Minimal valid config for unit tests across the crate.
#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    let mut cfg = parse_config(
        "[llm]\napi_base = \"http://localhost:8080/v1/chat/completions\"\nmodel = \"vision-model\"\n",
    )
    .expect("test config parses");
    cfg.vision.capture_settle_ms = 0;
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[llm]
api_base = "http://localhost:8080/v1/chat/completions"
model = "vision-model"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.vision.grid_step, 100);
        assert_eq!(cfg.vision.local_grid_step, 30);
        assert_eq!(cfg.vision.crop_size, 500);
        assert_eq!(cfg.runtime.max_steps, 100);
        assert_eq!(cfg.memory.compression_ratio, 5);
        assert_eq!(cfg.kill_switch.presses, 3);
        assert_eq!(cfg.runtime.completion_protocol, CompletionProtocol::Either);
        assert_eq!(cfg.llm.summary.short_max_tokens, 200);
    }

    #[test]
    fn completion_protocol_is_read_from_toml() {
        let toml = format!(
            "{MINIMAL}\n[runtime]\nmax_steps = 5\ncompletion_protocol = \"final_answer_action\"\n"
        );
        let cfg = parse_config(&toml).unwrap();
        assert_eq!(cfg.runtime.max_steps, 5);
        assert_eq!(cfg.runtime.completion_protocol, CompletionProtocol::FinalAnswerAction);
    }

    #[test]
    fn zero_compression_ratio_is_rejected() {
        let toml = format!(
            "{MINIMAL}\n[memory]\ncompression_ratio = 0\n"
        );
        assert!(matches!(parse_config(&toml), Err(GridClawError::Config(_))));
    }

    #[test]
    fn zero_max_steps_is_rejected() {
        let toml = format!("{MINIMAL}\n[runtime]\nmax_steps = 0\n");
        match parse_config(&toml) {
            Err(GridClawError::Config(msg)) => assert!(msg.contains("max_steps")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn config_key_wins_over_environment() {
        let mut cfg = parse_config(MINIMAL).unwrap();
        cfg.llm.api_key = Some("from-file".into());
        assert_eq!(cfg.api_key(), "from-file");
    }
}
