use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::GridClawResult;
use crate::memory::turn::ConversationTurn;

/// One JSONL line per conversation turn. Image payloads are reduced to a count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: i64,
    pub tier: String,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub images: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Append-only session transcript. Write failures are logged, never raised.
pub struct SessionLog {
    pub session_id: String,
    file_path: PathBuf,
}

impl SessionLog {
    /// New session file under `dir`, or the per-user data directory when `None`.
    pub fn new(dir: Option<&Path>) -> Self {
        let session_id = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(data_dir_or_cwd);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), "session dir unavailable: {e}");
        }
        let file_path = dir.join(format!("session_{session_id}.jsonl"));
        tracing::info!(path = %file_path.display(), "session log opened");
        Self {
            session_id,
            file_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn record(&self, tier: &str, turn: &ConversationTurn) {
        let entry = HistoryEntry {
            ts: chrono::Utc::now().timestamp_millis(),
            tier: tier.to_string(),
            role: turn.role.as_str().to_string(),
            content: turn.text_content().to_string(),
            images: turn.image_count(),
        };
        if let Err(e) = self.append(&entry) {
            tracing::warn!(path = %self.file_path.display(), "session log write failed: {e}");
        }
    }

    fn append(&self, entry: &HistoryEntry) -> GridClawResult<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// `<data dir>/gridclaw/sessions`, falling back to the working directory.
fn data_dir_or_cwd() -> PathBuf {
    if let Some(base) = dirs::data_local_dir() {
        return base.join("gridclaw").join("sessions");
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::turn::{ImageAttachment, ImageDetail, Role};

    #[test]
    fn turns_are_appended_without_image_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(Some(dir.path()));

        log.record("fixed", &ConversationTurn::text(Role::System, "be careful"));
        let img = ImageAttachment::new("data:image/png;base64,SECRET".into(), ImageDetail::High);
        log.record(
            "query",
            &ConversationTurn::with_images(Role::User, "what now", vec![img.clone(), img]),
        );

        let raw = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<HistoryEntry> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].role, "system");
        assert_eq!(lines[1].images, 2);
        assert!(!raw.contains("SECRET"));
    }

    #[test]
    fn unwritable_location_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let log = SessionLog::new(Some(&blocker.join("nested")));
        log.record("short", &ConversationTurn::text(Role::User, "hi"));
    }
}
