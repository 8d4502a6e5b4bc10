use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde_json::json;

use crate::boundary::{HostCapability, OsBoundary, OsError, OsResult};

/// One side effect recorded by the loopback boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEffect {
    /// Operation name, e.g. `audio.set_volume`.
    pub operation: String,
    /// JSON detail captured with the call.
    pub detail: serde_json::Value,
}

#[derive(Debug, Default)]
struct LoopbackState {
    volume: u8,
    muted: bool,
    brightness: u8,
    clipboard: String,
    files: IndexMap<PathBuf, String>,
    notes: Vec<String>,
    effects: Vec<RecordedEffect>,
    failing_ops: IndexSet<String>,
}

/// In-memory boundary double.
///
/// Records every effect instead of performing it, so tests can assert on the
/// exact operation sequence. Individual operations can be forced to fail.
#[derive(Debug, Clone, Default)]
pub struct LoopbackBoundary {
    state: Arc<RwLock<LoopbackState>>,
    capabilities: IndexSet<HostCapability>,
}

impl LoopbackBoundary {
    /// Creates a double advertising every capability.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LoopbackState {
                volume: 40,
                brightness: 70,
                ..LoopbackState::default()
            })),
            capabilities: IndexSet::from([
                HostCapability::Audio,
                HostCapability::Display,
                HostCapability::Power,
                HostCapability::Apps,
                HostCapability::Input,
                HostCapability::Clipboard,
                HostCapability::Files,
                HostCapability::Desktop,
                HostCapability::Clock,
                HostCapability::Packages,
                HostCapability::Shell,
            ]),
        }
    }

    /// Restricts the advertised capability set.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: IndexSet<HostCapability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Forces the named operation to fail until cleared.
    pub fn fail_operation(&self, operation: impl Into<String>) {
        self.state.write().failing_ops.insert(operation.into());
    }

    /// Clears a forced failure.
    pub fn clear_failure(&self, operation: &str) {
        self.state.write().failing_ops.shift_remove(operation);
    }

    /// Snapshot of recorded effects in call order.
    #[must_use]
    pub fn effects(&self) -> Vec<RecordedEffect> {
        self.state.read().effects.clone()
    }

    /// Current simulated volume.
    #[must_use]
    pub fn volume(&self) -> u8 {
        self.state.read().volume
    }

    /// Contents previously written for a path, if any.
    #[must_use]
    pub fn file(&self, path: &Path) -> Option<String> {
        self.state.read().files.get(path).cloned()
    }

    /// Notes recorded so far, oldest first.
    #[must_use]
    pub fn notes(&self) -> Vec<String> {
        self.state.read().notes.clone()
    }

    fn record(&self, operation: &str, detail: serde_json::Value) -> OsResult<()> {
        let mut state = self.state.write();
        if state.failing_ops.contains(operation) {
            return Err(OsError::CommandFailed {
                operation: operation.to_string(),
                detail: "forced failure".into(),
            });
        }
        state.effects.push(RecordedEffect {
            operation: operation.to_string(),
            detail,
        });
        Ok(())
    }
}

#[async_trait]
impl OsBoundary for LoopbackBoundary {
    fn capabilities(&self) -> IndexSet<HostCapability> {
        self.capabilities.clone()
    }

    async fn set_volume(&self, level: u8) -> OsResult<()> {
        self.record("audio.set_volume", json!({ "level": level }))?;
        self.state.write().volume = level.min(100);
        Ok(())
    }

    async fn get_volume(&self) -> OsResult<u8> {
        Ok(self.state.read().volume)
    }

    async fn mute(&self) -> OsResult<()> {
        self.record("audio.mute", json!({}))?;
        self.state.write().muted = true;
        Ok(())
    }

    async fn unmute(&self) -> OsResult<()> {
        self.record("audio.unmute", json!({}))?;
        self.state.write().muted = false;
        Ok(())
    }

    async fn media_play_pause(&self) -> OsResult<()> {
        self.record("audio.media_play_pause", json!({}))
    }

    async fn media_next(&self) -> OsResult<()> {
        self.record("audio.media_next", json!({}))
    }

    async fn media_previous(&self) -> OsResult<()> {
        self.record("audio.media_previous", json!({}))
    }

    async fn set_brightness(&self, level: u8) -> OsResult<()> {
        self.record("display.set_brightness", json!({ "level": level }))?;
        self.state.write().brightness = level.min(100);
        Ok(())
    }

    async fn get_brightness(&self) -> OsResult<u8> {
        Ok(self.state.read().brightness)
    }

    async fn lock(&self) -> OsResult<()> {
        self.record("power.lock", json!({}))
    }

    async fn sleep(&self) -> OsResult<()> {
        self.record("power.sleep", json!({}))
    }

    async fn shutdown(&self) -> OsResult<()> {
        self.record("power.shutdown", json!({}))
    }

    async fn restart(&self) -> OsResult<()> {
        self.record("power.restart", json!({}))
    }

    async fn open_app(&self, name: &str) -> OsResult<()> {
        self.record("apps.open", json!({ "name": name }))
    }

    async fn close_app(&self, name: &str) -> OsResult<()> {
        self.record("apps.close", json!({ "name": name }))
    }

    async fn focus_app(&self, name: &str) -> OsResult<()> {
        self.record("apps.focus", json!({ "name": name }))
    }

    async fn open_file_explorer(&self) -> OsResult<()> {
        self.record("apps.file_explorer", json!({}))
    }

    async fn type_text(&self, text: &str) -> OsResult<()> {
        self.record("input.type", json!({ "text": text }))
    }

    async fn press_key(&self, key: &str) -> OsResult<()> {
        self.record("input.key", json!({ "key": key }))
    }

    async fn click(&self, position: Option<(i32, i32)>) -> OsResult<()> {
        self.record("input.click", json!({ "position": position }))
    }

    async fn clipboard_read(&self) -> OsResult<String> {
        Ok(self.state.read().clipboard.clone())
    }

    async fn clipboard_write(&self, text: &str) -> OsResult<()> {
        self.record("clipboard.write", json!({ "len": text.len() }))?;
        self.state.write().clipboard = text.to_string();
        Ok(())
    }

    async fn create_dir(&self, path: &Path) -> OsResult<PathBuf> {
        self.record("files.create", json!({ "path": path }))?;
        Ok(path.to_path_buf())
    }

    async fn read_file(&self, path: &Path) -> OsResult<String> {
        self.state.read().files.get(path).cloned().ok_or_else(|| OsError::Io {
            operation: "files.read".into(),
            detail: format!("{} not found", path.display()),
        })
    }

    async fn write_file(&self, path: &Path, contents: &str) -> OsResult<PathBuf> {
        self.record("files.write", json!({ "path": path, "bytes": contents.len() }))?;
        self.state
            .write()
            .files
            .insert(path.to_path_buf(), contents.to_string());
        Ok(path.to_path_buf())
    }

    async fn move_path(&self, from: &Path, to: &Path) -> OsResult<()> {
        self.record("files.move", json!({ "from": from, "to": to }))?;
        let mut state = self.state.write();
        if let Some(contents) = state.files.shift_remove(from) {
            state.files.insert(to.to_path_buf(), contents);
        }
        Ok(())
    }

    async fn delete_path(&self, path: &Path) -> OsResult<()> {
        self.record("files.delete", json!({ "path": path }))?;
        self.state.write().files.shift_remove(path);
        Ok(())
    }

    async fn append_note(&self, content: &str) -> OsResult<PathBuf> {
        self.record("files.append_note", json!({ "len": content.len() }))?;
        self.state.write().notes.push(content.to_string());
        Ok(PathBuf::from("/tmp/loopback-notes.txt"))
    }

    async fn empty_trash(&self) -> OsResult<()> {
        self.record("files.empty_trash", json!({}))
    }

    async fn screenshot(&self) -> OsResult<PathBuf> {
        self.record("desktop.screenshot", json!({}))?;
        Ok(PathBuf::from("/tmp/loopback-shot.png"))
    }

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn install_package(&self, package: &str) -> OsResult<()> {
        self.record("packages.install", json!({ "package": package }))
    }

    async fn run_command(&self, command: &str) -> OsResult<String> {
        self.record("shell.run", json!({ "command": command }))?;
        Ok(format!("ran: {command}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_effects_in_order() {
        let boundary = LoopbackBoundary::new();
        boundary.set_volume(55).await.unwrap();
        boundary.mute().await.unwrap();
        let ops: Vec<String> = boundary
            .effects()
            .into_iter()
            .map(|e| e.operation)
            .collect();
        assert_eq!(ops, vec!["audio.set_volume", "audio.mute"]);
        assert_eq!(boundary.volume(), 55);
    }

    #[tokio::test]
    async fn forced_failures_surface() {
        let boundary = LoopbackBoundary::new();
        boundary.fail_operation("apps.open");
        let err = boundary.open_app("Spotify").await.unwrap_err();
        assert!(matches!(err, OsError::CommandFailed { .. }));
        boundary.clear_failure("apps.open");
        assert!(boundary.open_app("Spotify").await.is_ok());
    }
}
