use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use serde_json::{json, Value};

use aura_osgate::{HostCapability, OsBoundary};

use crate::{
    error::ErrorKind,
    registry::{RegistryError, ToolHandler, ToolRegistry},
    spec::{ArgMap, ArgSpec, Risk, ToolSpec},
};

/// Variant-tagged identifier for every builtin handler.
///
/// Handler ids in tool specs resolve to a variant once, at registration;
/// dispatch is a match, never a per-call lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryOp {
    /// `audio.set_volume`
    SetVolume,
    /// `audio.adjust_volume`
    AdjustVolume,
    /// `audio.get_volume`
    GetVolume,
    /// `audio.mute`
    Mute,
    /// `audio.unmute`
    Unmute,
    /// `audio.media_play_pause`
    MediaPlayPause,
    /// `audio.media_next`
    MediaNext,
    /// `audio.media_previous`
    MediaPrevious,
    /// `display.set_brightness`
    SetBrightness,
    /// `display.adjust_brightness`
    AdjustBrightness,
    /// `apps.open`
    OpenApp,
    /// `apps.close`
    CloseApp,
    /// `apps.focus`
    FocusApp,
    /// `apps.file_explorer`
    OpenFileExplorer,
    /// `apps.open_url`
    OpenUrl,
    /// `apps.web_search`
    WebSearch,
    /// `input.type`
    TypeText,
    /// `input.key`
    PressKey,
    /// `input.click`
    MouseClick,
    /// `clipboard.read`
    ClipboardRead,
    /// `clipboard.write`
    ClipboardWrite,
    /// `files.create_dir`
    CreateDir,
    /// `files.write`
    WriteFile,
    /// `files.read`
    ReadFile,
    /// `files.move`
    MovePath,
    /// `files.delete`
    DeletePath,
    /// `files.append_note`
    TakeNote,
    /// `files.empty_trash`
    EmptyTrash,
    /// `desktop.screenshot`
    Screenshot,
    /// `power.lock`
    Lock,
    /// `power.sleep`
    Sleep,
    /// `power.shutdown`
    Shutdown,
    /// `power.restart`
    Restart,
    /// `time.now`
    CurrentTime,
    /// `packages.install`
    InstallPackage,
    /// `shell.run`
    RunCommand,
}

impl BoundaryOp {
    /// Resolves a handler id string to its variant.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Some(match id {
            "audio.set_volume" => Self::SetVolume,
            "audio.adjust_volume" => Self::AdjustVolume,
            "audio.get_volume" => Self::GetVolume,
            "audio.mute" => Self::Mute,
            "audio.unmute" => Self::Unmute,
            "audio.media_play_pause" => Self::MediaPlayPause,
            "audio.media_next" => Self::MediaNext,
            "audio.media_previous" => Self::MediaPrevious,
            "display.set_brightness" => Self::SetBrightness,
            "display.adjust_brightness" => Self::AdjustBrightness,
            "apps.open" => Self::OpenApp,
            "apps.close" => Self::CloseApp,
            "apps.focus" => Self::FocusApp,
            "apps.file_explorer" => Self::OpenFileExplorer,
            "apps.open_url" => Self::OpenUrl,
            "apps.web_search" => Self::WebSearch,
            "input.type" => Self::TypeText,
            "input.key" => Self::PressKey,
            "input.click" => Self::MouseClick,
            "clipboard.read" => Self::ClipboardRead,
            "clipboard.write" => Self::ClipboardWrite,
            "files.create_dir" => Self::CreateDir,
            "files.write" => Self::WriteFile,
            "files.read" => Self::ReadFile,
            "files.move" => Self::MovePath,
            "files.delete" => Self::DeletePath,
            "files.append_note" => Self::TakeNote,
            "files.empty_trash" => Self::EmptyTrash,
            "desktop.screenshot" => Self::Screenshot,
            "power.lock" => Self::Lock,
            "power.sleep" => Self::Sleep,
            "power.shutdown" => Self::Shutdown,
            "power.restart" => Self::Restart,
            "time.now" => Self::CurrentTime,
            "packages.install" => Self::InstallPackage,
            "shell.run" => Self::RunCommand,
            _ => return None,
        })
    }
}

/// Handler dispatching a [`BoundaryOp`] against the OS boundary.
pub struct BoundaryTool {
    op: BoundaryOp,
    boundary: Arc<dyn OsBoundary>,
}

impl BoundaryTool {
    /// Binds an operation to a boundary.
    #[must_use]
    pub fn new(op: BoundaryOp, boundary: Arc<dyn OsBoundary>) -> Self {
        Self { op, boundary }
    }
}

fn str_arg<'a>(args: &'a ArgMap, name: &str) -> Result<&'a str, ErrorKind> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ErrorKind::Internal(format!("coerced argument '{name}' missing")))
}

fn int_arg(args: &ArgMap, name: &str) -> Result<i64, ErrorKind> {
    args.get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| ErrorKind::Internal(format!("coerced argument '{name}' missing")))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_level(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

#[async_trait]
impl ToolHandler for BoundaryTool {
    async fn invoke(&self, args: &ArgMap) -> Result<Value, ErrorKind> {
        let b = &self.boundary;
        match self.op {
            BoundaryOp::SetVolume => {
                let level = as_level(int_arg(args, "level")?);
                b.set_volume(level).await?;
                Ok(json!({ "level": level }))
            }
            BoundaryOp::AdjustVolume => {
                let delta = int_arg(args, "delta")?;
                let current = i64::from(b.get_volume().await?);
                let level = as_level(current + delta);
                b.set_volume(level).await?;
                Ok(json!({ "level": level }))
            }
            BoundaryOp::GetVolume => {
                let level = b.get_volume().await?;
                Ok(json!({ "level": level }))
            }
            BoundaryOp::Mute => {
                b.mute().await?;
                Ok(json!({ "muted": true }))
            }
            BoundaryOp::Unmute => {
                b.unmute().await?;
                Ok(json!({ "muted": false }))
            }
            BoundaryOp::MediaPlayPause => {
                b.media_play_pause().await?;
                Ok(json!({ "media": "play_pause" }))
            }
            BoundaryOp::MediaNext => {
                b.media_next().await?;
                Ok(json!({ "media": "next" }))
            }
            BoundaryOp::MediaPrevious => {
                b.media_previous().await?;
                Ok(json!({ "media": "previous" }))
            }
            BoundaryOp::SetBrightness => {
                let level = as_level(int_arg(args, "level")?);
                b.set_brightness(level).await?;
                Ok(json!({ "level": level }))
            }
            BoundaryOp::AdjustBrightness => {
                let delta = int_arg(args, "delta")?;
                let current = i64::from(b.get_brightness().await?);
                let level = as_level(current + delta);
                b.set_brightness(level).await?;
                Ok(json!({ "level": level }))
            }
            BoundaryOp::OpenApp => {
                let name = str_arg(args, "name")?;
                b.open_app(name).await?;
                Ok(json!({ "opened": name }))
            }
            BoundaryOp::CloseApp => {
                let name = str_arg(args, "name")?;
                b.close_app(name).await?;
                Ok(json!({ "closed": name }))
            }
            BoundaryOp::FocusApp => {
                let name = str_arg(args, "name")?;
                b.focus_app(name).await?;
                Ok(json!({ "focused": name }))
            }
            BoundaryOp::OpenFileExplorer => {
                b.open_file_explorer().await?;
                Ok(json!({ "opened": "file explorer" }))
            }
            BoundaryOp::OpenUrl => {
                let url = str_arg(args, "url")?;
                b.open_app(url).await?;
                Ok(json!({ "opened": url }))
            }
            BoundaryOp::WebSearch => {
                let query = str_arg(args, "query")?;
                let url = format!(
                    "https://www.google.com/search?q={}",
                    query.replace(' ', "+")
                );
                b.open_app(&url).await?;
                Ok(json!({ "query": query, "url": url }))
            }
            BoundaryOp::TypeText => {
                let text = str_arg(args, "text")?;
                b.type_text(text).await?;
                Ok(json!({ "typed": text.len() }))
            }
            BoundaryOp::PressKey => {
                let key = str_arg(args, "key")?;
                b.press_key(key).await?;
                Ok(json!({ "key": key }))
            }
            BoundaryOp::MouseClick => {
                let position = match (args.get("x"), args.get("y")) {
                    (Some(x), Some(y)) => {
                        let x = x.as_i64().ok_or_else(|| {
                            ErrorKind::Internal("coerced argument 'x' missing".into())
                        })?;
                        let y = y.as_i64().ok_or_else(|| {
                            ErrorKind::Internal("coerced argument 'y' missing".into())
                        })?;
                        Some((
                            i32::try_from(x).unwrap_or(i32::MAX),
                            i32::try_from(y).unwrap_or(i32::MAX),
                        ))
                    }
                    _ => None,
                };
                b.click(position).await?;
                Ok(json!({ "clicked": true }))
            }
            BoundaryOp::ClipboardRead => {
                let text = b.clipboard_read().await?;
                Ok(json!({ "text": text }))
            }
            BoundaryOp::ClipboardWrite => {
                let text = str_arg(args, "text")?;
                b.clipboard_write(text).await?;
                Ok(json!({ "bytes": text.len() }))
            }
            BoundaryOp::CreateDir => {
                let path = str_arg(args, "path")?;
                let created = b.create_dir(Path::new(path)).await?;
                Ok(json!({ "path": created }))
            }
            BoundaryOp::WriteFile => {
                let path = str_arg(args, "path")?;
                let contents = args
                    .get("contents")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let written = b.write_file(Path::new(path), contents).await?;
                Ok(json!({ "path": written, "bytes": contents.len() }))
            }
            BoundaryOp::ReadFile => {
                let path = str_arg(args, "path")?;
                let contents = b.read_file(Path::new(path)).await?;
                Ok(json!({ "contents": contents }))
            }
            BoundaryOp::MovePath => {
                let from = str_arg(args, "from")?;
                let to = str_arg(args, "to")?;
                b.move_path(Path::new(from), Path::new(to)).await?;
                Ok(json!({ "from": from, "to": to }))
            }
            BoundaryOp::DeletePath => {
                let path = str_arg(args, "path")?;
                b.delete_path(Path::new(path)).await?;
                Ok(json!({ "deleted": path }))
            }
            BoundaryOp::TakeNote => {
                let content = str_arg(args, "content")?;
                let path = b.append_note(content).await?;
                Ok(json!({ "path": path, "noted": content.len() }))
            }
            BoundaryOp::EmptyTrash => {
                b.empty_trash().await?;
                Ok(json!({ "emptied": true }))
            }
            BoundaryOp::Screenshot => {
                let path = b.screenshot().await?;
                Ok(json!({ "path": path }))
            }
            BoundaryOp::Lock => {
                b.lock().await?;
                Ok(json!({ "locked": true }))
            }
            BoundaryOp::Sleep => {
                b.sleep().await?;
                Ok(json!({ "sleeping": true }))
            }
            BoundaryOp::Shutdown => {
                b.shutdown().await?;
                Ok(json!({ "shutdown": true }))
            }
            BoundaryOp::Restart => {
                b.restart().await?;
                Ok(json!({ "restarting": true }))
            }
            BoundaryOp::CurrentTime => {
                let now = b.now();
                Ok(json!({
                    "iso": now.to_rfc3339(),
                    "friendly": now.format("%H:%M on %A, %B %e").to_string(),
                }))
            }
            BoundaryOp::InstallPackage => {
                let package = str_arg(args, "package")?;
                b.install_package(package).await?;
                Ok(json!({ "installed": package }))
            }
            BoundaryOp::RunCommand => {
                let command = str_arg(args, "command")?;
                let stdout = b.run_command(command).await?;
                Ok(json!({ "stdout": stdout }))
            }
        }
    }
}

/// Fallback stub returning its would-be effect as data.
///
/// Registered for tools that can degrade gracefully on hosts without the
/// backing capability (the cross-platform fallback path).
pub struct EchoStub {
    note: &'static str,
}

impl EchoStub {
    /// Creates a stub with a fixed note.
    #[must_use]
    pub const fn new(note: &'static str) -> Self {
        Self { note }
    }
}

#[async_trait]
impl ToolHandler for EchoStub {
    async fn invoke(&self, args: &ArgMap) -> Result<Value, ErrorKind> {
        Ok(json!({ "note": self.note, "args": args }))
    }
}

/// The builtin tool specs in registration (and therefore prompt) order.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn catalog() -> Vec<ToolSpec> {
    use HostCapability as Cap;
    vec![
        ToolSpec::builder("set_volume", "Set master volume to a percentage", "audio.set_volume")
            .arg("level", ArgSpec::integer().required().range(0.0, 100.0))
            .requires(Cap::Audio)
            .build(),
        ToolSpec::builder("adjust_volume", "Raise or lower volume by a delta", "audio.adjust_volume")
            .arg("delta", ArgSpec::integer().required().range(-100.0, 100.0))
            .requires(Cap::Audio)
            .build(),
        ToolSpec::builder("get_volume", "Read the current volume", "audio.get_volume")
            .requires(Cap::Audio)
            .build(),
        ToolSpec::builder("mute", "Mute audio output", "audio.mute")
            .requires(Cap::Audio)
            .build(),
        ToolSpec::builder("unmute", "Unmute audio output", "audio.unmute")
            .requires(Cap::Audio)
            .build(),
        ToolSpec::builder("media_play_pause", "Toggle media playback", "audio.media_play_pause")
            .requires(Cap::Audio)
            .build(),
        ToolSpec::builder("media_next", "Skip to the next track", "audio.media_next")
            .requires(Cap::Audio)
            .build(),
        ToolSpec::builder("media_previous", "Return to the previous track", "audio.media_previous")
            .requires(Cap::Audio)
            .build(),
        ToolSpec::builder("set_brightness", "Set screen brightness to a percentage", "display.set_brightness")
            .arg("level", ArgSpec::integer().required().range(0.0, 100.0))
            .requires(Cap::Display)
            .build(),
        ToolSpec::builder("adjust_brightness", "Raise or lower brightness by a delta", "display.adjust_brightness")
            .arg("delta", ArgSpec::integer().required().range(-100.0, 100.0))
            .requires(Cap::Display)
            .build(),
        ToolSpec::builder("open_app", "Launch an application by name", "apps.open")
            .arg("name", ArgSpec::string().required())
            .requires(Cap::Apps)
            .build(),
        ToolSpec::builder("close_app", "Close an application by name", "apps.close")
            .arg("name", ArgSpec::string().required())
            .risk(Risk::Medium)
            .requires(Cap::Apps)
            .build(),
        ToolSpec::builder("focus_app", "Bring an application window to the front", "apps.focus")
            .arg("name", ArgSpec::string().required())
            .requires(Cap::Apps)
            .build(),
        ToolSpec::builder("open_file_explorer", "Open the platform file manager", "apps.file_explorer")
            .requires(Cap::Apps)
            .build(),
        ToolSpec::builder("open_website", "Open a URL in the default browser", "apps.open_url")
            .arg("url", ArgSpec::string().required())
            .requires(Cap::Apps)
            .fallback("stub.echo")
            .build(),
        ToolSpec::builder("web_search", "Search the web in the default browser", "apps.web_search")
            .arg("query", ArgSpec::string().required())
            .requires(Cap::Apps)
            .fallback("stub.echo")
            .build(),
        ToolSpec::builder("type_text", "Type text into the focused window", "input.type")
            .arg("text", ArgSpec::string().required())
            .risk(Risk::Medium)
            .requires(Cap::Input)
            .build(),
        ToolSpec::builder("press_key", "Press a key or chord", "input.key")
            .arg("key", ArgSpec::string().required())
            .risk(Risk::Medium)
            .requires(Cap::Input)
            .build(),
        ToolSpec::builder("mouse_click", "Click at coordinates or the pointer", "input.click")
            .arg("x", ArgSpec::integer())
            .arg("y", ArgSpec::integer())
            .risk(Risk::Medium)
            .requires(Cap::Input)
            .build(),
        ToolSpec::builder("clipboard_read", "Read the clipboard", "clipboard.read")
            .requires(Cap::Clipboard)
            .build(),
        ToolSpec::builder("clipboard_write", "Write text to the clipboard", "clipboard.write")
            .arg("text", ArgSpec::string().required())
            .requires(Cap::Clipboard)
            .build(),
        ToolSpec::builder("create_dir", "Create a directory", "files.create_dir")
            .arg("path", ArgSpec::string().required())
            .requires(Cap::Files)
            .build(),
        ToolSpec::builder("write_file", "Write a text file", "files.write")
            .arg("path", ArgSpec::string().required())
            .arg("contents", ArgSpec::string().default_value(serde_json::json!("")))
            .requires(Cap::Files)
            .build(),
        ToolSpec::builder("read_file", "Read a text file", "files.read")
            .arg("path", ArgSpec::string().required())
            .requires(Cap::Files)
            .build(),
        ToolSpec::builder("move_path", "Move or rename a file or directory", "files.move")
            .arg("from", ArgSpec::string().required())
            .arg("to", ArgSpec::string().required())
            .risk(Risk::Medium)
            .requires(Cap::Files)
            .build(),
        ToolSpec::builder("delete_path", "Delete a file or directory", "files.delete")
            .arg("path", ArgSpec::string().required())
            .risk(Risk::Confirm)
            .requires(Cap::Files)
            .build(),
        ToolSpec::builder("take_note", "Append a note to the notes file", "files.append_note")
            .arg("content", ArgSpec::string().required())
            .requires(Cap::Files)
            .build(),
        ToolSpec::builder("empty_recycle_bin", "Empty the platform trash", "files.empty_trash")
            .risk(Risk::Confirm)
            .requires(Cap::Files)
            .build(),
        ToolSpec::builder("take_screenshot", "Capture the screen to a file", "desktop.screenshot")
            .requires(Cap::Desktop)
            .build(),
        ToolSpec::builder("lock_computer", "Lock the session", "power.lock")
            .risk(Risk::Medium)
            .requires(Cap::Power)
            .build(),
        ToolSpec::builder("sleep_computer", "Suspend the machine", "power.sleep")
            .risk(Risk::High)
            .requires(Cap::Power)
            .build(),
        ToolSpec::builder("shutdown_computer", "Power the machine off", "power.shutdown")
            .risk(Risk::Confirm)
            .requires(Cap::Power)
            .build(),
        ToolSpec::builder("restart_computer", "Reboot the machine", "power.restart")
            .risk(Risk::Confirm)
            .requires(Cap::Power)
            .build(),
        ToolSpec::builder("current_time", "Report the local time and date", "time.now")
            .requires(Cap::Clock)
            .build(),
        ToolSpec::builder("install_dependency", "Install a runtime package", "packages.install")
            .arg(
                "package",
                ArgSpec::string().required().matches("^[A-Za-z0-9_.-]+$"),
            )
            .risk(Risk::Medium)
            .requires(Cap::Packages)
            .timeout_ms(120_000)
            .build(),
        ToolSpec::builder("run_terminal_command", "Run one shell command", "shell.run")
            .arg("command", ArgSpec::string().required())
            .risk(Risk::Confirm)
            .requires(Cap::Shell)
            .timeout_ms(60_000)
            .build(),
    ]
}

/// Registers the builtin catalog against a boundary.
///
/// Handler ids resolve to [`BoundaryOp`] variants here, once; an id that
/// resolves to nothing is a configuration error.
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    boundary: &Arc<dyn OsBoundary>,
) -> Result<(), RegistryError> {
    for spec in catalog() {
        let Some(op) = BoundaryOp::from_id(&spec.handler_id) else {
            return Err(RegistryError::UnknownHandler(spec.handler_id.clone()));
        };
        let handler: Arc<dyn ToolHandler> =
            Arc::new(BoundaryTool::new(op, Arc::clone(boundary)));
        let fallback: Option<Arc<dyn ToolHandler>> = spec
            .fallback_handler_id
            .as_deref()
            .map(|_| Arc::new(EchoStub::new("cross-platform fallback")) as Arc<dyn ToolHandler>);
        registry.register_with_fallback(spec, handler, fallback)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecPolicy, ToolExecutor};
    use aura_osgate::LoopbackBoundary;
    use serde_json::json;

    fn setup() -> (Arc<LoopbackBoundary>, ToolExecutor) {
        let loopback = Arc::new(LoopbackBoundary::new());
        let boundary: Arc<dyn OsBoundary> = Arc::new((*loopback).clone());
        let registry = Arc::new(ToolRegistry::new());
        register_builtin_tools(&registry, &boundary).unwrap();
        let executor = ToolExecutor::new(registry, boundary.capabilities());
        (loopback, executor)
    }

    #[tokio::test]
    async fn set_volume_reaches_the_boundary() {
        let (loopback, executor) = setup();
        let mut args = ArgMap::new();
        args.insert("level".into(), json!(50));
        let result = executor.execute("set_volume", &args, &ExecPolicy::default()).await;
        assert!(result.ok);
        assert_eq!(loopback.volume(), 50);
    }

    #[tokio::test]
    async fn adjust_volume_clamps() {
        let (loopback, executor) = setup();
        let mut args = ArgMap::new();
        args.insert("delta".into(), json!(90));
        let result = executor
            .execute("adjust_volume", &args, &ExecPolicy::default())
            .await;
        assert!(result.ok);
        assert_eq!(loopback.volume(), 100);
    }

    #[tokio::test]
    async fn every_handler_id_resolves() {
        for spec in catalog() {
            assert!(
                BoundaryOp::from_id(&spec.handler_id).is_some(),
                "unresolvable handler id {}",
                spec.handler_id
            );
        }
    }

    #[tokio::test]
    async fn media_and_notes_reach_the_boundary() {
        let (loopback, executor) = setup();
        executor
            .execute("media_next", &ArgMap::new(), &ExecPolicy::default())
            .await;
        let mut args = ArgMap::new();
        args.insert("content".into(), json!("buy milk"));
        let result = executor.execute("take_note", &args, &ExecPolicy::default()).await;
        assert!(result.ok);
        let ops: Vec<String> = loopback.effects().into_iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec!["audio.media_next", "files.append_note"]);
        assert_eq!(loopback.notes(), vec!["buy milk"]);
    }

    #[tokio::test]
    async fn destructive_surfaces_are_confirmation_gated() {
        let (_loopback, executor) = setup();
        for tool in ["empty_recycle_bin", "restart_computer"] {
            let result = executor.execute(tool, &ArgMap::new(), &ExecPolicy::default()).await;
            assert!(
                matches!(result.error, Some(ErrorKind::ConfirmationRequired(_))),
                "{tool} should be gated"
            );
        }
        let mut args = ArgMap::new();
        args.insert("command".into(), json!("ls"));
        let result = executor
            .execute("run_terminal_command", &args, &ExecPolicy::confirmed())
            .await;
        assert!(result.ok);
        assert_eq!(result.value["stdout"], json!("ran: ls"));
    }

    #[tokio::test]
    async fn delete_is_confirmation_gated() {
        let (_loopback, executor) = setup();
        let mut args = ArgMap::new();
        args.insert("path".into(), json!("notes"));
        let result = executor
            .execute("delete_path", &args, &ExecPolicy::default())
            .await;
        assert!(matches!(
            result.error,
            Some(ErrorKind::ConfirmationRequired(_))
        ));
    }
}
