use std::{
    env,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use indexmap::IndexSet;
use tokio::{fs, process::Command};

use crate::boundary::{HostCapability, OsBoundary, OsError, OsResult};

/// Boundary implementation backed by platform utilities.
///
/// Operations shell out to the conventional tool for the current platform and
/// surface [`OsError::Unsupported`] where the host lacks one. Filesystem
/// operations are contained under a base directory; traversal outside it is
/// rejected before any effect occurs.
#[derive(Debug, Clone)]
pub struct NativeBoundary {
    files_root: PathBuf,
    shots_dir: PathBuf,
    capabilities: IndexSet<HostCapability>,
}

impl NativeBoundary {
    /// Probes the host and builds a boundary rooted at `files_root`.
    #[must_use]
    pub fn probe(files_root: impl Into<PathBuf>, shots_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_root: files_root.into(),
            shots_dir: shots_dir.into(),
            capabilities: probe_capabilities(),
        }
    }

    fn require(&self, capability: HostCapability, operation: &str) -> OsResult<()> {
        if self.capabilities.contains(&capability) {
            Ok(())
        } else {
            Err(OsError::unsupported(capability, operation))
        }
    }

    /// Resolves a user-supplied path under the files root.
    ///
    /// Relative paths join the root; absolute paths must already live under
    /// it. `..` components are rejected outright.
    fn resolve(&self, path: &Path) -> OsResult<PathBuf> {
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(OsError::InvalidPath(format!(
                "{} contains parent traversal",
                path.display()
            )));
        }
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.files_root.join(path)
        };
        if candidate.starts_with(&self.files_root) {
            Ok(candidate)
        } else {
            Err(OsError::InvalidPath(format!(
                "{} escapes {}",
                candidate.display(),
                self.files_root.display()
            )))
        }
    }
}

async fn run(operation: &str, program: &str, args: &[&str]) -> OsResult<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|err| OsError::CommandFailed {
            operation: operation.to_string(),
            detail: err.to_string(),
        })?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(OsError::CommandFailed {
            operation: operation.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn io_err(operation: &str, err: &std::io::Error) -> OsError {
    OsError::Io {
        operation: operation.to_string(),
        detail: err.to_string(),
    }
}

fn binary_on_path(name: &str) -> bool {
    let Some(path) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&path).any(|dir| dir.join(name).is_file())
}

#[cfg(target_os = "linux")]
fn probe_capabilities() -> IndexSet<HostCapability> {
    let mut caps = IndexSet::from([HostCapability::Files, HostCapability::Clock]);
    if binary_on_path("amixer") {
        caps.insert(HostCapability::Audio);
    }
    if binary_on_path("brightnessctl") {
        caps.insert(HostCapability::Display);
    }
    if binary_on_path("systemctl") {
        caps.insert(HostCapability::Power);
    }
    if binary_on_path("xdg-open") {
        caps.insert(HostCapability::Apps);
    }
    if binary_on_path("xdotool") {
        caps.insert(HostCapability::Input);
    }
    if binary_on_path("xclip") {
        caps.insert(HostCapability::Clipboard);
    }
    if binary_on_path("scrot") {
        caps.insert(HostCapability::Desktop);
    }
    if binary_on_path("pip3") {
        caps.insert(HostCapability::Packages);
    }
    if binary_on_path("sh") {
        caps.insert(HostCapability::Shell);
    }
    caps
}

#[cfg(target_os = "macos")]
fn probe_capabilities() -> IndexSet<HostCapability> {
    let mut caps = IndexSet::from([
        HostCapability::Files,
        HostCapability::Clock,
        HostCapability::Audio,
        HostCapability::Power,
        HostCapability::Apps,
        HostCapability::Input,
        HostCapability::Clipboard,
        HostCapability::Desktop,
        HostCapability::Shell,
    ]);
    if binary_on_path("pip3") {
        caps.insert(HostCapability::Packages);
    }
    caps
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn probe_capabilities() -> IndexSet<HostCapability> {
    IndexSet::from([HostCapability::Files, HostCapability::Clock])
}

#[async_trait]
impl OsBoundary for NativeBoundary {
    fn capabilities(&self) -> IndexSet<HostCapability> {
        self.capabilities.clone()
    }

    async fn set_volume(&self, level: u8) -> OsResult<()> {
        self.require(HostCapability::Audio, "audio.set_volume")?;
        let level = level.min(100);
        #[cfg(target_os = "linux")]
        {
            run(
                "audio.set_volume",
                "amixer",
                &["set", "Master", &format!("{level}%")],
            )
            .await
            .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "audio.set_volume",
                "osascript",
                &["-e", &format!("set volume output volume {level}")],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let _ = level;
            Err(OsError::unsupported(
                HostCapability::Audio,
                "audio.set_volume",
            ))
        }
    }

    async fn get_volume(&self) -> OsResult<u8> {
        self.require(HostCapability::Audio, "audio.get_volume")?;
        #[cfg(target_os = "linux")]
        {
            let out = run("audio.get_volume", "amixer", &["get", "Master"]).await?;
            parse_percent(&out).ok_or_else(|| OsError::CommandFailed {
                operation: "audio.get_volume".into(),
                detail: "no percentage in mixer output".into(),
            })
        }
        #[cfg(target_os = "macos")]
        {
            let out = run(
                "audio.get_volume",
                "osascript",
                &["-e", "output volume of (get volume settings)"],
            )
            .await?;
            out.trim().parse().map_err(|_| OsError::CommandFailed {
                operation: "audio.get_volume".into(),
                detail: format!("unparsable volume: {}", out.trim()),
            })
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(
                HostCapability::Audio,
                "audio.get_volume",
            ))
        }
    }

    async fn mute(&self) -> OsResult<()> {
        self.require(HostCapability::Audio, "audio.mute")?;
        #[cfg(target_os = "linux")]
        {
            run("audio.mute", "amixer", &["set", "Master", "mute"])
                .await
                .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "audio.mute",
                "osascript",
                &["-e", "set volume output muted true"],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(HostCapability::Audio, "audio.mute"))
        }
    }

    async fn unmute(&self) -> OsResult<()> {
        self.require(HostCapability::Audio, "audio.unmute")?;
        #[cfg(target_os = "linux")]
        {
            run("audio.unmute", "amixer", &["set", "Master", "unmute"])
                .await
                .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "audio.unmute",
                "osascript",
                &["-e", "set volume output muted false"],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(HostCapability::Audio, "audio.unmute"))
        }
    }

    async fn media_play_pause(&self) -> OsResult<()> {
        self.require(HostCapability::Audio, "audio.media_play_pause")?;
        #[cfg(target_os = "linux")]
        {
            run("audio.media_play_pause", "playerctl", &["play-pause"])
                .await
                .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "audio.media_play_pause",
                "osascript",
                &["-e", "tell application \"Music\" to playpause"],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(
                HostCapability::Audio,
                "audio.media_play_pause",
            ))
        }
    }

    async fn media_next(&self) -> OsResult<()> {
        self.require(HostCapability::Audio, "audio.media_next")?;
        #[cfg(target_os = "linux")]
        {
            run("audio.media_next", "playerctl", &["next"]).await.map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "audio.media_next",
                "osascript",
                &["-e", "tell application \"Music\" to next track"],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(
                HostCapability::Audio,
                "audio.media_next",
            ))
        }
    }

    async fn media_previous(&self) -> OsResult<()> {
        self.require(HostCapability::Audio, "audio.media_previous")?;
        #[cfg(target_os = "linux")]
        {
            run("audio.media_previous", "playerctl", &["previous"])
                .await
                .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "audio.media_previous",
                "osascript",
                &["-e", "tell application \"Music\" to previous track"],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(
                HostCapability::Audio,
                "audio.media_previous",
            ))
        }
    }

    async fn set_brightness(&self, level: u8) -> OsResult<()> {
        self.require(HostCapability::Display, "display.set_brightness")?;
        let level = level.min(100);
        #[cfg(target_os = "linux")]
        {
            run(
                "display.set_brightness",
                "brightnessctl",
                &["set", &format!("{level}%")],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = level;
            Err(OsError::unsupported(
                HostCapability::Display,
                "display.set_brightness",
            ))
        }
    }

    async fn get_brightness(&self) -> OsResult<u8> {
        self.require(HostCapability::Display, "display.get_brightness")?;
        #[cfg(target_os = "linux")]
        {
            let out = run(
                "display.get_brightness",
                "brightnessctl",
                &["--machine-readable", "info"],
            )
            .await?;
            parse_percent(&out).ok_or_else(|| OsError::CommandFailed {
                operation: "display.get_brightness".into(),
                detail: "no percentage in backlight output".into(),
            })
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(OsError::unsupported(
                HostCapability::Display,
                "display.get_brightness",
            ))
        }
    }

    async fn lock(&self) -> OsResult<()> {
        self.require(HostCapability::Power, "power.lock")?;
        #[cfg(target_os = "linux")]
        {
            run("power.lock", "loginctl", &["lock-session"])
                .await
                .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "power.lock",
                "osascript",
                &["-e", "tell application \"System Events\" to keystroke \"q\" using {command down, control down}"],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(HostCapability::Power, "power.lock"))
        }
    }

    async fn sleep(&self) -> OsResult<()> {
        self.require(HostCapability::Power, "power.sleep")?;
        #[cfg(target_os = "linux")]
        {
            run("power.sleep", "systemctl", &["suspend"]).await.map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run("power.sleep", "pmset", &["sleepnow"]).await.map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(HostCapability::Power, "power.sleep"))
        }
    }

    async fn shutdown(&self) -> OsResult<()> {
        self.require(HostCapability::Power, "power.shutdown")?;
        #[cfg(target_os = "linux")]
        {
            run("power.shutdown", "systemctl", &["poweroff"])
                .await
                .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "power.shutdown",
                "osascript",
                &["-e", "tell application \"System Events\" to shut down"],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(
                HostCapability::Power,
                "power.shutdown",
            ))
        }
    }

    async fn restart(&self) -> OsResult<()> {
        self.require(HostCapability::Power, "power.restart")?;
        #[cfg(target_os = "linux")]
        {
            run("power.restart", "systemctl", &["reboot"]).await.map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "power.restart",
                "osascript",
                &["-e", "tell application \"System Events\" to restart"],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(HostCapability::Power, "power.restart"))
        }
    }

    async fn open_app(&self, name: &str) -> OsResult<()> {
        self.require(HostCapability::Apps, "apps.open")?;
        #[cfg(target_os = "linux")]
        {
            // xdg-open handles URLs; bare app names launch directly.
            if name.contains("://") || name.contains('.') {
                run("apps.open", "xdg-open", &[name]).await.map(|_| ())
            } else {
                match run("apps.open", "gtk-launch", &[name]).await {
                    Ok(_) => Ok(()),
                    Err(_) => run("apps.open", name, &[]).await.map(|_| ()),
                }
            }
        }
        #[cfg(target_os = "macos")]
        {
            run("apps.open", "open", &["-a", name]).await.map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let _ = name;
            Err(OsError::unsupported(HostCapability::Apps, "apps.open"))
        }
    }

    async fn close_app(&self, name: &str) -> OsResult<()> {
        self.require(HostCapability::Apps, "apps.close")?;
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            run("apps.close", "pkill", &["-f", name]).await.map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let _ = name;
            Err(OsError::unsupported(HostCapability::Apps, "apps.close"))
        }
    }

    async fn focus_app(&self, name: &str) -> OsResult<()> {
        self.require(HostCapability::Apps, "apps.focus")?;
        #[cfg(target_os = "linux")]
        {
            run("apps.focus", "xdotool", &["search", "--name", name, "windowactivate"])
                .await
                .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "apps.focus",
                "osascript",
                &["-e", &format!("tell application \"{name}\" to activate")],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let _ = name;
            Err(OsError::unsupported(HostCapability::Apps, "apps.focus"))
        }
    }

    async fn open_file_explorer(&self) -> OsResult<()> {
        self.require(HostCapability::Apps, "apps.file_explorer")?;
        let root = self.files_root.to_string_lossy().into_owned();
        #[cfg(target_os = "linux")]
        {
            run("apps.file_explorer", "xdg-open", &[root.as_str()])
                .await
                .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run("apps.file_explorer", "open", &[root.as_str()])
                .await
                .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let _ = root;
            Err(OsError::unsupported(
                HostCapability::Apps,
                "apps.file_explorer",
            ))
        }
    }

    async fn type_text(&self, text: &str) -> OsResult<()> {
        self.require(HostCapability::Input, "input.type")?;
        #[cfg(target_os = "linux")]
        {
            run("input.type", "xdotool", &["type", "--delay", "30", text])
                .await
                .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "input.type",
                "osascript",
                &["-e", &format!("tell application \"System Events\" to keystroke \"{text}\"")],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let _ = text;
            Err(OsError::unsupported(HostCapability::Input, "input.type"))
        }
    }

    async fn press_key(&self, key: &str) -> OsResult<()> {
        self.require(HostCapability::Input, "input.key")?;
        #[cfg(target_os = "linux")]
        {
            run("input.key", "xdotool", &["key", key]).await.map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "input.key",
                "osascript",
                &["-e", &format!("tell application \"System Events\" to key code {key}")],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let _ = key;
            Err(OsError::unsupported(HostCapability::Input, "input.key"))
        }
    }

    async fn click(&self, position: Option<(i32, i32)>) -> OsResult<()> {
        self.require(HostCapability::Input, "input.click")?;
        #[cfg(target_os = "linux")]
        {
            if let Some((x, y)) = position {
                run(
                    "input.click",
                    "xdotool",
                    &["mousemove", &x.to_string(), &y.to_string(), "click", "1"],
                )
                .await
                .map(|_| ())
            } else {
                run("input.click", "xdotool", &["click", "1"]).await.map(|_| ())
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = position;
            Err(OsError::unsupported(HostCapability::Input, "input.click"))
        }
    }

    async fn clipboard_read(&self) -> OsResult<String> {
        self.require(HostCapability::Clipboard, "clipboard.read")?;
        #[cfg(target_os = "linux")]
        {
            run("clipboard.read", "xclip", &["-selection", "clipboard", "-o"]).await
        }
        #[cfg(target_os = "macos")]
        {
            run("clipboard.read", "pbpaste", &[]).await
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(
                HostCapability::Clipboard,
                "clipboard.read",
            ))
        }
    }

    async fn clipboard_write(&self, text: &str) -> OsResult<()> {
        self.require(HostCapability::Clipboard, "clipboard.write")?;
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            use tokio::io::AsyncWriteExt;
            let program = if cfg!(target_os = "macos") { "pbcopy" } else { "xclip" };
            let mut cmd = Command::new(program);
            if cfg!(target_os = "linux") {
                cmd.args(["-selection", "clipboard"]);
            }
            let mut child = cmd
                .stdin(std::process::Stdio::piped())
                .spawn()
                .map_err(|err| OsError::CommandFailed {
                    operation: "clipboard.write".into(),
                    detail: err.to_string(),
                })?;
            if let Some(stdin) = child.stdin.as_mut() {
                stdin
                    .write_all(text.as_bytes())
                    .await
                    .map_err(|err| io_err("clipboard.write", &err))?;
            }
            drop(child.stdin.take());
            let status = child.wait().await.map_err(|err| io_err("clipboard.write", &err))?;
            if status.success() {
                Ok(())
            } else {
                Err(OsError::CommandFailed {
                    operation: "clipboard.write".into(),
                    detail: format!("exit status {status}"),
                })
            }
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let _ = text;
            Err(OsError::unsupported(
                HostCapability::Clipboard,
                "clipboard.write",
            ))
        }
    }

    async fn create_dir(&self, path: &Path) -> OsResult<PathBuf> {
        let resolved = self.resolve(path)?;
        fs::create_dir_all(&resolved)
            .await
            .map_err(|err| io_err("files.create", &err))?;
        Ok(resolved)
    }

    async fn read_file(&self, path: &Path) -> OsResult<String> {
        let resolved = self.resolve(path)?;
        fs::read_to_string(&resolved)
            .await
            .map_err(|err| io_err("files.read", &err))
    }

    async fn write_file(&self, path: &Path, contents: &str) -> OsResult<PathBuf> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| io_err("files.write", &err))?;
        }
        fs::write(&resolved, contents.as_bytes())
            .await
            .map_err(|err| io_err("files.write", &err))?;
        Ok(resolved)
    }

    async fn move_path(&self, from: &Path, to: &Path) -> OsResult<()> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        fs::rename(&from, &to)
            .await
            .map_err(|err| io_err("files.move", &err))
    }

    async fn delete_path(&self, path: &Path) -> OsResult<()> {
        let resolved = self.resolve(path)?;
        if resolved.is_dir() {
            fs::remove_dir_all(&resolved)
                .await
                .map_err(|err| io_err("files.delete", &err))
        } else {
            fs::remove_file(&resolved)
                .await
                .map_err(|err| io_err("files.delete", &err))
        }
    }

    async fn append_note(&self, content: &str) -> OsResult<PathBuf> {
        use tokio::io::AsyncWriteExt;
        self.require(HostCapability::Files, "files.append_note")?;
        let path = self.files_root.join("aura_notes.txt");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| io_err("files.append_note", &err))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| io_err("files.append_note", &err))?;
        let line = format!("[{}] {content}\n", Local::now().format("%Y-%m-%d %H:%M"));
        file.write_all(line.as_bytes())
            .await
            .map_err(|err| io_err("files.append_note", &err))?;
        Ok(path)
    }

    async fn empty_trash(&self) -> OsResult<()> {
        self.require(HostCapability::Files, "files.empty_trash")?;
        #[cfg(target_os = "linux")]
        {
            run("files.empty_trash", "gio", &["trash", "--empty"])
                .await
                .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            run(
                "files.empty_trash",
                "osascript",
                &["-e", "tell application \"Finder\" to empty trash"],
            )
            .await
            .map(|_| ())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(OsError::unsupported(
                HostCapability::Files,
                "files.empty_trash",
            ))
        }
    }

    async fn screenshot(&self) -> OsResult<PathBuf> {
        self.require(HostCapability::Desktop, "desktop.screenshot")?;
        let dest = self
            .shots_dir
            .join(format!("shot-{}.png", Utc::now().format("%Y%m%d-%H%M%S")));
        fs::create_dir_all(&self.shots_dir)
            .await
            .map_err(|err| io_err("desktop.screenshot", &err))?;
        capture_screen(&dest).await?;
        Ok(dest)
    }

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn install_package(&self, package: &str) -> OsResult<()> {
        self.require(HostCapability::Packages, "packages.install")?;
        run(
            "packages.install",
            "pip3",
            &["install", "--user", "--quiet", package],
        )
        .await
        .map(|_| ())
    }

    async fn run_command(&self, command: &str) -> OsResult<String> {
        self.require(HostCapability::Shell, "shell.run")?;
        #[cfg(unix)]
        {
            run("shell.run", "sh", &["-lc", command]).await
        }
        #[cfg(not(unix))]
        {
            let _ = command;
            Err(OsError::unsupported(HostCapability::Shell, "shell.run"))
        }
    }
}

#[cfg(target_os = "linux")]
async fn capture_screen(dest: &Path) -> OsResult<()> {
    let dest = dest.to_string_lossy().into_owned();
    run("desktop.screenshot", "scrot", &[dest.as_str()])
        .await
        .map(|_| ())
}

#[cfg(target_os = "macos")]
async fn capture_screen(dest: &Path) -> OsResult<()> {
    let dest = dest.to_string_lossy().into_owned();
    run("desktop.screenshot", "screencapture", &["-x", dest.as_str()])
        .await
        .map(|_| ())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
async fn capture_screen(_dest: &Path) -> OsResult<()> {
    Err(OsError::unsupported(
        HostCapability::Desktop,
        "desktop.screenshot",
    ))
}

/// Pulls the integer immediately preceding the first `%` sign, which is how
/// both `amixer` (`[60%]`) and `brightnessctl -m` (`...,60%,...`) report.
#[cfg(target_os = "linux")]
fn parse_percent(output: &str) -> Option<u8> {
    let end = output.find('%')?;
    let digits: Vec<char> = output[..end]
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect();
    let digits: String = digits.into_iter().rev().collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolve_rejects_traversal() {
        let dir = tempdir().unwrap();
        let boundary = NativeBoundary::probe(dir.path(), dir.path().join("shots"));
        let err = boundary.resolve(Path::new("../outside.txt")).unwrap_err();
        assert!(matches!(err, OsError::InvalidPath(_)));
    }

    #[test]
    fn resolve_joins_relative_paths() {
        let dir = tempdir().unwrap();
        let boundary = NativeBoundary::probe(dir.path(), dir.path().join("shots"));
        let resolved = boundary.resolve(Path::new("Desktop/notes")).unwrap();
        assert!(resolved.starts_with(dir.path()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn percent_parsing_handles_mixer_and_backlight_formats() {
        assert_eq!(
            parse_percent("Front Left: Playback 39319 [60%] [on]"),
            Some(60)
        );
        assert_eq!(
            parse_percent("intel_backlight,backlight,937,50%,1500"),
            Some(50)
        );
        assert_eq!(parse_percent("no percentage here"), None);
    }

    #[tokio::test]
    async fn file_ops_round_trip() {
        let dir = tempdir().unwrap();
        let boundary = NativeBoundary::probe(dir.path(), dir.path().join("shots"));
        boundary
            .write_file(Path::new("notes/hello.txt"), "Hi")
            .await
            .unwrap();
        let read = boundary.read_file(Path::new("notes/hello.txt")).await.unwrap();
        assert_eq!(read, "Hi");
        boundary.delete_path(Path::new("notes")).await.unwrap();
    }

    #[tokio::test]
    async fn notes_accumulate_in_one_file() {
        let dir = tempdir().unwrap();
        let boundary = NativeBoundary::probe(dir.path(), dir.path().join("shots"));
        let path = boundary.append_note("buy milk").await.unwrap();
        boundary.append_note("call back").await.unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("buy milk"));
        assert!(contents.contains("call back"));
        assert_eq!(contents.lines().count(), 2);
    }
}
