use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host capability tags a tool may require.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HostCapability {
    /// Mixer control (`audio.*`).
    Audio,
    /// Backlight control (`display.*`).
    Display,
    /// Session power management (`power.*`).
    Power,
    /// Application launch and teardown (`apps.*`).
    Apps,
    /// Synthetic keyboard and mouse (`input.*`).
    Input,
    /// System clipboard (`clipboard.*`).
    Clipboard,
    /// Filesystem operations (`files.*`).
    Files,
    /// Screen capture (`desktop.*`).
    Desktop,
    /// Wall clock (`time.*`).
    Clock,
    /// Package installation used by dependency repair.
    Packages,
    /// Shell command execution (`shell.*`).
    Shell,
}

impl HostCapability {
    /// Returns a short stable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Audio => "os.audio",
            Self::Display => "os.display",
            Self::Power => "os.power",
            Self::Apps => "os.apps",
            Self::Input => "os.input",
            Self::Clipboard => "os.clipboard",
            Self::Files => "os.files",
            Self::Desktop => "os.desktop",
            Self::Clock => "os.clock",
            Self::Packages => "os.packages",
            Self::Shell => "os.shell",
        }
    }
}

/// Errors surfaced by boundary operations.
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OsError {
    /// The host lacks the capability backing this operation.
    #[error("{operation} is unsupported on this host ({capability:?})")]
    Unsupported {
        /// Capability that is missing.
        capability: HostCapability,
        /// Operation that was requested.
        operation: String,
    },
    /// The backing platform utility failed.
    #[error("{operation} failed: {detail}")]
    CommandFailed {
        /// Operation that was requested.
        operation: String,
        /// Stderr or exit detail.
        detail: String,
    },
    /// Filesystem error.
    #[error("io error during {operation}: {detail}")]
    Io {
        /// Operation that was requested.
        operation: String,
        /// Underlying error text.
        detail: String,
    },
    /// A path escaped the permitted root.
    #[error("path rejected: {0}")]
    InvalidPath(String),
}

impl OsError {
    /// Convenience constructor for unsupported operations.
    #[must_use]
    pub fn unsupported(capability: HostCapability, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            capability,
            operation: operation.into(),
        }
    }
}

/// Outcome alias for boundary calls.
pub type OsResult<T> = Result<T, OsError>;

/// The single OS boundary.
///
/// A flat set of named operations grouped by capability. Implementations own
/// every platform API call in the process; callers hold a `dyn` reference so
/// tests can substitute [`crate::loopback::LoopbackBoundary`].
#[async_trait]
pub trait OsBoundary: Send + Sync {
    /// Capabilities actually available on this host.
    fn capabilities(&self) -> IndexSet<HostCapability>;

    /// Sets master volume to an absolute percentage.
    async fn set_volume(&self, level: u8) -> OsResult<()>;
    /// Reads the current master volume percentage.
    async fn get_volume(&self) -> OsResult<u8>;
    /// Mutes the master channel.
    async fn mute(&self) -> OsResult<()>;
    /// Unmutes the master channel.
    async fn unmute(&self) -> OsResult<()>;

    /// Toggles media playback on the active player.
    async fn media_play_pause(&self) -> OsResult<()>;
    /// Skips to the next track.
    async fn media_next(&self) -> OsResult<()>;
    /// Returns to the previous track.
    async fn media_previous(&self) -> OsResult<()>;

    /// Sets backlight brightness to an absolute percentage.
    async fn set_brightness(&self, level: u8) -> OsResult<()>;
    /// Reads the current backlight percentage.
    async fn get_brightness(&self) -> OsResult<u8>;

    /// Locks the active session.
    async fn lock(&self) -> OsResult<()>;
    /// Suspends the machine.
    async fn sleep(&self) -> OsResult<()>;
    /// Powers the machine off.
    async fn shutdown(&self) -> OsResult<()>;
    /// Reboots the machine.
    async fn restart(&self) -> OsResult<()>;

    /// Launches an application or opens a URL with the default handler.
    async fn open_app(&self, name: &str) -> OsResult<()>;
    /// Terminates an application by name.
    async fn close_app(&self, name: &str) -> OsResult<()>;
    /// Raises an application window.
    async fn focus_app(&self, name: &str) -> OsResult<()>;
    /// Opens the platform file manager at the files root.
    async fn open_file_explorer(&self) -> OsResult<()>;

    /// Types literal text into the focused window.
    async fn type_text(&self, text: &str) -> OsResult<()>;
    /// Presses a named key or chord.
    async fn press_key(&self, key: &str) -> OsResult<()>;
    /// Clicks at the given coordinates, or at the pointer when absent.
    async fn click(&self, position: Option<(i32, i32)>) -> OsResult<()>;

    /// Reads the clipboard as text.
    async fn clipboard_read(&self) -> OsResult<String>;
    /// Replaces the clipboard with text.
    async fn clipboard_write(&self, text: &str) -> OsResult<()>;

    /// Creates a directory (and parents).
    async fn create_dir(&self, path: &Path) -> OsResult<PathBuf>;
    /// Reads a file as UTF-8.
    async fn read_file(&self, path: &Path) -> OsResult<String>;
    /// Writes a file, creating parents.
    async fn write_file(&self, path: &Path, contents: &str) -> OsResult<PathBuf>;
    /// Moves or renames a path.
    async fn move_path(&self, from: &Path, to: &Path) -> OsResult<()>;
    /// Deletes a file or directory tree.
    async fn delete_path(&self, path: &Path) -> OsResult<()>;
    /// Appends a timestamped note to the notes file and returns its path.
    async fn append_note(&self, content: &str) -> OsResult<PathBuf>;
    /// Empties the platform trash.
    async fn empty_trash(&self) -> OsResult<()>;

    /// Captures the screen to a file and returns its path.
    async fn screenshot(&self) -> OsResult<PathBuf>;

    /// Current local wall-clock time.
    fn now(&self) -> DateTime<Local>;

    /// Installs a package through the host package channel.
    async fn install_package(&self, package: &str) -> OsResult<()>;

    /// Runs one shell command and returns its stdout.
    async fn run_command(&self, command: &str) -> OsResult<String>;
}
