use std::{env, fs, path::PathBuf};

use anyhow::Result;

/// Environment-derived configuration.
///
/// Every variable is optional; `LLM_API_KEY` is only needed by the layers
/// that call the model and its absence surfaces as a typed error there.
#[derive(Debug, Clone)]
pub struct AuraConfig {
    /// Display name used in responses.
    pub assistant_name: String,
    /// Name the assistant addresses the user by.
    pub user_name: String,
    /// Token consumed by the external wake-word detector.
    pub wake_word: String,
    /// Directory for the capability store, stats, and logs.
    pub data_dir: PathBuf,
}

impl AuraConfig {
    /// Reads the environment surface, applying defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let data_dir = env::var_os("AURA_DATA_DIR").map_or_else(
            || {
                dirs::data_local_dir()
                    .unwrap_or_else(env::temp_dir)
                    .join("aura")
            },
            PathBuf::from,
        );
        Self {
            assistant_name: env::var("ASSISTANT_NAME").unwrap_or_else(|_| "AURA".to_string()),
            user_name: env::var("USER_NAME").unwrap_or_else(|_| "Sir".to_string()),
            wake_word: env::var("WAKE_WORD").unwrap_or_else(|_| "aura".to_string()),
            data_dir,
        }
    }

    /// Configuration rooted at an explicit directory (tests use this).
    #[must_use]
    pub fn rooted_at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            assistant_name: "AURA".to_string(),
            user_name: "Sir".to_string(),
            wake_word: "aura".to_string(),
            data_dir: data_dir.into(),
        }
    }

    /// Promoted capability store file.
    #[must_use]
    pub fn capabilities_path(&self) -> PathBuf {
        self.data_dir.join("capabilities.json")
    }

    /// Persisted counters file.
    #[must_use]
    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join("stats.json")
    }

    /// Append-only per-utterance trace directory.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Screenshot destination directory.
    #[must_use]
    pub fn shots_dir(&self) -> PathBuf {
        self.data_dir.join("shots")
    }

    /// Creates the persisted-state layout.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }

    /// Root directory for boundary file operations.
    #[must_use]
    pub fn files_root(&self) -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| self.data_dir.clone())
    }
}
