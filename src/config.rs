use crate::app_dirs::AppDirs;
use crate::policy::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_WORDS_PER_PHASE: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub words_per_phase: usize,
    /// Pause after each scored word before the next one is requested
    pub feedback_delay_ms: u64,
    /// Pause while phase 1 is being analyzed
    pub thinking_delay_ms: u64,
    pub word_retry: RetryPolicy,
    pub analysis_retry: RetryPolicy,
    pub save_retry: RetryPolicy,
    pub word_list: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            words_per_phase: DEFAULT_WORDS_PER_PHASE,
            feedback_delay_ms: 1500,
            thinking_delay_ms: 2000,
            word_retry: RetryPolicy::new(3, 200, 2),
            analysis_retry: RetryPolicy::new(2, 0, 1),
            save_retry: RetryPolicy::new(3, 500, 2),
            word_list: "children".to_string(),
        }
    }
}

impl SessionConfig {
    /// Defaults without any pauses
    pub fn immediate() -> Self {
        Self {
            feedback_delay_ms: 0,
            thinking_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn feedback_delay(&self) -> Duration {
        Duration::from_millis(self.feedback_delay_ms)
    }

    pub fn thinking_delay(&self) -> Duration {
        Duration::from_millis(self.thinking_delay_ms)
    }
}

pub trait ConfigStore {
    fn load(&self) -> SessionConfig;
    fn save(&self, cfg: &SessionConfig) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> SessionConfig {
        let Ok(bytes) = fs::read(&self.path) else {
            return SessionConfig::default();
        };
        match serde_json::from_slice::<SessionConfig>(&bytes) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!("ignoring unreadable config {}: {err}", self.path.display());
                SessionConfig::default()
            }
        }
    }

    fn save(&self, cfg: &SessionConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
