use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "letterwise";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn db_path() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".local")
                .join("state")
                .join(APP_NAME)
                .join("sessions.db")
        } else if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
            proj_dirs.data_local_dir().join("sessions.db")
        } else {
            PathBuf::from("letterwise_sessions.db")
        }
    }

    pub fn config_path() -> PathBuf {
        ProjectDirs::from("", "", APP_NAME)
            .map(|pd| pd.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("letterwise_config.json"))
    }
}
