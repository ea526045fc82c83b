use std::path::PathBuf;

use crate::config::Curriculum;
use crate::db::ScoreStore;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<ScoreStore>,
    pub curriculum: Curriculum,
    /// `--curriculum` file; takes precedence over the workspace's own.
    pub curriculum_override: Option<PathBuf>,
}

impl AppState {
    pub fn new(curriculum_override: Option<PathBuf>) -> Self {
        Self {
            workspace: None,
            store: None,
            curriculum: Curriculum::default(),
            curriculum_override,
        }
    }
}
