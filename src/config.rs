// ABOUTME: Sync target configuration loaded from sync.json
// ABOUTME: Ordered local paths, destination folder id and upload MIME type

use crate::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MIME_TYPE: &str = "application/json";

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.into()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub local_file_paths: Vec<PathBuf>,
    #[serde(default)]
    pub dst_folder_id: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

impl SyncConfig {
    pub fn new(local_file_paths: Vec<PathBuf>, dst_folder_id: impl Into<String>) -> Self {
        SyncConfig {
            local_file_paths,
            dst_folder_id: dst_folder_id.into(),
            mime_type: default_mime_type(),
        }
    }

    /// Loads `sync.json`. A missing file yields an empty config so that CLI
    /// flags alone can describe the run; [`SyncConfig::validate`] catches gaps.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no sync config file");
            return Ok(SyncConfig::new(Vec::new(), ""));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", path.display(), e)))
    }

    pub fn with_overrides(
        mut self,
        files: Vec<PathBuf>,
        folder: Option<String>,
        mime_type: Option<String>,
    ) -> Self {
        if !files.is_empty() {
            self.local_file_paths = files;
        }
        if let Some(folder) = folder {
            self.dst_folder_id = folder;
        }
        if let Some(mime) = mime_type {
            self.mime_type = mime;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dst_folder_id.trim().is_empty() {
            return Err(Error::Config(
                "No destination folder id. Set dst_folder_id in sync.json or pass --folder".into(),
            ));
        }
        if self.mime_type.trim().is_empty() {
            return Err(Error::Config("MIME type must not be empty".into()));
        }
        Ok(())
    }
}
