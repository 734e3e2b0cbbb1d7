//! Node storage configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Node storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory holding the sled database
    pub data_dir: PathBuf,
    /// Flush sled buffers every N milliseconds (None = sled default)
    #[serde(default)]
    pub flush_every_ms: Option<u64>,
}

impl NodeConfig {
    /// Path of the sled database inside the data directory
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("noticiero.sled")
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: directories::ProjectDirs::from("", "", "noticiero")
                .map(|d| d.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".noticiero")),
            flush_every_ms: Some(500),
        }
    }
}
