pub mod batch;
pub mod carpet;
pub mod path;
pub mod query;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use terrain::{BatchConfig, EngineHandle, SrtmTransport};

/// Settings shared by every command.
pub struct Options {
    pub data_dir: Option<PathBuf>,
    pub cache_size: u64,
    pub batch_window_ms: u64,
}

impl Options {
    pub fn transport(&self) -> Result<SrtmTransport> {
        let data_dir = self.data_dir.as_ref().context(
            "TERRAIN_DATA_DIR environment variable not set. Use --data-dir or set TERRAIN_DATA_DIR",
        )?;
        if !data_dir.is_dir() {
            anyhow::bail!("Data directory not found: {}", data_dir.display());
        }

        Ok(SrtmTransport::builder(data_dir)
            .cache_size(self.cache_size)
            .build())
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::default().window(Duration::from_millis(self.batch_window_ms))
    }

    /// Start a batching engine over the configured transport.
    pub fn engine(&self) -> Result<EngineHandle> {
        Ok(EngineHandle::spawn(self.transport()?, self.batch_config()))
    }
}
