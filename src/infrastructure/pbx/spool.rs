//! File-spool dispatch mechanism
//!
//! A call-control file is written to a staging directory then atomically
//! renamed into the PBX's watched spool directory. `create-then-rename`
//! only guarantees atomicity when the staging and spool directories share
//! a filesystem, which is this module's one operational precondition.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::domain::shared::{EngineError, Result};

pub struct SpoolConfig {
    pub staging_dir: PathBuf,
    pub spool_dir: PathBuf,
}

pub struct CallFile {
    pub channel: String,
    pub caller_id: String,
    pub max_retries: i32,
    pub retry_time: i32,
    pub wait_time: i32,
    pub context: String,
    pub extension: String,
    pub priority: i32,
    pub set_vars: Vec<(String, String)>,
}

impl CallFile {
    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Channel: {}\n", self.channel));
        out.push_str(&format!("CallerID: {}\n", self.caller_id));
        out.push_str(&format!("MaxRetries: {}\n", self.max_retries));
        out.push_str(&format!("RetryTime: {}\n", self.retry_time));
        out.push_str(&format!("WaitTime: {}\n", self.wait_time));
        out.push_str(&format!("Context: {}\n", self.context));
        out.push_str(&format!("Extension: {}\n", self.extension));
        out.push_str(&format!("Priority: {}\n", self.priority));
        for (k, v) in &self.set_vars {
            out.push_str(&format!("Set: {k}={v}\n"));
        }
        out.push_str("Archive: yes\n");
        out
    }
}

pub struct SpoolWriter {
    config: SpoolConfig,
}

impl SpoolWriter {
    pub fn new(config: SpoolConfig) -> Self {
        Self { config }
    }

    /// Writes `call` to a uniquely named file in the staging directory,
    /// then renames it into the spool directory. The rename is the
    /// publish point: the PBX never observes a partially written file.
    pub async fn write(&self, call: &CallFile) -> Result<PathBuf> {
        let filename = format!("{}.call", Uuid::new_v4());
        let staging_path = self.config.staging_dir.join(&filename);
        let spool_path = self.config.spool_dir.join(&filename);

        write_atomically(&staging_path, &spool_path, call.render().as_bytes()).await?;

        Ok(spool_path)
    }
}

async fn write_atomically(staging_path: &Path, spool_path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(staging_path)
        .await
        .map_err(EngineError::Io)?;
    file.write_all(contents).await.map_err(EngineError::Io)?;
    file.flush().await.map_err(EngineError::Io)?;
    drop(file);

    tokio::fs::rename(staging_path, spool_path)
        .await
        .map_err(EngineError::Io)?;

    Ok(())
}
