//! Uploads written to disk chunk by chunk before a job exists.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use dance_models::JobId;

use crate::error::WorkerResult;

/// An input file being received for a job that has not been created yet.
///
/// Hand it to [`crate::JobExecutor::submit_staged`] once the body is complete,
/// or call [`StagedUpload::discard`] to drop the partial file. A staged file
/// that is neither submitted nor discarded is left for the retention sweeper,
/// since its owner never becomes a live job.
#[derive(Debug)]
pub struct StagedUpload {
    pub(crate) job_id: JobId,
    pub(crate) filename: String,
    pub(crate) path: PathBuf,
    file: Option<File>,
    size: u64,
}

impl StagedUpload {
    pub(crate) async fn create(job_id: JobId, filename: &str, path: PathBuf) -> WorkerResult<Self> {
        let file = File::create(&path).await?;
        Ok(Self {
            job_id,
            filename: filename.to_string(),
            path,
            file: Some(file),
            size: 0,
        })
    }

    /// Append a chunk of the upload body.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> WorkerResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk).await?;
            self.size += chunk.len() as u64;
        }
        Ok(())
    }

    /// Bytes received so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the file.
    pub(crate) async fn finish(&mut self) -> WorkerResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        Ok(())
    }

    /// Remove the partial file.
    pub async fn discard(mut self) {
        drop(self.file.take());
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "Failed to remove staged upload: {}", e);
            }
        }
    }
}
