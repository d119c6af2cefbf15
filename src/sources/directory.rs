//! Directory-backed file source
//!
//! Stands in for the remote drop directory: every regular file in the
//! directory is a batch, and acknowledging a file deletes it.

use crate::core::traits::{FileSource, SourceFile};
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

/// Polls a local directory for batch files
#[derive(Debug, Clone)]
pub struct DirectoryFileSource {
    dir: PathBuf,
}

impl DirectoryFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Names of candidate files, sorted so batches are processed in a stable order
    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            // Skip hidden and partially-uploaded files
            match entry.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => names.push(name),
                Ok(_) => {}
                Err(raw) => warn!("Ignoring file with non UTF-8 name: {:?}", raw),
            }
        }

        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl FileSource for DirectoryFileSource {
    async fn poll(&self) -> Result<Vec<SourceFile>> {
        let names = self.list().await?;
        let mut files = Vec::with_capacity(names.len());

        for name in names {
            match fs::read(self.dir.join(&name)).await {
                Ok(content) => files.push(SourceFile::new(name, content)),
                // Removed between listing and reading
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(file = %name, "File disappeared before it was read");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(files)
    }

    async fn acknowledge(&self, file: &SourceFile) -> Result<()> {
        fs::remove_file(self.dir.join(&file.name))
            .await
            .map_err(|e| PipelineError::Io {
                message: format!("failed to delete '{}': {}", file.name, e),
            })?;
        debug!(file = %file.name, "Deleted processed file");
        Ok(())
    }
}
