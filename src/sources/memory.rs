//! In-memory file source

use crate::core::traits::{FileSource, SourceFile};
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

/// File source holding its files in memory
///
/// Files stay listed until acknowledged; acknowledged names are recorded in
/// order.
#[derive(Debug, Default)]
pub struct MemoryFileSource {
    files: Mutex<Vec<SourceFile>>,
    acknowledged: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryFileSource {
    pub fn with_files(files: impl IntoIterator<Item = SourceFile>) -> Self {
        Self {
            files: Mutex::new(files.into_iter().collect()),
            acknowledged: Mutex::default(),
        }
    }

    /// Names of acknowledged files, in acknowledgment order
    pub fn acknowledged(&self) -> Vec<String> {
        lock(&self.acknowledged).clone()
    }

    /// Files still waiting to be acknowledged
    pub fn remaining(&self) -> Vec<String> {
        lock(&self.files).iter().map(|f| f.name.clone()).collect()
    }
}

#[async_trait]
impl FileSource for MemoryFileSource {
    async fn poll(&self) -> Result<Vec<SourceFile>> {
        Ok(lock(&self.files).clone())
    }

    async fn acknowledge(&self, file: &SourceFile) -> Result<()> {
        let mut files = lock(&self.files);
        if let Some(index) = files.iter().position(|f| f.name == file.name) {
            files.remove(index);
        } else if lock(&self.acknowledged).contains(&file.name) {
            return Err(PipelineError::Io {
                message: format!("file '{}' already acknowledged", file.name),
            });
        }
        drop(files);

        lock(&self.acknowledged).push(file.name.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acknowledge_removes_file_from_listing() {
        let source = MemoryFileSource::with_files([
            SourceFile::new("a.csv", "x"),
            SourceFile::new("b.csv", "y"),
        ]);

        let first = source.poll().await.unwrap().remove(0);
        source.acknowledge(&first).await.unwrap();

        assert_eq!(source.remaining(), vec!["b.csv".to_string()]);
        assert_eq!(source.acknowledged(), vec!["a.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_acknowledge_twice_fails() {
        let source = MemoryFileSource::with_files([SourceFile::new("a.csv", "x")]);
        let file = SourceFile::new("a.csv", "x");

        source.acknowledge(&file).await.unwrap();

        assert!(source.acknowledge(&file).await.is_err());
    }
}
