//! Global input and output resource directories.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use reelflow_types::{ReelflowError, Result};

use crate::workspace::{reset_dir, unique_destination};

/// The input directory that literal inputs and `@resources` read from, and
/// the output directory archived files land in.
#[derive(Debug)]
pub struct Resources {
    input_dir: PathBuf,
    output_dir: PathBuf,
    archived: Mutex<Vec<PathBuf>>,
}

impl Resources {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            archived: Mutex::new(Vec::new()),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Regular files in the input directory, sorted by name.
    pub async fn list_inputs(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.input_dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReelflowError::FileNotFound {
                    path: self.input_dir.clone(),
                }
            } else {
                e.into()
            }
        })?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Path of a literal input file. The file must exist.
    pub fn resolve_literal(&self, name: &str) -> Result<PathBuf> {
        let path = self.input_dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ReelflowError::FileNotFound { path })
        }
    }

    /// Copy `files` into the output directory and return the new paths.
    pub async fn archive(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let mut copied = Vec::with_capacity(files.len());
        for file in files {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| ReelflowError::FileNotFound { path: file.clone() })?;
            let dest = unique_destination(&self.output_dir, name);
            tokio::fs::copy(file, &dest).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ReelflowError::FileNotFound { path: file.clone() }
                } else {
                    e.into()
                }
            })?;
            tracing::debug!(from = %file.display(), to = %dest.display(), "Archived file");
            copied.push(dest);
        }
        self.archived.lock().extend(copied.iter().cloned());
        Ok(copied)
    }

    /// Every file archived so far.
    pub fn archived(&self) -> Vec<PathBuf> {
        self.archived.lock().clone()
    }

    /// Remove everything in the output directory.
    pub async fn clear_output(&self) -> Result<()> {
        reset_dir(&self.output_dir).await?;
        self.archived.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(dir: &TempDir, inputs: &[&str]) -> Resources {
        let input = dir.path().join("input");
        std::fs::create_dir_all(input.join("nested")).unwrap();
        for name in inputs {
            std::fs::write(input.join(name), b"x").unwrap();
        }
        Resources::new(input, dir.path().join("output"))
    }

    #[tokio::test]
    async fn list_inputs_is_sorted_and_skips_dirs() {
        let dir = TempDir::new().unwrap();
        let res = setup(&dir, &["b.mp4", "a.mp3"]);
        let files = res.list_inputs().await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.mp3", "b.mp4"]);
    }

    #[tokio::test]
    async fn list_inputs_of_missing_dir() {
        let dir = TempDir::new().unwrap();
        let res = Resources::new(dir.path().join("nope"), dir.path().join("out"));
        assert!(matches!(
            res.list_inputs().await,
            Err(ReelflowError::FileNotFound { .. })
        ));
    }

    #[test]
    fn resolve_literal_requires_existing_file() {
        let dir = TempDir::new().unwrap();
        let res = setup(&dir, &["a.mp4"]);
        assert!(res.resolve_literal("a.mp4").is_ok());
        assert!(matches!(
            res.resolve_literal("missing.mp4"),
            Err(ReelflowError::FileNotFound { .. })
        ));
        assert!(res.resolve_literal("nested").is_err());
    }

    #[tokio::test]
    async fn archive_copies_and_records() {
        let dir = TempDir::new().unwrap();
        let res = setup(&dir, &["a.mp4"]);
        let src = res.input_dir().join("a.mp4");

        let first = res.archive(&[src.clone()]).await.unwrap();
        let second = res.archive(&[src]).await.unwrap();

        assert_eq!(first, vec![res.output_dir().join("a.mp4")]);
        assert_eq!(second, vec![res.output_dir().join("a-1.mp4")]);
        assert_eq!(res.archived().len(), 2);

        res.clear_output().await.unwrap();
        assert!(res.archived().is_empty());
        assert!(!res.output_dir().join("a.mp4").exists());
    }
}
