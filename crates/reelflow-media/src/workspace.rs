//! Per-run workspace: one private directory tree per step.

use std::path::{Path, PathBuf};

use reelflow_types::Result;

/// The `input/` and `output/` folders owned by one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDirs {
    pub root: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Root of the temporary workspace tree.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove everything under the root and recreate it empty.
    pub async fn clear(&self) -> Result<()> {
        reset_dir(&self.root).await?;
        tracing::debug!(path = %self.root.display(), "Workspace cleared");
        Ok(())
    }

    /// Create `parent/step-<id>/{input,output}`, wiping any previous content.
    pub async fn create_step_dirs(&self, parent: &Path, id: u32) -> Result<StepDirs> {
        let root = parent.join(format!("step-{id}"));
        reset_dir(&root).await?;
        let dirs = StepDirs {
            input: root.join("input"),
            output: root.join("output"),
            root,
        };
        tokio::fs::create_dir_all(&dirs.input).await?;
        tokio::fs::create_dir_all(&dirs.output).await?;
        Ok(dirs)
    }
}

/// A path in `dir` for `file_name` that does not exist yet. Clashing names get
/// a `-<n>` suffix before the extension.
pub fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let name = Path::new(file_name);
    let stem = name.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
    let ext = name.extension().and_then(|e| e.to_str());
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem}-{n}.{ext}")),
            None => dir.join(format!("{stem}-{n}")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Remove `path` if present and recreate it empty.
pub(crate) async fn reset_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}
