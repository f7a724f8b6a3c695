use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

use super::{Blob, JudgeFs};
use crate::error::{Error, Result};

/// Files under a root directory, addressed by relative path.
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::NotFound(root.to_string_lossy().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(Error::Argument(format!(
                "`{}` is not a path inside the filesystem",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl JudgeFs for DirFs {
    fn open(&self, path: &str) -> Result<Blob> {
        let full = self.resolve(path)?;
        match fs::read(&full) {
            Ok(data) => Ok(data.into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
