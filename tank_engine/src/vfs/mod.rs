//! Named byte blobs the compiler and testcases read from.
//!
//! A filesystem is shared as `Arc<dyn JudgeFs>`: cloning the `Arc` acquires
//! it, dropping releases it.

mod archive;
mod dir;
mod ram;
mod zipfs;

use std::{fs, path::Path, sync::Arc};

use log::debug;

use crate::error::{Error, Result};

pub use self::{archive::TarFs, dir::DirFs, ram::RamFs, zipfs::ZipFs};

pub type Blob = Arc<[u8]>;

pub trait JudgeFs: Send + Sync {
    fn open(&self, path: &str) -> Result<Blob>;
}

/// Reads `path` from `store`, reporting any failure as `ExtractionFailed`.
pub fn load(store: &dyn JudgeFs, path: &str) -> Result<Blob> {
    store.open(path).map_err(|e| Error::extraction(path, e))
}

/// Copies `path` of `store` to `dest` on disk.
pub fn extract(store: &dyn JudgeFs, path: &str, dest: &Path) -> Result<()> {
    let blob = load(store, path)?;
    fs::write(dest, &blob).map_err(|e| Error::extraction(path, e.into()))?;
    debug!("extracted `{}` to {} ({} bytes)", path, dest.display(), blob.len());
    Ok(())
}

/// Normalizes an entry name: forward slashes, no leading `./` or `/`.
pub(crate) fn normalize(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}
