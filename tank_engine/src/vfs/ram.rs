use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use super::{normalize, Blob, JudgeFs};
use crate::error::{Error, Result};

/// In-memory blob store.
#[derive(Default)]
pub struct RamFs {
    blobs: RwLock<HashMap<String, Blob>>,
}

impl RamFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: &str, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        let blob: Blob = data.into();
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(path), blob);
    }

    pub fn remove(&self, path: &str) -> bool {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize(path))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JudgeFs for RamFs {
    fn open(&self, path: &str) -> Result<Blob> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }
}
