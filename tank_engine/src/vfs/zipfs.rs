use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

use log::debug;
use zip::ZipArchive;

use super::{normalize, Blob, JudgeFs};
use crate::error::{Error, Result};

/// Read-only store backed by a `.zip` problem package.
#[derive(Debug)]
pub struct ZipFs {
    blobs: HashMap<String, Blob>,
}

impl ZipFs {
    pub fn open_archive(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let store = Self::from_reader(BufReader::new(File::open(path)?))?;
        debug!("loaded {} entries from {}", store.blobs.len(), path.display());
        Ok(store)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut blobs = HashMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = normalize(file.name());
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            blobs.insert(name, data.into());
        }
        Ok(Self { blobs })
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl JudgeFs for ZipFs {
    fn open(&self, path: &str) -> Result<Blob> {
        self.blobs
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }
}
