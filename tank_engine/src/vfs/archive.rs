use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use flate2::read::GzDecoder;
use log::debug;
use tar::Archive;

use super::{normalize, Blob, JudgeFs};
use crate::error::{Error, Result};

/// Read-only store backed by a `.tar` or `.tar.gz` problem archive.
///
/// Regular files are loaded once when the archive is opened; directories
/// and links are skipped.
pub struct TarFs {
    blobs: HashMap<String, Blob>,
}

impl TarFs {
    pub fn open_archive(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path)?);
        let name = path.to_string_lossy();
        let store = if name.ends_with(".gz") || name.ends_with(".tgz") {
            Self::from_reader(GzDecoder::new(file))?
        } else {
            Self::from_reader(file)?
        };
        debug!("loaded {} entries from {}", store.blobs.len(), path.display());
        Ok(store)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut archive = Archive::new(reader);
        let mut blobs = HashMap::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = normalize(&entry.path()?.to_string_lossy());
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
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

impl JudgeFs for TarFs {
    fn open(&self, path: &str) -> Result<Blob> {
        self.blobs
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn reads_entries() -> Result<()> {
        let data = build_archive(&[
            ("Input/input0.txt", "1 2\n"),
            ("Output/output0.txt", "3\n"),
        ]);
        let store = TarFs::from_reader(&data[..])?;
        assert_eq!(store.len(), 2);
        assert_eq!(&*store.open("Input/input0.txt")?, b"1 2\n");
        assert_eq!(&*store.open("Output/output0.txt")?, b"3\n");
        assert!(matches!(store.open("Tester/tester0.cpp"), Err(Error::NotFound(_))));
        Ok(())
    }

    #[test]
    fn opens_gzipped_archive_from_disk() -> Result<()> {
        let data = build_archive(&[("Tester/tester0.cpp", "#include \"foo.h\"\n")]);
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("1000.tar.gz");
        let mut encoder = GzEncoder::new(File::create(&path)?, Compression::default());
        encoder.write_all(&data)?;
        encoder.finish()?;

        let store = TarFs::open_archive(&path)?;
        assert_eq!(&*store.open("Tester/tester0.cpp")?, b"#include \"foo.h\"\n");
        Ok(())
    }
}
