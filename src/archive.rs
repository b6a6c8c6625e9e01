use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::ops::Bound;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::domain::{ObservationId, UserRef};
use crate::error::BackupError;

/// Append-only zip of observations, one virtual directory per observation.
///
/// Entry names already in the file are indexed on open so membership checks
/// never rescan the central directory. The writer finalizes the archive when
/// dropped, so entries written before an early return are kept.
pub struct ObservationArchive {
    path: Utf8PathBuf,
    writer: ZipWriter<File>,
    names: BTreeSet<String>,
}

impl ObservationArchive {
    pub fn open(path: &Utf8Path) -> Result<Self, BackupError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_std_path())
            .map_err(|err| BackupError::Filesystem(format!("open archive {path}: {err}")))?;
        let len = file
            .metadata()
            .map_err(|err| BackupError::Filesystem(err.to_string()))?
            .len();

        let (writer, names) = if len == 0 {
            (ZipWriter::new(file), BTreeSet::new())
        } else {
            let names = {
                let archive = ZipArchive::new(&file)
                    .map_err(|err| BackupError::Archive(format!("read {path}: {err}")))?;
                archive
                    .file_names()
                    .map(|name| name.to_string())
                    .collect::<BTreeSet<_>>()
            };
            let writer = ZipWriter::new_append(file)
                .map_err(|err| BackupError::Archive(format!("append to {path}: {err}")))?;
            (writer, names)
        };

        debug!(archive = %path, entries = names.len(), "opened archive");
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            names,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// True iff some entry name starts with `"<id>/"`.
    pub fn is_archived(&self, id: ObservationId) -> bool {
        let prefix = id.entry_prefix();
        self.names
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .next()
            .is_some_and(|name| name.starts_with(&prefix))
    }

    /// Stores `bytes` uncompressed under `name`.
    pub fn write_entry(&mut self, name: &str, bytes: &[u8]) -> Result<(), BackupError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        self.writer
            .start_file(name, options)
            .map_err(|err| BackupError::Archive(format!("start entry {name}: {err}")))?;
        self.writer
            .write_all(bytes)
            .map_err(|err| BackupError::Archive(format!("write entry {name}: {err}")))?;
        self.names.insert(name.to_string());
        Ok(())
    }

    pub fn write_json<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
    ) -> Result<(), BackupError> {
        let bytes = to_pretty_json(value)?;
        self.write_entry(name, &bytes)
    }

    /// Writes the central directory and closes the file.
    pub fn finish(self) -> Result<(), BackupError> {
        let path = self.path;
        self.writer
            .finish()
            .map_err(|err| BackupError::Archive(format!("finalize {path}: {err}")))?;
        Ok(())
    }
}

pub fn observation_entry_name(id: ObservationId) -> String {
    format!("{id}/{id}.json")
}

pub fn image_entry_name(id: ObservationId, filename: &str) -> String {
    format!("{id}/{filename}")
}

pub fn snapshot_entry_name(user: &UserRef) -> String {
    format!("{user}.json")
}

/// Four-space indented JSON. Object keys come out sorted because
/// `serde_json::Map` is ordered by key.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, BackupError> {
    let mut bytes = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|err| BackupError::Archive(err.to_string()))?;
    Ok(bytes)
}
