//! Filesystem archive implementation
//!
//! This module provides the directory-tree implementation of `ArchiveStorage`.
//! JSON documents are written to a temporary sibling and renamed into place,
//! so a reader sees either the previous or the new version of a file.

use crate::state::{CompletionSet, ProgressData, SectionMetadata, Topic};
use crate::storage::layout::{
    completion_path, metadata_path, parse_metadata_path, progress_path, raw_page_path,
    structured_path, INDEX_FILE, METADATA_DIR, RAW_DIR, STRUCTURED_DIR,
};
use crate::storage::traits::{ArchiveStorage, StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Directory-tree archive rooted at one path
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Creates a handle on `root`; nothing is touched on disk until `initialize`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn layout_dirs(&self) -> [PathBuf; 3] {
        [
            self.root.join(RAW_DIR),
            self.root.join(STRUCTURED_DIR),
            self.root.join(METADATA_DIR),
        ]
    }
}

impl ArchiveStorage for FsStorage {
    fn initialize(&self) -> StorageResult<()> {
        for dir in self.layout_dirs() {
            fs::create_dir_all(&dir).map_err(|e| StorageError::from_io(&dir, e))?;
        }

        let progress = progress_path(&self.root);
        if !progress.exists() {
            write_json_atomic(&progress, &ProgressData::zero())?;
            tracing::info!("Initialized archive at {}", self.root.display());
        }

        Ok(())
    }

    fn validate(&self) -> StorageResult<()> {
        for dir in self.layout_dirs() {
            if !dir.is_dir() {
                return Err(StorageError::NotFound { path: dir });
            }
        }

        let progress = progress_path(&self.root);
        if !progress.is_file() {
            return Err(StorageError::NotFound { path: progress });
        }

        Ok(())
    }

    fn read_progress(&self) -> StorageResult<ProgressData> {
        let path = progress_path(&self.root);
        let progress: ProgressData = read_json(&path)?;
        progress
            .check()
            .map_err(|message| StorageError::invalid_format(&path, message))?;
        Ok(progress)
    }

    fn write_progress(&self, progress: &ProgressData) -> StorageResult<()> {
        let path = progress_path(&self.root);
        progress
            .check()
            .map_err(|message| StorageError::invalid_format(&path, message))?;
        write_json_atomic(&path, progress)
    }

    fn read_section_metadata(&self, section_id: &str) -> StorageResult<SectionMetadata> {
        let path = metadata_path(&self.root, section_id)?;
        let metadata: SectionMetadata = read_json(&path)?;
        metadata
            .check()
            .map_err(|message| StorageError::invalid_format(&path, message))?;
        Ok(metadata)
    }

    fn write_section_metadata(
        &self,
        section_id: &str,
        metadata: &SectionMetadata,
    ) -> StorageResult<()> {
        let path = metadata_path(&self.root, section_id)?;
        metadata
            .check()
            .map_err(|message| StorageError::invalid_format(&path, message))?;
        write_json_atomic(&path, metadata)
    }

    fn list_sections(&self) -> StorageResult<Vec<String>> {
        let dir = self.root.join(METADATA_DIR);
        let entries = fs::read_dir(&dir).map_err(|e| StorageError::from_io(&dir, e))?;

        let mut sections = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::from_io(&dir, e))?;
            let index = entry.path().join(INDEX_FILE);
            if !index.is_file() {
                continue;
            }
            // Stray directories such as `subforum-` or `notes` are not sections
            match parse_metadata_path(&index) {
                Ok(location) => sections.push(location.section_id),
                Err(e) => tracing::debug!("Ignoring {}: {}", index.display(), e),
            }
        }

        sections.sort();
        Ok(sections)
    }

    fn write_topic(&self, topic: &Topic) -> StorageResult<()> {
        let path = structured_path(&self.root, &topic.section_id, &topic.id)?;
        write_json_atomic(&path, topic)
    }

    fn read_topic(&self, section_id: &str, topic_id: &str) -> StorageResult<Topic> {
        read_json(&structured_path(&self.root, section_id, topic_id)?)
    }

    fn write_raw_page(
        &self,
        section_id: &str,
        topic_id: &str,
        page: u32,
        html: &str,
    ) -> StorageResult<()> {
        let path = raw_page_path(&self.root, section_id, topic_id, page)?;
        write_bytes_atomic(&path, html.as_bytes())
    }

    fn has_raw_page(&self, section_id: &str, topic_id: &str, page: u32) -> bool {
        raw_page_path(&self.root, section_id, topic_id, page)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    fn load_completion(&self) -> StorageResult<CompletionSet> {
        match read_json(&completion_path(&self.root)) {
            Ok(completion) => Ok(completion),
            Err(e) if e.is_not_found() => Ok(CompletionSet::default()),
            Err(e) => Err(e),
        }
    }

    fn save_completion(&self, completion: &CompletionSet) -> StorageResult<()> {
        write_json_atomic(&completion_path(&self.root), completion)
    }
}

/// Recursively sums the sizes of all files below `path`
///
/// Symbolic links are counted by their own size and never followed.
/// A missing `path` is reported as `NotFound` rather than a zero size.
pub fn directory_size(path: &Path) -> StorageResult<u64> {
    let metadata = fs::symlink_metadata(path).map_err(|e| StorageError::from_io(path, e))?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }

    let mut total = 0;
    let entries = fs::read_dir(path).map_err(|e| StorageError::from_io(path, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::from_io(path, e))?;
        let child = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| StorageError::from_io(&child, e))?;

        if file_type.is_dir() {
            total += directory_size(&child)?;
        } else {
            let len = entry
                .metadata()
                .map_err(|e| StorageError::from_io(&child, e))?
                .len();
            total += len;
        }
    }

    Ok(total)
}

/// Reads and deserializes a JSON document
fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let bytes = fs::read(path).map_err(|e| StorageError::from_io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::invalid_format(path, e.to_string()))
}

/// Serializes `value` and replaces `path` with it
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| StorageError::invalid_format(path, e.to_string()))?;
    write_bytes_atomic(path, &bytes)
}

/// Write bytes atomically (write to temp, then rename)
fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| StorageError::from_io(parent, e))?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(StorageError::from_io(&tmp, e));
    }

    fs::rename(&tmp, path).map_err(|e| StorageError::from_io(path, e))
}
