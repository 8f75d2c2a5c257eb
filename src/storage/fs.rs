//! Filesystem storage backend.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tracing::{debug, warn};

use super::{BoxedReader, BoxedWriter, OutputSink, Storage, StorageError, segment_file_name};
use crate::download::DownloadSpec;
use crate::download::filename::numbered_filename;

const DOWNLOADS_DIR: &str = "downloads";
const SPEC_FILE: &str = "download.json";

/// Stores specs and segments under `<program_folder>/downloads/<id>/` and
/// writes merged files into `output_dir`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    downloads_dir: PathBuf,
    output_dir: PathBuf,
}

impl FsStorage {
    /// Creates a backend rooted at `program_folder`. Directories are created on demand.
    pub fn new(program_folder: impl AsRef<Path>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloads_dir: program_folder.as_ref().join(DOWNLOADS_DIR),
            output_dir: output_dir.into(),
        }
    }

    /// Returns the directory holding one download's spec and segments.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] for ids that are not a single plain
    /// path component, so user-supplied ids cannot escape the downloads folder.
    pub fn download_dir(&self, id: &str) -> Result<PathBuf, StorageError> {
        let plain = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains('/')
            && !id.contains('\\');
        if plain {
            Ok(self.downloads_dir.join(id))
        } else {
            Err(StorageError::NotFound { id: id.to_string() })
        }
    }

    fn segment_path(
        &self,
        id: &str,
        index: u32,
        segment_count: usize,
    ) -> Result<PathBuf, StorageError> {
        Ok(self
            .download_dir(id)?
            .join(segment_file_name(index, segment_count)))
    }

    async fn ensure_dir(path: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| StorageError::io(path, e))
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn list_downloads(&self) -> Result<Vec<DownloadSpec>, StorageError> {
        let mut entries = match fs::read_dir(&self.downloads_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.downloads_dir, e)),
        };

        let mut specs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.downloads_dir, e))?
        {
            let Ok(id) = entry.file_name().into_string() else {
                continue;
            };
            match self.read_spec(&id).await {
                Ok(spec) => specs.push(spec),
                Err(e) => warn!(id = %id, error = %e, "skipping unreadable download"),
            }
        }
        specs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(specs)
    }

    async fn read_spec(&self, id: &str) -> Result<DownloadSpec, StorageError> {
        let path = self.download_dir(id)?.join(SPEC_FILE);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound { id: id.to_string() });
            }
            Err(e) => return Err(StorageError::io(path, e)),
        };
        serde_json::from_slice(&raw).map_err(|e| StorageError::Broken {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn write_spec(&self, spec: &DownloadSpec) -> Result<(), StorageError> {
        let dir = self.download_dir(&spec.id)?;
        Self::ensure_dir(&dir).await?;

        let encoded = serde_json::to_vec_pretty(spec).map_err(|source| StorageError::Encode {
            id: spec.id.clone(),
            source,
        })?;

        // Write-then-rename so an interrupted save never leaves a truncated spec.
        let tmp = dir.join(format!("{SPEC_FILE}.tmp"));
        let path = dir.join(SPEC_FILE);
        fs::write(&tmp, encoded)
            .await
            .map_err(|e| StorageError::io(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        debug!(id = %spec.id, path = %path.display(), "spec saved");
        Ok(())
    }

    async fn open_segment_writer(
        &self,
        id: &str,
        index: u32,
        segment_count: usize,
    ) -> Result<BoxedWriter, StorageError> {
        Self::ensure_dir(&self.download_dir(id)?).await?;
        let path = self.segment_path(id, index, segment_count)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(Box::new(file))
    }

    async fn open_segment_reader(
        &self,
        id: &str,
        index: u32,
        segment_count: usize,
    ) -> Result<BoxedReader, StorageError> {
        let path = self.segment_path(id, index, segment_count)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(Box::new(file))
    }

    async fn segment_size(
        &self,
        id: &str,
        index: u32,
        segment_count: usize,
    ) -> Result<u64, StorageError> {
        let path = self.segment_path(id, index, segment_count)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    async fn delete_segment(
        &self,
        id: &str,
        index: u32,
        segment_count: usize,
    ) -> Result<(), StorageError> {
        let path = self.segment_path(id, index, segment_count)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    async fn open_output(&self, spec: &DownloadSpec) -> Result<OutputSink, StorageError> {
        Self::ensure_dir(&self.output_dir).await?;
        for n in 0..=u32::MAX {
            let location = self.output_dir.join(numbered_filename(&spec.name, n));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&location)
                .await
            {
                Ok(file) => {
                    return Ok(OutputSink {
                        location,
                        writer: Box::new(file),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(StorageError::io(location, e)),
            }
        }
        Err(StorageError::io(
            self.output_dir.join(&spec.name),
            std::io::Error::new(ErrorKind::AlreadyExists, "no free output name"),
        ))
    }

    async fn discard_output(&self, location: &Path) -> Result<(), StorageError> {
        match fs::remove_file(location).await {
            Ok(()) => {
                debug!(location = %location.display(), "partial output removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(location, e)),
        }
    }

    async fn delete_download(&self, id: &str) -> Result<(), StorageError> {
        let dir = self.download_dir(id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(id = %id, "download storage removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(dir, e)),
        }
    }
}
