//! In-memory storage backend for tests and embedding.

use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::io::AsyncWrite;

use super::{BoxedReader, BoxedWriter, OutputSink, Storage, StorageError, segment_file_name};
use crate::download::DownloadSpec;
use crate::download::filename::numbered_filename;

type SegmentKey = (String, u32);

/// Keeps specs, segment bytes and merged outputs in concurrent maps.
///
/// Cloning shares the underlying maps, so a test can keep a handle while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    specs: Arc<DashMap<String, DownloadSpec>>,
    segments: Arc<DashMap<SegmentKey, Vec<u8>>>,
    outputs: Arc<DashMap<PathBuf, Vec<u8>>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the merged bytes written to `location`, if any.
    #[must_use]
    pub fn output(&self, location: &Path) -> Option<Vec<u8>> {
        self.outputs.get(location).map(|entry| entry.value().clone())
    }

    /// Returns every output location, sorted.
    #[must_use]
    pub fn output_locations(&self) -> Vec<PathBuf> {
        let mut locations: Vec<PathBuf> = self.outputs.iter().map(|e| e.key().clone()).collect();
        locations.sort();
        locations
    }

    /// Returns the bytes currently stored for a segment.
    #[must_use]
    pub fn segment_bytes(&self, id: &str, index: u32) -> Option<Vec<u8>> {
        self.segments
            .get(&(id.to_string(), index))
            .map(|entry| entry.value().clone())
    }

    /// Replaces a segment's bytes directly.
    pub fn put_segment(&self, id: &str, index: u32, bytes: impl Into<Vec<u8>>) {
        self.segments.insert((id.to_string(), index), bytes.into());
    }

    /// Returns the number of stored segment objects across all downloads.
    #[must_use]
    pub fn segment_object_count(&self) -> usize {
        self.segments.len()
    }

    fn segment_label(id: &str, index: u32, segment_count: usize) -> PathBuf {
        PathBuf::from(id).join(segment_file_name(index, segment_count))
    }
}

/// Appends every write straight into a shared map entry.
struct MapWriter<K: std::hash::Hash + Eq> {
    map: Arc<DashMap<K, Vec<u8>>>,
    key: K,
}

impl<K> AsyncWrite for MapWriter<K>
where
    K: std::hash::Hash + Eq + Clone + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.map
            .entry(self.key.clone())
            .or_default()
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list_downloads(&self) -> Result<Vec<DownloadSpec>, StorageError> {
        let mut specs: Vec<DownloadSpec> = self.specs.iter().map(|e| e.value().clone()).collect();
        specs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(specs)
    }

    async fn read_spec(&self, id: &str) -> Result<DownloadSpec, StorageError> {
        self.specs
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    async fn write_spec(&self, spec: &DownloadSpec) -> Result<(), StorageError> {
        self.specs.insert(spec.id.clone(), spec.clone());
        Ok(())
    }

    async fn open_segment_writer(
        &self,
        id: &str,
        index: u32,
        _segment_count: usize,
    ) -> Result<BoxedWriter, StorageError> {
        let key = (id.to_string(), index);
        self.segments.entry(key.clone()).or_default();
        Ok(Box::new(MapWriter {
            map: Arc::clone(&self.segments),
            key,
        }))
    }

    async fn open_segment_reader(
        &self,
        id: &str,
        index: u32,
        segment_count: usize,
    ) -> Result<BoxedReader, StorageError> {
        let bytes = self.segment_bytes(id, index).ok_or_else(|| {
            StorageError::io(
                Self::segment_label(id, index, segment_count),
                io::Error::new(io::ErrorKind::NotFound, "segment not found"),
            )
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn segment_size(
        &self,
        id: &str,
        index: u32,
        _segment_count: usize,
    ) -> Result<u64, StorageError> {
        Ok(self
            .segments
            .get(&(id.to_string(), index))
            .map_or(0, |entry| entry.value().len() as u64))
    }

    async fn delete_segment(
        &self,
        id: &str,
        index: u32,
        _segment_count: usize,
    ) -> Result<(), StorageError> {
        self.segments.remove(&(id.to_string(), index));
        Ok(())
    }

    async fn open_output(&self, spec: &DownloadSpec) -> Result<OutputSink, StorageError> {
        let mut n = 0;
        let location = loop {
            let candidate = PathBuf::from(numbered_filename(&spec.name, n));
            if let Entry::Vacant(slot) = self.outputs.entry(candidate.clone()) {
                slot.insert(Vec::new());
                break candidate;
            }
            n += 1;
        };
        Ok(OutputSink {
            location: location.clone(),
            writer: Box::new(MapWriter {
                map: Arc::clone(&self.outputs),
                key: location,
            }),
        })
    }

    async fn discard_output(&self, location: &Path) -> Result<(), StorageError> {
        self.outputs.remove(location);
        Ok(())
    }

    async fn delete_download(&self, id: &str) -> Result<(), StorageError> {
        self.specs.remove(id);
        self.segments.retain(|(owner, _), _| owner != id);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::Segment;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn sample_spec(id: &str) -> DownloadSpec {
        DownloadSpec {
            id: id.to_string(),
            url: "https://example.com/file.tar.gz".to_string(),
            name: "file.tar.gz".to_string(),
            size: 4,
            version_token: None,
            segments: vec![Segment::new(0, 0, 4)],
        }
    }

    #[tokio::test]
    async fn test_segment_write_read_delete() {
        let storage = MemoryStorage::new();
        let mut writer = storage.open_segment_writer("a", 0, 1).await.unwrap();
        writer.write_all(b"ab").await.unwrap();
        writer.write_all(b"cd").await.unwrap();
        assert_eq!(storage.segment_size("a", 0, 1).await.unwrap(), 4);

        let mut reader = storage.open_segment_reader("a", 0, 1).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"abcd");

        storage.delete_segment("a", 0, 1).await.unwrap();
        assert_eq!(storage.segment_size("a", 0, 1).await.unwrap(), 0);
        assert!(storage.open_segment_reader("a", 0, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_outputs_get_unique_locations() {
        let storage = MemoryStorage::new();
        let spec = sample_spec("x-file.tar.gz");
        let mut first = storage.open_output(&spec).await.unwrap();
        first.writer.write_all(b"one").await.unwrap();
        let second = storage.open_output(&spec).await.unwrap();

        assert_eq!(first.location, PathBuf::from("file.tar.gz"));
        assert_eq!(second.location, PathBuf::from("file_1.tar.gz"));
        assert_eq!(storage.output(&first.location).unwrap(), b"one");
        assert_eq!(storage.output_locations().len(), 2);

        storage.discard_output(&first.location).await.unwrap();
        assert!(storage.output(&first.location).is_none());
        let third = storage.open_output(&spec).await.unwrap();
        assert_eq!(third.location, PathBuf::from("file.tar.gz"));
    }

    #[tokio::test]
    async fn test_delete_download_removes_only_its_segments() {
        let storage = MemoryStorage::new();
        storage.write_spec(&sample_spec("a")).await.unwrap();
        storage.put_segment("a", 0, b"1".to_vec());
        storage.put_segment("a", 1, b"2".to_vec());
        storage.put_segment("b", 0, b"3".to_vec());

        storage.delete_download("a").await.unwrap();
        storage.delete_download("a").await.unwrap();

        assert!(storage.read_spec("a").await.is_err());
        assert_eq!(storage.segment_object_count(), 1);
        assert_eq!(storage.segment_bytes("b", 0).unwrap(), b"3");
    }
}
