//! Local source files
//!
//! A [`SourceFile`] is an open, read-only handle plus the metadata the
//! upload protocol needs. It is owned by exactly one upload at a time.

use super::planner::ChunkDescriptor;
use super::UploadError;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Open file being uploaded
#[derive(Debug)]
pub struct SourceFile {
    file: File,
    path: PathBuf,
    filename: String,
    size: u64,
}

impl SourceFile {
    /// Open `path` for reading
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| UploadError::SourceUnavailable(path.display().to_string(), e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| UploadError::SourceUnavailable(path.display().to_string(), e))?;
        if !metadata.is_file() {
            return Err(UploadError::SourceUnavailable(
                path.display().to_string(),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            file,
            path: path.to_path_buf(),
            filename,
            size: metadata.len(),
        })
    }

    /// Override the name advertised to the server (e.g. a relative path)
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read exactly the bytes described by `chunk`
    pub async fn read_chunk(&mut self, chunk: &ChunkDescriptor) -> Result<Bytes, UploadError> {
        let length = usize::try_from(chunk.length).map_err(|_| {
            UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "chunk does not fit in memory",
            ))
        })?;
        let mut buf = vec![0u8; length];
        if length > 0 {
            self.file.seek(SeekFrom::Start(chunk.offset)).await?;
            self.file.read_exact(&mut buf).await?;
        }
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::planner::plan;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_chunks_reassemble_file() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&data).unwrap();

        let mut source = SourceFile::open(tmp.path()).await.unwrap();
        assert_eq!(source.size(), 1000);

        let mut reassembled = Vec::new();
        for chunk in plan(source.size(), 64) {
            let bytes = source.read_chunk(&chunk).await.unwrap();
            assert_eq!(bytes.len() as u64, chunk.length);
            reassembled.extend_from_slice(&bytes);
        }
        assert_eq!(reassembled, data);
    }

    #[tokio::test]
    async fn test_empty_file_reads_empty_chunk() {
        let tmp = NamedTempFile::new().unwrap();
        let mut source = SourceFile::open(tmp.path()).await.unwrap();
        let chunk = plan(0, 10).next().unwrap();
        assert!(source.read_chunk(&chunk).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = SourceFile::open("/nonexistent/runpilot/file.bin").await;
        assert!(matches!(result, Err(UploadError::SourceUnavailable(_, _))));
    }

    #[tokio::test]
    async fn test_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = SourceFile::open(dir.path()).await;
        assert!(matches!(result, Err(UploadError::SourceUnavailable(_, _))));
    }
}
