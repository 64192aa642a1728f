use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::IoError;
use crate::io::{LocalFileReader, RangeReader};

/// Creates range readers from slide identifiers.
///
/// The registry only sees this trait, so tests can serve slides from memory
/// while the server reads them from the slide directory.
#[async_trait]
pub trait SlideSource: Send + Sync {
    /// The type of range reader this source creates.
    type Reader: RangeReader + 'static;

    /// Create a reader for `slide_id`, failing with `IoError::NotFound` when
    /// no such slide exists.
    async fn create_reader(&self, slide_id: &str) -> Result<Self::Reader, IoError>;
}

/// Slides stored as flat files in one directory, identified by file name.
#[derive(Debug, Clone)]
pub struct LocalSlideSource {
    root: PathBuf,
}

impl LocalSlideSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of `slide_id` inside the slide directory.
    ///
    /// Identifiers are plain file names; anything that could escape the
    /// directory resolves to `NotFound`.
    pub fn resolve(&self, slide_id: &str) -> Result<PathBuf, IoError> {
        if is_plain_file_name(slide_id) {
            Ok(self.root.join(slide_id))
        } else {
            Err(IoError::NotFound(slide_id.to_string()))
        }
    }
}

#[async_trait]
impl SlideSource for LocalSlideSource {
    type Reader = LocalFileReader;

    async fn create_reader(&self, slide_id: &str) -> Result<Self::Reader, IoError> {
        let path = self.resolve(slide_id)?;
        LocalFileReader::open(path).await.map_err(|e| match e {
            IoError::NotFound(_) => IoError::NotFound(slide_id.to_string()),
            other => other,
        })
    }
}

/// A single path component that is not `.`/`..` and has no separators.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
