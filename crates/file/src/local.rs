//! Local filesystem file reader implementation

use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::Path;

/// Reads whole files from the local filesystem
pub struct LocalFileReader;

impl LocalFileReader {
    /// Read the entire file at `path` into memory
    ///
    /// A missing path or a directory maps to [`Error::NotFound`], a
    /// permission failure to [`Error::AccessDenied`]. The `io::Error` is kept
    /// as the source in every case.
    pub async fn read(path: &Path) -> Result<Vec<u8>> {
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| classify(path, e))?;

        tracing::debug!("Read {} bytes from file: {}", contents.len(), path.display());

        Ok(contents)
    }
}

fn classify(path: &Path, source: std::io::Error) -> Error {
    let uri = path.display().to_string();
    match source.kind() {
        ErrorKind::NotFound | ErrorKind::IsADirectory | ErrorKind::NotADirectory => {
            Error::NotFound {
                uri,
                source: Some(source),
            }
        }
        ErrorKind::PermissionDenied => Error::AccessDenied { uri, source },
        _ => Error::Io { uri, source },
    }
}
