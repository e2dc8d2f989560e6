use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("entry '{entry}' escapes the destination (resolves to '{}')", resolved.display())]
    PathTraversal { entry: String, resolved: PathBuf },

    #[error("strip_components({count}) removed all path components from '{original}'")]
    NoComponentsRemaining { original: String, count: usize },

    #[error("archive is corrupted: {0}")]
    Corrupted(#[from] zip::result::ZipError),

    #[error("failed to extract '{}': {source}", path.display())]
    ExtractionFailed { path: PathBuf, source: io::Error },

    #[error("failed to create directory: {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
