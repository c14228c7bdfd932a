//! Error types for registration and watch-service failures.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by [`crate::notifier::Notifier`] registration calls.
#[derive(Debug, Error)]
pub enum Error {
    /// A directory was passed where a file path was expected.
    #[error("expected a file, not a directory: {0}")]
    IsADirectory(PathBuf),

    /// The file does not reside below the notifier's root directory.
    #[error("file {file} does not reside below the root directory {root}")]
    OutsideRoot { file: PathBuf, root: PathBuf },

    /// The OS watch service could not be created or a watch could not be
    /// registered.
    #[error("filesystem watch service unavailable: {0}")]
    Watch(#[from] notify::Error),

    /// Filesystem I/O failed during a registration operation.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
