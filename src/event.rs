//! Modification events and the observer capability they are delivered to.

use crate::diff;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Event signaling that a watched file was created, changed, or deleted.
///
/// The diff is linewise: unchanged lines start with `"= "`, added lines with
/// `"> "`, and deleted lines with `"< "`. A newly created file is all
/// additions, a deleted file all deletions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModificationEvent {
    file: PathBuf,
    file_time: SystemTime,
    diff: Vec<String>,
}

impl ModificationEvent {
    pub fn new(file: PathBuf, file_time: SystemTime, diff: Vec<String>) -> Self {
        Self {
            file,
            file_time,
            diff,
        }
    }

    /// Build an event by diffing `file` against an older copy of it.
    ///
    /// The timestamp is the file's current modification time, or the current
    /// instant if the file no longer exists.
    pub(crate) fn from_files(file: &Path, old: &Path) -> io::Result<Self> {
        let diff = diff::diff_files(old, file)?;
        let file_time = match fs::metadata(file) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => SystemTime::now(),
            Err(e) => return Err(e),
        };
        Ok(Self::new(file.to_path_buf(), file_time, diff))
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn file_time(&self) -> SystemTime {
        self.file_time
    }

    /// Linewise diff with prefixes indicating the modification.
    pub fn diff(&self) -> &[String] {
        &self.diff
    }
}

impl fmt::Display for ModificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.file.display())?;
        for line in &self.diff {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Sink for [`ModificationEvent`]s.
///
/// Dispatch is synchronous from the notification loop, so implementations
/// should return promptly. The same observer may be registered for multiple
/// files.
pub trait Observer: Send + Sync {
    fn file_modified(&self, event: &ModificationEvent);
}

impl<F> Observer for F
where
    F: Fn(&ModificationEvent) + Send + Sync,
{
    fn file_modified(&self, event: &ModificationEvent) {
        self(event)
    }
}
