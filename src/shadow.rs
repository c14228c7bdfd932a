//! Shadow repository: a mirror tree holding the last-seen content of every
//! watched file, used both to compute diffs and to detect spurious
//! notifications.

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maps watched files below `root` to mirror copies below `shadow_root`,
/// preserving their relative paths and modification times.
#[derive(Debug, Clone)]
pub struct ShadowRepository {
    root: PathBuf,
    shadow_root: PathBuf,
}

impl ShadowRepository {
    /// Create the repository, creating `shadow_root` on disk if absent.
    pub fn create(root: PathBuf, shadow_root: PathBuf) -> io::Result<Self> {
        if !shadow_root.exists() {
            fs::create_dir_all(&shadow_root)?;
        }
        Ok(Self { root, shadow_root })
    }

    /// Translate a file below the root to its shadow location. The shadow
    /// file may or may not exist.
    pub fn shadow_path(&self, file: &Path) -> io::Result<PathBuf> {
        let relative = file.strip_prefix(&self.root).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} is not below the watched root {}",
                    file.display(),
                    self.root.display()
                ),
            )
        })?;
        Ok(self.shadow_root.join(relative))
    }

    /// Copy `file` into the shadow tree if it exists on disk and has no
    /// shadow yet. Intermediate shadow directories are created on demand.
    pub fn seed(&self, file: &Path) -> io::Result<()> {
        let shadow_file = self.shadow_path(file)?;
        if file.exists() && !shadow_file.exists() {
            copy_preserving_mtime(file, &shadow_file)?;
        }
        Ok(())
    }

    /// Replace the shadow of `file` with its current on-disk content.
    pub fn refresh(&self, file: &Path) -> io::Result<()> {
        let shadow_file = self.shadow_path(file)?;
        debug!("refreshing shadow copy of {}", file.display());
        copy_preserving_mtime(file, &shadow_file)
    }

    /// Delete the shadow of `file` if it exists.
    pub fn purge(&self, file: &Path) -> io::Result<()> {
        let shadow_file = self.shadow_path(file)?;
        match fs::remove_file(&shadow_file) {
            Ok(()) => {
                debug!("deleted shadow copy of {}", file.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Recursively delete the whole shadow tree.
    pub fn purge_all(&self) -> io::Result<()> {
        if self.shadow_root.exists() {
            fs::remove_dir_all(&self.shadow_root)?;
        }
        Ok(())
    }
}

/// `fs::copy` carries permissions but not timestamps; the shadow must keep
/// the source's modification time exactly.
fn copy_preserving_mtime(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::copy(src, dst)?;
    let mtime = FileTime::from_last_modification_time(&fs::metadata(src)?);
    filetime::set_file_mtime(dst, mtime)
}
