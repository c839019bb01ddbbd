//! The `.part` file an incoming transfer streams into.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{PART_SUFFIX, TransferError};

/// Partial path for a destination: `<destination>.part`.
pub fn part_path_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PART_SUFFIX);
    destination.with_file_name(name)
}

/// Size of an existing partial file, `None` when there is none.
pub fn existing_part_size(part_path: &Path) -> Option<u64> {
    fs::metadata(part_path).ok().map(|m| m.len())
}

/// Open handle to a partial download.
///
/// The job owns this handle for the whole receive phase. The middleware's
/// sink is a clone of the same file description ([`PartFile::sink`]), so a
/// reposition here moves the middleware's write cursor too. On success the
/// partial file is renamed over the destination ([`PartFile::finalize`]);
/// on cancel or error it is left in place for a later resume
/// ([`PartFile::discard`]).
#[derive(Debug)]
pub struct PartFile {
    file: File,
    part_path: PathBuf,
    destination: PathBuf,
}

impl PartFile {
    /// Opens the partial file and reserves the destination name.
    ///
    /// When `resume` is set, existing partial content is kept and the write
    /// cursor starts at its end; otherwise the partial file is truncated.
    /// An empty file is created at `destination` if none exists yet, so the
    /// name cannot be taken while the transfer runs.
    pub fn create(
        destination: &Path,
        part_path: PathBuf,
        resume: bool,
    ) -> Result<Self, TransferError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(!resume)
            .open(&part_path)?;
        if resume {
            file.seek(SeekFrom::End(0))?;
        }

        // Reserve the final name without clobbering whatever conflict
        // resolution decided to keep there.
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(destination)?;

        Ok(Self {
            file,
            part_path,
            destination: destination.to_path_buf(),
        })
    }

    pub fn part_path(&self) -> &Path {
        &self.part_path
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// A second handle to the same open file, for the middleware to write
    /// into. Shares the write cursor with this handle.
    pub fn sink(&self) -> Result<File, TransferError> {
        Ok(self.file.try_clone()?)
    }

    /// Moves the write cursor to the offset the peer confirmed.
    ///
    /// A confirmed offset below the current size truncates first: the peer
    /// is restarting, and stale bytes past the restart point must not
    /// survive into the finalized file.
    pub fn reposition(&mut self, offset: u64) -> Result<(), TransferError> {
        let len = self.file.metadata()?.len();
        if offset < len {
            self.file.set_len(offset)?;
        }
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Flushes and renames the partial file over the destination, removing
    /// any stale file that still holds the name. Returns the final path.
    pub fn finalize(self) -> Result<PathBuf, TransferError> {
        let Self {
            mut file,
            part_path,
            destination,
        } = self;
        file.flush()?;
        drop(file);
        if destination.exists() {
            fs::remove_file(&destination)?;
        }
        fs::rename(&part_path, &destination)?;
        Ok(destination)
    }

    /// Closes the handle and leaves the partial file on disk.
    pub fn discard(self) {
        tracing::debug!(part = %self.part_path.display(), "keeping partial file for a later resume");
    }
}
