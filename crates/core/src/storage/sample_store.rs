use std::fs;
use std::path::{Path, PathBuf};

use crate::shared::constants::{SAMPLE_CAPACITY, SAMPLE_EXTENSION};
use crate::shared::frame::Frame;
use crate::storage::domain::image_writer::ImageWriter;

/// Result of offering a frame to the [`SampleStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The frame was written to this path.
    Saved(PathBuf),
    /// Capacity reached; nothing was written.
    Full,
    /// An I/O problem prevented the save. Logged; the next call retries.
    Skipped,
}

/// Bounded directory of sample frames named `image_<n>.<ext>`, `n` from 1.
///
/// The count is re-read from the directory listing before every write, so
/// files added or removed out of band shift the next name. Once the cached
/// count reaches capacity, saves return [`SaveOutcome::Full`] without
/// touching the filesystem. Assumes a single writer.
pub struct SampleStore {
    directory: PathBuf,
    capacity: usize,
    current_count: usize,
    writer: Box<dyn ImageWriter>,
}

impl SampleStore {
    pub fn new(directory: &Path, writer: Box<dyn ImageWriter>) -> Self {
        Self::with_capacity(directory, SAMPLE_CAPACITY, writer)
    }

    pub fn with_capacity(directory: &Path, capacity: usize, writer: Box<dyn ImageWriter>) -> Self {
        Self {
            directory: directory.to_path_buf(),
            capacity,
            current_count: 0,
            writer,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn current_count(&self) -> usize {
        self.current_count
    }

    pub fn is_full(&self) -> bool {
        self.current_count >= self.capacity
    }

    pub fn save(&mut self, frame: &Frame) -> SaveOutcome {
        if self.is_full() {
            return SaveOutcome::Full;
        }

        if let Err(e) = fs::create_dir_all(&self.directory) {
            log::warn!(
                "Cannot create sample directory {}: {e}",
                self.directory.display()
            );
            return SaveOutcome::Skipped;
        }

        match fs::read_dir(&self.directory) {
            Ok(entries) => self.current_count = entries.count().min(self.capacity),
            Err(e) => {
                log::warn!(
                    "Cannot list sample directory {}: {e}",
                    self.directory.display()
                );
                return SaveOutcome::Skipped;
            }
        }
        if self.is_full() {
            log::info!(
                "Sample directory {} already holds {} images",
                self.directory.display(),
                self.capacity
            );
            return SaveOutcome::Full;
        }

        let path = self.directory.join(sample_file_name(self.current_count + 1));
        match self.writer.write(&path, frame) {
            Ok(()) => {
                self.current_count += 1;
                log::info!(
                    "Saved sample {}/{} to {}",
                    self.current_count,
                    self.capacity,
                    path.display()
                );
                SaveOutcome::Saved(path)
            }
            Err(e) => {
                log::warn!("Failed to write sample {}: {e}", path.display());
                SaveOutcome::Skipped
            }
        }
    }
}

pub fn sample_file_name(n: usize) -> String {
    format!("image_{n}.{SAMPLE_EXTENSION}")
}
