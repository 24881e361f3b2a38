use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::display::domain::frame_display::FrameDisplay;
use crate::shared::frame::Frame;
use crate::storage::domain::image_writer::ImageWriter;

struct Preview {
    path: PathBuf,
    every: usize,
    writer: Box<dyn ImageWriter>,
}

/// Display without a window.
///
/// Keys arrive over a channel (the CLI feeds it from stdin). Optionally the
/// latest rendered frame is written to a preview image every `every` frames,
/// starting with the first.
pub struct HeadlessDisplay {
    keys: Option<Receiver<char>>,
    preview: Option<Preview>,
    title: Option<String>,
    rendered: usize,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self {
            keys: None,
            preview: None,
            title: None,
            rendered: 0,
        }
    }

    pub fn with_keys(mut self, keys: Receiver<char>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_preview(mut self, path: &Path, every: usize, writer: Box<dyn ImageWriter>) -> Self {
        self.preview = Some(Preview {
            path: path.to_path_buf(),
            every: every.max(1),
            writer,
        });
        self
    }

    pub fn is_open(&self) -> bool {
        self.title.is_some()
    }
}

impl Default for HeadlessDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDisplay for HeadlessDisplay {
    fn open(&mut self, title: &str) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = self.preview.as_ref().and_then(|p| p.path.parent()) {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        log::debug!("Display '{title}' opened");
        self.title = Some(title.to_string());
        Ok(())
    }

    fn render(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if !self.is_open() {
            return Err("display is not open".into());
        }
        let due = self.rendered;
        self.rendered += 1;

        if let Some(preview) = &self.preview {
            if due % preview.every == 0 {
                preview.writer.write(&preview.path, frame)?;
            }
        }
        Ok(())
    }

    fn wait_key(&mut self, timeout: Duration) -> Option<char> {
        match &self.keys {
            Some(rx) => rx.recv_timeout(timeout).ok(),
            None => {
                std::thread::sleep(timeout);
                None
            }
        }
    }

    fn close(&mut self) {
        if let Some(title) = self.title.take() {
            log::debug!("Display '{title}' closed after {} frames", self.rendered);
        }
    }
}
