use std::time::{Duration, Instant};

use minifb::{Key, KeyRepeat, ScaleMode, Window, WindowOptions};

use crate::display::domain::frame_display::FrameDisplay;
use crate::shared::frame::Frame;

/// Window size before the first frame arrives. Frames of other sizes are
/// scaled to fit with their aspect ratio kept.
const INITIAL_SIZE: (usize, usize) = (640, 480);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Reported by `wait_key` once the user closes the window.
pub const CLOSE_KEY: char = '\u{1b}';

const LETTERS: [Key; 26] = [
    Key::A, Key::B, Key::C, Key::D, Key::E, Key::F, Key::G, Key::H, Key::I,
    Key::J, Key::K, Key::L, Key::M, Key::N, Key::O, Key::P, Key::Q, Key::R,
    Key::S, Key::T, Key::U, Key::V, Key::W, Key::X, Key::Y, Key::Z,
];

/// Desktop window showing each rendered frame. Keys pressed while the window
/// has focus are returned by `wait_key`.
pub struct WindowDisplay {
    window: Option<Window>,
    buffer: Vec<u32>,
}

// Safety: the window is created, drawn and dropped by whichever thread runs
// the pipeline loop. It is never shared between threads.
unsafe impl Send for WindowDisplay {}

impl WindowDisplay {
    pub fn new() -> Self {
        Self {
            window: None,
            buffer: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.window.is_some()
    }
}

impl Default for WindowDisplay {
    fn default() -> Self {
        Self::new()
    }
}

/// Packs RGB or gray pixels into `0RGB` words.
fn pack_pixels(frame: &Frame, buffer: &mut Vec<u32>) -> Result<(), Box<dyn std::error::Error>> {
    buffer.clear();
    match frame.channels() {
        3 => buffer.extend(
            frame
                .data()
                .chunks_exact(3)
                .map(|p| u32::from_be_bytes([0, p[0], p[1], p[2]])),
        ),
        1 => buffer.extend(frame.data().iter().map(|&v| u32::from_be_bytes([0, v, v, v]))),
        n => return Err(format!("cannot display {n}-channel frame {}", frame.index()).into()),
    }
    Ok(())
}

fn key_char(key: Key) -> char {
    match key {
        Key::Escape => CLOSE_KEY,
        Key::Enter | Key::NumPadEnter => '\n',
        Key::Space => ' ',
        _ => LETTERS
            .iter()
            .position(|&k| k == key)
            .map(|i| (b'a' + i as u8) as char)
            .unwrap_or('\0'),
    }
}

impl FrameDisplay for WindowDisplay {
    fn open(&mut self, title: &str) -> Result<(), Box<dyn std::error::Error>> {
        if self.window.is_some() {
            return Ok(());
        }
        let options = WindowOptions {
            resize: true,
            scale_mode: ScaleMode::AspectRatioStretch,
            ..WindowOptions::default()
        };
        let window = Window::new(title, INITIAL_SIZE.0, INITIAL_SIZE.1, options)?;
        log::debug!("Window '{title}' opened");
        self.window = Some(window);
        Ok(())
    }

    fn render(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let Some(window) = self.window.as_mut() else {
            return Err("display is not open".into());
        };
        if !window.is_open() {
            return Ok(());
        }
        pack_pixels(frame, &mut self.buffer)?;
        window.update_with_buffer(&self.buffer, frame.width() as usize, frame.height() as usize)?;
        Ok(())
    }

    /// A closed window reads as [`CLOSE_KEY`].
    fn wait_key(&mut self, timeout: Duration) -> Option<char> {
        let window = self.window.as_mut()?;
        let deadline = Instant::now() + timeout;
        loop {
            if !window.is_open() {
                return Some(CLOSE_KEY);
            }
            if let Some(&key) = window.get_keys_pressed(KeyRepeat::No).first() {
                return Some(key_char(key));
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            std::thread::sleep((deadline - now).min(POLL_INTERVAL));
            window.update();
        }
    }

    fn close(&mut self) {
        if self.window.take().is_some() {
            log::debug!("Window closed");
        }
    }
}
