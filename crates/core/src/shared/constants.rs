pub const CASCADE_MODEL_NAME: &str = "haarcascade_frontalface_alt2.xml";
pub const CASCADE_MODEL_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_alt2.xml";

/// Directory shipped next to the core crate that may hold the cascade file.
pub const BUNDLED_CASCADE_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/cascades");

/// Application folder name under the platform cache/config/data dirs.
pub const APP_DIR_NAME: &str = "Facecap";

/// Camera index opened when none is configured.
pub const DEFAULT_DEVICE_INDEX: u32 = 0;

/// Maximum number of sample frames kept on disk.
pub const SAMPLE_CAPACITY: usize = 20;
pub const SAMPLE_EXTENSION: &str = "jpg";

/// Label drawn above every detection.
pub const DETECTION_LABEL: &str = "HUMAN";

pub const WINDOW_TITLE: &str = "facecap";

/// How long the display is polled for a key each iteration.
pub const KEY_POLL_TIMEOUT_MS: u64 = 1;
