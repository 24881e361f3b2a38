pub mod headless_display;
#[cfg(feature = "window")]
pub mod window_display;
