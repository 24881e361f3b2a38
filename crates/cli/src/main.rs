mod settings;

use std::io::BufRead;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use crossbeam_channel::Sender;

use facecap_core::annotation::infrastructure::box_annotator::BoxAnnotator;
use facecap_core::capture::infrastructure::ffmpeg_frame_source::{CaptureTarget, FfmpegFrameSource};
use facecap_core::detection::domain::detection_params::DetectionParams;
use facecap_core::detection::infrastructure::cascade_loader::CascadeLoader;
use facecap_core::display::domain::frame_display::FrameDisplay;
use facecap_core::display::infrastructure::headless_display::HeadlessDisplay;
#[cfg(feature = "window")]
use facecap_core::display::infrastructure::window_display::WindowDisplay;
use facecap_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use facecap_core::pipeline::vision_pipeline::{StopReason, VisionPipeline};
use facecap_core::shared::constants::CASCADE_MODEL_NAME;
use facecap_core::storage::infrastructure::image_file_writer::ImageFileWriter;
use facecap_core::storage::sample_store::SampleStore;

use settings::Settings;

/// Detect faces from a camera and keep a small set of sample frames.
#[derive(Parser)]
#[command(name = "facecap")]
struct Cli {
    /// Camera device index.
    #[arg(long)]
    device: Option<u32>,

    /// Replay a recorded video instead of opening a camera.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Directory that receives image_1.jpg .. image_20.jpg.
    #[arg(long)]
    samples_dir: Option<PathBuf>,

    /// Run without a window. Enter on stdin stops the loop.
    #[arg(long)]
    headless: bool,

    /// Keep the latest annotated frame in this image file (headless only).
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Frames between preview updates.
    #[arg(long)]
    preview_every: Option<usize>,

    /// Store the effective device, samples directory and preview interval
    /// as the new defaults.
    #[arg(long)]
    save_settings: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = effective_settings(&cli, Settings::load());
    validate(&cli, &settings)?;

    if cli.save_settings {
        let path = settings.save()?;
        log::info!("Settings saved to {}", path.display());
    }

    let target = match &cli.input {
        Some(path) => CaptureTarget::File(path.clone()),
        None => CaptureTarget::Camera,
    };
    let source = FfmpegFrameSource::new(target);

    log::info!("Resolving model: {CASCADE_MODEL_NAME}");
    let loader = CascadeLoader::frontal_face(DetectionParams::default())
        .with_progress(download_progress);

    let display = build_display(&cli, &settings);
    let store = SampleStore::new(&settings.samples_dir, Box::new(ImageFileWriter::new()));

    let mut pipeline = VisionPipeline::new(
        Box::new(source),
        display,
        Box::new(loader),
        store,
        Box::new(BoxAnnotator::new()),
    )
    .with_logger(Box::new(StdoutPipelineLogger::default()))
    .with_device_index(settings.device_index);

    if cli.input.is_none() {
        let how = if uses_window(&cli) {
            "press any key in the window"
        } else {
            "press Enter"
        };
        eprintln!("Capturing from camera {}, {how} to stop", settings.device_index);
    }
    let summary = pipeline.start()?;

    let store = pipeline.store();
    match summary.reason {
        StopReason::EndOfStream => log::info!("End of stream"),
        StopReason::KeyPressed(_) | StopReason::Stopped => log::info!("Stopped by user"),
    }
    log::info!(
        "Saved {} new samples to {} ({}/{} stored)",
        summary.samples_saved,
        store.directory().display(),
        store.current_count(),
        store.capacity()
    );
    Ok(())
}

fn effective_settings(cli: &Cli, mut settings: Settings) -> Settings {
    if let Some(device) = cli.device {
        settings.device_index = device;
    }
    if let Some(dir) = &cli.samples_dir {
        settings.samples_dir = dir.clone();
    }
    if let Some(every) = cli.preview_every {
        settings.preview_every = every;
    }
    settings
}

fn uses_window(cli: &Cli) -> bool {
    cfg!(feature = "window") && !cli.headless
}

fn build_display(cli: &Cli, settings: &Settings) -> Box<dyn FrameDisplay> {
    #[cfg(feature = "window")]
    {
        if !cli.headless {
            return Box::new(WindowDisplay::new());
        }
    }

    let (key_tx, key_rx) = crossbeam_channel::bounded(1);
    spawn_key_reader(key_tx);
    let mut display = HeadlessDisplay::new().with_keys(key_rx);
    if let Some(preview) = &cli.preview {
        display = display.with_preview(
            preview,
            settings.preview_every,
            Box::new(ImageFileWriter::new()),
        );
    }
    Box::new(display)
}

fn validate(cli: &Cli, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(input) = &cli.input {
        if !input.exists() {
            return Err(format!("Input file not found: {}", input.display()).into());
        }
        if cli.device.is_some() {
            return Err("--device and --input are mutually exclusive".into());
        }
    }
    if cli.preview.is_some() && uses_window(cli) {
        return Err("--preview requires --headless".into());
    }
    if cli.preview.is_some() && settings.preview_every == 0 {
        return Err("Preview interval must be at least 1 frame".into());
    }
    if cli.preview_every.is_some() && cli.preview.is_none() {
        return Err("--preview-every requires --preview".into());
    }
    Ok(())
}

/// Any line on stdin (including an empty one) is a key press. A closed stdin
/// never stops the loop.
fn spawn_key_reader(keys: Sender<char>) {
    std::thread::spawn(move || {
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => {}
            Ok(_) => {
                let key = line.chars().next().unwrap_or('\n');
                let _ = keys.send(key);
            }
        }
    });
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
