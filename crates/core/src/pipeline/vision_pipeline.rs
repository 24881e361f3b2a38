use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use super::pipeline_state::PipelineState;
use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::capture::domain::frame_source::FrameSource;
use crate::detection::domain::face_detector::{ClassifierLoader, FaceDetector};
use crate::display::domain::frame_display::FrameDisplay;
use crate::shared::constants::{DEFAULT_DEVICE_INDEX, KEY_POLL_TIMEOUT_MS, WINDOW_TITLE};
use crate::storage::sample_store::{SampleStore, SaveOutcome};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to load face classifier: {0}")]
    ModelLoad(String),
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("failed to read frame: {0}")]
    FrameRead(String),
    #[error("face detection failed: {0}")]
    Detection(String),
    #[error("failed to annotate frame: {0}")]
    Annotation(String),
    #[error("display error: {0}")]
    Display(String),
}

/// Requests a running pipeline to stop from any thread.
///
/// Checked once per loop iteration, so the loop exits after the frame in
/// flight.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    KeyPressed(char),
    Stopped,
}

/// Counters for one `start` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Non-empty frames that went through detection and rendering.
    pub frames: usize,
    pub detections: usize,
    pub samples_saved: usize,
    pub reason: StopReason,
}

/// Closes the display and releases the frame source when dropped.
struct Session<'a> {
    source: &'a mut Box<dyn FrameSource>,
    display: &'a mut Box<dyn FrameDisplay>,
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.display.close();
        self.source.close();
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Capture → detect → save → annotate → render loop.
///
/// Frames with at least one detection are offered to the [`SampleStore`]
/// before annotation, so stored samples never carry boxes or labels. The
/// classifier is loaded on the first `start` and reused afterwards.
pub struct VisionPipeline {
    source: Box<dyn FrameSource>,
    display: Box<dyn FrameDisplay>,
    loader: Box<dyn ClassifierLoader>,
    detector: Option<Box<dyn FaceDetector>>,
    store: SampleStore,
    annotator: Box<dyn FrameAnnotator>,
    logger: Box<dyn PipelineLogger>,
    device_index: u32,
    window_title: String,
    key_timeout: Duration,
    state: PipelineState,
    stop: StopHandle,
}

impl VisionPipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        display: Box<dyn FrameDisplay>,
        loader: Box<dyn ClassifierLoader>,
        store: SampleStore,
        annotator: Box<dyn FrameAnnotator>,
    ) -> Self {
        Self {
            source,
            display,
            loader,
            detector: None,
            store,
            annotator,
            logger: Box::new(NullPipelineLogger),
            device_index: DEFAULT_DEVICE_INDEX,
            window_title: WINDOW_TITLE.to_string(),
            key_timeout: Duration::from_millis(KEY_POLL_TIMEOUT_MS),
            state: PipelineState::Idle,
            stop: StopHandle::default(),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_device_index(mut self, device_index: u32) -> Self {
        self.device_index = device_index;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn is_classifier_loaded(&self) -> bool {
        self.detector.is_some()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs the loop on the calling thread until the stream ends, a key is
    /// pressed, or a stop is requested. The frame source and display are
    /// released on every return path.
    ///
    /// A stop requested before this call is cleared.
    pub fn start(&mut self) -> Result<RunSummary, PipelineError> {
        self.stop.reset();
        self.state = PipelineState::Running;
        self.logger
            .info(&format!("Starting capture on device {}", self.device_index));

        let result = self.run();
        self.state = PipelineState::Stopped;

        match &result {
            Ok(summary) => self.logger.info(&format!(
                "Pipeline stopped ({:?}): {} frames, {} detections, {} samples saved",
                summary.reason, summary.frames, summary.detections, summary.samples_saved
            )),
            Err(e) => log::error!("Pipeline failed: {e}"),
        }
        self.logger.summary();
        result
    }

    /// Requests the loop to stop and releases the frame source. Idempotent.
    pub fn stop(&mut self) {
        self.stop.stop();
        self.source.close();
        if self.state != PipelineState::Idle {
            self.state = PipelineState::Stopped;
        }
    }

    fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let Self {
            source,
            display,
            loader,
            detector: detector_slot,
            store,
            annotator,
            logger,
            device_index,
            window_title,
            key_timeout,
            stop,
            ..
        } = self;

        let session = Session { source, display };

        if !session.source.is_open() {
            session
                .source
                .open(*device_index)
                .map_err(|e| PipelineError::DeviceUnavailable(e.to_string()))?;
        }
        session
            .display
            .open(window_title.as_str())
            .map_err(|e| PipelineError::Display(e.to_string()))?;

        let loaded = match detector_slot.take() {
            Some(d) => d,
            None => {
                let d = loader
                    .load()
                    .map_err(|e| PipelineError::ModelLoad(e.to_string()))?;
                logger.info("Face classifier loaded");
                d
            }
        };
        let detector: &dyn FaceDetector = &**detector_slot.insert(loaded);

        let mut summary = RunSummary {
            frames: 0,
            detections: 0,
            samples_saved: 0,
            reason: StopReason::EndOfStream,
        };

        loop {
            if stop.is_stopped() {
                summary.reason = StopReason::Stopped;
                break;
            }

            let t = Instant::now();
            let next = session
                .source
                .read_frame()
                .map_err(|e| PipelineError::FrameRead(e.to_string()))?;
            logger.timing("read", elapsed_ms(t));

            let Some(mut frame) = next else { break };
            if frame.is_empty() {
                log::debug!("Skipping empty frame {}", frame.index());
                continue;
            }

            let t = Instant::now();
            let detections = detector
                .detect(&frame)
                .map_err(|e| PipelineError::Detection(e.to_string()))?;
            logger.timing("detect", elapsed_ms(t));
            logger.metric("faces", detections.len() as f64);

            if !detections.is_empty() {
                let t = Instant::now();
                if let SaveOutcome::Saved(_) = store.save(&frame) {
                    summary.samples_saved += 1;
                }
                logger.timing("save", elapsed_ms(t));

                let t = Instant::now();
                annotator
                    .annotate(&mut frame, &detections)
                    .map_err(|e| PipelineError::Annotation(e.to_string()))?;
                logger.timing("annotate", elapsed_ms(t));
            }

            let t = Instant::now();
            session
                .display
                .render(&frame)
                .map_err(|e| PipelineError::Display(e.to_string()))?;
            logger.timing("render", elapsed_ms(t));

            summary.frames += 1;
            summary.detections += detections.len();
            logger.progress(summary.frames);

            if let Some(key) = session.display.wait_key(*key_timeout) {
                summary.reason = StopReason::KeyPressed(key);
                break;
            }
        }

        Ok(summary)
    }
}
