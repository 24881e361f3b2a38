use std::time::Instant;

/// Cross-cutting logger for pipeline loop events.
///
/// Keeps the loop free of output concerns: the CLI reports throttled
/// progress and a timing summary, tests discard everything.
pub trait PipelineLogger: Send {
    /// Report how many frames the loop has processed so far.
    fn progress(&mut self, frames: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a per-frame metric (e.g. face count).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _frames: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Logger for the CLI. Collects per-stage timings and metrics and logs
/// progress every `throttle_frames` frames.
///
/// Stages and metrics are reported in the order they were first recorded,
/// which for the loop is read, detect, save, annotate, render.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    timings: Vec<(String, Vec<f64>)>,
    metrics: Vec<(String, Vec<f64>)>,
    start_time: Instant,
    frames: usize,
}

fn record(series: &mut Vec<(String, Vec<f64>)>, name: &str, value: f64) {
    match series.iter_mut().find(|(n, _)| n == name) {
        Some((_, values)) => values.push(value),
        None => series.push((name.to_string(), vec![value])),
    }
}

fn lookup<'a>(series: &'a [(String, Vec<f64>)], name: &str) -> Option<&'a [f64]> {
    series
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_slice())
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: Vec::new(),
            metrics: Vec::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    /// Returns the formatted summary string, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.frames;
        let mut lines = vec![format!(
            "Pipeline summary ({frames} frames, {:.1}s total):",
            elapsed_ms / 1000.0
        )];

        for (stage, durations) in &self.timings {
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = mean(durations);
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({pct:4.1}%)"
            ));
        }

        for (name, values) in &self.metrics {
            let total: f64 = values.iter().sum();
            lines.push(format!("  {name}: avg {:.1}, total {total:.0}", mean(values)));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        lookup(&self.timings, stage)
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        lookup(&self.metrics, name)
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, frames: usize) {
        self.frames = frames;
        if frames > 0 && frames % self.throttle_frames == 0 {
            let faces: f64 = lookup(&self.metrics, "faces")
                .map(|v| v.iter().sum())
                .unwrap_or(0.0);
            log::info!("Processed {frames} frames, {faces:.0} faces detected");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        record(&mut self.timings, stage, duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        record(&mut self.metrics, name, value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
