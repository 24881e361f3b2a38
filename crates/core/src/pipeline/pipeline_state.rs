/// Lifecycle of a [`VisionPipeline`](super::vision_pipeline::VisionPipeline).
///
/// `Idle` until the first `start`, `Running` while the loop runs, `Stopped`
/// after any exit. A stopped pipeline may be started again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    Idle,
    Running,
    Stopped,
}
