pub mod pipeline_logger;
pub mod pipeline_state;
pub mod vision_pipeline;
