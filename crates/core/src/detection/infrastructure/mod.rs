pub mod cascade_face_detector;
pub mod cascade_loader;
pub mod haar_cascade;
mod integral_image;
pub mod model_resolver;
