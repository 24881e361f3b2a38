pub mod detection_params;
pub mod face_detector;
pub mod rect_grouper;
