pub mod domain;
pub mod infrastructure;
pub mod sample_store;
