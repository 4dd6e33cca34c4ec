pub mod common;
pub mod completions;
pub mod mapping;
pub mod status;
pub mod sync;
pub mod task;
