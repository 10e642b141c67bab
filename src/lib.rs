pub mod approval;
pub mod config;
pub mod errors;
pub mod generation;
pub mod logging;
pub mod memory;
pub mod pipeline;
pub mod quill_config;
pub mod store;
pub mod ui;
pub mod util;
pub mod writer;
