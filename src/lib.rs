pub mod api;
pub mod core;
pub mod error;
pub mod format;
pub mod logging;
pub mod report;
