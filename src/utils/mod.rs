//! Utility functions

mod format;
mod sanitize;

pub use format::format_duration;
pub use sanitize::sanitize_filename;
