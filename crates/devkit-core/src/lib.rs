pub mod config;
pub mod error;
pub mod format;
pub mod hooks;
pub mod io;
pub mod paths;
pub mod queue;

pub use error::{DevkitError, Result};
