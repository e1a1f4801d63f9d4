mod raw;
mod loader;
pub mod error;

pub use loader::{load_suite, parse_suite};
pub use error::ConfigError;
