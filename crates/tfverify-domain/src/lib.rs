pub mod error;
pub mod suite;
pub mod types;
mod tests;

pub use error::OutputError;
pub use suite::{Expectations, RetryPolicy, SuiteConfig, TerraformSettings};
pub use types::*;
