pub mod assertions;
pub mod cases;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod report;

#[cfg(test)]
mod testing;

pub use assertions::AssertionSet;
pub use cases::{builtin_cases, BUILTIN_CASE_NAMES};
pub use context::{SuiteContext, TestCase};
pub use error::{CaseError, HarnessError};
pub use lifecycle::{Environment, Suite};
pub use report::{CaseReport, CaseStatus, SetupOutcome, SuiteReport, TeardownOutcome};
