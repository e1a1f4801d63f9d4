use thiserror::Error;

use crate::report::TeardownOutcome;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Staging, apply or output capture failed. `cleanup` tells whether the
    /// partial environment was destroyed.
    #[error("setup failed: {cause}")]
    Setup {
        cause: String,
        cleanup: TeardownOutcome,
    },
}

/// Why a test case stopped before finishing.
#[derive(Debug, Error)]
pub enum CaseError {
    #[error(transparent)]
    Output(#[from] tfverify_domain::OutputError),

    #[error("provider error: {0}")]
    Driver(#[from] tfverify_driver::DriverError),

    #[error("bad expectation: {0}")]
    Expectation(String),
}
