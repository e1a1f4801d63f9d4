use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("provision failed: {0}")]
    ProvisionFailed(String),

    #[error("teardown failed: {0}")]
    TeardownFailed(String),

    #[error("reading outputs failed: {0}")]
    Output(#[from] tfverify_domain::OutputError),

    #[error("staging working copy failed: {0}")]
    Staging(String),

    #[error("no subscription given and ARM_SUBSCRIPTION_ID is not set")]
    SubscriptionUnresolved,

    #[error("provider query failed: {0}")]
    Provider(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}
