pub mod azure;
pub mod driver;
pub mod error;
pub mod stage;
pub mod terraform;
mod token;

pub use azure::{AzureVerifier, AzureVerifierConfig};
pub use driver::{ProviderVerifier, ProvisionOptions, Provisioner};
pub use error::DriverError;
pub use stage::stage_working_copy;
pub use terraform::TerraformBackend;
