use thiserror::Error;

/// Failures raised while reading the captured provisioning outputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("output '{name}' was not produced by the provisioning step")]
    MissingOutput { name: String },

    #[error("output '{name}' is a {actual}, expected a {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("output '{output}' has no entry for key '{key}'")]
    MissingKey { output: String, key: String },

    #[error("output '{output}' has unexpected key '{key}'")]
    UnexpectedKey { output: String, key: String },

    #[error("malformed provisioning output: {0}")]
    Malformed(String),
}
