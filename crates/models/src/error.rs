use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorShape {
    pub error_message: String,
    pub error_type: String,
}

#[derive(Error, Debug)]
pub enum PolioError {
    #[error("Request to {source_name} failed: {reason}")]
    UpstreamRequest { source_name: String, reason: String },

    #[error("No 'features' key in GeoJSON response from {source_name}")]
    MissingFeatures { source_name: String },

    #[error("Data source is empty: {source_name}")]
    EmptySource { source_name: String },

    #[error("Build context not usable: {reason}")]
    InvalidContext { reason: String },

    #[error("Missing file in build context: {path}")]
    MissingContextFile { path: String },

    #[error("Invalid container descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("Image does not match its descriptor: {}", mismatches.join("; "))]
    ImageContractMismatch { mismatches: Vec<String> },

    #[error("Docker error: {message}")]
    DockerError { message: String },

    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("Internal server error: {reason}")]
    InternalError { reason: String },
}

impl PolioError {
    pub fn to_error_shape(&self) -> ErrorShape {
        ErrorShape {
            error_message: self.to_string(),
            error_type: self.error_type().to_string(),
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            PolioError::UpstreamRequest { .. } => "UpstreamError",
            PolioError::MissingFeatures { .. } => "UpstreamError",
            PolioError::EmptySource { .. } => "UpstreamError",
            PolioError::InvalidContext { .. } => "BuildError",
            PolioError::MissingContextFile { .. } => "BuildError",
            PolioError::InvalidDescriptor { .. } => "BuildError",
            PolioError::ImageContractMismatch { .. } => "BuildError",
            PolioError::DockerError { .. } => "ServiceException",
            PolioError::ConfigError { .. } => "ServiceException",
            PolioError::InternalError { .. } => "ServiceException",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            PolioError::UpstreamRequest { .. } => 502,
            PolioError::MissingFeatures { .. } => 502,
            PolioError::EmptySource { .. } => 502,
            PolioError::InvalidContext { .. } => 400,
            PolioError::MissingContextFile { .. } => 400,
            PolioError::InvalidDescriptor { .. } => 400,
            PolioError::ImageContractMismatch { .. } => 409,
            PolioError::DockerError { .. } => 500,
            PolioError::ConfigError { .. } => 500,
            PolioError::InternalError { .. } => 500,
        }
    }

    /// True for failures that came from an upstream data source.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            PolioError::UpstreamRequest { .. }
                | PolioError::MissingFeatures { .. }
                | PolioError::EmptySource { .. }
        )
    }
}
