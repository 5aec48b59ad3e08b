//! Error taxonomy shared by every pipeline stage.
//!
//! All stages return [`Result<T>`](Result) with a [`PipelineError`]. The variants
//! mirror how an operator resolves them: configuration errors are fixed in the
//! document, artifact errors by re-running the upstream stage, schema errors by
//! fixing the data, model errors by inspecting the named family.
//!
//! Errors are serializable (`{code, message}`) so a driver can emit them as
//! machine-readable diagnostics.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the forecasting pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The configuration document could not be read or parsed.
    #[error("Failed to load configuration '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    /// A required configuration key is absent.
    #[error("Missing configuration key '{path}'")]
    ConfigMissingKey { path: String },

    /// A configuration value has the wrong type.
    #[error("Configuration key '{path}' must be {expected}, found {found}")]
    ConfigTypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A configuration value has the right type but an unusable value.
    #[error("Invalid configuration '{path}': {reason}")]
    InvalidConfig { path: String, reason: String },

    /// An input artifact does not exist.
    #[error("Artifact not found: {path}")]
    ArtifactNotFound { path: String },

    /// An artifact exists but its content cannot be decoded.
    #[error("Artifact '{path}' is corrupt: {reason}")]
    ArtifactCorrupt { path: String, reason: String },

    /// A dataset lacks an expected column or violates a column invariant.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// A categorical value was not seen when the encoding was fitted.
    #[error("Unknown category '{value}' in column '{column}'")]
    UnknownCategory { column: String, value: String },

    /// Not enough rows to carry out the operation.
    #[error("Insufficient rows: {0}")]
    InsufficientRows(String),

    /// A model family failed to fit, predict or persist.
    #[error("Model '{family}' failed: {reason}")]
    ModelFailed { family: String, reason: String },

    /// An artifact names a model family the registry cannot restore.
    #[error("Unknown model family '{0}'")]
    UnknownModelFamily(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Wrap this error as the failure of a model family.
    ///
    /// Errors that already name a family are returned untouched.
    pub fn for_family(self, family: &str) -> Self {
        match self {
            Self::ModelFailed { .. } => self,
            other => Self::ModelFailed {
                family: family.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Stable error code for diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigLoad { .. } => "CONFIG_LOAD",
            Self::ConfigMissingKey { .. } => "CONFIG_MISSING_KEY",
            Self::ConfigTypeMismatch { .. } => "CONFIG_TYPE_MISMATCH",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::ArtifactNotFound { .. } => "ARTIFACT_NOT_FOUND",
            Self::ArtifactCorrupt { .. } => "ARTIFACT_CORRUPT",
            Self::SchemaViolation(_) => "SCHEMA_VIOLATION",
            Self::UnknownCategory { .. } => "UNKNOWN_CATEGORY",
            Self::InsufficientRows(_) => "INSUFFICIENT_ROWS",
            Self::ModelFailed { .. } => "MODEL_FAILED",
            Self::UnknownModelFamily(_) => "UNKNOWN_MODEL_FAMILY",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Process exit status for a stage that failed with this error.
    ///
    /// - `2`: configuration errors
    /// - `3`: missing or corrupt artifacts
    /// - `4`: schema and category errors
    /// - `5`: model family failures
    /// - `1`: everything else
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigLoad { .. }
            | Self::ConfigMissingKey { .. }
            | Self::ConfigTypeMismatch { .. }
            | Self::InvalidConfig { .. } => 2,
            Self::ArtifactNotFound { .. } | Self::ArtifactCorrupt { .. } => 3,
            Self::SchemaViolation(_) | Self::UnknownCategory { .. } | Self::InsufficientRows(_) => 4,
            Self::ModelFailed { .. } | Self::UnknownModelFamily(_) => 5,
            Self::Io(_) | Self::Polars(_) | Self::Json(_) | Self::Yaml(_) => 1,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }

    /// The innermost error, with every context layer removed.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a configuration error (never retried).
    pub fn is_config_error(&self) -> bool {
        matches!(
            self.root(),
            Self::ConfigLoad { .. }
                | Self::ConfigMissingKey { .. }
                | Self::ConfigTypeMismatch { .. }
                | Self::InvalidConfig { .. }
        )
    }
}

/// Serialize as a struct with `code` and `message` fields.
impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}
