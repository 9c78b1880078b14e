use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Item not found: {what}")]
    NotFound { what: String },

    #[error("Failed to launch '{program}': {reason}")]
    LaunchError { program: String, reason: String },

    #[error("Service at {url} not reachable within {timeout_secs}s")]
    Unreachable { url: String, timeout_secs: u64 },

    #[error("Invalid state transition: {message}")]
    InvalidState { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Process,
    Configuration,
    Request,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SimError {
    pub fn validation(message: impl Into<String>) -> Self {
        SimError::ValidationError {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        SimError::NotFound { what: what.into() }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        SimError::InvalidState {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SimError::HttpError(_) | SimError::Unreachable { .. } => ErrorCategory::Network,
            SimError::LaunchError { .. } => ErrorCategory::Process,
            SimError::ConfigError { .. }
            | SimError::ConfigValidationError { .. }
            | SimError::InvalidConfigValueError { .. }
            | SimError::MissingConfigError { .. } => ErrorCategory::Configuration,
            SimError::ValidationError { .. }
            | SimError::NotFound { .. }
            | SimError::InvalidState { .. }
            | SimError::SerializationError(_) => ErrorCategory::Request,
            SimError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SimError::NotFound { .. } => ErrorSeverity::Low,
            SimError::HttpError(_) | SimError::Unreachable { .. } => ErrorSeverity::Medium,
            SimError::ValidationError { .. }
            | SimError::InvalidState { .. }
            | SimError::SerializationError(_)
            | SimError::ConfigError { .. }
            | SimError::ConfigValidationError { .. }
            | SimError::InvalidConfigValueError { .. }
            | SimError::MissingConfigError { .. } => ErrorSeverity::High,
            SimError::LaunchError { .. } | SimError::IoError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => {
                "Check that the service is running and the host/port are correct"
            }
            ErrorCategory::Process => {
                "Check that the simultons binary exists and the port is free"
            }
            ErrorCategory::Configuration => "Review the configuration file and CLI flags",
            ErrorCategory::Request => "Fix the request body or the target id and retry",
            ErrorCategory::System => "Check file permissions and available system resources",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            SimError::Unreachable { url, .. } => format!("Cannot reach {}", url),
            SimError::LaunchError { program, .. } => format!("Could not start {}", program),
            SimError::NotFound { .. } => "Item not found".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
