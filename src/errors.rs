use thiserror::Error;

/// Failures reported by a venue adapter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VenueError {
    /// Expected element or control is not on screen
    #[error("not found: {0}")]
    NotFound(String),
    /// Bounded wait for an element expired
    #[error("timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },
    /// Control is present but cannot be activated
    #[error("control disabled: {0}")]
    Disabled(String),
    /// Text was present but not numeric
    #[error("could not parse {what} from {text:?}")]
    Unparseable { what: String, text: String },
    #[error("unexpected venue error: {0}")]
    Unexpected(String),
}

impl VenueError {
    /// True for the absent/timed-out/disabled family
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VenueError::NotFound(_) | VenueError::Timeout { .. } | VenueError::Disabled(_)
        )
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
