//! Service error taxonomy

use lexica_kg::StoreError;
use thiserror::Error;

/// Failure of the generation collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// The attempt exceeded its time budget
    #[error("generation timed out after {secs}s ({provider})")]
    Timeout { provider: String, secs: u64 },

    /// The provider ran but reported failure
    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    /// The provider answered with something that is not a page
    #[error("provider {provider} returned an invalid response: {message}")]
    InvalidResponse { provider: String, message: String },

    /// No strategy is configured
    #[error("no generation providers configured")]
    NoProviders,

    /// Every strategy failed; one entry per attempt, in order
    #[error("all {} provider(s) failed: {}", .0.len(), .0.join("; "))]
    Exhausted(Vec<String>),
}

/// Service-level error
#[derive(Error, Debug)]
pub enum LexicaError {
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or invalid settings, e.g. an absent scheduler secret
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Another regeneration of the slug is running
    #[error("Regeneration already in progress for {0}")]
    InFlight(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The job queue is closed or a worker dropped its result
    #[error("Job error: {0}")]
    Job(String),
}

pub type Result<T> = std::result::Result<T, LexicaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_lists_attempts() {
        let error = GenerationError::Exhausted(vec![
            "sonnet: timed out".to_string(),
            "haiku: exit 1".to_string(),
        ]);
        let rendered = error.to_string();
        assert!(rendered.starts_with("all 2 provider(s) failed"));
        assert!(rendered.contains("haiku: exit 1"));
    }

    #[test]
    fn test_conversions() {
        let error: LexicaError = GenerationError::NoProviders.into();
        assert!(matches!(error, LexicaError::Generation(_)));

        let error: LexicaError = StoreError::QueryError("boom".to_string()).into();
        assert!(error.to_string().contains("boom"));
    }
}
