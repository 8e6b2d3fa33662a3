// ⚠️ Error Taxonomy
// Scrape failures and persistence failures are fatal to a run.
// Unmatched stores are not errors at all: they are logged and skipped.

use thiserror::Error;

// ============================================================================
// SCRAPE ERROR
// ============================================================================

/// The external ranking source could not be read or understood.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Source unreachable (network, file, HTTP status)
    #[error("ranking source unreachable: {0}")]
    Unreachable(String),

    /// Page was fetched but has no recognizable trends table
    #[error("unrecognized page structure: {0}")]
    UnrecognizedStructure(String),
}

// ============================================================================
// PIPELINE ERROR
// ============================================================================

/// Failure of a whole reconciliation run.
///
/// `Display` is the generic message shown to whoever triggered the run;
/// the detailed cause is available through `source()` and is logged.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ranking update failed")]
    Scrape(#[source] ScrapeError),

    #[error("ranking update failed")]
    Persistence {
        #[source]
        source: anyhow::Error,
        /// Points attempted before the batch was rolled back
        partial_count: usize,
    },
}

impl PipelineError {
    /// Detailed cause, for server-side logs and the fetch log entry
    pub fn detail(&self) -> String {
        match self {
            PipelineError::Scrape(e) => e.to_string(),
            PipelineError::Persistence { source, .. } => format!("{:#}", source),
        }
    }

    /// Best-known count of points handled before the failure
    pub fn partial_count(&self) -> usize {
        match self {
            PipelineError::Scrape(_) => 0,
            PipelineError::Persistence { partial_count, .. } => *partial_count,
        }
    }
}

// ============================================================================
// CONFIG ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read roster file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse roster file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid roster: {0}")]
    Invalid(String),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}
