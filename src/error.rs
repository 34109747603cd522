//! Error taxonomy shared by the auth, catalog, and pipeline layers.

use thiserror::Error;

/// Failures that abort an enrichment run or an auth operation.
///
/// Unreadable or malformed stored credentials are not part of this
/// enum: `TokenStore::load` reports them as `CredentialLoad::Absent` instead.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// The input table lacks one or more of the required identity columns.
    #[error("input is missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },
    /// Token exchange or refresh did not yield a usable access token.
    #[error("token exchange failed: {0}")]
    AuthExchange(String),
    /// The consent step could not produce an authorization code.
    #[error("authorization consent failed: {0}")]
    Consent(String),
    /// Network or API failure during a catalog request.
    #[error("catalog request failed: {0}")]
    Request(String),
    /// A catalog response was missing a field the client relies on.
    #[error("malformed catalog response: {0}")]
    MalformedResponse(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("table error on {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

impl EnrichError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn csv(path: &std::path::Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EnrichError>;
