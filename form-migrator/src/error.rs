//! Error types for form migration

use helpdesk_client::ClientError;
use thiserror::Error;

/// Errors that abort a migration run
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("failed to fetch source form {form_id}: {source}")]
    SourceForm {
        form_id: u64,
        #[source]
        source: ClientError,
    },

    #[error("failed to list {resource} in {account}: {source}")]
    Listing {
        resource: &'static str,
        account: String,
        #[source]
        source: ClientError,
    },

    #[error("ambiguous field titles: {}", titles.join(", "))]
    AmbiguousTitle { titles: Vec<String> },

    #[error("failed to create form '{name}': {source}")]
    FormCreation {
        name: String,
        #[source]
        source: ClientError,
    },
}

impl MigrationError {
    /// Wrap a listing failure with the resource and account it concerned
    pub fn listing(resource: &'static str, account: &str, source: ClientError) -> Self {
        MigrationError::Listing {
            resource,
            account: account.to_string(),
            source,
        }
    }
}

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, MigrationError>;
