//! Error taxonomy for the pipeline components.
//!
//! Library code returns [`Result`]; the CLI wraps these in `anyhow` with
//! command-level context. Each variant maps to one failure class of the
//! pipeline so callers can tell a dead endpoint from an empty collection
//! or a model that produced garbage.

/// Errors raised by the store, embedding, generation, and feedback layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport or authentication failure reaching an external service.
    #[error("connection to {service} failed: {message}")]
    Connection { service: String, message: String },

    /// A retrieval that required a hit found nothing.
    #[error("no results in collection '{collection}' for query '{query}'")]
    EmptyResult { collection: String, query: String },

    /// The collection already exists and the schema policy forbids reuse.
    #[error("collection '{0}' already exists (schema policy is 'fail')")]
    SchemaConflict(String),

    /// Read or write against a collection that was never initialized.
    #[error("collection '{0}' does not exist; run `testgen init` first")]
    UnknownCollection(String),

    /// The embedding provider rejected the request or answered malformed JSON.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The chat provider rejected the request or answered malformed JSON.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Generated unit tests did not pass validation.
    #[error("generated output rejected after {attempts} attempt(s): {reason}")]
    InvalidOutput { attempts: u32, reason: String },

    /// The test report could not be read or parsed.
    #[error("invalid test report: {0}")]
    Report(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// The remote store answered but refused the request.
    #[error("{service} rejected the request: {message}")]
    StoreApi { service: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn connection(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Connection {
            service: service.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_message_names_collection_and_query() {
        let err = Error::EmptyResult {
            collection: "CodeFiles".into(),
            query: "calculate_discounted_price".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("CodeFiles"));
        assert!(msg.contains("calculate_discounted_price"));
    }

    #[test]
    fn test_connection_helper() {
        let err = Error::connection("weaviate", "refused");
        assert_eq!(err.to_string(), "connection to weaviate failed: refused");
    }
}
