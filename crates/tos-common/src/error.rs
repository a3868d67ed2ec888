/// Error types shared across the monitor crates.
///
/// These errors represent failures in infrastructure components (embedding model) that are
/// independent of the change-detection domain. Application-specific errors should be defined
/// in each binary crate and wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("embedding error: {0}")]
    Embedding(String),
}
