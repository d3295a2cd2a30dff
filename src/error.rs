//! Unified infrastructure error type.

/// The error type returned by bindery's fallible server operations.
///
/// Request-level failures (bad input, failed validation, serialization
/// trouble) are never surfaced as `Error`s: the pipeline turns them into a
/// rendered response. This type covers binding to a port and accepting
/// connections.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
