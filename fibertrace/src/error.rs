//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::matching::MatchError;

/// Fatal failures while tracing one frame.
///
/// Data-quality conditions never appear here; they are logged and encoded
/// in the output (empty `fitparms`, dropped peaks). Everything below
/// aborts the image.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Match(#[from] MatchError),
}
