use thiserror::Error;

use crate::parse::ParseError;

/// Error returned by the loading helpers such as
/// [`ProcessingState::from_sources()`](crate::ProcessingState::from_sources).
///
/// Validation and construction failures reach it through [`ParseError`],
/// which carries them with their source position. Hand-built rules and
/// pipelines report [`CheckError`](crate::CheckError) and
/// [`DefinitionError`](crate::DefinitionError) from their builders directly.
#[derive(Debug, Error)]
pub enum RulepipeError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error(transparent)]
    Config(#[from] crate::ConfigError),
}
