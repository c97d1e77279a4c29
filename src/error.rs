use std::collections::TryReserveError;

use thiserror::Error;

/// Recoverable failures of the storage engine.
///
/// Precondition violations are programmer errors and panic instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A container could not grow.
    #[error("cannot reserve memory: {0}")]
    Reserve(#[from] TryReserveError),

    /// All indices representable by the identifier type are in use.
    #[error("all {limit} indices of {ty} are in use")]
    Exhausted {
        /// The identifier type.
        ty:    &'static str,
        /// The number of usable indices.
        limit: usize,
    },
}
