use thiserror::Error;

use crate::feed::{FetchError, ParseError};
use crate::storage::DatabaseError;
use crate::util::UrlValidationError;

/// Errors surfaced by the library's operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid feed URL {url:?}")]
    InvalidUrl {
        url: String,
        #[source]
        source: UrlValidationError,
    },

    #[error(transparent)]
    Transport(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] DatabaseError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
