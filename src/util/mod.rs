//! Argument and URL validation shared by the CLI and the sync orchestrator.

mod ids;
mod url_validator;

pub use ids::parse_ids;
pub use url_validator::{validate_url, UrlValidationError};
