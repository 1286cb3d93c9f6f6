//! Retrieving and decoding RSS/Atom feeds.
//!
//! - [`fetcher`] - HTTP client, timeout and body size cap
//! - [`detect`] - RSS/Atom sniffing on the raw body
//! - [`parser`] - XML decoding into [`NewEntry`](crate::storage::NewEntry) values
//!
//! Nothing here touches the store; [`crate::sync`] ties the pieces together.

pub mod detect;
pub mod fetcher;
pub mod parser;

pub use detect::detect_format;
pub use fetcher::{build_client, fetch_feed, FetchError, USER_AGENT};
pub use parser::{parse_feed, ParseError, ParseErrorKind};
