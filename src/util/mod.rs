//! Small helpers shared by the store, the enrichment client and the CLI.

mod text;
mod url_validator;

pub use text::{strip_control_chars, truncate_chars, truncate_to_width};
pub use url_validator::{validate_url, UrlValidationError};
