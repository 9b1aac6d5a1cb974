// kiln-net/src/lib.rs
pub mod http;
pub mod validation;

pub use http::{build_http_client, fetch_formula_source};
pub use validation::{compute_digest, validate_url, verify_checksum};
