// kiln-core/src/check/mod.rs
pub mod smoke;

pub use self::smoke::{verify, verify_default};
