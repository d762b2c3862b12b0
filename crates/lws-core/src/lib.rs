//! # lws-core
//! Result type, error taxonomy, fixed-width records, domain types and
//! read-time crypto for the light-wallet server.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod record;
pub mod types;

pub use error::{Error, Expect, ExpectExt};
