//! Domain layer of the ledgerbox sync backend.

pub mod auth;
pub mod entities;
pub mod errors;
pub mod sync;
pub mod utils;

pub use errors::{DatabaseError, Error, Result};
