//! Bearer token verification against hashed session records.

mod token_verifier;

pub use token_verifier::*;
