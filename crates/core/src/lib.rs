//! Domain types and pure logic for payment-gated greeting card generation.
//!
//! Nothing in this crate performs I/O.  Network access, timers and the
//! payment signer live in `greetcard-client`.

pub mod error;
pub mod job;
pub mod money;
pub mod progress;
pub mod request;
pub mod types;
