//! Payment-gated greeting card client.
//!
//! Provides the card generation REST client, wallet payment
//! authorization, job submission, the polling lifecycle tracker with its
//! broadcast events, and client-side storage of ancillary access grants.

pub mod access;
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod flow;
pub mod messages;
pub mod payment;
pub mod signer;
pub mod submitter;
pub mod tracker;
