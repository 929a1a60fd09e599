//! Tether: an identity-network command shell.
//!
//! The crate resolves loosely-specified names onto exactly one stored
//! entity (an invitation link, an offered claim, or a claim proof request),
//! drives links through a synchronize → verify → accept lifecycle against a
//! remote peer, and reconciles asynchronous ledger replies with the
//! commands that triggered them.

pub mod agent;
pub mod claim;
pub mod client;
pub mod context;
pub mod correlate;
pub mod home;
pub mod link;
pub mod matching;
pub mod output;
pub mod session;
pub mod shell;
pub mod wallet;
