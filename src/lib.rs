//! Notify Bridge, policy-gated notification orchestration.

pub mod channels;
pub mod config;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod policy;
pub mod server;

#[cfg(test)]
mod testing;
