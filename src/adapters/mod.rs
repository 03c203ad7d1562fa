//! Adapters Layer
//!
//! Inbound adapters expose the agent over HTTP. Outbound adapters implement
//! the domain ports: package building, authentication, HTTP transport and
//! queue storage.

pub mod inbound;
pub mod outbound;
