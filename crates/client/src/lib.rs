//! Network client for harbor.
//!
//! This crate provides the reqwest-backed implementation of the engine's
//! `Network` seam used by the proxy server.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig};
