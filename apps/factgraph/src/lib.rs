//! # factgraph
//!
//! Application layer over `factgraph-core`: the HTTP API, the CLI and the
//! layered configuration they share.

pub mod api;
pub mod cli;
pub mod config;
