//! HTTP API and process wiring for the dispatch backend.

pub mod app;
pub mod config;
pub mod middleware;
pub mod runtime;
