//! HTTP API for the nominal roll: configuration, auth middleware, routing.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
