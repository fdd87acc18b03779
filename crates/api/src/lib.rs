//! HTTP API: podcast submission endpoint, routing, and request/response mapping.

pub mod app;
pub mod middleware;
