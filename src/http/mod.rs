//! HTTP adapter in front of the flood control gate.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{router, RATELIMIT_REMAINING};
