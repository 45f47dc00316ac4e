// src/api/mod.rs
//! HTTP surface over the resolver and the refresh coordinator.

pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{router, ApiServer, ApiState};
