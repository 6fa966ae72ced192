//! Shared types and models for the Stockroom inventory system
//!
//! This crate contains types shared between the backend, the browser client (via WASM),
//! and other components of the system.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
