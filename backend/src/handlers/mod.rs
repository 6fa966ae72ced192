//! HTTP request handlers

pub mod health;
pub mod product;
pub mod purchase;

pub use health::*;
pub use product::*;
pub use purchase::*;
