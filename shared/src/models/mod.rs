//! Domain models for the Stockroom inventory system

mod product;
mod purchase;
mod supplier;

pub use product::*;
pub use purchase::*;
pub use supplier::*;
