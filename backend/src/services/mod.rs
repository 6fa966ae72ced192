//! Business logic services for the Stockroom backend

pub mod product;
pub mod purchase;

pub use product::ProductService;
pub use purchase::PurchaseService;
