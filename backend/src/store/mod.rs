//! Transactional storage boundary
//!
//! Services talk to storage only through [`Store`] and the transactions it opens.
//! A uniqueness conflict is reported as [`StoreError::UniqueViolation`] so callers can
//! treat it as a recoverable "already exists" signal instead of a failure.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use shared::models::{
    NewPriceAlert, NewProduct, NewPurchaseHeader, NewPurchaseItem, NewStockMovement, NewSupplier,
    PriceAlert, Product, ProductChanges, PurchaseHeader, PurchaseItemDetail, PurchaseLineItem,
    PurchaseSummary, StockMovement, Supplier,
};
use shared::types::PriceAlertFilter;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Referenced {0} does not exist")]
    MissingReference(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                let constraint = db.constraint().unwrap_or("unique").to_string();
                return StoreError::UniqueViolation(constraint);
            }
            if db.is_foreign_key_violation() {
                let entity = referenced_entity(db.constraint().unwrap_or_default());
                return StoreError::MissingReference(entity.to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// Entity named by a foreign key constraint such as `purchase_items_product_id_fkey`
fn referenced_entity(constraint: &str) -> &'static str {
    if constraint.contains("product_id") {
        "Product"
    } else if constraint.contains("supplier_id") {
        "Supplier"
    } else if constraint.contains("purchase_item_id") {
        "Purchase item"
    } else if constraint.contains("purchase_id") {
        "Purchase"
    } else {
        "Record"
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to the shared relational store
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Tx: StoreTx;

    /// Open a new transaction
    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Check connectivity
    async fn ping(&self) -> StoreResult<()>;

    async fn get_product(&self, product_id: i64) -> StoreResult<Option<Product>>;

    /// Products, newest first
    async fn list_products(&self) -> StoreResult<Vec<Product>>;

    /// Products at or below their reorder threshold
    async fn low_stock_products(&self) -> StoreResult<Vec<Product>>;

    /// Suppliers by name
    async fn list_suppliers(&self) -> StoreResult<Vec<Supplier>>;

    /// Purchase headers with supplier names, newest first
    async fn list_purchases(&self) -> StoreResult<Vec<PurchaseSummary>>;

    /// Items of the given purchases in insertion order
    async fn purchase_item_details(
        &self,
        purchase_ids: &[i64],
    ) -> StoreResult<Vec<PurchaseItemDetail>>;

    /// Price alerts, newest first
    async fn list_price_alerts(&self, filter: &PriceAlertFilter) -> StoreResult<Vec<PriceAlert>>;

    /// Ledger entries of a product, oldest first
    async fn stock_movements(&self, product_id: i64) -> StoreResult<Vec<StockMovement>>;
}

/// A single unit of work. Dropping it without [`StoreTx::commit`] rolls it back.
#[async_trait]
pub trait StoreTx: Send {
    // Suppliers

    /// Insert a supplier; `UniqueViolation` when the name is taken
    async fn insert_supplier(&mut self, supplier: &NewSupplier) -> StoreResult<i64>;

    async fn find_supplier_id(&mut self, name: &str) -> StoreResult<Option<i64>>;

    // Purchase headers

    async fn find_purchase_by_invoice(
        &mut self,
        supplier_id: i64,
        invoice_number: &str,
    ) -> StoreResult<Option<PurchaseHeader>>;

    /// Insert a header; `UniqueViolation` when (supplier, invoice) exists
    async fn insert_purchase(&mut self, header: &NewPurchaseHeader) -> StoreResult<i64>;

    /// Set the invoice file only if the header has none yet
    async fn attach_invoice_file(&mut self, purchase_id: i64, path: &str) -> StoreResult<()>;

    async fn get_purchase(&mut self, purchase_id: i64) -> StoreResult<Option<PurchaseHeader>>;

    // Line items and ledger

    async fn insert_purchase_item(&mut self, item: &NewPurchaseItem)
        -> StoreResult<PurchaseLineItem>;

    async fn purchase_items(&mut self, purchase_id: i64) -> StoreResult<Vec<PurchaseLineItem>>;

    async fn insert_stock_movement(&mut self, movement: &NewStockMovement) -> StoreResult<i64>;

    /// Add `delta` to a product's stock and return the new value
    async fn adjust_stock(&mut self, product_id: i64, delta: i64) -> StoreResult<i64>;

    /// Unit price of the most recently inserted item for the product outside the given purchase
    async fn latest_unit_price(
        &mut self,
        product_id: i64,
        excluding_purchase_id: i64,
    ) -> StoreResult<Option<Decimal>>;

    async fn insert_price_alert(&mut self, alert: &NewPriceAlert) -> StoreResult<PriceAlert>;

    // Reversal

    async fn delete_price_alerts_for_items(&mut self, item_ids: &[i64]) -> StoreResult<u64>;

    async fn delete_stock_movements(&mut self, purchase_id: i64) -> StoreResult<u64>;

    async fn delete_purchase_items(&mut self, purchase_id: i64) -> StoreResult<u64>;

    async fn delete_purchase(&mut self, purchase_id: i64) -> StoreResult<u64>;

    // Products

    /// Read a product, locking it for the rest of the transaction
    async fn find_product(&mut self, product_id: i64) -> StoreResult<Option<Product>>;

    async fn find_product_by_sku(&mut self, sku: &str) -> StoreResult<Option<Product>>;

    async fn insert_product(&mut self, product: &NewProduct) -> StoreResult<Product>;

    async fn update_product(
        &mut self,
        product_id: i64,
        changes: &ProductChanges,
    ) -> StoreResult<Option<Product>>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_entity() {
        assert_eq!(referenced_entity("purchase_items_product_id_fkey"), "Product");
        assert_eq!(referenced_entity("purchases_supplier_id_fkey"), "Supplier");
        assert_eq!(referenced_entity("purchase_items_purchase_id_fkey"), "Purchase");
        assert_eq!(
            referenced_entity("price_alerts_purchase_item_id_fkey"),
            "Purchase item"
        );
        assert_eq!(referenced_entity(""), "Record");
    }

    #[test]
    fn test_unique_violation_flag() {
        assert!(StoreError::UniqueViolation("suppliers_name_key".into()).is_unique_violation());
        assert!(!StoreError::MissingReference("Product".into()).is_unique_violation());
    }
}
