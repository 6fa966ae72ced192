//! Product catalog service
//!
//! Direct edits to `current_stock` are written to the stock ledger as manual
//! adjustments so the ledger and the cached stock value stay in agreement.

use validator::Validate;

use shared::models::{
    NewProduct, NewStockMovement, Product, ProductChanges, StockMovement, Supplier,
    UpsertAction, UpsertOutcome, UpsertProductInput,
};

use crate::error::{AppError, AppResult};
use crate::store::{Store, StoreError, StoreTx};

const INITIAL_STOCK_NOTE: &str = "Initial stock";
const MANUAL_ADJUSTMENT_NOTE: &str = "Manual adjustment";

/// Product service for catalog maintenance and stock queries
#[derive(Clone)]
pub struct ProductService<S> {
    store: S,
}

/// Map a SKU conflict to a client error
fn sku_conflict(err: StoreError) -> AppError {
    match err {
        StoreError::UniqueViolation(_) => AppError::DuplicateEntry("sku".to_string()),
        other => other.into(),
    }
}

impl<S: Store> ProductService<S> {
    /// Create a new ProductService instance
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// List products, newest first
    pub async fn list_products(&self) -> AppResult<Vec<Product>> {
        let products = self.store.list_products().await?;
        Ok(products)
    }

    /// Get a single product
    pub async fn get_product(&self, product_id: i64) -> AppResult<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    /// Products at or below their reorder threshold
    pub async fn low_stock_products(&self) -> AppResult<Vec<Product>> {
        let products = self.store.low_stock_products().await?;
        Ok(products)
    }

    /// Ledger history of a product
    pub async fn stock_movements(&self, product_id: i64) -> AppResult<Vec<StockMovement>> {
        // 404 for unknown products rather than an empty history
        self.get_product(product_id).await?;
        let movements = self.store.stock_movements(product_id).await?;
        Ok(movements)
    }

    /// List suppliers by name
    pub async fn list_suppliers(&self) -> AppResult<Vec<Supplier>> {
        let suppliers = self.store.list_suppliers().await?;
        Ok(suppliers)
    }

    /// Create a product
    pub async fn create_product(&self, input: NewProduct) -> AppResult<Product> {
        let input = input.normalized();
        input.validate()?;

        let mut tx = self.store.begin().await?;
        let product = Self::insert_with_ledger(&mut tx, &input).await?;
        tx.commit().await?;

        tracing::info!(product_id = product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    /// Update a product; absent fields keep their stored values
    pub async fn update_product(
        &self,
        product_id: i64,
        changes: ProductChanges,
    ) -> AppResult<Product> {
        let changes = changes.normalized();
        changes.validate()?;

        let mut tx = self.store.begin().await?;
        let existing = tx
            .find_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
        let product = Self::update_with_ledger(&mut tx, &existing, &changes).await?;
        tx.commit().await?;

        tracing::info!(product_id = product.id, sku = %product.sku, "Product updated");
        Ok(product)
    }

    /// Create or update a product keyed by SKU
    pub async fn upsert_product(&self, input: UpsertProductInput) -> AppResult<UpsertOutcome> {
        input.validate()?;
        let sku = input.sku.trim().to_string();
        if sku.is_empty() {
            return Err(AppError::Validation {
                field: "sku".to_string(),
                message: "SKU is required".to_string(),
            });
        }

        let mut tx = self.store.begin().await?;
        let outcome = match tx.find_product_by_sku(&sku).await? {
            Some(existing) => {
                let changes = input.changes();
                let product = Self::update_with_ledger(&mut tx, &existing, &changes).await?;
                UpsertOutcome {
                    action: UpsertAction::Updated,
                    product,
                }
            }
            None => {
                let new_product = input.into_new_product();
                new_product.validate()?;
                let product = Self::insert_with_ledger(&mut tx, &new_product).await?;
                UpsertOutcome {
                    action: UpsertAction::Created,
                    product,
                }
            }
        };
        tx.commit().await?;

        tracing::info!(
            product_id = outcome.product.id,
            sku = %outcome.product.sku,
            action = ?outcome.action,
            "Product upserted"
        );
        Ok(outcome)
    }

    async fn insert_with_ledger(tx: &mut S::Tx, input: &NewProduct) -> AppResult<Product> {
        let product = tx.insert_product(input).await.map_err(sku_conflict)?;

        if product.current_stock != 0 {
            tx.insert_stock_movement(&NewStockMovement {
                product_id: product.id,
                purchase_id: None,
                quantity_change: product.current_stock,
                unit_price: None,
                note: INITIAL_STOCK_NOTE.to_string(),
            })
            .await?;
        }

        Ok(product)
    }

    async fn update_with_ledger(
        tx: &mut S::Tx,
        existing: &Product,
        changes: &ProductChanges,
    ) -> AppResult<Product> {
        let product = tx
            .update_product(existing.id, changes)
            .await
            .map_err(sku_conflict)?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let delta = product.current_stock - existing.current_stock;
        if delta != 0 {
            tx.insert_stock_movement(&NewStockMovement {
                product_id: product.id,
                purchase_id: None,
                quantity_change: delta,
                unit_price: None,
                note: MANUAL_ADJUSTMENT_NOTE.to_string(),
            })
            .await?;
        }

        Ok(product)
    }
}
