//! In-process store
//!
//! Enforces the same unique and foreign-key rules as the PostgreSQL schema. A transaction
//! holds the store lock for its whole lifetime and works on a copy of the tables, so
//! transactions are serialized and a dropped transaction leaves no trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use shared::models::{
    NewPriceAlert, NewProduct, NewPurchaseHeader, NewPurchaseItem, NewStockMovement, NewSupplier,
    PriceAlert, Product, ProductChanges, PurchaseHeader, PurchaseItemDetail, PurchaseLineItem,
    PurchaseSummary, StockMovement, Supplier,
};
use shared::types::PriceAlertFilter;

use super::{Store, StoreError, StoreResult, StoreTx};

#[derive(Debug, Clone, Default)]
struct Tables {
    sequence: i64,
    products: BTreeMap<i64, Product>,
    suppliers: BTreeMap<i64, Supplier>,
    purchases: BTreeMap<i64, PurchaseHeader>,
    purchase_items: BTreeMap<i64, PurchaseLineItem>,
    stock_movements: BTreeMap<i64, StockMovement>,
    price_alerts: BTreeMap<i64, PriceAlert>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }
}

/// Store kept entirely in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Transaction over a private copy of the tables
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        let guard = self.tables.clone().lock_owned().await;
        let work = (*guard).clone();
        Ok(MemoryTx { guard, work })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get_product(&self, product_id: i64) -> StoreResult<Option<Product>> {
        let tables = self.tables.lock().await;
        Ok(tables.products.get(&product_id).cloned())
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        let tables = self.tables.lock().await;
        Ok(tables.products.values().rev().cloned().collect())
    }

    async fn low_stock_products(&self) -> StoreResult<Vec<Product>> {
        let tables = self.tables.lock().await;
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|p| p.needs_reorder())
            .cloned()
            .collect();
        products.sort_by_key(|p| (p.current_stock - p.min_stock_level, p.id));
        Ok(products)
    }

    async fn list_suppliers(&self) -> StoreResult<Vec<Supplier>> {
        let tables = self.tables.lock().await;
        let mut suppliers: Vec<Supplier> = tables.suppliers.values().cloned().collect();
        suppliers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(suppliers)
    }

    async fn list_purchases(&self) -> StoreResult<Vec<PurchaseSummary>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .purchases
            .values()
            .rev()
            .map(|p| PurchaseSummary {
                id: p.id,
                supplier_id: p.supplier_id,
                supplier_name: tables.suppliers.get(&p.supplier_id).map(|s| s.name.clone()),
                purchase_date: p.purchase_date,
                invoice_number: p.invoice_number.clone(),
                invoice_file_path: p.invoice_file_path.clone(),
                note: p.note.clone(),
                created_by_name: p.created_by_name.clone(),
            })
            .collect())
    }

    async fn purchase_item_details(
        &self,
        purchase_ids: &[i64],
    ) -> StoreResult<Vec<PurchaseItemDetail>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .purchase_items
            .values()
            .filter(|i| purchase_ids.contains(&i.purchase_id))
            .map(|i| {
                let product = tables.products.get(&i.product_id);
                PurchaseItemDetail {
                    id: i.id,
                    purchase_id: i.purchase_id,
                    product_id: i.product_id,
                    product_name: product.map(|p| p.name.clone()),
                    sku: product.map(|p| p.sku.clone()),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    item_created_by_name: i.created_by_name.clone(),
                    item_note: i.item_note.clone(),
                }
            })
            .collect())
    }

    async fn list_price_alerts(&self, filter: &PriceAlertFilter) -> StoreResult<Vec<PriceAlert>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .price_alerts
            .values()
            .rev()
            .filter(|a| filter.product_id.map_or(true, |id| a.product_id == id))
            .cloned()
            .collect())
    }

    async fn stock_movements(&self, product_id: i64) -> StoreResult<Vec<StockMovement>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .stock_movements
            .values()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect())
    }
}

impl MemoryTx {
    fn require_product(&self, product_id: i64) -> StoreResult<()> {
        if self.work.products.contains_key(&product_id) {
            Ok(())
        } else {
            Err(StoreError::MissingReference("Product".to_string()))
        }
    }

    fn sku_taken(&self, sku: &str, except: Option<i64>) -> bool {
        self.work
            .products
            .values()
            .any(|p| p.sku == sku && Some(p.id) != except)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_supplier(&mut self, supplier: &NewSupplier) -> StoreResult<i64> {
        if self.work.suppliers.values().any(|s| s.name == supplier.name) {
            return Err(StoreError::UniqueViolation("suppliers_name_key".to_string()));
        }
        let id = self.work.next_id();
        self.work.suppliers.insert(
            id,
            Supplier {
                id,
                name: supplier.name.clone(),
                email: supplier.email.clone(),
                phone: supplier.phone.clone(),
                address: supplier.address.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn find_supplier_id(&mut self, name: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .work
            .suppliers
            .values()
            .find(|s| s.name == name)
            .map(|s| s.id))
    }

    async fn find_purchase_by_invoice(
        &mut self,
        supplier_id: i64,
        invoice_number: &str,
    ) -> StoreResult<Option<PurchaseHeader>> {
        Ok(self
            .work
            .purchases
            .values()
            .find(|p| p.supplier_id == supplier_id && p.invoice_number == invoice_number)
            .cloned())
    }

    async fn insert_purchase(&mut self, header: &NewPurchaseHeader) -> StoreResult<i64> {
        if !self.work.suppliers.contains_key(&header.supplier_id) {
            return Err(StoreError::MissingReference("Supplier".to_string()));
        }
        if self
            .find_purchase_by_invoice(header.supplier_id, &header.invoice_number)
            .await?
            .is_some()
        {
            return Err(StoreError::UniqueViolation(
                "purchases_supplier_invoice_key".to_string(),
            ));
        }
        let id = self.work.next_id();
        self.work.purchases.insert(
            id,
            PurchaseHeader {
                id,
                supplier_id: header.supplier_id,
                purchase_date: header.purchase_date,
                invoice_number: header.invoice_number.clone(),
                invoice_file_path: header.invoice_file_path.clone(),
                note: header.note.clone(),
                created_by_name: header.created_by_name.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn attach_invoice_file(&mut self, purchase_id: i64, path: &str) -> StoreResult<()> {
        if let Some(header) = self.work.purchases.get_mut(&purchase_id) {
            if header.invoice_file_path.is_none() {
                header.invoice_file_path = Some(path.to_string());
            }
        }
        Ok(())
    }

    async fn get_purchase(&mut self, purchase_id: i64) -> StoreResult<Option<PurchaseHeader>> {
        Ok(self.work.purchases.get(&purchase_id).cloned())
    }

    async fn insert_purchase_item(
        &mut self,
        item: &NewPurchaseItem,
    ) -> StoreResult<PurchaseLineItem> {
        if !self.work.purchases.contains_key(&item.purchase_id) {
            return Err(StoreError::MissingReference("Purchase".to_string()));
        }
        self.require_product(item.product_id)?;
        let id = self.work.next_id();
        let created = PurchaseLineItem {
            id,
            purchase_id: item.purchase_id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            created_by_name: item.created_by_name.clone(),
            item_note: item.item_note.clone(),
        };
        self.work.purchase_items.insert(id, created.clone());
        Ok(created)
    }

    async fn purchase_items(&mut self, purchase_id: i64) -> StoreResult<Vec<PurchaseLineItem>> {
        Ok(self
            .work
            .purchase_items
            .values()
            .filter(|i| i.purchase_id == purchase_id)
            .cloned()
            .collect())
    }

    async fn insert_stock_movement(&mut self, movement: &NewStockMovement) -> StoreResult<i64> {
        self.require_product(movement.product_id)?;
        let id = self.work.next_id();
        self.work.stock_movements.insert(
            id,
            StockMovement {
                id,
                product_id: movement.product_id,
                purchase_id: movement.purchase_id,
                quantity_change: movement.quantity_change,
                unit_price: movement.unit_price,
                occurred_at: Utc::now(),
                note: Some(movement.note.clone()),
            },
        );
        Ok(id)
    }

    async fn adjust_stock(&mut self, product_id: i64, delta: i64) -> StoreResult<i64> {
        let product = self
            .work
            .products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::MissingReference("Product".to_string()))?;
        product.current_stock += delta;
        product.updated_at = Utc::now();
        Ok(product.current_stock)
    }

    async fn latest_unit_price(
        &mut self,
        product_id: i64,
        excluding_purchase_id: i64,
    ) -> StoreResult<Option<Decimal>> {
        Ok(self
            .work
            .purchase_items
            .values()
            .rev()
            .find(|i| i.product_id == product_id && i.purchase_id != excluding_purchase_id)
            .map(|i| i.unit_price))
    }

    async fn insert_price_alert(&mut self, alert: &NewPriceAlert) -> StoreResult<PriceAlert> {
        self.require_product(alert.product_id)?;
        if !self.work.purchase_items.contains_key(&alert.purchase_item_id) {
            return Err(StoreError::MissingReference("Purchase item".to_string()));
        }
        let id = self.work.next_id();
        let created = PriceAlert {
            id,
            product_id: alert.product_id,
            supplier_id: alert.supplier_id,
            purchase_item_id: alert.purchase_item_id,
            old_unit_price: alert.old_unit_price,
            new_unit_price: alert.new_unit_price,
            created_at: Utc::now(),
            note: Some(alert.note.clone()),
        };
        self.work.price_alerts.insert(id, created.clone());
        Ok(created)
    }

    async fn delete_price_alerts_for_items(&mut self, item_ids: &[i64]) -> StoreResult<u64> {
        let before = self.work.price_alerts.len();
        self.work
            .price_alerts
            .retain(|_, a| !item_ids.contains(&a.purchase_item_id));
        Ok((before - self.work.price_alerts.len()) as u64)
    }

    async fn delete_stock_movements(&mut self, purchase_id: i64) -> StoreResult<u64> {
        let before = self.work.stock_movements.len();
        self.work
            .stock_movements
            .retain(|_, m| m.purchase_id != Some(purchase_id));
        Ok((before - self.work.stock_movements.len()) as u64)
    }

    async fn delete_purchase_items(&mut self, purchase_id: i64) -> StoreResult<u64> {
        let before = self.work.purchase_items.len();
        self.work
            .purchase_items
            .retain(|_, i| i.purchase_id != purchase_id);
        Ok((before - self.work.purchase_items.len()) as u64)
    }

    async fn delete_purchase(&mut self, purchase_id: i64) -> StoreResult<u64> {
        if self.work.purchases.remove(&purchase_id).is_none() {
            return Ok(0);
        }
        // Cascade, as the schema does
        let Tables {
            purchase_items,
            price_alerts,
            ..
        } = &mut self.work;
        purchase_items.retain(|item_id, i| {
            let keep = i.purchase_id != purchase_id;
            if !keep {
                price_alerts.retain(|_, a| a.purchase_item_id != *item_id);
            }
            keep
        });
        Ok(1)
    }

    async fn find_product(&mut self, product_id: i64) -> StoreResult<Option<Product>> {
        Ok(self.work.products.get(&product_id).cloned())
    }

    async fn find_product_by_sku(&mut self, sku: &str) -> StoreResult<Option<Product>> {
        Ok(self
            .work
            .products
            .values()
            .find(|p| p.sku == sku)
            .cloned())
    }

    async fn insert_product(&mut self, product: &NewProduct) -> StoreResult<Product> {
        if self.sku_taken(&product.sku, None) {
            return Err(StoreError::UniqueViolation("products_sku_key".to_string()));
        }
        let id = self.work.next_id();
        let now = Utc::now();
        let created = Product {
            id,
            sku: product.sku.clone(),
            name: product.name.clone(),
            current_stock: product.current_stock,
            min_stock_level: product.min_stock_level,
            note: product.note.clone(),
            original_part_number: product.original_part_number.clone(),
            china_part_number: product.china_part_number.clone(),
            image_path: None,
            created_at: now,
            updated_at: now,
        };
        self.work.products.insert(id, created.clone());
        Ok(created)
    }

    async fn update_product(
        &mut self,
        product_id: i64,
        changes: &ProductChanges,
    ) -> StoreResult<Option<Product>> {
        if let Some(sku) = &changes.sku {
            if self.sku_taken(sku, Some(product_id)) {
                return Err(StoreError::UniqueViolation("products_sku_key".to_string()));
            }
        }
        let Some(product) = self.work.products.get_mut(&product_id) else {
            return Ok(None);
        };
        changes.apply_to(product);
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn commit(self) -> StoreResult<()> {
        let MemoryTx { mut guard, work } = self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
