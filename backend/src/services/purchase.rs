//! Purchase recording service
//!
//! Records supplier deliveries and reverses them. Each operation runs in a single
//! transaction: the supplier and the purchase header are resolved, stock and ledger are
//! updated, and price alerts are raised. Either everything commits or nothing does.

use std::collections::BTreeMap;

use shared::models::{
    NewPriceAlert, NewPurchaseHeader, NewPurchaseItem, NewStockMovement, PriceAlert,
    PurchaseDeletion, PurchaseHeader, PurchaseWithItems, RecordPurchaseRequest,
    RecordedPurchase, StockMovement, SupplierRef, ValidatedItem, ValidatedPurchase,
};
use shared::types::PriceAlertFilter;
use shared::validation::{unit_price_changed, validate_purchase_request};

use crate::error::{AppError, AppResult};
use crate::store::{Store, StoreError, StoreResult, StoreTx};

/// Purchase service for recording and reversing supplier deliveries
#[derive(Clone)]
pub struct PurchaseService<S> {
    store: S,
}

/// Turn a uniqueness conflict into "someone else inserted it first"
fn adopt_on_conflict(result: StoreResult<i64>) -> StoreResult<Option<i64>> {
    match result {
        Ok(id) => Ok(Some(id)),
        Err(StoreError::UniqueViolation(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

impl<S: Store> PurchaseService<S> {
    /// Create a new PurchaseService instance
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record a purchase with its line items
    pub async fn record_purchase(
        &self,
        request: RecordPurchaseRequest,
    ) -> AppResult<RecordedPurchase> {
        // Rejected requests never open a transaction
        let purchase = validate_purchase_request(request)?;

        let mut tx = self.store.begin().await?;
        match Self::apply_purchase(&mut tx, &purchase).await {
            Ok(recorded) => {
                tx.commit().await?;
                tracing::info!(
                    purchase_id = recorded.purchase.id,
                    supplier_id = recorded.purchase.supplier_id,
                    invoice_number = %recorded.purchase.invoice_number,
                    items = recorded.items.len(),
                    price_alerts = recorded.price_alerts.len(),
                    "Purchase recorded"
                );
                Ok(recorded)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback after failed purchase failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn apply_purchase(
        tx: &mut S::Tx,
        purchase: &ValidatedPurchase,
    ) -> AppResult<RecordedPurchase> {
        let supplier_id = Self::resolve_supplier(tx, &purchase.supplier).await?;
        let purchase_id = Self::resolve_header(tx, supplier_id, purchase).await?;

        let mut items = Vec::with_capacity(purchase.items.len());
        let mut price_alerts = Vec::new();

        for item in &purchase.items {
            let line = tx
                .insert_purchase_item(&NewPurchaseItem {
                    purchase_id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    created_by_name: item
                        .created_by_name
                        .clone()
                        .or_else(|| purchase.created_by_name.clone()),
                    item_note: item.note.clone().or_else(|| purchase.note.clone()),
                })
                .await?;

            tx.insert_stock_movement(&NewStockMovement {
                product_id: item.product_id,
                purchase_id: Some(purchase_id),
                quantity_change: i64::from(item.quantity),
                unit_price: Some(item.unit_price),
                note: StockMovement::purchase_note(purchase_id),
            })
            .await?;

            tx.adjust_stock(item.product_id, i64::from(item.quantity))
                .await?;

            if let Some(alert) =
                Self::check_price_change(tx, supplier_id, purchase_id, line.id, item).await?
            {
                price_alerts.push(alert);
            }

            items.push(line);
        }

        let header = tx
            .get_purchase(purchase_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;

        Ok(RecordedPurchase {
            purchase: header,
            items,
            price_alerts,
        })
    }

    /// Find or create the supplier, adopting the winner of a concurrent insert
    async fn resolve_supplier(tx: &mut S::Tx, supplier: &SupplierRef) -> AppResult<i64> {
        let new_supplier = match supplier {
            SupplierRef::Existing(id) => return Ok(*id),
            SupplierRef::ByName(new_supplier) => new_supplier,
        };

        if let Some(id) = adopt_on_conflict(tx.insert_supplier(new_supplier).await)? {
            tracing::info!(supplier_id = id, name = %new_supplier.name, "Supplier created");
            return Ok(id);
        }

        let id = tx
            .find_supplier_id(&new_supplier.name)
            .await?
            .ok_or_else(|| StoreError::UniqueViolation("suppliers_name_key".to_string()))?;
        tracing::debug!(supplier_id = id, name = %new_supplier.name, "Reusing existing supplier");
        Ok(id)
    }

    /// Find or create the header for (supplier, invoice number)
    async fn resolve_header(
        tx: &mut S::Tx,
        supplier_id: i64,
        purchase: &ValidatedPurchase,
    ) -> AppResult<i64> {
        if let Some(existing) = tx
            .find_purchase_by_invoice(supplier_id, &purchase.invoice_number)
            .await?
        {
            Self::merge_into(tx, &existing, purchase).await?;
            return Ok(existing.id);
        }

        let inserted = adopt_on_conflict(
            tx.insert_purchase(&NewPurchaseHeader {
                supplier_id,
                purchase_date: purchase.purchase_date,
                invoice_number: purchase.invoice_number.clone(),
                invoice_file_path: purchase.invoice_file_path.clone(),
                note: purchase.note.clone(),
                created_by_name: purchase.created_by_name.clone(),
            })
            .await,
        )?;
        if let Some(id) = inserted {
            return Ok(id);
        }

        // Lost a race with a concurrent submission of the same invoice
        let existing = tx
            .find_purchase_by_invoice(supplier_id, &purchase.invoice_number)
            .await?
            .ok_or_else(|| {
                StoreError::UniqueViolation("purchases_supplier_invoice_key".to_string())
            })?;
        tracing::warn!(
            purchase_id = existing.id,
            invoice_number = %purchase.invoice_number,
            "Concurrent purchase header insert; adopting existing header"
        );
        Self::merge_into(tx, &existing, purchase).await?;
        Ok(existing.id)
    }

    /// Merge a resubmission into an existing header. The note is never overwritten and
    /// the invoice file is only filled in when missing.
    async fn merge_into(
        tx: &mut S::Tx,
        existing: &PurchaseHeader,
        purchase: &ValidatedPurchase,
    ) -> AppResult<()> {
        tracing::debug!(
            purchase_id = existing.id,
            invoice_number = %existing.invoice_number,
            "Appending items to existing purchase"
        );
        if existing.invoice_file_path.is_none() {
            if let Some(path) = &purchase.invoice_file_path {
                tx.attach_invoice_file(existing.id, path).await?;
            }
        }
        Ok(())
    }

    /// Compare against the latest purchase of the product under any other header
    async fn check_price_change(
        tx: &mut S::Tx,
        supplier_id: i64,
        purchase_id: i64,
        purchase_item_id: i64,
        item: &ValidatedItem,
    ) -> AppResult<Option<PriceAlert>> {
        let Some(previous) = tx.latest_unit_price(item.product_id, purchase_id).await? else {
            return Ok(None);
        };
        if !unit_price_changed(previous, item.unit_price) {
            return Ok(None);
        }

        let alert = tx
            .insert_price_alert(&NewPriceAlert {
                product_id: item.product_id,
                supplier_id,
                purchase_item_id,
                old_unit_price: previous,
                new_unit_price: item.unit_price,
                note: PriceAlert::AUTO_NOTE.to_string(),
            })
            .await?;
        tracing::info!(
            product_id = alert.product_id,
            old_unit_price = %alert.old_unit_price,
            new_unit_price = %alert.new_unit_price,
            change = %alert.change(),
            "Unit price {}",
            if alert.is_increase() { "increased" } else { "decreased" }
        );
        Ok(Some(alert))
    }

    /// Delete a purchase and reverse its stock, ledger and alert effects
    pub async fn delete_purchase(&self, purchase_id: i64) -> AppResult<PurchaseDeletion> {
        let mut tx = self.store.begin().await?;
        match Self::reverse_purchase(&mut tx, purchase_id).await {
            Ok(deletion) => {
                tx.commit().await?;
                tracing::info!(purchase_id, deleted = deletion.deleted, "Purchase reversed");
                Ok(deletion)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback after failed reversal failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn reverse_purchase(tx: &mut S::Tx, purchase_id: i64) -> AppResult<PurchaseDeletion> {
        let items = tx.purchase_items(purchase_id).await?;

        // Stock may go negative if it was consumed elsewhere; that is not clamped
        for item in &items {
            tx.adjust_stock(item.product_id, -i64::from(item.quantity))
                .await?;
        }

        let item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        tx.delete_price_alerts_for_items(&item_ids).await?;
        tx.delete_stock_movements(purchase_id).await?;
        tx.delete_purchase_items(purchase_id).await?;
        let deleted = tx.delete_purchase(purchase_id).await?;

        Ok(PurchaseDeletion {
            deleted: deleted > 0,
        })
    }

    /// List purchases newest first, each with its items in insertion order
    pub async fn list_purchases(&self) -> AppResult<Vec<PurchaseWithItems>> {
        let purchases = self.store.list_purchases().await?;
        if purchases.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = purchases.iter().map(|p| p.id).collect();
        let mut items_by_purchase: BTreeMap<i64, Vec<_>> = BTreeMap::new();
        for item in self.store.purchase_item_details(&ids).await? {
            items_by_purchase
                .entry(item.purchase_id)
                .or_default()
                .push(item);
        }

        Ok(purchases
            .into_iter()
            .map(|purchase| PurchaseWithItems {
                items: items_by_purchase.remove(&purchase.id).unwrap_or_default(),
                purchase,
            })
            .collect())
    }

    /// Price alert history, newest first
    pub async fn list_price_alerts(&self, filter: PriceAlertFilter) -> AppResult<Vec<PriceAlert>> {
        let alerts = self.store.list_price_alerts(&filter).await?;
        Ok(alerts)
    }
}
