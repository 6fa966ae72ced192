//! Purchase, stock ledger and price alert models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{SupplierDescriptor, SupplierRef};

/// A supplier delivery. At most one header exists per (supplier, invoice number).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseHeader {
    pub id: i64,
    pub supplier_id: i64,
    pub purchase_date: NaiveDate,
    pub invoice_number: String,
    pub invoice_file_path: Option<String>,
    pub note: Option<String>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One delivered product line under a purchase header
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseLineItem {
    pub id: i64,
    pub purchase_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub created_by_name: Option<String>,
    pub item_note: Option<String>,
}

/// Append-only stock ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    /// Originating purchase, used to match entries on reversal
    pub purchase_id: Option<i64>,
    pub quantity_change: i64,
    pub unit_price: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl StockMovement {
    /// Ledger note for entries created by a purchase
    pub fn purchase_note(purchase_id: i64) -> String {
        format!("Purchase {}", purchase_id)
    }
}

/// Advisory record of a unit price change between purchases of a product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PriceAlert {
    pub id: i64,
    pub product_id: i64,
    pub supplier_id: i64,
    pub purchase_item_id: i64,
    pub old_unit_price: Decimal,
    pub new_unit_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl PriceAlert {
    pub const AUTO_NOTE: &'static str = "Auto-generated on purchase";

    /// Signed change from the previous unit price
    pub fn change(&self) -> Decimal {
        self.new_unit_price - self.old_unit_price
    }

    pub fn is_increase(&self) -> bool {
        self.new_unit_price > self.old_unit_price
    }
}

// ============================================================================
// Write-side rows
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchaseHeader {
    pub supplier_id: i64,
    pub purchase_date: NaiveDate,
    pub invoice_number: String,
    pub invoice_file_path: Option<String>,
    pub note: Option<String>,
    pub created_by_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchaseItem {
    pub purchase_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub created_by_name: Option<String>,
    pub item_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStockMovement {
    pub product_id: i64,
    pub purchase_id: Option<i64>,
    pub quantity_change: i64,
    pub unit_price: Option<Decimal>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPriceAlert {
    pub product_id: i64,
    pub supplier_id: i64,
    pub purchase_item_id: i64,
    pub old_unit_price: Decimal,
    pub new_unit_price: Decimal,
    pub note: String,
}

// ============================================================================
// Requests
// ============================================================================

/// Purchase submission as decoded from the client, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordPurchaseRequest {
    #[serde(default)]
    pub supplier_id: Option<i64>,
    #[serde(default)]
    pub supplier: Option<SupplierDescriptor>,
    #[serde(default)]
    pub purchase_date: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub invoice_file_path: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub created_by_name: Option<String>,
    #[serde(default)]
    pub items: Vec<PurchaseItemRequest>,
}

/// One requested line item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseItemRequest {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub created_by_name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// A purchase request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPurchase {
    pub supplier: SupplierRef,
    pub purchase_date: NaiveDate,
    pub invoice_number: String,
    pub invoice_file_path: Option<String>,
    pub note: Option<String>,
    pub created_by_name: Option<String>,
    pub items: Vec<ValidatedItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedItem {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub created_by_name: Option<String>,
    pub note: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

/// Outcome of recording a purchase
#[derive(Debug, Clone, Serialize)]
pub struct RecordedPurchase {
    pub purchase: PurchaseHeader,
    pub items: Vec<PurchaseLineItem>,
    /// Alerts raised by this submission
    pub price_alerts: Vec<PriceAlert>,
}

/// Outcome of reversing a purchase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurchaseDeletion {
    pub deleted: bool,
}

/// Purchase header joined with its supplier name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseSummary {
    pub id: i64,
    pub supplier_id: i64,
    pub supplier_name: Option<String>,
    pub purchase_date: NaiveDate,
    pub invoice_number: String,
    pub invoice_file_path: Option<String>,
    pub note: Option<String>,
    pub created_by_name: Option<String>,
}

/// Line item joined with its product name and SKU
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseItemDetail {
    pub id: i64,
    pub purchase_id: i64,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub item_created_by_name: Option<String>,
    pub item_note: Option<String>,
}

/// Listing entry: header plus its items in insertion order
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseWithItems {
    #[serde(flatten)]
    pub purchase: PurchaseSummary,
    pub items: Vec<PurchaseItemDetail>,
}
