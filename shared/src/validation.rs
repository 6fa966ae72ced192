//! Validation utilities for the Stockroom inventory system
//!
//! Everything here is pure so the backend and the browser client agree on what a
//! well-formed purchase looks like before any storage is touched.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::{
    NewSupplier, PurchaseItemRequest, RecordPurchaseRequest, SupplierRef, ValidatedItem,
    ValidatedPurchase,
};
use crate::types::ValidationIssue;

/// Accepted format for `purchase_date`
pub const PURCHASE_DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Purchase Validations
// ============================================================================

/// Validate a raw purchase submission.
///
/// Fails on the first missing or invalid field; the whole request is rejected so
/// nothing is written for a partially valid item list.
pub fn validate_purchase_request(
    request: RecordPurchaseRequest,
) -> Result<ValidatedPurchase, ValidationIssue> {
    let purchase_date = match non_blank(request.purchase_date) {
        Some(raw) => parse_purchase_date(&raw).ok_or_else(|| {
            ValidationIssue::new("purchase_date", "Purchase date must be formatted as YYYY-MM-DD")
        })?,
        None => {
            return Err(ValidationIssue::new(
                "purchase_date",
                "Purchase date is required",
            ))
        }
    };

    let invoice_number = non_blank(request.invoice_number)
        .ok_or_else(|| ValidationIssue::new("invoice_number", "Invoice number is required"))?;

    if request.items.is_empty() {
        return Err(ValidationIssue::new(
            "items",
            "At least one purchase item is required",
        ));
    }

    let supplier = match request.supplier_id.filter(|id| *id > 0) {
        Some(id) => SupplierRef::Existing(id),
        None => {
            let descriptor = request.supplier.unwrap_or_default();
            let name = non_blank(descriptor.name).ok_or_else(|| {
                ValidationIssue::new(
                    "supplier.name",
                    "Supplier name is required when supplier_id is not given",
                )
            })?;
            SupplierRef::ByName(NewSupplier {
                name,
                email: non_blank(descriptor.email),
                phone: non_blank(descriptor.phone),
                address: non_blank(descriptor.address),
            })
        }
    };

    let items = request
        .items
        .into_iter()
        .enumerate()
        .map(|(index, item)| validate_purchase_item(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ValidatedPurchase {
        supplier,
        purchase_date,
        invoice_number,
        invoice_file_path: non_blank(request.invoice_file_path),
        note: non_blank(request.note),
        created_by_name: non_blank(request.created_by_name),
        items,
    })
}

/// Validate one line item; `index` is used to name the failing field
pub fn validate_purchase_item(
    index: usize,
    item: PurchaseItemRequest,
) -> Result<ValidatedItem, ValidationIssue> {
    let field = |name: &str| format!("items[{}].{}", index, name);

    let product_id = item
        .product_id
        .filter(|id| *id > 0)
        .ok_or_else(|| ValidationIssue::new(field("product_id"), "Product is required"))?;

    let quantity = match item.quantity {
        Some(q) if q > 0 => i32::try_from(q)
            .map_err(|_| ValidationIssue::new(field("quantity"), "Quantity is too large"))?,
        Some(_) => {
            return Err(ValidationIssue::new(
                field("quantity"),
                "Quantity must be positive",
            ))
        }
        None => return Err(ValidationIssue::new(field("quantity"), "Quantity is required")),
    };

    let unit_price = match item.unit_price {
        Some(p) if p <= Decimal::ZERO => {
            return Err(ValidationIssue::new(
                field("unit_price"),
                "Unit price must be positive",
            ))
        }
        Some(p) if p.normalize().scale() > UNIT_PRICE_SCALE => {
            return Err(ValidationIssue::new(
                field("unit_price"),
                "Unit price cannot have more than 2 decimal places",
            ))
        }
        Some(p) if p >= max_unit_price() => {
            return Err(ValidationIssue::new(
                field("unit_price"),
                "Unit price is too large",
            ))
        }
        Some(p) => p,
        None => {
            return Err(ValidationIssue::new(
                field("unit_price"),
                "Unit price is required",
            ))
        }
    };

    Ok(ValidatedItem {
        product_id,
        quantity,
        unit_price,
        created_by_name: non_blank(item.created_by_name),
        note: non_blank(item.note),
    })
}

/// Decimal places a stored unit price keeps
pub const UNIT_PRICE_SCALE: u32 = 2;

/// Exclusive upper bound of a stored unit price, `NUMERIC(12,2)`
pub fn max_unit_price() -> Decimal {
    Decimal::new(10_000_000_000, 0)
}

/// Parse a `YYYY-MM-DD` purchase date
pub fn parse_purchase_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), PURCHASE_DATE_FORMAT).ok()
}

/// A price alert is raised on any change, up or down
pub fn unit_price_changed(previous: Decimal, current: Decimal) -> bool {
    previous != current
}

// ============================================================================
// Stock Validations
// ============================================================================

/// A product needs reordering once stock falls to its threshold
pub fn is_low_stock(current_stock: i64, min_stock_level: i64) -> bool {
    current_stock <= min_stock_level
}

// ============================================================================
// General Validations
// ============================================================================

/// Trim a string and treat blank values as absent
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Make an uploaded file name safe for the local file system
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
