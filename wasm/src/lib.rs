//! WebAssembly module for the Stockroom purchase form
//!
//! Provides client-side checks before a purchase is submitted:
//! - Purchase request validation
//! - Reorder threshold check
//! - Unit price comparison and line totals

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::debug_1(&JsValue::from_str("stockroom-wasm loaded"));
}

/// Result of validating a purchase form in the browser
#[derive(Debug, Serialize)]
struct ValidationReport {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Validate a purchase request given as JSON.
///
/// Returns a JSON report `{"valid":true}` or `{"valid":false,"field":..,"message":..}`
/// naming the first rejected field, the same field the server would reject.
#[wasm_bindgen]
pub fn validate_purchase_json(request_json: &str) -> String {
    let report = match serde_json::from_str::<RecordPurchaseRequest>(request_json) {
        Ok(request) => match validate_purchase_request(request) {
            Ok(_) => ValidationReport {
                valid: true,
                field: None,
                message: None,
            },
            Err(issue) => ValidationReport {
                valid: false,
                field: Some(issue.field),
                message: Some(issue.message),
            },
        },
        Err(e) => ValidationReport {
            valid: false,
            field: None,
            message: Some(format!("Invalid purchase JSON: {}", e)),
        },
    };
    serde_json::to_string(&report).unwrap_or_else(|_| r#"{"valid":false}"#.to_string())
}

/// Whether a product should be reordered
#[wasm_bindgen]
pub fn needs_reorder(current_stock: i64, min_stock_level: i64) -> bool {
    is_low_stock(current_stock, min_stock_level)
}

/// Whether a new unit price would raise a price alert against the previous one.
/// Unparseable prices never do.
#[wasm_bindgen]
pub fn price_would_alert(previous_price: &str, new_price: &str) -> bool {
    match (
        Decimal::from_str(previous_price.trim()),
        Decimal::from_str(new_price.trim()),
    ) {
        (Ok(previous), Ok(current)) => unit_price_changed(previous, current),
        _ => false,
    }
}

/// Line total `quantity * unit_price` as a decimal string, empty when the price is invalid
#[wasm_bindgen]
pub fn line_total(quantity: i32, unit_price: &str) -> String {
    Decimal::from_str(unit_price.trim())
        .map(|price| (price * Decimal::from(quantity)).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_purchase_json() {
        let valid = r#"{
            "supplier": {"name": "Acme"},
            "purchase_date": "2024-01-15",
            "invoice_number": "INV-1",
            "items": [{"product_id": 1, "quantity": 5, "unit_price": "10.00"}]
        }"#;
        assert_eq!(validate_purchase_json(valid), r#"{"valid":true}"#);

        let missing_price = r#"{
            "supplier_id": 3,
            "purchase_date": "2024-01-15",
            "invoice_number": "INV-1",
            "items": [{"product_id": 1, "quantity": 5}]
        }"#;
        let report: serde_json::Value =
            serde_json::from_str(&validate_purchase_json(missing_price)).unwrap();
        assert_eq!(report["valid"], false);
        assert_eq!(report["field"], "items[0].unit_price");

        let report: serde_json::Value =
            serde_json::from_str(&validate_purchase_json("not json")).unwrap();
        assert_eq!(report["valid"], false);
    }

    #[test]
    fn test_needs_reorder() {
        assert!(needs_reorder(5, 5));
        assert!(needs_reorder(-2, 0));
        assert!(!needs_reorder(6, 5));
    }

    #[test]
    fn test_price_would_alert() {
        assert!(price_would_alert("10.00", "12.00"));
        assert!(!price_would_alert("10.00", "10.0"));
        assert!(!price_would_alert("10.00", "abc"));
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line_total(5, "10.00"), "50.00");
        assert_eq!(line_total(3, "x"), "");
    }
}
