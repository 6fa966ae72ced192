//! Common types used across the system

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single rejected field in an incoming request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{field}: {message}")]
pub struct ValidationIssue {
    /// Path of the offending field, e.g. `items[1].unit_price`
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Query filter for the price alert history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceAlertFilter {
    pub product_id: Option<i64>,
}
