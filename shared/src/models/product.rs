//! Product catalog models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::{is_low_stock, non_blank};

/// A stocked product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    /// Unique business key
    pub sku: String,
    pub name: String,
    /// Cached sum of the stock ledger. May go negative after reversals.
    pub current_stock: i64,
    /// Reorder threshold
    pub min_stock_level: i64,
    pub note: Option<String>,
    pub original_part_number: Option<String>,
    pub china_part_number: Option<String>,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product has reached its reorder threshold
    pub fn needs_reorder(&self) -> bool {
        is_low_stock(self.current_stock, self.min_stock_level)
    }
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, message = "Product name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "SKU is required"))]
    pub sku: String,
    #[serde(default)]
    pub current_stock: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "Minimum stock level cannot be negative"))]
    pub min_stock_level: i64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub original_part_number: Option<String>,
    #[serde(default)]
    pub china_part_number: Option<String>,
}

impl NewProduct {
    /// Trim text fields and drop blank optional ones
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            sku: self.sku.trim().to_string(),
            note: non_blank(self.note),
            original_part_number: non_blank(self.original_part_number),
            china_part_number: non_blank(self.china_part_number),
            ..self
        }
    }
}

/// Partial update of a product. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProductChanges {
    #[serde(default)]
    #[validate(length(min = 1, message = "Product name cannot be blank"))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "SKU cannot be blank"))]
    pub sku: Option<String>,
    #[serde(default)]
    pub current_stock: Option<i64>,
    #[serde(default)]
    #[validate(range(min = 0, message = "Minimum stock level cannot be negative"))]
    pub min_stock_level: Option<i64>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub original_part_number: Option<String>,
    #[serde(default)]
    pub china_part_number: Option<String>,
}

impl ProductChanges {
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.map(|n| n.trim().to_string()),
            sku: self.sku.map(|s| s.trim().to_string()),
            note: non_blank(self.note),
            original_part_number: non_blank(self.original_part_number),
            china_part_number: non_blank(self.china_part_number),
            ..self
        }
    }

    /// Apply the changes to a stored product in place
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(sku) = &self.sku {
            product.sku = sku.clone();
        }
        if let Some(stock) = self.current_stock {
            product.current_stock = stock;
        }
        if let Some(min) = self.min_stock_level {
            product.min_stock_level = min;
        }
        if self.note.is_some() {
            product.note = self.note.clone();
        }
        if self.original_part_number.is_some() {
            product.original_part_number = self.original_part_number.clone();
        }
        if self.china_part_number.is_some() {
            product.china_part_number = self.china_part_number.clone();
        }
    }
}

/// Create-or-update keyed by SKU
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertProductInput {
    #[validate(length(min = 1, message = "SKU is required"))]
    pub sku: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub current_stock: Option<i64>,
    #[serde(default)]
    #[validate(range(min = 0, message = "Minimum stock level cannot be negative"))]
    pub min_stock_level: Option<i64>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub original_part_number: Option<String>,
    #[serde(default)]
    pub china_part_number: Option<String>,
}

impl UpsertProductInput {
    /// Changes to apply when the SKU already exists
    pub fn changes(&self) -> ProductChanges {
        ProductChanges {
            name: non_blank(self.name.clone()),
            sku: None,
            current_stock: self.current_stock,
            min_stock_level: self.min_stock_level,
            note: self.note.clone(),
            original_part_number: self.original_part_number.clone(),
            china_part_number: self.china_part_number.clone(),
        }
        .normalized()
    }

    /// New product when the SKU is unknown; the SKU doubles as the name
    pub fn into_new_product(self) -> NewProduct {
        let sku = self.sku.trim().to_string();
        let name = non_blank(self.name).unwrap_or_else(|| sku.clone());
        NewProduct {
            name,
            sku,
            current_stock: self.current_stock.unwrap_or(0),
            min_stock_level: self.min_stock_level.unwrap_or(0),
            note: self.note,
            original_part_number: self.original_part_number,
            china_part_number: self.china_part_number,
        }
        .normalized()
    }
}

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
}

/// Result of an upsert
#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
    pub action: UpsertAction,
    pub product: Product,
}
