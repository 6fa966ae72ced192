//! Supplier models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A supplier delivering products. Names are unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Inline supplier description sent with a purchase when no `supplier_id` is known
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplierDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Validated supplier ready to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSupplier {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// How a purchase names its supplier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplierRef {
    /// Known supplier id
    Existing(i64),
    /// Find by name, or create from the descriptor
    ByName(NewSupplier),
}
