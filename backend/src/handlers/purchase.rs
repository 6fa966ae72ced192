//! HTTP handlers for purchase recording endpoints

use axum::{
    extract::{multipart::Field, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;

use shared::models::{
    PriceAlert, PurchaseDeletion, PurchaseWithItems, RecordPurchaseRequest, RecordedPurchase,
};
use shared::types::{PriceAlertFilter, ValidationIssue};

use crate::error::{AppError, AppResult};
use crate::services::PurchaseService;
use crate::store::Store;
use crate::uploads::{self, StoredUpload};
use crate::AppState;

/// Multipart field carrying the invoice document
pub const INVOICE_FILE_FIELD: &str = "invoice_file";

fn upload_error(err: impl std::fmt::Display) -> AppError {
    AppError::Upload(err.to_string())
}

fn parse_json_field<T: DeserializeOwned>(field: &str, value: &str) -> AppResult<T> {
    serde_json::from_str(value).map_err(|e| {
        ValidationIssue::new(field, format!("Invalid JSON in {}: {}", field, e)).into()
    })
}

fn blank_to_none(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Copy a text form field onto the request
fn apply_form_field(
    request: &mut RecordPurchaseRequest,
    name: &str,
    value: String,
) -> AppResult<()> {
    match name {
        "supplier_id" => {
            request.supplier_id = match blank_to_none(value) {
                Some(raw) => Some(raw.trim().parse().map_err(|_| {
                    ValidationIssue::new("supplier_id", "Supplier id must be an integer")
                })?),
                None => None,
            };
        }
        "supplier" => {
            request.supplier = match blank_to_none(value) {
                Some(raw) => Some(parse_json_field("supplier", &raw)?),
                None => None,
            };
        }
        "items" => {
            request.items = match blank_to_none(value) {
                Some(raw) => parse_json_field("items", &raw)?,
                None => Vec::new(),
            };
        }
        "purchase_date" => request.purchase_date = Some(value),
        "invoice_number" => request.invoice_number = Some(value),
        "note" => request.note = Some(value),
        "created_by_name" => request.created_by_name = Some(value),
        other => tracing::debug!(field = other, "Ignoring unknown purchase form field"),
    }
    Ok(())
}

/// Read the multipart form. A stored invoice is returned alongside the request so the
/// caller can remove it if recording fails.
async fn read_purchase_form(
    upload_dir: &str,
    multipart: &mut Multipart,
) -> AppResult<(RecordPurchaseRequest, Option<StoredUpload>)> {
    let mut request = RecordPurchaseRequest::default();
    let mut upload: Option<StoredUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or_default().to_string();

        let result = if name == INVOICE_FILE_FIELD {
            match store_invoice_field(upload_dir, field).await {
                Ok(Some(stored)) => {
                    // Last file part wins
                    if let Some(previous) = upload.replace(stored) {
                        uploads::discard(&previous).await;
                    }
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            }
        } else {
            match field.text().await {
                Ok(value) => apply_form_field(&mut request, &name, value),
                Err(e) => Err(upload_error(e)),
            }
        };

        if let Err(err) = result {
            if let Some(stored) = &upload {
                uploads::discard(stored).await;
            }
            return Err(err);
        }
    }

    Ok((request, upload))
}

async fn store_invoice_field(
    upload_dir: &str,
    field: Field<'_>,
) -> AppResult<Option<StoredUpload>> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let bytes = field.bytes().await.map_err(upload_error)?;
    // Browsers send an empty part when no file was chosen
    if file_name.is_empty() || bytes.is_empty() {
        return Ok(None);
    }
    uploads::store_invoice(upload_dir, &file_name, &bytes)
        .await
        .map(Some)
}

/// Record a purchase from a multipart form
pub async fn create_purchase<S: Store>(
    State(state): State<AppState<S>>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<RecordedPurchase>)> {
    let (mut request, upload) =
        read_purchase_form(&state.config.uploads.dir, &mut multipart).await?;
    if let Some(stored) = &upload {
        request.invoice_file_path = Some(stored.public_path.clone());
    }

    let service = PurchaseService::new(state.store);
    match service.record_purchase(request).await {
        Ok(recorded) => {
            // A merged header keeps its earlier invoice; the new upload is unreferenced
            if let Some(stored) = &upload {
                if recorded.purchase.invoice_file_path.as_deref()
                    != Some(stored.public_path.as_str())
                {
                    uploads::discard(stored).await;
                }
            }
            Ok((StatusCode::CREATED, Json(recorded)))
        }
        Err(err) => {
            if let Some(stored) = &upload {
                uploads::discard(stored).await;
            }
            Err(err)
        }
    }
}

/// List purchases with their items
pub async fn list_purchases<S: Store>(
    State(state): State<AppState<S>>,
) -> AppResult<Json<Vec<PurchaseWithItems>>> {
    let service = PurchaseService::new(state.store);
    let purchases = service.list_purchases().await?;
    Ok(Json(purchases))
}

/// Delete a purchase and reverse its effects
pub async fn delete_purchase<S: Store>(
    State(state): State<AppState<S>>,
    Path(purchase_id): Path<i64>,
) -> AppResult<Json<PurchaseDeletion>> {
    let service = PurchaseService::new(state.store);
    let deletion = service.delete_purchase(purchase_id).await?;
    Ok(Json(deletion))
}

/// Price alert history
pub async fn list_price_alerts<S: Store>(
    State(state): State<AppState<S>>,
    Query(filter): Query<PriceAlertFilter>,
) -> AppResult<Json<Vec<PriceAlert>>> {
    let service = PurchaseService::new(state.store);
    let alerts = service.list_price_alerts(filter).await?;
    Ok(Json(alerts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_form_fields_fill_request() {
        let mut request = RecordPurchaseRequest::default();
        apply_form_field(&mut request, "supplier", r#"{"name":"Acme"}"#.into()).unwrap();
        apply_form_field(&mut request, "purchase_date", "2024-01-15".into()).unwrap();
        apply_form_field(
            &mut request,
            "items",
            r#"[{"product_id":1,"quantity":5,"unit_price":"10.00"}]"#.into(),
        )
        .unwrap();

        assert_eq!(request.supplier.and_then(|s| s.name).as_deref(), Some("Acme"));
        assert_eq!(request.purchase_date.as_deref(), Some("2024-01-15"));
        assert_eq!(request.items.len(), 1);
        assert_eq!(request.items[0].unit_price, Some(Decimal::from_str("10.00").unwrap()));
    }

    #[test]
    fn test_blank_supplier_id_is_absent() {
        let mut request = RecordPurchaseRequest::default();
        apply_form_field(&mut request, "supplier_id", "  ".into()).unwrap();
        assert_eq!(request.supplier_id, None);
    }

    #[test]
    fn test_malformed_items_names_field() {
        let mut request = RecordPurchaseRequest::default();
        let err = apply_form_field(&mut request, "items", "[{".into()).unwrap_err();
        match err {
            AppError::Validation { field, .. } => assert_eq!(field, "items"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
