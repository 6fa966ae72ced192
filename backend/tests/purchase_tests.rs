//! Purchase recording tests
//!
//! Drives the purchase engine against the in-memory store:
//! - Supplier and header resolution (find-or-create, idempotent merge)
//! - Stock and ledger updates
//! - Price alert triggering
//! - All-or-nothing failure and reversal

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::models::{
    NewProduct, Product, PurchaseItemRequest, RecordPurchaseRequest, SupplierDescriptor,
};
use shared::types::PriceAlertFilter;
use stockroom_backend::services::{ProductService, PurchaseService};
use stockroom_backend::{AppError, MemoryStore, Store};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

async fn seed_product(store: &MemoryStore, sku: &str, stock: i64) -> Product {
    ProductService::new(store.clone())
        .create_product(NewProduct {
            name: format!("Part {}", sku),
            sku: sku.to_string(),
            current_stock: stock,
            min_stock_level: 0,
            note: None,
            original_part_number: None,
            china_part_number: None,
        })
        .await
        .unwrap()
}

async fn stock_of(store: &MemoryStore, product_id: i64) -> i64 {
    store.get_product(product_id).await.unwrap().unwrap().current_stock
}

fn item(product_id: i64, quantity: i64, unit_price: &str) -> PurchaseItemRequest {
    PurchaseItemRequest {
        product_id: Some(product_id),
        quantity: Some(quantity),
        unit_price: Some(dec(unit_price)),
        ..Default::default()
    }
}

fn purchase(
    supplier: &str,
    invoice: &str,
    items: Vec<PurchaseItemRequest>,
) -> RecordPurchaseRequest {
    RecordPurchaseRequest {
        supplier: Some(SupplierDescriptor {
            name: Some(supplier.to_string()),
            ..Default::default()
        }),
        purchase_date: Some("2024-01-15".to_string()),
        invoice_number: Some(invoice.to_string()),
        items,
        ..Default::default()
    }
}

// ============================================================================
// Recording
// ============================================================================

#[tokio::test]
async fn test_records_purchase_with_new_supplier() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let nut = seed_product(&store, "NUT-10", 4).await;
    let service = PurchaseService::new(store.clone());

    let mut request = purchase(
        "Acme",
        "INV-1",
        vec![item(bolt.id, 5, "10.00"), item(nut.id, 3, "2.50")],
    );
    request.created_by_name = Some("Ayse".to_string());
    request.note = Some("January delivery".to_string());

    let recorded = service.record_purchase(request).await.unwrap();

    assert_eq!(recorded.purchase.invoice_number, "INV-1");
    assert_eq!(recorded.purchase.note.as_deref(), Some("January delivery"));
    assert_eq!(recorded.items.len(), 2);
    assert!(recorded.price_alerts.is_empty());
    // Header-level actor and note carry down to the items
    assert_eq!(recorded.items[0].created_by_name.as_deref(), Some("Ayse"));
    assert_eq!(recorded.items[1].item_note.as_deref(), Some("January delivery"));

    assert_eq!(stock_of(&store, bolt.id).await, 5);
    assert_eq!(stock_of(&store, nut.id).await, 7);

    let suppliers = store.list_suppliers().await.unwrap();
    assert_eq!(suppliers.len(), 1);
    assert_eq!(suppliers[0].name, "Acme");
    assert_eq!(suppliers[0].id, recorded.purchase.supplier_id);

    let movements = store.stock_movements(bolt.id).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].quantity_change, 5);
    assert_eq!(movements[0].unit_price, Some(dec("10.00")));
    assert_eq!(movements[0].purchase_id, Some(recorded.purchase.id));
    assert_eq!(
        movements[0].note.as_deref(),
        Some(format!("Purchase {}", recorded.purchase.id).as_str())
    );
}

#[tokio::test]
async fn test_item_level_actor_overrides_header() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let service = PurchaseService::new(store.clone());

    let mut line = item(bolt.id, 1, "1.00");
    line.created_by_name = Some("Mehmet".to_string());
    line.note = Some("damaged box".to_string());
    let mut request = purchase("Acme", "INV-1", vec![line]);
    request.created_by_name = Some("Ayse".to_string());

    let recorded = service.record_purchase(request).await.unwrap();
    assert_eq!(recorded.items[0].created_by_name.as_deref(), Some("Mehmet"));
    assert_eq!(recorded.items[0].item_note.as_deref(), Some("damaged box"));
}

#[tokio::test]
async fn test_supplier_is_reused_by_name() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let service = PurchaseService::new(store.clone());

    let first = service
        .record_purchase(purchase("Acme", "INV-1", vec![item(bolt.id, 1, "1.00")]))
        .await
        .unwrap();
    let second = service
        .record_purchase(purchase("Acme", "INV-2", vec![item(bolt.id, 1, "1.00")]))
        .await
        .unwrap();

    assert_eq!(first.purchase.supplier_id, second.purchase.supplier_id);
    assert_ne!(first.purchase.id, second.purchase.id);
    assert_eq!(store.list_suppliers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_existing_supplier_id_is_used_directly() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let service = PurchaseService::new(store.clone());

    let first = service
        .record_purchase(purchase("Acme", "INV-1", vec![item(bolt.id, 1, "1.00")]))
        .await
        .unwrap();

    let request = RecordPurchaseRequest {
        supplier_id: Some(first.purchase.supplier_id),
        purchase_date: Some("2024-02-01".to_string()),
        invoice_number: Some("INV-2".to_string()),
        items: vec![item(bolt.id, 2, "1.00")],
        ..Default::default()
    };
    let second = service.record_purchase(request).await.unwrap();
    assert_eq!(second.purchase.supplier_id, first.purchase.supplier_id);
}

#[tokio::test]
async fn test_resubmission_merges_into_existing_header() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let service = PurchaseService::new(store.clone());

    let mut first = purchase("Acme", "INV-1", vec![item(bolt.id, 5, "10.00")]);
    first.note = Some("first".to_string());
    let first = service.record_purchase(first).await.unwrap();
    assert_eq!(first.purchase.invoice_file_path, None);

    let mut second = purchase("Acme", "INV-1", vec![item(bolt.id, 2, "10.00")]);
    second.note = Some("second".to_string());
    second.invoice_file_path = Some("/uploads/1_a.pdf".to_string());
    let second = service.record_purchase(second).await.unwrap();

    assert_eq!(second.purchase.id, first.purchase.id);
    // Note is never overwritten; a missing file is filled in
    assert_eq!(second.purchase.note.as_deref(), Some("first"));
    assert_eq!(
        second.purchase.invoice_file_path.as_deref(),
        Some("/uploads/1_a.pdf")
    );

    let mut third = purchase("Acme", "INV-1", vec![item(bolt.id, 1, "10.00")]);
    third.invoice_file_path = Some("/uploads/2_b.pdf".to_string());
    let third = service.record_purchase(third).await.unwrap();
    assert_eq!(
        third.purchase.invoice_file_path.as_deref(),
        Some("/uploads/1_a.pdf")
    );

    assert_eq!(stock_of(&store, bolt.id).await, 8);

    let listing = service.list_purchases().await.unwrap();
    assert_eq!(listing.len(), 1);
    let quantities: Vec<i32> = listing[0].items.iter().map(|i| i.quantity).collect();
    assert_eq!(quantities, vec![5, 2, 1]);
}

#[tokio::test]
async fn test_listing_is_newest_first() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let service = PurchaseService::new(store.clone());

    for invoice in ["INV-1", "INV-2", "INV-3"] {
        service
            .record_purchase(purchase("Acme", invoice, vec![item(bolt.id, 1, "1.00")]))
            .await
            .unwrap();
    }

    let listing = service.list_purchases().await.unwrap();
    let invoices: Vec<&str> = listing
        .iter()
        .map(|p| p.purchase.invoice_number.as_str())
        .collect();
    assert_eq!(invoices, vec!["INV-3", "INV-2", "INV-1"]);
    assert_eq!(listing[0].purchase.supplier_name.as_deref(), Some("Acme"));
    assert_eq!(listing[0].items[0].sku.as_deref(), Some("BOLT-10"));
}

// ============================================================================
// Price alerts
// ============================================================================

#[tokio::test]
async fn test_price_change_raises_alert() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let service = PurchaseService::new(store.clone());

    let first = service
        .record_purchase(purchase("Acme", "INV-1", vec![item(bolt.id, 5, "10.00")]))
        .await
        .unwrap();
    assert!(first.price_alerts.is_empty());

    let second = service
        .record_purchase(purchase("Acme", "INV-2", vec![item(bolt.id, 5, "12.00")]))
        .await
        .unwrap();
    assert_eq!(second.price_alerts.len(), 1);
    let alert = &second.price_alerts[0];
    assert_eq!(alert.product_id, bolt.id);
    assert_eq!(alert.supplier_id, second.purchase.supplier_id);
    assert_eq!(alert.purchase_item_id, second.items[0].id);
    assert_eq!(alert.old_unit_price, dec("10.00"));
    assert_eq!(alert.new_unit_price, dec("12.00"));
    assert_eq!(alert.change(), dec("2.00"));
    assert!(alert.is_increase());
    assert_eq!(alert.note.as_deref(), Some("Auto-generated on purchase"));

    // Same price as the latest purchase: no alert
    let third = service
        .record_purchase(purchase("Acme", "INV-3", vec![item(bolt.id, 5, "12.00")]))
        .await
        .unwrap();
    assert!(third.price_alerts.is_empty());

    let history = service
        .list_price_alerts(PriceAlertFilter {
            product_id: Some(bolt.id),
        })
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_items_on_same_header_are_not_compared() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let service = PurchaseService::new(store.clone());

    let recorded = service
        .record_purchase(purchase(
            "Acme",
            "INV-1",
            vec![item(bolt.id, 1, "10.00"), item(bolt.id, 1, "11.00")],
        ))
        .await
        .unwrap();
    assert!(recorded.price_alerts.is_empty());
}

#[tokio::test]
async fn test_alert_history_filters_by_product() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let nut = seed_product(&store, "NUT-10", 0).await;
    let service = PurchaseService::new(store.clone());

    service
        .record_purchase(purchase(
            "Acme",
            "INV-1",
            vec![item(bolt.id, 1, "1.00"), item(nut.id, 1, "1.00")],
        ))
        .await
        .unwrap();
    service
        .record_purchase(purchase(
            "Acme",
            "INV-2",
            vec![item(bolt.id, 1, "2.00"), item(nut.id, 1, "3.00")],
        ))
        .await
        .unwrap();

    let all = service
        .list_price_alerts(PriceAlertFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    // Newest first
    assert_eq!(all[0].product_id, nut.id);

    let nut_only = service
        .list_price_alerts(PriceAlertFilter {
            product_id: Some(nut.id),
        })
        .await
        .unwrap();
    assert_eq!(nut_only.len(), 1);
    assert_eq!(nut_only[0].new_unit_price, dec("3.00"));
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_unknown_product_rolls_back_everything() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 3).await;
    let service = PurchaseService::new(store.clone());

    let err = service
        .record_purchase(purchase(
            "Acme",
            "INV-1",
            vec![item(bolt.id, 5, "10.00"), item(9999, 1, "1.00")],
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(ref entity) if entity == "Product"));
    assert_eq!(stock_of(&store, bolt.id).await, 3);
    assert!(service.list_purchases().await.unwrap().is_empty());
    assert!(store.list_suppliers().await.unwrap().is_empty());
    // Only the initial stock entry remains
    assert_eq!(store.stock_movements(bolt.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_supplier_id_is_not_found() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let service = PurchaseService::new(store.clone());

    let request = RecordPurchaseRequest {
        supplier_id: Some(42),
        purchase_date: Some("2024-01-15".to_string()),
        invoice_number: Some("INV-1".to_string()),
        items: vec![item(bolt.id, 1, "1.00")],
        ..Default::default()
    };
    let err = service.record_purchase(request).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(ref entity) if entity == "Supplier"));
}

#[tokio::test]
async fn test_invalid_item_is_rejected_before_writing() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let service = PurchaseService::new(store.clone());

    let err = service
        .record_purchase(purchase(
            "Acme",
            "INV-1",
            vec![item(bolt.id, 1, "1.00"), item(bolt.id, 0, "1.00")],
        ))
        .await
        .unwrap_err();

    match err {
        AppError::Validation { field, .. } => assert_eq!(field, "items[1].quantity"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(store.list_suppliers().await.unwrap().is_empty());
    assert_eq!(stock_of(&store, bolt.id).await, 0);
}

// ============================================================================
// Reversal
// ============================================================================

#[tokio::test]
async fn test_delete_reverses_purchase() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 2).await;
    let service = PurchaseService::new(store.clone());

    service
        .record_purchase(purchase("Acme", "INV-1", vec![item(bolt.id, 5, "10.00")]))
        .await
        .unwrap();
    let second = service
        .record_purchase(purchase("Acme", "INV-2", vec![item(bolt.id, 4, "12.00")]))
        .await
        .unwrap();
    assert_eq!(stock_of(&store, bolt.id).await, 11);
    assert_eq!(second.price_alerts.len(), 1);

    let deletion = service.delete_purchase(second.purchase.id).await.unwrap();
    assert!(deletion.deleted);

    assert_eq!(stock_of(&store, bolt.id).await, 7);
    assert!(service
        .list_price_alerts(PriceAlertFilter::default())
        .await
        .unwrap()
        .is_empty());
    let movements = store.stock_movements(bolt.id).await.unwrap();
    assert!(movements
        .iter()
        .all(|m| m.purchase_id != Some(second.purchase.id)));
    assert_eq!(service.list_purchases().await.unwrap().len(), 1);

    // Deleting again reports nothing deleted
    let again = service.delete_purchase(second.purchase.id).await.unwrap();
    assert!(!again.deleted);
}

#[tokio::test]
async fn test_delete_can_leave_negative_stock() {
    let store = MemoryStore::new();
    let bolt = seed_product(&store, "BOLT-10", 0).await;
    let service = PurchaseService::new(store.clone());
    let products = ProductService::new(store.clone());

    let recorded = service
        .record_purchase(purchase("Acme", "INV-1", vec![item(bolt.id, 5, "10.00")]))
        .await
        .unwrap();

    // Three units consumed elsewhere
    products
        .update_product(
            bolt.id,
            shared::models::ProductChanges {
                current_stock: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    service.delete_purchase(recorded.purchase.id).await.unwrap();
    assert_eq!(stock_of(&store, bolt.id).await, -3);
}

// ============================================================================
// Property Tests
// ============================================================================

fn purchase_strategy() -> impl Strategy<Value = Vec<(usize, i64, i64)>> {
    // (product index, quantity, unit price in cents)
    prop::collection::vec((0usize..3, 1i64..50, 1i64..5000), 1..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Current stock always equals the sum of the product's ledger entries,
    /// after any mix of recordings and reversals
    #[test]
    fn prop_stock_matches_ledger(
        lines in purchase_strategy(),
        initial in 0i64..20,
        deletions in prop::collection::vec(any::<bool>(), 8),
    ) {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let mut products = Vec::new();
            for sku in ["A-1", "B-2", "C-3"] {
                products.push(seed_product(&store, sku, initial).await);
            }
            let service = PurchaseService::new(store.clone());

            let mut expected = vec![initial; products.len()];
            for (n, (index, quantity, cents)) in lines.iter().enumerate() {
                let product = &products[*index];
                let recorded = service
                    .record_purchase(purchase(
                        "Acme",
                        &format!("INV-{}", n),
                        vec![PurchaseItemRequest {
                            product_id: Some(product.id),
                            quantity: Some(*quantity),
                            unit_price: Some(Decimal::new(*cents, 2)),
                            ..Default::default()
                        }],
                    ))
                    .await
                    .unwrap();

                if deletions[n] {
                    service.delete_purchase(recorded.purchase.id).await.unwrap();
                } else {
                    expected[*index] += quantity;
                }
            }

            for (product, expected) in products.iter().zip(expected) {
                let stock = stock_of(&store, product.id).await;
                let ledger: i64 = store
                    .stock_movements(product.id)
                    .await
                    .unwrap()
                    .iter()
                    .map(|m| m.quantity_change)
                    .sum();
                prop_assert_eq!(stock, expected);
                prop_assert_eq!(ledger, stock);
            }
            Ok(())
        })?;
    }

    /// One alert per consecutive price change of a product
    #[test]
    fn prop_alert_per_price_change(prices in prop::collection::vec(1i64..5, 1..10)) {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let bolt = seed_product(&store, "BOLT-10", 0).await;
            let service = PurchaseService::new(store.clone());

            for (n, cents) in prices.iter().enumerate() {
                service
                    .record_purchase(purchase(
                        "Acme",
                        &format!("INV-{}", n),
                        vec![PurchaseItemRequest {
                            product_id: Some(bolt.id),
                            quantity: Some(1),
                            unit_price: Some(Decimal::new(*cents, 2)),
                            ..Default::default()
                        }],
                    ))
                    .await
                    .unwrap();
            }

            let expected = prices.windows(2).filter(|w| w[0] != w[1]).count();
            let alerts = service
                .list_price_alerts(PriceAlertFilter::default())
                .await
                .unwrap();
            prop_assert_eq!(alerts.len(), expected);
            Ok(())
        })?;
    }
}
