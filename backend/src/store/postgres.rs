//! PostgreSQL implementation of the storage boundary

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use shared::models::{
    NewPriceAlert, NewProduct, NewPurchaseHeader, NewPurchaseItem, NewStockMovement, NewSupplier,
    PriceAlert, Product, ProductChanges, PurchaseHeader, PurchaseItemDetail, PurchaseLineItem,
    PurchaseSummary, StockMovement, Supplier,
};
use shared::types::PriceAlertFilter;

use super::{Store, StoreError, StoreResult, StoreTx};

/// Store backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    /// Create a new PgStore instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// An open PostgreSQL transaction. sqlx rolls it back on drop.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> StoreResult<PgTx> {
        let tx = self.db.begin().await?;
        Ok(PgTx { tx })
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn get_product(&self, product_id: i64) -> StoreResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, current_stock, min_stock_level, note,
                   original_part_number, china_part_number, image_path, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(product)
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, current_stock, min_stock_level, note,
                   original_part_number, china_part_number, image_path, created_at, updated_at
            FROM products
            ORDER BY id DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(products)
    }

    async fn low_stock_products(&self) -> StoreResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, current_stock, min_stock_level, note,
                   original_part_number, china_part_number, image_path, created_at, updated_at
            FROM products
            WHERE current_stock <= min_stock_level
            ORDER BY current_stock - min_stock_level ASC, id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(products)
    }

    async fn list_suppliers(&self) -> StoreResult<Vec<Supplier>> {
        let suppliers = sqlx::query_as::<_, Supplier>(
            "SELECT id, name, email, phone, address, created_at FROM suppliers ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(suppliers)
    }

    async fn list_purchases(&self) -> StoreResult<Vec<PurchaseSummary>> {
        let purchases = sqlx::query_as::<_, PurchaseSummary>(
            r#"
            SELECT p.id, p.supplier_id, s.name AS supplier_name, p.purchase_date,
                   p.invoice_number, p.invoice_file_path, p.note, p.created_by_name
            FROM purchases p
            LEFT JOIN suppliers s ON s.id = p.supplier_id
            ORDER BY p.id DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(purchases)
    }

    async fn purchase_item_details(
        &self,
        purchase_ids: &[i64],
    ) -> StoreResult<Vec<PurchaseItemDetail>> {
        let items = sqlx::query_as::<_, PurchaseItemDetail>(
            r#"
            SELECT pi.id, pi.purchase_id, pi.product_id, pr.name AS product_name, pr.sku AS sku,
                   pi.quantity, pi.unit_price, pi.created_by_name AS item_created_by_name,
                   pi.item_note
            FROM purchase_items pi
            LEFT JOIN products pr ON pr.id = pi.product_id
            WHERE pi.purchase_id = ANY($1)
            ORDER BY pi.id ASC
            "#,
        )
        .bind(purchase_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    async fn list_price_alerts(&self, filter: &PriceAlertFilter) -> StoreResult<Vec<PriceAlert>> {
        let alerts = sqlx::query_as::<_, PriceAlert>(
            r#"
            SELECT id, product_id, supplier_id, purchase_item_id, old_unit_price, new_unit_price,
                   created_at, note
            FROM price_alerts
            WHERE ($1::BIGINT IS NULL OR product_id = $1)
            ORDER BY id DESC
            "#,
        )
        .bind(filter.product_id)
        .fetch_all(&self.db)
        .await?;

        Ok(alerts)
    }

    async fn stock_movements(&self, product_id: i64) -> StoreResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, purchase_id, quantity_change, unit_price, occurred_at, note
            FROM stock_movements
            WHERE product_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        Ok(movements)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_supplier(&mut self, supplier: &NewSupplier) -> StoreResult<i64> {
        // DO NOTHING keeps the transaction usable when a concurrent insert wins
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO suppliers (name, email, phone, address)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&supplier.name)
        .bind(&supplier.email)
        .bind(&supplier.phone)
        .bind(&supplier.address)
        .fetch_optional(&mut *self.tx)
        .await?;

        id.ok_or_else(|| StoreError::UniqueViolation("suppliers_name_key".to_string()))
    }

    async fn find_supplier_id(&mut self, name: &str) -> StoreResult<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM suppliers WHERE name = $1 LIMIT 1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(id)
    }

    async fn find_purchase_by_invoice(
        &mut self,
        supplier_id: i64,
        invoice_number: &str,
    ) -> StoreResult<Option<PurchaseHeader>> {
        let header = sqlx::query_as::<_, PurchaseHeader>(
            r#"
            SELECT id, supplier_id, purchase_date, invoice_number, invoice_file_path, note,
                   created_by_name, created_at
            FROM purchases
            WHERE supplier_id = $1 AND invoice_number = $2
            LIMIT 1
            "#,
        )
        .bind(supplier_id)
        .bind(invoice_number)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(header)
    }

    async fn insert_purchase(&mut self, header: &NewPurchaseHeader) -> StoreResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO purchases (supplier_id, purchase_date, invoice_number, invoice_file_path,
                                   note, created_by_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (supplier_id, invoice_number) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(header.supplier_id)
        .bind(header.purchase_date)
        .bind(&header.invoice_number)
        .bind(&header.invoice_file_path)
        .bind(&header.note)
        .bind(&header.created_by_name)
        .fetch_optional(&mut *self.tx)
        .await?;

        id.ok_or_else(|| StoreError::UniqueViolation("purchases_supplier_invoice_key".to_string()))
    }

    async fn attach_invoice_file(&mut self, purchase_id: i64, path: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE purchases SET invoice_file_path = $1 WHERE id = $2 AND invoice_file_path IS NULL",
        )
        .bind(path)
        .bind(purchase_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_purchase(&mut self, purchase_id: i64) -> StoreResult<Option<PurchaseHeader>> {
        let header = sqlx::query_as::<_, PurchaseHeader>(
            r#"
            SELECT id, supplier_id, purchase_date, invoice_number, invoice_file_path, note,
                   created_by_name, created_at
            FROM purchases
            WHERE id = $1
            "#,
        )
        .bind(purchase_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(header)
    }

    async fn insert_purchase_item(
        &mut self,
        item: &NewPurchaseItem,
    ) -> StoreResult<PurchaseLineItem> {
        let created = sqlx::query_as::<_, PurchaseLineItem>(
            r#"
            INSERT INTO purchase_items (purchase_id, product_id, quantity, unit_price,
                                        created_by_name, item_note)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, purchase_id, product_id, quantity, unit_price, created_by_name, item_note
            "#,
        )
        .bind(item.purchase_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(&item.created_by_name)
        .bind(&item.item_note)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(created)
    }

    async fn purchase_items(&mut self, purchase_id: i64) -> StoreResult<Vec<PurchaseLineItem>> {
        let items = sqlx::query_as::<_, PurchaseLineItem>(
            r#"
            SELECT id, purchase_id, product_id, quantity, unit_price, created_by_name, item_note
            FROM purchase_items
            WHERE purchase_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(items)
    }

    async fn insert_stock_movement(&mut self, movement: &NewStockMovement) -> StoreResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO stock_movements (product_id, purchase_id, quantity_change, unit_price,
                                         occurred_at, note)
            VALUES ($1, $2, $3, $4, NOW(), $5)
            RETURNING id
            "#,
        )
        .bind(movement.product_id)
        .bind(movement.purchase_id)
        .bind(movement.quantity_change)
        .bind(movement.unit_price)
        .bind(&movement.note)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn adjust_stock(&mut self, product_id: i64, delta: i64) -> StoreResult<i64> {
        let stock = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE products
            SET current_stock = current_stock + $1, updated_at = NOW()
            WHERE id = $2
            RETURNING current_stock
            "#,
        )
        .bind(delta)
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        stock.ok_or_else(|| StoreError::MissingReference("Product".to_string()))
    }

    async fn latest_unit_price(
        &mut self,
        product_id: i64,
        excluding_purchase_id: i64,
    ) -> StoreResult<Option<Decimal>> {
        let price = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT unit_price
            FROM purchase_items
            WHERE product_id = $1 AND purchase_id <> $2
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(product_id)
        .bind(excluding_purchase_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(price)
    }

    async fn insert_price_alert(&mut self, alert: &NewPriceAlert) -> StoreResult<PriceAlert> {
        let created = sqlx::query_as::<_, PriceAlert>(
            r#"
            INSERT INTO price_alerts (product_id, supplier_id, purchase_item_id, old_unit_price,
                                      new_unit_price, created_at, note)
            VALUES ($1, $2, $3, $4, $5, NOW(), $6)
            RETURNING id, product_id, supplier_id, purchase_item_id, old_unit_price,
                      new_unit_price, created_at, note
            "#,
        )
        .bind(alert.product_id)
        .bind(alert.supplier_id)
        .bind(alert.purchase_item_id)
        .bind(alert.old_unit_price)
        .bind(alert.new_unit_price)
        .bind(&alert.note)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(created)
    }

    async fn delete_price_alerts_for_items(&mut self, item_ids: &[i64]) -> StoreResult<u64> {
        if item_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM price_alerts WHERE purchase_item_id = ANY($1)")
            .bind(item_ids)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_stock_movements(&mut self, purchase_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM stock_movements WHERE purchase_id = $1")
            .bind(purchase_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_purchase_items(&mut self, purchase_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM purchase_items WHERE purchase_id = $1")
            .bind(purchase_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_purchase(&mut self, purchase_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM purchases WHERE id = $1")
            .bind(purchase_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_product(&mut self, product_id: i64) -> StoreResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, current_stock, min_stock_level, note,
                   original_part_number, china_part_number, image_path, created_at, updated_at
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(product)
    }

    async fn find_product_by_sku(&mut self, sku: &str) -> StoreResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, current_stock, min_stock_level, note,
                   original_part_number, china_part_number, image_path, created_at, updated_at
            FROM products
            WHERE sku = $1
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(sku)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(product)
    }

    async fn insert_product(&mut self, product: &NewProduct) -> StoreResult<Product> {
        let created = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (sku, name, current_stock, min_stock_level, note,
                                  original_part_number, china_part_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, sku, name, current_stock, min_stock_level, note,
                      original_part_number, china_part_number, image_path, created_at, updated_at
            "#,
        )
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.current_stock)
        .bind(product.min_stock_level)
        .bind(&product.note)
        .bind(&product.original_part_number)
        .bind(&product.china_part_number)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(created)
    }

    async fn update_product(
        &mut self,
        product_id: i64,
        changes: &ProductChanges,
    ) -> StoreResult<Option<Product>> {
        let updated = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                name = COALESCE($1, name),
                sku = COALESCE($2, sku),
                current_stock = COALESCE($3, current_stock),
                min_stock_level = COALESCE($4, min_stock_level),
                note = COALESCE($5, note),
                original_part_number = COALESCE($6, original_part_number),
                china_part_number = COALESCE($7, china_part_number),
                updated_at = NOW()
            WHERE id = $8
            RETURNING id, sku, name, current_stock, min_stock_level, note,
                      original_part_number, china_part_number, image_path, created_at, updated_at
            "#,
        )
        .bind(&changes.name)
        .bind(&changes.sku)
        .bind(changes.current_stock)
        .bind(changes.min_stock_level)
        .bind(&changes.note)
        .bind(&changes.original_part_number)
        .bind(&changes.china_part_number)
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(updated)
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
