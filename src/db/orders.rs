//! Local emission orders and the cache of server-side orders.

use crate::db::models::{ApiOrder, NewOrder, Order, SyncSummary, status};
use crate::db::sqlite::Storage;
use crate::error::OmsError;
use crate::types::OrderInfo;
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info};

const ORDER_COLUMNS: &str = "id, connection_id, extension_code, gtin, quantity, serial_number_type, \
     template_id, cis_type, status, order_id, comment, created_at, updated_at";
const API_ORDER_COLUMNS: &str = "id, order_id, connection_id, extension_code, status, buffers, \
     decline_reason, created_ts, last_seen_at, updated_at";

impl Storage {
    pub async fn list_orders(&self) -> Result<Vec<Order>, OmsError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id DESC");
        Ok(sqlx::query_as(&sql).fetch_all(self.pool()).await?)
    }

    pub async fn get_order(&self, id: i64) -> Result<Order, OmsError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| OmsError::not_found("order", id))
    }

    /// New orders start as drafts.
    pub async fn insert_order(&self, order: &NewOrder) -> Result<Order, OmsError> {
        let now = Utc::now();
        let id = sqlx::query(
            r#"INSERT INTO orders (
                connection_id, extension_code, gtin, quantity, serial_number_type,
                template_id, cis_type, status, comment, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(order.connection_id)
        .bind(&order.extension_code)
        .bind(&order.gtin)
        .bind(order.quantity)
        .bind(&order.serial_number_type)
        .bind(order.template_id)
        .bind(&order.cis_type)
        .bind(status::ORDER_DRAFT)
        .bind(&order.comment)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?
        .last_insert_rowid();
        self.get_order(id).await
    }

    pub async fn update_order(&self, id: i64, order: &NewOrder) -> Result<Order, OmsError> {
        let affected = sqlx::query(
            r#"UPDATE orders SET
                connection_id = ?, extension_code = ?, gtin = ?, quantity = ?,
                serial_number_type = ?, template_id = ?, cis_type = ?, comment = ?,
                updated_at = ?
               WHERE id = ?"#,
        )
        .bind(order.connection_id)
        .bind(&order.extension_code)
        .bind(&order.gtin)
        .bind(order.quantity)
        .bind(&order.serial_number_type)
        .bind(order.template_id)
        .bind(&order.cis_type)
        .bind(&order.comment)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("order", id));
        }
        self.get_order(id).await
    }

    /// Record the server order id and status after submission.
    pub async fn set_order_submitted(
        &self,
        id: i64,
        order_id: &str,
        order_status: &str,
    ) -> Result<Order, OmsError> {
        let affected = sqlx::query(
            "UPDATE orders SET order_id = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(order_id)
        .bind(order_status)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("order", id));
        }
        self.get_order(id).await
    }

    pub async fn delete_order(&self, id: i64) -> Result<(), OmsError> {
        let affected = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("order", id));
        }
        Ok(())
    }

    pub async fn list_api_orders(&self, connection_id: Option<i64>) -> Result<Vec<ApiOrder>, OmsError> {
        let sql = format!(
            "SELECT {API_ORDER_COLUMNS} FROM api_orders \
             WHERE (? IS NULL OR connection_id = ?) ORDER BY created_ts DESC, id DESC"
        );
        Ok(sqlx::query_as(&sql)
            .bind(connection_id)
            .bind(connection_id)
            .fetch_all(self.pool())
            .await?)
    }

    pub async fn get_api_order(&self, order_id: &str) -> Result<ApiOrder, OmsError> {
        let sql = format!("SELECT {API_ORDER_COLUMNS} FROM api_orders WHERE order_id = ?");
        sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| OmsError::not_found("api order", order_id))
    }

    /// Save one server pull for a (connection, extension) scope.
    ///
    /// Known orders are updated by `order_id`, unseen ones inserted, and
    /// orders of the scope missing from the pull are marked `OBSOLETE`.
    /// Rows are never deleted. Local orders with a matching `order_id` take
    /// over the server status; submitted local orders of the scope that the
    /// pull does not list become `OBSOLETE` as well.
    pub async fn sync_api_orders(
        &self,
        connection_id: i64,
        extension_code: &str,
        fetched: &[OrderInfo],
    ) -> Result<SyncSummary, OmsError> {
        let now = Utc::now();
        let mut summary = SyncSummary::default();
        let mut tx = self.pool().begin().await?;

        let mut seen = HashSet::with_capacity(fetched.len());
        for info in fetched {
            if !seen.insert(info.order_id.as_str()) {
                debug!(order_id = %info.order_id, "duplicate order in pull skipped");
                continue;
            }
            let buffers = serde_json::to_string(&info.buffers)?;

            let updated = sqlx::query(
                r#"UPDATE api_orders SET
                    connection_id = ?, extension_code = ?, status = ?, buffers = ?,
                    decline_reason = ?, created_ts = COALESCE(?, created_ts),
                    last_seen_at = ?, updated_at = ?
                   WHERE order_id = ?"#,
            )
            .bind(connection_id)
            .bind(extension_code)
            .bind(&info.order_status)
            .bind(&buffers)
            .bind(&info.decline_reason)
            .bind(info.created_timestamp)
            .bind(now)
            .bind(now)
            .bind(&info.order_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated > 0 {
                summary.updated += 1;
            } else {
                sqlx::query(
                    r#"INSERT INTO api_orders (
                        order_id, connection_id, extension_code, status, buffers,
                        decline_reason, created_ts, last_seen_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                )
                .bind(&info.order_id)
                .bind(connection_id)
                .bind(extension_code)
                .bind(&info.order_status)
                .bind(&buffers)
                .bind(&info.decline_reason)
                .bind(info.created_timestamp)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                summary.inserted += 1;
            }

            sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE order_id = ? AND status <> ?")
                .bind(&info.order_status)
                .bind(now)
                .bind(&info.order_id)
                .bind(&info.order_status)
                .execute(&mut *tx)
                .await?;
        }

        let known: Vec<(String,)> = sqlx::query_as(
            "SELECT order_id FROM api_orders WHERE connection_id = ? AND extension_code = ? AND status <> ?",
        )
        .bind(connection_id)
        .bind(extension_code)
        .bind(status::ORDER_OBSOLETE)
        .fetch_all(&mut *tx)
        .await?;

        for (order_id,) in known {
            if seen.contains(order_id.as_str()) {
                continue;
            }
            sqlx::query("UPDATE api_orders SET status = ?, updated_at = ? WHERE order_id = ?")
                .bind(status::ORDER_OBSOLETE)
                .bind(now)
                .bind(&order_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE order_id = ?")
                .bind(status::ORDER_OBSOLETE)
                .bind(now)
                .bind(&order_id)
                .execute(&mut *tx)
                .await?;
            summary.obsoleted += 1;
        }

        // Submitted here but never listed by the server.
        let submitted: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, order_id FROM orders \
             WHERE connection_id = ? AND extension_code = ? AND order_id IS NOT NULL AND status <> ?",
        )
        .bind(connection_id)
        .bind(extension_code)
        .bind(status::ORDER_OBSOLETE)
        .fetch_all(&mut *tx)
        .await?;

        for (id, order_id) in submitted {
            if seen.contains(order_id.as_str()) {
                continue;
            }
            sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status::ORDER_OBSOLETE)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            summary.obsoleted += 1;
        }

        tx.commit().await?;
        info!(
            connection_id,
            extension = extension_code,
            inserted = summary.inserted,
            updated = summary.updated,
            obsoleted = summary.obsoleted,
            "server orders saved"
        );
        Ok(summary)
    }
}
