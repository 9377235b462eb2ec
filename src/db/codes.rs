//! Marking codes and aggregation files.

use crate::db::models::{AggregationFile, MarkingCode, MarkingCodeChanges, NewMarkingCode, status};
use crate::db::sqlite::Storage;
use crate::error::OmsError;
use crate::service::aggregation::LevelBuckets;
use crate::service::gs1::{GS_MARKER, normalize_code, server_code};
use chrono::Utc;

const CODE_COLUMNS: &str =
    "id, code, gtin, order_id, extension_code, block_id, status, report_id, created_at";
const FILE_COLUMNS: &str = "id, file_name, raw_json, level0_codes, level1_codes, level2_codes, \
     status, report_id, created_at";

impl Storage {
    pub async fn list_codes(&self, order_id: Option<&str>) -> Result<Vec<MarkingCode>, OmsError> {
        let sql = format!(
            "SELECT {CODE_COLUMNS} FROM marking_codes WHERE (? IS NULL OR order_id = ?) ORDER BY id"
        );
        Ok(sqlx::query_as(&sql)
            .bind(order_id)
            .bind(order_id)
            .fetch_all(self.pool())
            .await?)
    }

    pub async fn get_code(&self, id: i64) -> Result<MarkingCode, OmsError> {
        let sql = format!("SELECT {CODE_COLUMNS} FROM marking_codes WHERE id = ?");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| OmsError::not_found("marking code", id))
    }

    pub async fn find_code(&self, code: &str) -> Result<Option<MarkingCode>, OmsError> {
        let sql = format!("SELECT {CODE_COLUMNS} FROM marking_codes WHERE code = ?");
        Ok(sqlx::query_as(&sql)
            .bind(normalize_code(code))
            .fetch_optional(self.pool())
            .await?)
    }

    /// Store codes in normalized form; codes already present are skipped.
    /// Returns how many rows were added.
    pub async fn insert_codes(&self, codes: &[NewMarkingCode]) -> Result<u64, OmsError> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;
        let mut inserted = 0;
        for item in codes {
            let code = normalize_code(&item.code);
            if code.is_empty() {
                continue;
            }
            inserted += sqlx::query(
                r#"INSERT OR IGNORE INTO marking_codes (
                    code, gtin, order_id, extension_code, block_id, status, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(code)
            .bind(&item.gtin)
            .bind(&item.order_id)
            .bind(&item.extension_code)
            .bind(&item.block_id)
            .bind(status::CODE_EMITTED)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Returns how many stored codes were marked. A code given without its
    /// crypto tail marks the stored code with the same head.
    pub async fn mark_codes_reported<S: AsRef<str>>(
        &self,
        codes: &[S],
        report_id: &str,
    ) -> Result<u64, OmsError> {
        let mut tx = self.pool().begin().await?;
        let mut marked = 0;
        for code in codes {
            let code = normalize_code(code.as_ref());
            if code.is_empty() {
                continue;
            }
            let head = format!("{}{GS_MARKER}", server_code(&code));
            let head_len = i64::try_from(head.chars().count()).unwrap_or(i64::MAX);
            marked += sqlx::query(
                "UPDATE marking_codes SET status = ?, report_id = ? \
                 WHERE code = ? OR substr(code, 1, ?) = ?",
            )
            .bind(status::CODE_REPORTED)
            .bind(report_id)
            .bind(&code)
            .bind(head_len)
            .bind(&head)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(marked)
    }

    pub async fn update_code(
        &self,
        id: i64,
        changes: &MarkingCodeChanges,
    ) -> Result<MarkingCode, OmsError> {
        let affected = sqlx::query(
            "UPDATE marking_codes SET gtin = ?, order_id = ?, block_id = ?, status = ? WHERE id = ?",
        )
        .bind(&changes.gtin)
        .bind(&changes.order_id)
        .bind(&changes.block_id)
        .bind(&changes.status)
        .bind(id)
        .execute(self.pool())
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("marking code", id));
        }
        self.get_code(id).await
    }

    pub async fn delete_code(&self, id: i64) -> Result<(), OmsError> {
        let affected = sqlx::query("DELETE FROM marking_codes WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("marking code", id));
        }
        Ok(())
    }

    pub async fn list_aggregation_files(&self) -> Result<Vec<AggregationFile>, OmsError> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM aggregation_files ORDER BY id DESC");
        Ok(sqlx::query_as(&sql).fetch_all(self.pool()).await?)
    }

    pub async fn get_aggregation_file(&self, id: i64) -> Result<AggregationFile, OmsError> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM aggregation_files WHERE id = ?");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| OmsError::not_found("aggregation file", id))
    }

    /// Persist the raw document alongside its per-level code lists.
    pub async fn insert_aggregation_file(
        &self,
        file_name: &str,
        raw_json: &str,
        buckets: &LevelBuckets,
    ) -> Result<AggregationFile, OmsError> {
        let id = sqlx::query(
            r#"INSERT INTO aggregation_files (
                file_name, raw_json, level0_codes, level1_codes, level2_codes, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(file_name)
        .bind(raw_json)
        .bind(serde_json::to_string(&buckets.level0)?)
        .bind(serde_json::to_string(&buckets.level1)?)
        .bind(serde_json::to_string(&buckets.level2)?)
        .bind(status::FILE_NEW)
        .bind(Utc::now())
        .execute(self.pool())
        .await?
        .last_insert_rowid();
        self.get_aggregation_file(id).await
    }

    pub async fn set_aggregation_file_sent(
        &self,
        id: i64,
        report_id: &str,
    ) -> Result<AggregationFile, OmsError> {
        let affected = sqlx::query("UPDATE aggregation_files SET status = ?, report_id = ? WHERE id = ?")
            .bind(status::FILE_SENT)
            .bind(report_id)
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("aggregation file", id));
        }
        self.get_aggregation_file(id).await
    }

    /// Rename a file or change its status; going back to `NEW` forgets the
    /// report id so the file can be reported again.
    pub async fn update_aggregation_file(
        &self,
        id: i64,
        file_name: &str,
        file_status: &str,
    ) -> Result<AggregationFile, OmsError> {
        let affected = sqlx::query(
            r#"UPDATE aggregation_files SET
                file_name = ?, status = ?,
                report_id = CASE WHEN ? = ? THEN NULL ELSE report_id END
               WHERE id = ?"#,
        )
        .bind(file_name)
        .bind(file_status)
        .bind(file_status)
        .bind(status::FILE_NEW)
        .bind(id)
        .execute(self.pool())
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("aggregation file", id));
        }
        self.get_aggregation_file(id).await
    }

    pub async fn delete_aggregation_file(&self, id: i64) -> Result<(), OmsError> {
        let affected = sqlx::query("DELETE FROM aggregation_files WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("aggregation file", id));
        }
        Ok(())
    }
}
