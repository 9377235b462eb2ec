use crate::db::models::{ApiLog, NewApiLog};
use crate::db::sqlite::Storage;
use crate::error::OmsError;
use chrono::Utc;

impl Storage {
    pub async fn insert_api_log(&self, log: &NewApiLog) -> Result<i64, OmsError> {
        let id = sqlx::query(
            r#"INSERT INTO api_logs (
                connection_id, method, url, request_body, status_code,
                response_body, error, duration_ms, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.connection_id)
        .bind(&log.method)
        .bind(&log.url)
        .bind(&log.request_body)
        .bind(log.status_code)
        .bind(&log.response_body)
        .bind(&log.error)
        .bind(log.duration_ms)
        .bind(Utc::now())
        .execute(self.pool())
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Newest first.
    pub async fn list_api_logs(&self, limit: i64) -> Result<Vec<ApiLog>, OmsError> {
        Ok(sqlx::query_as(
            r#"SELECT id, connection_id, method, url, request_body, status_code,
               response_body, error, duration_ms, created_at
               FROM api_logs ORDER BY id DESC LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn clear_api_logs(&self) -> Result<u64, OmsError> {
        Ok(sqlx::query("DELETE FROM api_logs")
            .execute(self.pool())
            .await?
            .rows_affected())
    }
}
