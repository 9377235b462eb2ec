//! CRUD for the code/name lookup tables (extensions, countries, order
//! statuses, usage types).

use crate::db::models::{ReferenceItem, ReferenceKind};
use crate::db::sqlite::Storage;
use crate::error::OmsError;

impl Storage {
    pub async fn list_reference(&self, kind: ReferenceKind) -> Result<Vec<ReferenceItem>, OmsError> {
        let sql = format!("SELECT id, code, name FROM {} ORDER BY code", kind.table());
        Ok(sqlx::query_as(&sql).fetch_all(self.pool()).await?)
    }

    pub async fn get_reference(&self, kind: ReferenceKind, id: i64) -> Result<ReferenceItem, OmsError> {
        let sql = format!("SELECT id, code, name FROM {} WHERE id = ?", kind.table());
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| OmsError::not_found(kind.entity(), id))
    }

    pub async fn find_reference_by_code(
        &self,
        kind: ReferenceKind,
        code: &str,
    ) -> Result<Option<ReferenceItem>, OmsError> {
        let sql = format!("SELECT id, code, name FROM {} WHERE code = ?", kind.table());
        Ok(sqlx::query_as(&sql)
            .bind(code)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn get_reference_by_code(
        &self,
        kind: ReferenceKind,
        code: &str,
    ) -> Result<ReferenceItem, OmsError> {
        self.find_reference_by_code(kind, code)
            .await?
            .ok_or_else(|| OmsError::not_found(kind.entity(), code))
    }

    /// Insert a row; a taken code yields `Duplicate`.
    pub async fn insert_reference(
        &self,
        kind: ReferenceKind,
        code: &str,
        name: &str,
    ) -> Result<ReferenceItem, OmsError> {
        let sql = format!("INSERT INTO {} (code, name) VALUES (?, ?)", kind.table());
        let id = sqlx::query(&sql)
            .bind(code)
            .bind(name)
            .execute(self.pool())
            .await
            .map_err(|e| OmsError::from_insert(e, kind.entity(), code))?
            .last_insert_rowid();
        self.get_reference(kind, id).await
    }

    pub async fn update_reference(
        &self,
        kind: ReferenceKind,
        id: i64,
        code: &str,
        name: &str,
    ) -> Result<ReferenceItem, OmsError> {
        let sql = format!("UPDATE {} SET code = ?, name = ? WHERE id = ?", kind.table());
        let affected = sqlx::query(&sql)
            .bind(code)
            .bind(name)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| OmsError::from_insert(e, kind.entity(), code))?
            .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found(kind.entity(), id));
        }
        self.get_reference(kind, id).await
    }

    pub async fn delete_reference(&self, kind: ReferenceKind, id: i64) -> Result<(), OmsError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
        let affected = sqlx::query(&sql)
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found(kind.entity(), id));
        }
        Ok(())
    }
}
