//! Connections, credentials and nomenclature.

use crate::db::models::{
    Connection, Credential, NewConnection, NewCredential, NewNomenclature, Nomenclature,
};
use crate::db::sqlite::Storage;
use crate::error::OmsError;
use chrono::Utc;

const CONNECTION_COLUMNS: &str =
    "id, name, base_url, oms_id, extension_code, participant_id, created_at";
const CREDENTIAL_COLUMNS: &str = "id, name, client_token, connection_id, created_at";
const NOMENCLATURE_COLUMNS: &str = "id, gtin, name, extension_code, template_id, country_code";

impl Storage {
    pub async fn list_connections(&self) -> Result<Vec<Connection>, OmsError> {
        let sql = format!("SELECT {CONNECTION_COLUMNS} FROM connections ORDER BY id");
        Ok(sqlx::query_as(&sql).fetch_all(self.pool()).await?)
    }

    pub async fn get_connection(&self, id: i64) -> Result<Connection, OmsError> {
        let sql = format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = ?");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| OmsError::not_found("connection", id))
    }

    pub async fn insert_connection(&self, conn: &NewConnection) -> Result<Connection, OmsError> {
        let id = sqlx::query(
            r#"INSERT INTO connections (name, base_url, oms_id, extension_code, participant_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&conn.name)
        .bind(&conn.base_url)
        .bind(&conn.oms_id)
        .bind(&conn.extension_code)
        .bind(&conn.participant_id)
        .bind(Utc::now())
        .execute(self.pool())
        .await?
        .last_insert_rowid();
        self.get_connection(id).await
    }

    pub async fn update_connection(
        &self,
        id: i64,
        conn: &NewConnection,
    ) -> Result<Connection, OmsError> {
        let affected = sqlx::query(
            r#"UPDATE connections SET
                name = ?, base_url = ?, oms_id = ?, extension_code = ?, participant_id = ?
               WHERE id = ?"#,
        )
        .bind(&conn.name)
        .bind(&conn.base_url)
        .bind(&conn.oms_id)
        .bind(&conn.extension_code)
        .bind(&conn.participant_id)
        .bind(id)
        .execute(self.pool())
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("connection", id));
        }
        self.get_connection(id).await
    }

    /// Credentials pointing at the connection are detached, not deleted.
    pub async fn delete_connection(&self, id: i64) -> Result<(), OmsError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("UPDATE credentials SET connection_id = NULL WHERE connection_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let affected = sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("connection", id));
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_credentials(&self) -> Result<Vec<Credential>, OmsError> {
        let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials ORDER BY id");
        Ok(sqlx::query_as(&sql).fetch_all(self.pool()).await?)
    }

    pub async fn get_credential(&self, id: i64) -> Result<Credential, OmsError> {
        let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = ?");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| OmsError::not_found("credential", id))
    }

    /// Most recently added credential bound to the connection.
    pub async fn credential_for_connection(
        &self,
        connection_id: i64,
    ) -> Result<Option<Credential>, OmsError> {
        let sql = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE connection_id = ? ORDER BY id DESC LIMIT 1"
        );
        Ok(sqlx::query_as(&sql)
            .bind(connection_id)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn insert_credential(&self, cred: &NewCredential) -> Result<Credential, OmsError> {
        let id = sqlx::query(
            "INSERT INTO credentials (name, client_token, connection_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&cred.name)
        .bind(&cred.client_token)
        .bind(cred.connection_id)
        .bind(Utc::now())
        .execute(self.pool())
        .await?
        .last_insert_rowid();
        self.get_credential(id).await
    }

    pub async fn update_credential(
        &self,
        id: i64,
        cred: &NewCredential,
    ) -> Result<Credential, OmsError> {
        let affected = sqlx::query(
            "UPDATE credentials SET name = ?, client_token = ?, connection_id = ? WHERE id = ?",
        )
        .bind(&cred.name)
        .bind(&cred.client_token)
        .bind(cred.connection_id)
        .bind(id)
        .execute(self.pool())
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("credential", id));
        }
        self.get_credential(id).await
    }

    pub async fn delete_credential(&self, id: i64) -> Result<(), OmsError> {
        let affected = sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("credential", id));
        }
        Ok(())
    }

    pub async fn list_nomenclature(&self) -> Result<Vec<Nomenclature>, OmsError> {
        let sql = format!("SELECT {NOMENCLATURE_COLUMNS} FROM nomenclature ORDER BY name, gtin");
        Ok(sqlx::query_as(&sql).fetch_all(self.pool()).await?)
    }

    pub async fn get_nomenclature(&self, id: i64) -> Result<Nomenclature, OmsError> {
        let sql = format!("SELECT {NOMENCLATURE_COLUMNS} FROM nomenclature WHERE id = ?");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| OmsError::not_found("nomenclature", id))
    }

    pub async fn find_nomenclature_by_gtin(
        &self,
        gtin: &str,
    ) -> Result<Option<Nomenclature>, OmsError> {
        let sql = format!("SELECT {NOMENCLATURE_COLUMNS} FROM nomenclature WHERE gtin = ? LIMIT 1");
        Ok(sqlx::query_as(&sql)
            .bind(gtin)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn insert_nomenclature(&self, item: &NewNomenclature) -> Result<Nomenclature, OmsError> {
        let id = sqlx::query(
            r#"INSERT INTO nomenclature (gtin, name, extension_code, template_id, country_code)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&item.gtin)
        .bind(&item.name)
        .bind(&item.extension_code)
        .bind(item.template_id)
        .bind(&item.country_code)
        .execute(self.pool())
        .await?
        .last_insert_rowid();
        self.get_nomenclature(id).await
    }

    pub async fn update_nomenclature(
        &self,
        id: i64,
        item: &NewNomenclature,
    ) -> Result<Nomenclature, OmsError> {
        let affected = sqlx::query(
            r#"UPDATE nomenclature SET
                gtin = ?, name = ?, extension_code = ?, template_id = ?, country_code = ?
               WHERE id = ?"#,
        )
        .bind(&item.gtin)
        .bind(&item.name)
        .bind(&item.extension_code)
        .bind(item.template_id)
        .bind(&item.country_code)
        .bind(id)
        .execute(self.pool())
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("nomenclature", id));
        }
        self.get_nomenclature(id).await
    }

    pub async fn delete_nomenclature(&self, id: i64) -> Result<(), OmsError> {
        let affected = sqlx::query("DELETE FROM nomenclature WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(OmsError::not_found("nomenclature", id));
        }
        Ok(())
    }
}
