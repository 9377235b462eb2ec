use crate::db::migrations;
use crate::db::models::ReferenceKind;
use crate::db::schema::{
    SEED_COUNTRIES, SEED_EXTENSIONS, SEED_ORDER_STATUSES, SEED_USAGE_TYPES, SQLITE_INIT, TABLES,
};
use crate::error::OmsError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

pub type SqlitePool = Pool<Sqlite>;

/// Local cache of everything the client knows. Cheap to clone.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `database_url` and bring its
    /// schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self, OmsError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(connect_opts)
            .await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        info!(database_url, "database ready");
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables, add columns missing from older databases, seed lookups.
    pub async fn init_schema(&self) -> Result<(), OmsError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }

        let added = migrations::run(&self.pool).await?;
        if added > 0 {
            info!(added, "schema migrated");
        }

        self.seed(ReferenceKind::Extension, SEED_EXTENSIONS).await?;
        self.seed(ReferenceKind::OrderStatus, SEED_ORDER_STATUSES).await?;
        self.seed(ReferenceKind::UsageType, SEED_USAGE_TYPES).await?;
        self.seed(ReferenceKind::Country, SEED_COUNTRIES).await?;
        Ok(())
    }

    async fn seed(&self, kind: ReferenceKind, rows: &[(&str, &str)]) -> Result<(), OmsError> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (code, name) VALUES (?, ?)",
            kind.table()
        );
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for &(code, name) in rows {
            inserted += sqlx::query(&sql)
                .bind(code)
                .bind(name)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        if inserted > 0 {
            debug!(table = kind.table(), inserted, "seeded reference rows");
        }
        Ok(())
    }

    /// Row count of every table, for the status report.
    pub async fn table_counts(&self) -> Result<Vec<(&'static str, i64)>, OmsError> {
        let mut counts = Vec::with_capacity(TABLES.len());
        for table in TABLES {
            let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
            counts.push((*table, count));
        }
        Ok(counts)
    }

    pub async fn missing_columns(&self) -> Result<Vec<(&'static str, &'static str)>, OmsError> {
        migrations::missing_columns(&self.pool).await
    }
}
