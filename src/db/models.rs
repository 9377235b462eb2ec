use crate::error::OmsError;
use crate::service::aggregation::LevelBuckets;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Code/name lookup tables that share one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    Extension,
    Country,
    OrderStatus,
    UsageType,
}

impl ReferenceKind {
    pub fn table(self) -> &'static str {
        match self {
            ReferenceKind::Extension => "extensions",
            ReferenceKind::Country => "countries",
            ReferenceKind::OrderStatus => "order_statuses",
            ReferenceKind::UsageType => "usage_types",
        }
    }

    pub fn entity(self) -> &'static str {
        match self {
            ReferenceKind::Extension => "extension",
            ReferenceKind::Country => "country",
            ReferenceKind::OrderStatus => "order status",
            ReferenceKind::UsageType => "usage type",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct ReferenceItem {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Connection {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub oms_id: String,
    pub extension_code: Option<String>,
    pub participant_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewConnection {
    pub name: String,
    pub base_url: String,
    pub oms_id: String,
    pub extension_code: Option<String>,
    pub participant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Credential {
    pub id: i64,
    pub name: String,
    pub client_token: String,
    pub connection_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewCredential {
    pub name: String,
    pub client_token: String,
    pub connection_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Nomenclature {
    pub id: i64,
    pub gtin: String,
    pub name: String,
    pub extension_code: Option<String>,
    pub template_id: Option<i64>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewNomenclature {
    pub gtin: String,
    pub name: String,
    pub extension_code: Option<String>,
    pub template_id: Option<i64>,
    pub country_code: Option<String>,
}

/// Emission order composed locally; `order_id` is set once the OMS accepts it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Order {
    pub id: i64,
    pub connection_id: i64,
    pub extension_code: String,
    pub gtin: String,
    pub quantity: i64,
    pub serial_number_type: String,
    pub template_id: Option<i64>,
    pub cis_type: String,
    pub status: String,
    pub order_id: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewOrder {
    pub connection_id: i64,
    pub extension_code: String,
    pub gtin: String,
    pub quantity: i64,
    pub serial_number_type: String,
    pub template_id: Option<i64>,
    pub cis_type: String,
    pub comment: Option<String>,
}

/// Order as last reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct ApiOrder {
    pub id: i64,
    pub order_id: String,
    pub connection_id: i64,
    pub extension_code: String,
    pub status: String,
    /// `BufferInfo` list as JSON.
    pub buffers: String,
    pub decline_reason: Option<String>,
    pub created_ts: Option<i64>,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct MarkingCode {
    pub id: i64,
    pub code: String,
    pub gtin: Option<String>,
    pub order_id: Option<String>,
    pub extension_code: String,
    pub block_id: Option<String>,
    pub status: String,
    pub report_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewMarkingCode {
    pub code: String,
    pub gtin: Option<String>,
    pub order_id: Option<String>,
    pub extension_code: String,
    pub block_id: Option<String>,
}

/// Editable part of a stored code; the code string itself is its identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarkingCodeChanges {
    pub gtin: Option<String>,
    pub order_id: Option<String>,
    pub block_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct AggregationFile {
    pub id: i64,
    pub file_name: String,
    pub raw_json: String,
    pub level0_codes: String,
    pub level1_codes: String,
    pub level2_codes: String,
    pub status: String,
    pub report_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AggregationFile {
    pub fn buckets(&self) -> Result<LevelBuckets, OmsError> {
        Ok(LevelBuckets {
            level0: serde_json::from_str(&self.level0_codes)?,
            level1: serde_json::from_str(&self.level1_codes)?,
            level2: serde_json::from_str(&self.level2_codes)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct ApiLog {
    pub id: i64,
    pub connection_id: Option<i64>,
    pub method: String,
    pub url: String,
    pub request_body: Option<String>,
    pub status_code: Option<i64>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewApiLog {
    pub connection_id: Option<i64>,
    pub method: String,
    pub url: String,
    pub request_body: Option<String>,
    pub status_code: Option<i64>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub duration_ms: i64,
}

/// Outcome of saving one server order pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub inserted: u64,
    pub updated: u64,
    pub obsoleted: u64,
}

/// Status values written by the client itself.
pub mod status {
    pub const ORDER_DRAFT: &str = "DRAFT";
    /// Status of an order right after the OMS accepted it.
    pub const ORDER_CREATED: &str = "CREATED";
    pub const ORDER_OBSOLETE: &str = "OBSOLETE";
    pub const CODE_EMITTED: &str = "EMITTED";
    pub const CODE_REPORTED: &str = "REPORTED";
    pub const FILE_NEW: &str = "NEW";
    pub const FILE_SENT: &str = "SENT";
}
