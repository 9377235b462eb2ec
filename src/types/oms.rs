//! Request and response bodies of the OMS API v2.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub oms_id: String,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub oms_version: Option<String>,
}

/// One product line of an emission order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderProduct {
    pub gtin: String,
    pub quantity: i64,
    pub serial_number_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cis_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub products: Vec<OrderProduct>,
    /// Category specific attributes (factory, contact person, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub oms_id: String,
    pub order_id: String,
    #[serde(default)]
    pub expected_complete_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrdersResponse {
    pub oms_id: String,
    #[serde(default)]
    pub order_infos: Vec<OrderInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderInfo {
    pub order_id: String,
    pub order_status: String,
    #[serde(default)]
    pub created_timestamp: Option<i64>,
    #[serde(default)]
    pub decline_reason: Option<String>,
    #[serde(default)]
    pub buffers: Vec<BufferInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BufferInfo {
    #[serde(default)]
    pub order_id: Option<String>,
    pub gtin: String,
    #[serde(default)]
    pub left_in_buffer: Option<i64>,
    #[serde(default)]
    pub total_codes: Option<i64>,
    #[serde(default)]
    pub unavailable_codes: Option<i64>,
    #[serde(default)]
    pub available_codes: Option<i64>,
    #[serde(default)]
    pub pools_exhausted: Option<bool>,
    #[serde(default)]
    pub buffer_status: Option<String>,
    #[serde(default)]
    pub total_passed: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodesResponse {
    pub oms_id: String,
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default)]
    pub block_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloseBufferResponse {
    pub oms_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UtilisationReport {
    pub sntins: Vec<String>,
    pub usage_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_line_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_order_id: Option<String>,
    pub aggregation_units: Vec<AggregationUnit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregationUnit {
    pub unit_serial_number: String,
    pub aggregation_type: String,
    pub aggregation_unit_capacity: u32,
    pub aggregated_items_count: u32,
    pub sntins: Vec<String>,
    #[serde(default)]
    pub should_be_unbundled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub oms_id: String,
    pub report_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportInfo {
    pub oms_id: String,
    pub report_id: String,
    pub report_status: String,
    #[serde(default)]
    pub error_reason: Option<String>,
}
