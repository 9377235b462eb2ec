//! User actions: one method per action of the desktop tool, mediating between
//! the local cache and the OMS API.

use crate::api::{OmsApi, OmsTarget};
use crate::config::Config;
use crate::db::{
    AggregationFile, ApiLog, ApiOrder, Connection, Credential, MarkingCode, MarkingCodeChanges,
    NewConnection,
    NewCredential, NewMarkingCode, NewNomenclature, NewOrder, Nomenclature, Order, ReferenceItem,
    ReferenceKind, Storage, SyncSummary, status,
};
use crate::error::OmsError;
use crate::service::aggregation::{self, LevelBuckets};
use crate::service::gs1::{is_valid_gtin, normalize_code, parse_code};
use crate::service::report::{
    AggregationOptions, CapacityCorrection, UtilisationOptions, build_aggregation_report,
    build_utilisation_report,
};
use crate::types::{
    BufferInfo, CloseBufferResponse, CreateOrderRequest, OrderProduct, PingResponse, ReportInfo,
    ReportResponse,
};
use serde::Serialize;
use serde_json::Map;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

/// Result of pulling orders: fresh from the server, or the cache when offline.
#[derive(Debug, Clone)]
pub enum OrdersView {
    Fresh {
        summary: SyncSummary,
        orders: Vec<ApiOrder>,
    },
    Cached {
        reason: String,
        orders: Vec<ApiOrder>,
    },
}

impl OrdersView {
    pub fn orders(&self) -> &[ApiOrder] {
        match self {
            OrdersView::Fresh { orders, .. } | OrdersView::Cached { orders, .. } => orders,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchedCodes {
    pub received: usize,
    pub stored: u64,
    pub block_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationSubmission {
    pub report_id: String,
    pub units: usize,
    pub corrections: Vec<CapacityCorrection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbStatus {
    pub tables: Vec<(&'static str, i64)>,
    pub missing_columns: Vec<(&'static str, &'static str)>,
}

#[derive(Clone)]
pub struct Controller {
    storage: Storage,
    api: OmsApi,
}

impl Controller {
    pub fn new(storage: Storage, api: OmsApi) -> Self {
        Self { storage, api }
    }

    /// Open the configured database and build the API client on top of it.
    pub async fn open(cfg: &Config) -> Result<Self, OmsError> {
        let storage = Storage::connect(&cfg.database_url).await?;
        let api = OmsApi::new(cfg, storage.clone())?;
        Ok(Self::new(storage, api))
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // Lookup tables

    pub async fn list_reference(&self, kind: ReferenceKind) -> Result<Vec<ReferenceItem>, OmsError> {
        self.storage.list_reference(kind).await
    }

    pub async fn add_reference(
        &self,
        kind: ReferenceKind,
        code: &str,
        name: &str,
    ) -> Result<ReferenceItem, OmsError> {
        let (code, name) = reference_fields(kind, code, name)?;
        if self.storage.find_reference_by_code(kind, &code).await?.is_some() {
            return Err(OmsError::Duplicate {
                entity: kind.entity(),
                key: code,
            });
        }
        let item = self.storage.insert_reference(kind, &code, &name).await?;
        info!(table = kind.table(), code = %item.code, "reference row added");
        Ok(item)
    }

    pub async fn edit_reference(
        &self,
        kind: ReferenceKind,
        id: i64,
        code: &str,
        name: &str,
    ) -> Result<ReferenceItem, OmsError> {
        let (code, name) = reference_fields(kind, code, name)?;
        if let Some(other) = self.storage.find_reference_by_code(kind, &code).await?
            && other.id != id
        {
            return Err(OmsError::Duplicate {
                entity: kind.entity(),
                key: code,
            });
        }
        self.storage.update_reference(kind, id, &code, &name).await
    }

    pub async fn delete_reference(&self, kind: ReferenceKind, id: i64) -> Result<(), OmsError> {
        self.storage.delete_reference(kind, id).await?;
        info!(table = kind.table(), id, "reference row deleted");
        Ok(())
    }

    // Connections and credentials

    pub async fn list_connections(&self) -> Result<Vec<Connection>, OmsError> {
        self.storage.list_connections().await
    }

    pub async fn add_connection(&self, conn: NewConnection) -> Result<Connection, OmsError> {
        self.check_connection(&conn).await?;
        let conn = self.storage.insert_connection(&conn).await?;
        info!(id = conn.id, name = %conn.name, "connection added");
        Ok(conn)
    }

    pub async fn edit_connection(&self, id: i64, conn: NewConnection) -> Result<Connection, OmsError> {
        self.check_connection(&conn).await?;
        self.storage.update_connection(id, &conn).await
    }

    pub async fn delete_connection(&self, id: i64) -> Result<(), OmsError> {
        self.storage.delete_connection(id).await?;
        info!(id, "connection deleted");
        Ok(())
    }

    pub async fn list_credentials(&self) -> Result<Vec<Credential>, OmsError> {
        self.storage.list_credentials().await
    }

    pub async fn add_credential(&self, cred: NewCredential) -> Result<Credential, OmsError> {
        self.check_credential(&cred).await?;
        let cred = self.storage.insert_credential(&cred).await?;
        info!(id = cred.id, name = %cred.name, "credential added");
        Ok(cred)
    }

    pub async fn edit_credential(&self, id: i64, cred: NewCredential) -> Result<Credential, OmsError> {
        self.check_credential(&cred).await?;
        self.storage.update_credential(id, &cred).await
    }

    pub async fn delete_credential(&self, id: i64) -> Result<(), OmsError> {
        self.storage.delete_credential(id).await
    }

    // Nomenclature

    pub async fn list_nomenclature(&self) -> Result<Vec<Nomenclature>, OmsError> {
        self.storage.list_nomenclature().await
    }

    pub async fn add_nomenclature(&self, item: NewNomenclature) -> Result<Nomenclature, OmsError> {
        self.check_nomenclature(&item).await?;
        if self.storage.find_nomenclature_by_gtin(&item.gtin).await?.is_some() {
            return Err(OmsError::Duplicate {
                entity: "nomenclature",
                key: item.gtin,
            });
        }
        self.storage.insert_nomenclature(&item).await
    }

    pub async fn edit_nomenclature(
        &self,
        id: i64,
        item: NewNomenclature,
    ) -> Result<Nomenclature, OmsError> {
        self.check_nomenclature(&item).await?;
        if let Some(other) = self.storage.find_nomenclature_by_gtin(&item.gtin).await?
            && other.id != id
        {
            return Err(OmsError::Duplicate {
                entity: "nomenclature",
                key: item.gtin,
            });
        }
        self.storage.update_nomenclature(id, &item).await
    }

    pub async fn delete_nomenclature(&self, id: i64) -> Result<(), OmsError> {
        self.storage.delete_nomenclature(id).await
    }

    // Local orders

    pub async fn list_orders(&self) -> Result<Vec<Order>, OmsError> {
        self.storage.list_orders().await
    }

    pub async fn add_order(&self, order: NewOrder) -> Result<Order, OmsError> {
        self.check_order(&order).await?;
        let order = self.storage.insert_order(&order).await?;
        info!(id = order.id, gtin = %order.gtin, quantity = order.quantity, "order drafted");
        Ok(order)
    }

    /// Only drafts can change; submitted orders belong to the server.
    pub async fn edit_order(&self, id: i64, order: NewOrder) -> Result<Order, OmsError> {
        let existing = self.storage.get_order(id).await?;
        if existing.status != status::ORDER_DRAFT {
            return Err(OmsError::Validation(format!(
                "order {id} is {} and can no longer be edited",
                existing.status
            )));
        }
        self.check_order(&order).await?;
        self.storage.update_order(id, &order).await
    }

    pub async fn delete_order(&self, id: i64) -> Result<(), OmsError> {
        self.storage.delete_order(id).await
    }

    // Codes and aggregation files

    pub async fn list_codes(&self, order_id: Option<&str>) -> Result<Vec<MarkingCode>, OmsError> {
        self.storage.list_codes(order_id).await
    }

    /// Store scanned codes; GTIN is read from each code.
    pub async fn add_codes<S: AsRef<str>>(
        &self,
        codes: &[S],
        extension_code: &str,
    ) -> Result<u64, OmsError> {
        self.require_reference(ReferenceKind::Extension, extension_code)
            .await?;
        let rows = codes
            .iter()
            .map(|raw| {
                let code = normalize_code(raw.as_ref());
                let gtin = parse_code(&code)?.gtin;
                Ok(NewMarkingCode {
                    code,
                    gtin: Some(gtin),
                    extension_code: extension_code.to_string(),
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>, OmsError>>()?;
        self.storage.insert_codes(&rows).await
    }

    pub async fn edit_code(
        &self,
        id: i64,
        changes: MarkingCodeChanges,
    ) -> Result<MarkingCode, OmsError> {
        if ![status::CODE_EMITTED, status::CODE_REPORTED].contains(&changes.status.as_str()) {
            return Err(OmsError::Validation(format!(
                "unknown code status {}",
                changes.status
            )));
        }
        if let Some(gtin) = changes.gtin.as_deref()
            && !is_valid_gtin(gtin)
        {
            return Err(OmsError::Validation(format!("invalid GTIN {gtin}")));
        }
        self.storage.update_code(id, &changes).await
    }

    pub async fn delete_code(&self, id: i64) -> Result<(), OmsError> {
        self.storage.delete_code(id).await
    }

    pub async fn import_aggregation_file(&self, path: &Path) -> Result<AggregationFile, OmsError> {
        let parsed = aggregation::ingest_file(path)?;
        let file = self
            .storage
            .insert_aggregation_file(&parsed.file_name, &parsed.raw_json, &parsed.buckets)
            .await?;
        info!(
            id = file.id,
            file = %file.file_name,
            codes = parsed.buckets.total(),
            "aggregation file imported"
        );
        Ok(file)
    }

    pub async fn list_aggregation_files(&self) -> Result<Vec<AggregationFile>, OmsError> {
        self.storage.list_aggregation_files().await
    }

    pub async fn show_aggregation_file(
        &self,
        id: i64,
    ) -> Result<(AggregationFile, LevelBuckets), OmsError> {
        let file = self.storage.get_aggregation_file(id).await?;
        let buckets = file.buckets()?;
        Ok((file, buckets))
    }

    pub async fn edit_aggregation_file(
        &self,
        id: i64,
        file_name: &str,
        file_status: &str,
    ) -> Result<AggregationFile, OmsError> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(OmsError::Validation("file name is required".to_string()));
        }
        if ![status::FILE_NEW, status::FILE_SENT].contains(&file_status) {
            return Err(OmsError::Validation(format!(
                "unknown aggregation file status {file_status}"
            )));
        }
        self.storage
            .update_aggregation_file(id, file_name, file_status)
            .await
    }

    pub async fn delete_aggregation_file(&self, id: i64) -> Result<(), OmsError> {
        self.storage.delete_aggregation_file(id).await
    }

    // OMS calls

    /// Connection plus its newest credential, ready for an API call.
    pub async fn target(
        &self,
        connection_id: i64,
        extension: Option<&str>,
    ) -> Result<OmsTarget, OmsError> {
        let connection = self.storage.get_connection(connection_id).await?;
        let credential = self
            .storage
            .credential_for_connection(connection_id)
            .await?
            .ok_or_else(|| OmsError::MissingCredential(connection.name.clone()))?;
        OmsTarget::resolve(&connection, &credential, extension)
    }

    pub async fn ping(
        &self,
        connection_id: i64,
        extension: Option<&str>,
    ) -> Result<PingResponse, OmsError> {
        let target = self.target(connection_id, extension).await?;
        self.api.ping(&target).await
    }

    /// Send a draft order to the OMS and remember the server order id.
    pub async fn submit_order(&self, id: i64) -> Result<Order, OmsError> {
        let order = self.storage.get_order(id).await?;
        if order.order_id.is_some() {
            return Err(OmsError::Validation(format!(
                "order {id} was already submitted"
            )));
        }
        let target = self
            .target(order.connection_id, Some(&order.extension_code))
            .await?;
        let request = CreateOrderRequest {
            products: vec![OrderProduct {
                gtin: order.gtin.clone(),
                quantity: order.quantity,
                serial_number_type: order.serial_number_type.clone(),
                template_id: order.template_id,
                cis_type: Some(order.cis_type.clone()),
            }],
            attributes: Map::new(),
        };
        let created = self.api.create_order(&target, &request).await?;
        info!(id, order_id = %created.order_id, "order accepted by OMS");
        self.storage
            .set_order_submitted(id, &created.order_id, status::ORDER_CREATED)
            .await
    }

    /// Pull the server order list and save it; offline falls back to the cache.
    pub async fn refresh_orders(
        &self,
        connection_id: i64,
        extension: Option<&str>,
    ) -> Result<OrdersView, OmsError> {
        let target = self.target(connection_id, extension).await?;
        match self.api.list_orders(&target).await {
            Ok(resp) => {
                let summary = self
                    .storage
                    .sync_api_orders(connection_id, &target.extension, &resp.order_infos)
                    .await?;
                let orders = self.storage.list_api_orders(Some(connection_id)).await?;
                Ok(OrdersView::Fresh { summary, orders })
            }
            Err(e) if e.is_offline() => {
                warn!(connection_id, error = %e, "OMS unreachable, showing cached orders");
                let orders = self.storage.list_api_orders(Some(connection_id)).await?;
                Ok(OrdersView::Cached {
                    reason: e.to_string(),
                    orders,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn buffer_status(
        &self,
        connection_id: i64,
        extension: Option<&str>,
        order_id: &str,
        gtin: &str,
    ) -> Result<BufferInfo, OmsError> {
        let target = self.target(connection_id, extension).await?;
        self.api.buffer_status(&target, order_id, gtin).await
    }

    /// Download codes from an order buffer into the local cache.
    pub async fn fetch_codes(
        &self,
        connection_id: i64,
        extension: Option<&str>,
        order_id: &str,
        gtin: &str,
        quantity: u32,
    ) -> Result<FetchedCodes, OmsError> {
        if quantity == 0 {
            return Err(OmsError::Validation("quantity must be positive".to_string()));
        }
        let target = self.target(connection_id, extension).await?;
        let resp = self.api.get_codes(&target, order_id, gtin, quantity).await?;
        let rows: Vec<NewMarkingCode> = resp
            .codes
            .iter()
            .map(|code| NewMarkingCode {
                code: code.clone(),
                gtin: Some(gtin.to_string()),
                order_id: Some(order_id.to_string()),
                extension_code: target.extension.clone(),
                block_id: resp.block_id.clone(),
            })
            .collect();
        let stored = self.storage.insert_codes(&rows).await?;
        info!(order_id, gtin, received = rows.len(), stored, "codes fetched");
        Ok(FetchedCodes {
            received: rows.len(),
            stored,
            block_id: resp.block_id,
        })
    }

    pub async fn close_buffer(
        &self,
        connection_id: i64,
        extension: Option<&str>,
        order_id: &str,
        gtin: &str,
    ) -> Result<CloseBufferResponse, OmsError> {
        let target = self.target(connection_id, extension).await?;
        let resp = self.api.close_buffer(&target, order_id, gtin).await?;
        info!(order_id, gtin, "buffer closed");
        Ok(resp)
    }

    /// Codes of a server order that have not been reported yet.
    pub async fn unreported_codes(&self, order_id: &str) -> Result<Vec<String>, OmsError> {
        Ok(self
            .storage
            .list_codes(Some(order_id))
            .await?
            .into_iter()
            .filter(|c| c.status == status::CODE_EMITTED)
            .map(|c| c.code)
            .collect())
    }

    /// Report codes as used; stored copies are marked with the report id.
    pub async fn send_utilisation(
        &self,
        connection_id: i64,
        extension: Option<&str>,
        codes: &[String],
        usage_type: &str,
        options: &UtilisationOptions,
    ) -> Result<ReportResponse, OmsError> {
        self.require_reference(ReferenceKind::UsageType, usage_type)
            .await?;
        let report = build_utilisation_report(codes, usage_type, options)?;
        let target = self.target(connection_id, extension).await?;
        let resp = self.api.send_utilisation(&target, &report).await?;
        let marked = self
            .storage
            .mark_codes_reported(codes, &resp.report_id)
            .await?;
        if marked < report.sntins.len() as u64 {
            warn!(
                report_id = %resp.report_id,
                sent = report.sntins.len(),
                marked,
                "some reported codes are not in the local cache"
            );
        }
        info!(report_id = %resp.report_id, sent = report.sntins.len(), marked, "utilisation reported");
        Ok(resp)
    }

    /// Build and send the aggregation report of an imported file.
    pub async fn send_aggregation_report(
        &self,
        file_id: i64,
        connection_id: i64,
        extension: Option<&str>,
        mut options: AggregationOptions,
    ) -> Result<AggregationSubmission, OmsError> {
        let file = self.storage.get_aggregation_file(file_id).await?;
        if file.status == status::FILE_SENT {
            return Err(OmsError::Validation(format!(
                "aggregation file {file_id} was already reported as {}",
                file.report_id.as_deref().unwrap_or("?")
            )));
        }
        let parsed = aggregation::ingest_str(file.file_name.clone(), &file.raw_json)?;

        let connection = self.storage.get_connection(connection_id).await?;
        if options.participant_id.is_none() {
            options.participant_id = connection.participant_id.clone();
        }
        let built = build_aggregation_report(&parsed.nodes, &options)?;
        let target = self.target(connection_id, extension).await?;
        let resp = self.api.send_aggregation(&target, &built.report).await?;
        self.storage
            .set_aggregation_file_sent(file_id, &resp.report_id)
            .await?;
        info!(
            file_id,
            report_id = %resp.report_id,
            units = built.report.aggregation_units.len(),
            corrected = built.corrections.len(),
            "aggregation reported"
        );
        Ok(AggregationSubmission {
            report_id: resp.report_id,
            units: built.report.aggregation_units.len(),
            corrections: built.corrections,
        })
    }

    pub async fn report_status(
        &self,
        connection_id: i64,
        extension: Option<&str>,
        report_id: &str,
    ) -> Result<ReportInfo, OmsError> {
        let target = self.target(connection_id, extension).await?;
        self.api.report_info(&target, report_id).await
    }

    // Maintenance

    pub async fn db_status(&self) -> Result<DbStatus, OmsError> {
        Ok(DbStatus {
            tables: self.storage.table_counts().await?,
            missing_columns: self.storage.missing_columns().await?,
        })
    }

    pub async fn api_logs(&self, limit: i64) -> Result<Vec<ApiLog>, OmsError> {
        self.storage.list_api_logs(limit).await
    }

    pub async fn clear_api_logs(&self) -> Result<u64, OmsError> {
        self.storage.clear_api_logs().await
    }

    // Existence checks

    async fn require_reference(&self, kind: ReferenceKind, code: &str) -> Result<(), OmsError> {
        self.storage.get_reference_by_code(kind, code).await.map(|_| ())
    }

    async fn check_connection(&self, conn: &NewConnection) -> Result<(), OmsError> {
        if conn.name.trim().is_empty() || conn.oms_id.trim().is_empty() {
            return Err(OmsError::Validation(
                "connection name and OMS id are required".to_string(),
            ));
        }
        let url = Url::parse(&conn.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(OmsError::Validation(format!(
                "unsupported URL scheme {}",
                url.scheme()
            )));
        }
        if let Some(ext) = conn.extension_code.as_deref() {
            self.require_reference(ReferenceKind::Extension, ext).await?;
        }
        Ok(())
    }

    async fn check_credential(&self, cred: &NewCredential) -> Result<(), OmsError> {
        if cred.client_token.trim().is_empty() {
            return Err(OmsError::Validation("client token is required".to_string()));
        }
        if let Some(connection_id) = cred.connection_id {
            self.storage.get_connection(connection_id).await?;
        }
        Ok(())
    }

    async fn check_nomenclature(&self, item: &NewNomenclature) -> Result<(), OmsError> {
        if !is_valid_gtin(&item.gtin) {
            return Err(OmsError::Validation(format!("invalid GTIN {}", item.gtin)));
        }
        if let Some(ext) = item.extension_code.as_deref() {
            self.require_reference(ReferenceKind::Extension, ext).await?;
        }
        if let Some(country) = item.country_code.as_deref() {
            self.require_reference(ReferenceKind::Country, country).await?;
        }
        Ok(())
    }

    async fn check_order(&self, order: &NewOrder) -> Result<(), OmsError> {
        if order.quantity <= 0 {
            return Err(OmsError::Validation("quantity must be positive".to_string()));
        }
        if !is_valid_gtin(&order.gtin) {
            return Err(OmsError::Validation(format!("invalid GTIN {}", order.gtin)));
        }
        self.storage.get_connection(order.connection_id).await?;
        self.require_reference(ReferenceKind::Extension, &order.extension_code)
            .await
    }
}

fn reference_fields(kind: ReferenceKind, code: &str, name: &str) -> Result<(String, String), OmsError> {
    let code = code.trim();
    let name = name.trim();
    if code.is_empty() || name.is_empty() {
        return Err(OmsError::Validation(format!(
            "{} code and name are required",
            kind.entity()
        )));
    }
    Ok((code.to_string(), name.to_string()))
}
