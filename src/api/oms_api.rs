use crate::config::Config;
use crate::db::{Connection, Credential, NewApiLog, Storage};
use crate::error::{OmsApiError, OmsError};
use crate::types::{
    AggregationReport, BufferInfo, CloseBufferResponse, CodesResponse, CreateOrderRequest,
    CreateOrderResponse, OrdersResponse, PingResponse, ReportInfo, ReportResponse,
    UtilisationReport,
};
use backon::{ExponentialBuilder, Retryable};
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Header carrying the participant token on every OMS call.
pub const CLIENT_TOKEN_HEADER: &str = "clientToken";

/// Where a call goes and who makes it: one connection plus its credential.
#[derive(Debug, Clone)]
pub struct OmsTarget {
    pub connection_id: Option<i64>,
    pub base_url: Url,
    pub oms_id: String,
    pub extension: String,
    pub client_token: String,
}

impl OmsTarget {
    /// `extension` overrides the connection's default category.
    pub fn resolve(
        connection: &Connection,
        credential: &Credential,
        extension: Option<&str>,
    ) -> Result<Self, OmsError> {
        let extension = extension
            .map(str::to_string)
            .or_else(|| connection.extension_code.clone())
            .ok_or_else(|| {
                OmsError::Validation(format!(
                    "connection {} has no default extension; pass one explicitly",
                    connection.name
                ))
            })?;
        Ok(Self {
            connection_id: Some(connection.id),
            base_url: Url::parse(&connection.base_url)?,
            oms_id: connection.oms_id.clone(),
            extension,
            client_token: credential.client_token.clone(),
        })
    }

    /// `{base}/api/v2/{extension}/{resource}?omsId=...&extra...`
    pub fn endpoint(&self, resource: &str, query: &[(&str, &str)]) -> Result<Url, OmsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| OmsError::Validation(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v2", self.extension.as_str()])
            .extend(resource.split('/').filter(|s| !s.is_empty()));
        url.query_pairs_mut()
            .append_pair("omsId", &self.oms_id)
            .extend_pairs(query.iter().copied());
        Ok(url)
    }
}

/// Thin REST client for the OMS API v2. Every exchange is logged to `api_logs`.
#[derive(Clone)]
pub struct OmsApi {
    client: reqwest::Client,
    storage: Storage,
    retry_policy: ExponentialBuilder,
    log_body_limit: usize,
}

impl OmsApi {
    pub fn new(cfg: &Config, storage: Storage) -> Result<Self, OmsError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut builder = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(cfg.connect_timeout())
            .timeout(cfg.request_timeout())
            .default_headers(headers);
        if let Some(proxy_url) = cfg.proxy.as_ref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }
        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(3))
            .with_max_times(cfg.retry_max_times)
            .with_jitter();

        Ok(Self {
            client: builder.build()?,
            storage,
            retry_policy,
            log_body_limit: cfg.log_body_limit,
        })
    }

    pub async fn ping(&self, target: &OmsTarget) -> Result<PingResponse, OmsError> {
        self.get(target, "ping", &[]).await
    }

    pub async fn create_order(
        &self,
        target: &OmsTarget,
        order: &CreateOrderRequest,
    ) -> Result<CreateOrderResponse, OmsError> {
        self.post(target, "orders", &[], order).await
    }

    pub async fn list_orders(&self, target: &OmsTarget) -> Result<OrdersResponse, OmsError> {
        self.get(target, "orders", &[]).await
    }

    pub async fn buffer_status(
        &self,
        target: &OmsTarget,
        order_id: &str,
        gtin: &str,
    ) -> Result<BufferInfo, OmsError> {
        self.get(target, "buffer/status", &[("orderId", order_id), ("gtin", gtin)])
            .await
    }

    pub async fn get_codes(
        &self,
        target: &OmsTarget,
        order_id: &str,
        gtin: &str,
        quantity: u32,
    ) -> Result<CodesResponse, OmsError> {
        let quantity = quantity.to_string();
        self.get(
            target,
            "codes",
            &[("orderId", order_id), ("gtin", gtin), ("quantity", &quantity)],
        )
        .await
    }

    pub async fn close_buffer(
        &self,
        target: &OmsTarget,
        order_id: &str,
        gtin: &str,
    ) -> Result<CloseBufferResponse, OmsError> {
        self.post(
            target,
            "buffer/close",
            &[("orderId", order_id), ("gtin", gtin)],
            &serde_json::json!({}),
        )
        .await
    }

    pub async fn send_utilisation(
        &self,
        target: &OmsTarget,
        report: &UtilisationReport,
    ) -> Result<ReportResponse, OmsError> {
        self.post(target, "utilisation", &[], report).await
    }

    pub async fn send_aggregation(
        &self,
        target: &OmsTarget,
        report: &AggregationReport,
    ) -> Result<ReportResponse, OmsError> {
        self.post(target, "aggregation", &[], report).await
    }

    pub async fn report_info(
        &self,
        target: &OmsTarget,
        report_id: &str,
    ) -> Result<ReportInfo, OmsError> {
        self.get(target, "report/info", &[("reportId", report_id)])
            .await
    }

    /// GETs are idempotent and retried on transient failures.
    async fn get<T: DeserializeOwned>(
        &self,
        target: &OmsTarget,
        resource: &str,
        query: &[(&str, &str)],
    ) -> Result<T, OmsError> {
        let url = target.endpoint(resource, query)?;
        (|| async { self.send_once(target, Method::GET, url.clone(), None).await })
            .retry(self.retry_policy)
            .when(OmsError::is_retryable)
            .notify(|e: &OmsError, delay: Duration| {
                warn!(resource, error = %e, ?delay, "OMS request failed, retrying");
            })
            .await
    }

    /// POSTs create server state and are sent exactly once.
    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        target: &OmsTarget,
        resource: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, OmsError> {
        let url = target.endpoint(resource, query)?;
        let body = serde_json::to_string(body)?;
        self.send_once(target, Method::POST, url, Some(body)).await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        target: &OmsTarget,
        method: Method,
        url: Url,
        body: Option<String>,
    ) -> Result<T, OmsError> {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(CLIENT_TOKEN_HEADER, &target.client_token);
        if let Some(body) = body.as_ref() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let started = Instant::now();
        let outcome = match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                resp.text().await.map(|text| (status, text))
            }
            Err(e) => Err(e),
        };
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        let mut log = NewApiLog {
            connection_id: target.connection_id,
            method: method.to_string(),
            url: redact(&url),
            request_body: body.as_deref().map(|b| truncate_body(b, self.log_body_limit)),
            duration_ms,
            ..Default::default()
        };
        match &outcome {
            Ok((status, text)) => {
                log.status_code = Some(i64::from(status.as_u16()));
                log.response_body = Some(truncate_body(text, self.log_body_limit));
            }
            Err(e) => log.error = Some(e.to_string()),
        }
        if let Err(e) = self.storage.insert_api_log(&log).await {
            warn!(error = %e, "failed to persist API log");
        }

        let (status, text) = outcome?;
        debug!(%method, url = %log.url, status = status.as_u16(), duration_ms, "OMS call");
        if !status.is_success() {
            return Err(match OmsApiError::parse(&text) {
                Some(error) => OmsError::Upstream { status, error },
                None => OmsError::UpstreamStatus { status, body: text },
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// URL as stored in logs, without any userinfo password.
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    let _ = url.set_password(None);
    url.to_string()
}

fn truncate_body(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated {} bytes]", &body[..end], body.len() - end)
}
