#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;
use znak_oms::config::Config;
use znak_oms::db::{NewConnection, NewCredential, Storage};
use znak_oms::Controller;
use znak_oms::api::OmsApi;

pub const TOKEN: &str = "secret-token";
pub const OMS_ID: &str = "oms-test-1";
pub const GTIN: &str = "04604060005904";

pub struct TestEnv {
    pub dir: TempDir,
    pub cfg: Config,
    pub storage: Storage,
}

pub fn test_config(database_url: String) -> Config {
    Config {
        database_url,
        retry_max_times: 0,
        connect_timeout_secs: 2,
        request_timeout_secs: 5,
        ..Config::default()
    }
}

pub async fn test_env() -> TestEnv {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let database_url = format!("sqlite:{}", dir.path().join("znak.sqlite").display());
    let cfg = test_config(database_url);
    let storage = Storage::connect(&cfg.database_url)
        .await
        .expect("failed to open test database");
    TestEnv { dir, cfg, storage }
}

impl TestEnv {
    pub fn controller(&self) -> Controller {
        let api = OmsApi::new(&self.cfg, self.storage.clone()).expect("failed to build client");
        Controller::new(self.storage.clone(), api)
    }

    /// Connection with a valid credential pointing at `base_url`.
    pub async fn connect_to(&self, base_url: &str) -> i64 {
        let conn = self
            .storage
            .insert_connection(&NewConnection {
                name: "test".into(),
                base_url: base_url.into(),
                oms_id: OMS_ID.into(),
                extension_code: Some("pharma".into()),
                participant_id: Some("7700000000".into()),
            })
            .await
            .expect("insert connection");
        self.storage
            .insert_credential(&NewCredential {
                name: "token".into(),
                client_token: TOKEN.into(),
                connection_id: Some(conn.id),
            })
            .await
            .expect("insert credential");
        conn.id
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub extension: String,
    pub resource: String,
    pub query: HashMap<String, String>,
    pub token: Option<String>,
    pub body: String,
}

#[derive(Default)]
pub struct FakeInner {
    pub requests: Vec<Recorded>,
    pub orders: Vec<Value>,
    pub codes: Vec<String>,
    /// Requests answered with 503 before normal service resumes.
    pub failures_left: u32,
    pub next_id: u32,
}

#[derive(Clone, Default)]
pub struct FakeOms {
    pub base_url: String,
    pub inner: Arc<Mutex<FakeInner>>,
}

impl FakeOms {
    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn set_orders(&self, orders: Vec<Value>) {
        self.inner.lock().unwrap().orders = orders;
    }

    pub fn set_codes(&self, codes: Vec<String>) {
        self.inner.lock().unwrap().codes = codes;
    }

    pub fn fail_next(&self, n: u32) {
        self.inner.lock().unwrap().failures_left = n;
    }
}

/// Minimal in-process OMS bound to an ephemeral local port.
pub async fn spawn_fake_oms() -> FakeOms {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind fake OMS");
    let addr = listener.local_addr().expect("local addr");
    let fake = FakeOms {
        base_url: format!("http://{addr}"),
        ..Default::default()
    };
    let app = Router::new()
        .route("/api/v2/{ext}/{*rest}", any(handle))
        .with_state(fake.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake OMS crashed");
    });
    fake
}

/// Base URL on which nothing listens.
pub async fn dead_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

fn oms_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "globalErrors": [{"error": message, "errorCode": status.as_u16()}]
        })),
    )
        .into_response()
}

async fn handle(
    State(fake): State<FakeOms>,
    method: Method,
    Path((ext, rest)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let token = headers
        .get("clienttoken")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mut inner = fake.inner.lock().unwrap();
    inner.requests.push(Recorded {
        method: method.to_string(),
        extension: ext.clone(),
        resource: rest.clone(),
        query: query.clone(),
        token: token.clone(),
        body: body.clone(),
    });

    if token.as_deref() != Some(TOKEN) {
        return oms_error(StatusCode::UNAUTHORIZED, "Invalid client token");
    }
    if inner.failures_left > 0 {
        inner.failures_left -= 1;
        return (StatusCode::SERVICE_UNAVAILABLE, "upstream busy").into_response();
    }

    let oms_id = query.get("omsId").cloned().unwrap_or_default();
    match (method.as_str(), rest.as_str()) {
        ("GET", "ping") => Json(json!({
            "omsId": oms_id, "apiVersion": "2.0.0", "omsVersion": "3.9.1"
        }))
        .into_response(),
        ("POST", "orders") => {
            let req: Value = serde_json::from_str(&body).unwrap_or_default();
            let product = &req["products"][0];
            if product["gtin"].as_str().is_none() {
                return oms_error(StatusCode::BAD_REQUEST, "products required");
            }
            inner.next_id += 1;
            let order_id = format!("order-{}", inner.next_id);
            let order = json!({
                "orderId": order_id,
                "orderStatus": "CREATED",
                "createdTimestamp": 1_700_000_000_000i64,
                "buffers": [{
                    "gtin": product["gtin"],
                    "availableCodes": product["quantity"],
                    "bufferStatus": "PENDING"
                }]
            });
            inner.orders.push(order);
            Json(json!({
                "omsId": oms_id, "orderId": order_id, "expectedCompleteTimestamp": 60000
            }))
            .into_response()
        }
        ("GET", "orders") => Json(json!({
            "omsId": oms_id, "orderInfos": inner.orders
        }))
        .into_response(),
        ("GET", "buffer/status") => {
            let order_id = query.get("orderId").cloned().unwrap_or_default();
            let buffer = inner
                .orders
                .iter()
                .find(|o| o["orderId"] == order_id.as_str())
                .map(|o| o["buffers"][0].clone());
            match buffer {
                Some(mut b) => {
                    b["orderId"] = Value::from(order_id);
                    Json(b).into_response()
                }
                None => oms_error(StatusCode::NOT_FOUND, "Order not found"),
            }
        }
        ("GET", "codes") => {
            let quantity: usize = query
                .get("quantity")
                .and_then(|q| q.parse().ok())
                .unwrap_or(0);
            let take = quantity.min(inner.codes.len());
            let codes: Vec<String> = inner.codes.drain(..take).collect();
            Json(json!({ "omsId": oms_id, "codes": codes, "blockId": "block-1" })).into_response()
        }
        ("POST", "buffer/close") => Json(json!({ "omsId": oms_id })).into_response(),
        ("POST", "utilisation") | ("POST", "aggregation") => {
            inner.next_id += 1;
            Json(json!({ "omsId": oms_id, "reportId": format!("report-{}", inner.next_id) }))
                .into_response()
        }
        ("GET", "report/info") => Json(json!({
            "omsId": oms_id,
            "reportId": query.get("reportId").cloned().unwrap_or_default(),
            "reportStatus": "SUCCESS"
        }))
        .into_response(),
        _ => oms_error(StatusCode::NOT_FOUND, "Unknown resource"),
    }
}
