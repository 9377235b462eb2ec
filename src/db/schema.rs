//! SQL DDL and reference data for the local cache.
//! Statements are separated by `;` and executed one by one.

/// Tables for every cached entity. Timestamps are RFC3339 text written by the
/// client; natural keys of lookup tables are UNIQUE.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS extensions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS countries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS order_statuses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS usage_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS connections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    base_url TEXT NOT NULL,
    oms_id TEXT NOT NULL,
    extension_code TEXT NULL,
    participant_id TEXT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    client_token TEXT NOT NULL,
    connection_id INTEGER NULL REFERENCES connections(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS nomenclature (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    gtin TEXT NOT NULL,
    name TEXT NOT NULL,
    extension_code TEXT NULL,
    template_id INTEGER NULL,
    country_code TEXT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    connection_id INTEGER NOT NULL,
    extension_code TEXT NOT NULL,
    gtin TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    serial_number_type TEXT NOT NULL,
    template_id INTEGER NULL,
    cis_type TEXT NOT NULL,
    status TEXT NOT NULL,
    order_id TEXT NULL,
    comment TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL UNIQUE,
    connection_id INTEGER NOT NULL,
    extension_code TEXT NOT NULL,
    status TEXT NOT NULL,
    buffers TEXT NOT NULL DEFAULT '[]', -- JSON array of buffer infos
    decline_reason TEXT NULL,
    created_ts INTEGER NULL, -- server millis
    last_seen_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_api_orders_scope ON api_orders(connection_id, extension_code);

CREATE TABLE IF NOT EXISTS marking_codes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    gtin TEXT NULL,
    order_id TEXT NULL,
    extension_code TEXT NOT NULL,
    block_id TEXT NULL,
    status TEXT NOT NULL,
    report_id TEXT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_marking_codes_order ON marking_codes(order_id);

CREATE TABLE IF NOT EXISTS aggregation_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name TEXT NOT NULL,
    raw_json TEXT NOT NULL,
    level0_codes TEXT NOT NULL DEFAULT '[]',
    level1_codes TEXT NOT NULL DEFAULT '[]',
    level2_codes TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL,
    report_id TEXT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    connection_id INTEGER NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    request_body TEXT NULL,
    status_code INTEGER NULL,
    response_body TEXT NULL,
    error TEXT NULL,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_api_logs_created ON api_logs(created_at)
"#;

/// Every table the client owns, in display order.
pub const TABLES: &[&str] = &[
    "extensions",
    "countries",
    "order_statuses",
    "usage_types",
    "connections",
    "credentials",
    "nomenclature",
    "orders",
    "api_orders",
    "marking_codes",
    "aggregation_files",
    "api_logs",
];

pub const SEED_EXTENSIONS: &[(&str, &str)] = &[
    ("pharma", "Medicines"),
    ("tobacco", "Tobacco products"),
    ("lp", "Light industry"),
    ("shoes", "Footwear"),
    ("tires", "Tires"),
    ("perfum", "Perfumery"),
    ("milk", "Dairy products"),
    ("water", "Packaged water"),
    ("chemistry", "Household chemicals"),
];

pub const SEED_ORDER_STATUSES: &[(&str, &str)] = &[
    ("DRAFT", "Draft, not sent"),
    ("CREATED", "Created"),
    ("PENDING", "Pending approval"),
    ("DECLINED", "Declined"),
    ("APPROVED", "Approved"),
    ("READY", "Ready, codes available"),
    ("CLOSED", "Closed"),
    ("OBSOLETE", "No longer reported by the server"),
];

pub const SEED_USAGE_TYPES: &[(&str, &str)] = &[
    ("PRINTED", "Codes printed"),
    ("VERIFIED", "Codes printed and verified"),
];

pub const SEED_COUNTRIES: &[(&str, &str)] = &[
    ("RU", "Russia"),
    ("BY", "Belarus"),
    ("KZ", "Kazakhstan"),
    ("AM", "Armenia"),
    ("KG", "Kyrgyzstan"),
    ("CN", "China"),
];
