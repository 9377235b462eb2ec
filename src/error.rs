use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use sqlx::Error as SqlxError;
use std::fmt;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum OmsError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No credential available for connection {0}")]
    MissingCredential(String),

    #[error("Upstream error with status {status}: {body}")]
    UpstreamStatus { status: StatusCode, body: String },

    #[error("OMS API error ({status}): {error}")]
    Upstream { status: StatusCode, error: OmsApiError },
}

impl OmsError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        OmsError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OmsError::NotFound { .. })
    }

    /// Transport failures, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            OmsError::Reqwest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            OmsError::UpstreamStatus { status, .. } | OmsError::Upstream { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Network-level failure, as opposed to a server that answered with an error.
    pub fn is_offline(&self) -> bool {
        matches!(self, OmsError::Reqwest(e) if e.is_connect() || e.is_timeout())
    }

    /// Convert a UNIQUE constraint violation into `Duplicate`, leave other errors alone.
    pub(crate) fn from_insert(e: SqlxError, entity: &'static str, key: impl ToString) -> Self {
        match &e {
            SqlxError::Database(db) if db.is_unique_violation() => OmsError::Duplicate {
                entity,
                key: key.to_string(),
            },
            _ => OmsError::Database(e),
        }
    }
}

impl From<figment::Error> for OmsError {
    fn from(e: figment::Error) -> Self {
        OmsError::Config(Box::new(e))
    }
}

/// Structured error body returned by the OMS on non-2xx responses.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct OmsApiError {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub global_errors: Vec<GlobalError>,
    #[serde(default)]
    pub field_errors: Vec<FieldError>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GlobalError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<Value>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default)]
    pub field_error: Option<String>,
}

impl OmsApiError {
    /// Parse an error body; `None` when it carries no recognizable errors.
    pub fn parse(body: &str) -> Option<Self> {
        let parsed: OmsApiError = serde_json::from_str(body).ok()?;
        (!parsed.global_errors.is_empty() || !parsed.field_errors.is_empty()).then_some(parsed)
    }
}

impl fmt::Display for OmsApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .global_errors
            .iter()
            .filter_map(|g| g.error.clone())
            .collect();
        parts.extend(self.field_errors.iter().map(|fe| {
            format!(
                "{}: {}",
                fe.field_name.as_deref().unwrap_or("?"),
                fe.field_error.as_deref().unwrap_or("invalid")
            )
        }));
        write!(f, "{}", parts.join("; "))
    }
}
