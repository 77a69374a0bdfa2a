//! Wire types for the card generation HTTP API.
//!
//! Request bodies are serialized from borrowed data; response bodies are
//! deserialized leniently (optional fields default to `None`) so that a
//! backend adding fields never breaks the client.

use serde::{Deserialize, Serialize};

use greetcard_core::job::JobStatus;
use greetcard_core::progress::TaskProgress;

// ---------------------------------------------------------------------------
// Generation options
// ---------------------------------------------------------------------------

/// Requested card length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthMode {
    Short,
    #[default]
    Standard,
    Long,
}

/// How the backend decomposes the generation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Simple,
    #[default]
    Hierarchical,
}

impl std::str::FromStr for LengthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "standard" => Ok(Self::Standard),
            "long" => Ok(Self::Long),
            other => Err(format!("unknown length mode '{other}'")),
        }
    }
}

impl std::str::FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "hierarchical" => Ok(Self::Hierarchical),
            other => Err(format!("unknown generation mode '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// Body of `POST /cards`.
#[derive(Debug, Serialize)]
pub struct SubmitBody<'a> {
    pub payment_header: &'a str,
    pub target_resource_id: &'a str,
    pub theme_text: &'a str,
    pub is_public: bool,
    pub length_mode: LengthMode,
    pub generation_mode: GenerationMode,
}

/// Successful response of `POST /cards`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job: SubmittedJob,
    /// Opaque secondary grant; passed to the caller untouched.
    #[serde(default)]
    pub ancillary_access: Option<serde_json::Value>,
}

/// The job record embedded in a submit response.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedJob {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub word_count: Option<u32>,
    #[serde(default)]
    pub preview: Option<String>,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Response of `GET /cards/{id}/status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<TaskProgress>,
    #[serde(default)]
    pub word_count: Option<u32>,
    #[serde(default)]
    pub preview: Option<String>,
    /// Backend-provided reason when `status` is `failed`.
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusResponse {
    /// Bare response with only a status, used by tests and fast paths.
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            word_count: None,
            preview: None,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Asset generation / resource metadata
// ---------------------------------------------------------------------------

/// Response of `POST /cards/{id}/banner`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetResponse {
    pub asset_url: String,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub enhanced: Option<bool>,
}

/// Response of `GET /resources/{id}/metadata`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default)]
    pub current_price_usd: Option<f64>,
    #[serde(default)]
    pub base_price_usd: Option<f64>,
}

// ---------------------------------------------------------------------------
// Error bodies
// ---------------------------------------------------------------------------

/// A single rejected request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Non-2xx response body: `{ "detail": ... }` or `{ "message": ... }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<ErrorDetail>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `detail` is either a plain string or a list of per-field entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Text(String),
    Fields(Vec<FieldDetail>),
}

/// One entry of a field-level `detail` list.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDetail {
    #[serde(default)]
    pub loc: Vec<serde_json::Value>,
    pub msg: String,
}

/// Field name used when the backend does not point at a specific field.
pub const REQUEST_FIELD: &str = "request";

impl ErrorBody {
    /// Parse a raw error body. Non-JSON bodies become a bare `message`.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self {
            detail: None,
            message: (!body.trim().is_empty()).then(|| body.trim().to_string()),
        })
    }

    /// Human-readable summary for logs and surfaced errors.
    pub fn summary(&self) -> String {
        match (&self.detail, &self.message) {
            (Some(ErrorDetail::Text(text)), _) => text.clone(),
            (Some(ErrorDetail::Fields(fields)), _) if !fields.is_empty() => fields
                .iter()
                .map(|f| f.msg.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            (_, Some(message)) => message.clone(),
            _ => "no error detail provided".to_string(),
        }
    }

    /// Per-field errors; a plain message becomes a single `request` entry.
    pub fn field_errors(&self) -> Vec<FieldError> {
        match &self.detail {
            Some(ErrorDetail::Fields(fields)) if !fields.is_empty() => fields
                .iter()
                .map(|f| FieldError {
                    field: field_name(&f.loc),
                    message: f.msg.clone(),
                })
                .collect(),
            _ => vec![FieldError {
                field: REQUEST_FIELD.to_string(),
                message: self.summary(),
            }],
        }
    }
}

/// Last meaningful segment of a `loc` path, e.g. `["body", "theme_text"]`
/// yields `theme_text`.
fn field_name(loc: &[serde_json::Value]) -> String {
    loc.last()
        .map(|seg| match seg {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| REQUEST_FIELD.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
