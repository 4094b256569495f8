//! Uniform response envelope returned by every tool.
//!
//! An envelope is `{ok, data, error, meta, provenance}`. Successful envelopes
//! carry `data` and a null `error`; failed envelopes carry a null `data` and an
//! `error` of `{type, message, details}` where `type` is drawn from the closed
//! [`ErrorType`] set. `meta` and `provenance` are always JSON objects.
//!
//! [`make_ok`] and [`make_err`] never hand out a malformed value: anything that
//! fails validation is replaced by a synthetic `runtime_error` envelope.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Free-form `meta` / `provenance` mapping.
pub type Fields = Map<String, Value>;

/// Closed set of error kinds a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    MissingEnv,
    FileNotFound,
    InvalidInput,
    PermissionDenied,
    FileTooLarge,
    /// Remote materials database failure.
    MpApiError,
    UpstreamTimeout,
    UpstreamRateLimited,
    /// Catch-all for unexpected internal failure.
    RuntimeError,
}

impl ErrorType {
    pub const ALL: [ErrorType; 9] = [
        ErrorType::MissingEnv,
        ErrorType::FileNotFound,
        ErrorType::InvalidInput,
        ErrorType::PermissionDenied,
        ErrorType::FileTooLarge,
        ErrorType::MpApiError,
        ErrorType::UpstreamTimeout,
        ErrorType::UpstreamRateLimited,
        ErrorType::RuntimeError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::MissingEnv => "missing_env",
            ErrorType::FileNotFound => "file_not_found",
            ErrorType::InvalidInput => "invalid_input",
            ErrorType::PermissionDenied => "permission_denied",
            ErrorType::FileTooLarge => "file_too_large",
            ErrorType::MpApiError => "mp_api_error",
            ErrorType::UpstreamTimeout => "upstream_timeout",
            ErrorType::UpstreamRateLimited => "upstream_rate_limited",
            ErrorType::RuntimeError => "runtime_error",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorType {
    type Err = EnvelopeViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EnvelopeViolation::UnknownErrorType(s.to_string()))
    }
}

/// The `error` member of a failed envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub message: String,
    pub details: Value,
}

/// Reasons an envelope fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeViolation {
    #[error("Envelope must be an object.")]
    NotAnObject,
    #[error("Envelope missing {0}.")]
    MissingField(&'static str),
    #[error("ok must be a boolean.")]
    OkNotBoolean,
    #[error("{0} must be an object.")]
    FieldNotAnObject(&'static str),
    #[error("ok True requires error=None.")]
    ErrorOnSuccess,
    #[error("ok False requires data=None.")]
    DataOnFailure,
    #[error("error must be an object.")]
    MissingError,
    #[error("error missing {0}.")]
    MissingErrorField(&'static str),
    #[error("error.message must be a string.")]
    MessageNotString,
    #[error("Invalid error.type: {0}")]
    UnknownErrorType(String),
    #[error("Envelope payload is not serializable: {0}")]
    Serialization(String),
}

/// A single, immutable tool response.
///
/// Fields are private; envelopes are built with [`make_ok`] / [`make_err`] so
/// the invariants hold for every value that leaves this module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    ok: bool,
    data: Value,
    error: Option<ErrorDetail>,
    meta: Fields,
    provenance: Fields,
}

impl Envelope {
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn error(&self) -> Option<&ErrorDetail> {
        self.error.as_ref()
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        self.error.as_ref().map(|e| e.error_type)
    }

    pub fn meta(&self) -> &Fields {
        &self.meta
    }

    pub fn provenance(&self) -> &Fields {
        &self.provenance
    }

    /// Wire form of the envelope.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("ok".into(), Value::Bool(self.ok));
        obj.insert("data".into(), self.data.clone());
        obj.insert(
            "error".into(),
            match &self.error {
                Some(e) => serde_json::json!({
                    "type": e.error_type.as_str(),
                    "message": e.message,
                    "details": e.details,
                }),
                None => Value::Null,
            },
        );
        obj.insert("meta".into(), Value::Object(self.meta.clone()));
        obj.insert("provenance".into(), Value::Object(self.provenance.clone()));
        Value::Object(obj)
    }

    fn validation_failed(violation: &EnvelopeViolation) -> Self {
        tracing::error!("Envelope validation failed: {}", violation);
        Self {
            ok: false,
            data: Value::Null,
            error: Some(ErrorDetail {
                error_type: ErrorType::RuntimeError,
                message: "Envelope validation failed.".to_string(),
                details: Value::String(violation.to_string()),
            }),
            meta: Fields::new(),
            provenance: Fields::new(),
        }
    }
}

/// Build a success envelope.
pub fn make_ok<T: Serialize>(data: T, meta: Fields, provenance: Fields) -> Envelope {
    match serde_json::to_value(data) {
        Ok(data) => validate(Envelope {
            ok: true,
            data,
            error: None,
            meta,
            provenance,
        }),
        Err(e) => Envelope::validation_failed(&EnvelopeViolation::Serialization(e.to_string())),
    }
}

/// Build a failure envelope.
pub fn make_err(
    error_type: ErrorType,
    message: impl Into<String>,
    details: Value,
    meta: Fields,
    provenance: Fields,
) -> Envelope {
    validate(Envelope {
        ok: false,
        data: Value::Null,
        error: Some(ErrorDetail {
            error_type,
            message: message.into(),
            details,
        }),
        meta,
        provenance,
    })
}

/// Lenient validation: returns the envelope unchanged when it holds, or a
/// `runtime_error` envelope describing the violation.
pub fn validate(envelope: Envelope) -> Envelope {
    match validate_strict(&envelope) {
        Ok(()) => envelope,
        Err(violation) => Envelope::validation_failed(&violation),
    }
}

/// Strict validation for self-tests. Never reachable from a remote caller.
pub fn validate_strict(envelope: &Envelope) -> Result<(), EnvelopeViolation> {
    if envelope.ok {
        if envelope.error.is_some() {
            return Err(EnvelopeViolation::ErrorOnSuccess);
        }
    } else {
        if !envelope.data.is_null() {
            return Err(EnvelopeViolation::DataOnFailure);
        }
        if envelope.error.is_none() {
            return Err(EnvelopeViolation::MissingError);
        }
    }
    Ok(())
}

/// Strict validation of a raw JSON envelope as it appears on the wire.
pub fn validate_value(value: &Value) -> Result<(), EnvelopeViolation> {
    let obj = value.as_object().ok_or(EnvelopeViolation::NotAnObject)?;
    for key in ["ok", "data", "error", "meta", "provenance"] {
        if !obj.contains_key(key) {
            return Err(EnvelopeViolation::MissingField(key));
        }
    }
    if !obj["meta"].is_object() {
        return Err(EnvelopeViolation::FieldNotAnObject("meta"));
    }
    if !obj["provenance"].is_object() {
        return Err(EnvelopeViolation::FieldNotAnObject("provenance"));
    }
    let ok = obj["ok"].as_bool().ok_or(EnvelopeViolation::OkNotBoolean)?;
    if ok {
        if !obj["error"].is_null() {
            return Err(EnvelopeViolation::ErrorOnSuccess);
        }
        return Ok(());
    }
    if !obj["data"].is_null() {
        return Err(EnvelopeViolation::DataOnFailure);
    }
    let error = obj["error"]
        .as_object()
        .ok_or(EnvelopeViolation::MissingError)?;
    for key in ["type", "message", "details"] {
        if !error.contains_key(key) {
            return Err(EnvelopeViolation::MissingErrorField(key));
        }
    }
    if !error["message"].is_string() {
        return Err(EnvelopeViolation::MessageNotString);
    }
    let error_type = error["type"]
        .as_str()
        .ok_or_else(|| EnvelopeViolation::UnknownErrorType(error["type"].to_string()))?;
    error_type.parse::<ErrorType>()?;
    Ok(())
}

/// Standard `meta` block: `{tool, version, warnings}`.
pub fn tool_meta(tool: &str, warnings: &[&str]) -> Fields {
    let mut meta = Fields::new();
    meta.insert("tool".into(), Value::String(tool.to_string()));
    meta.insert(
        "version".into(),
        Value::String(env!("CARGO_PKG_VERSION").to_string()),
    );
    meta.insert(
        "warnings".into(),
        Value::Array(
            warnings
                .iter()
                .map(|w| Value::String(w.to_string()))
                .collect(),
        ),
    );
    meta
}

/// Where an operation's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Local,
    Computed,
    /// Materials Project.
    Mp,
    /// LLM provider.
    OpenAi,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Local => "local",
            Source::Computed => "computed",
            Source::Mp => "mp",
            Source::OpenAi => "openai",
        }
    }
}

/// `provenance` block listing the identifiers an operation touched.
pub fn provenance_ids<I, S>(source: Source, ids: I) -> Fields
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut prov = Fields::new();
    prov.insert("source".into(), Value::String(source.as_str().to_string()));
    prov.insert(
        "ids".into(),
        Value::Array(ids.into_iter().map(|s| Value::String(s.into())).collect()),
    );
    prov
}

/// `provenance` block listing artifacts an operation produced.
pub fn provenance_outputs<I, S>(source: Source, outputs: I) -> Fields
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut prov = Fields::new();
    prov.insert("source".into(), Value::String(source.as_str().to_string()));
    prov.insert(
        "outputs".into(),
        Value::Array(
            outputs
                .into_iter()
                .map(|s| Value::String(s.into()))
                .collect(),
        ),
    );
    prov
}
