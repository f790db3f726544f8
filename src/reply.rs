//! Outcome normalisation and JSON error envelopes.
//!
//! Handlers that deal in `(payload, error)` pairs hand them to [`respond`],
//! which turns them into exactly one [`Response`]:
//!
//! | Outcome | Status | Body |
//! |---|---|---|
//! | no error, payload | desired status | payload as JSON |
//! | no error, no payload | desired status | empty |
//! | sentinel [`ApiError`] | fixed per variant | envelope, no `reason` |
//! | [`ApiError::Unrecognized`] | 500 | envelope, `reason` = description |
//!
//! Every response built here is `application/json; charset=utf-8`. The
//! envelope is `{"code", "message", "reason"?, "validation_errors"?}`.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::StatusCode;
use http::header::{ACCEPT, HeaderValue, LOCATION};
use serde::Serialize;
use tracing::error;

use crate::error::ApiError;
use crate::response::{IntoResponse, Response};

/// The JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub validation_errors: BTreeMap<String, String>,
}

impl ErrorEnvelope {
    /// Envelope for `status` with its canonical text. An empty `reason` is
    /// treated as absent.
    pub fn new(status: StatusCode, reason: &str) -> Self {
        Self {
            code: status.as_u16(),
            message: status.canonical_reason().unwrap_or_default().to_owned(),
            reason: (!reason.is_empty()).then(|| reason.to_owned()),
            validation_errors: BTreeMap::new(),
        }
    }

    pub fn with_validation_errors<I, K, V>(mut self, errors: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.validation_errors
            .extend(errors.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status = self.status();
        match encode(&self) {
            Ok(body) => json_response(status, body),
            Err(e) => {
                error!(source = "rest", error = %e, code = self.code, "error envelope encoding failed");
                json_response(status, Bytes::new())
            }
        }
    }
}

/// A serialisable payload answered with `200 OK`.
///
/// ```rust
/// use tessera::{Request, reply::Json};
///
/// #[derive(serde::Serialize)]
/// struct Item { id: u64 }
///
/// async fn get_item(_req: Request) -> Json<Item> {
///     Json(Item { id: 42 })
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        respond(Some(&self.0), None, StatusCode::OK, None)
    }
}

// ── Normaliser ────────────────────────────────────────────────────────────────

/// Turns a handler outcome into one response. The status used is available
/// as [`Response::status_code`].
pub fn respond<T: Serialize + ?Sized>(
    payload: Option<&T>,
    error: Option<ApiError>,
    status: StatusCode,
    location: Option<&str>,
) -> Response {
    if let Some(err) = error {
        return self::error(err);
    }

    let body = match payload.map(encode).transpose() {
        Ok(body) => body.unwrap_or_default(),
        Err(e) => {
            error!(source = "rest", error = %e, "response encoding failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "response encoding failed");
        }
    };

    let mut res = json_response(status, body);
    if let Some(loc) = location.filter(|l| !l.is_empty()) {
        match HeaderValue::try_from(loc) {
            Ok(v) => {
                res.headers.insert(LOCATION, v);
            }
            Err(_) => error!(source = "rest", location = loc, "invalid location header dropped"),
        }
    }
    res
}

/// Normalises an error with no payload.
pub fn error(err: ApiError) -> Response {
    match err {
        ApiError::Unrecognized(reason) => {
            error!(source = "rest", error = %reason, "unrecognized handler error");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &reason)
        }
        sentinel => error_response(sentinel.status(), ""),
    }
}

/// Status plus the standard envelope, with an optional `reason`.
pub fn error_response(status: StatusCode, reason: &str) -> Response {
    ErrorEnvelope::new(status, reason).into_response()
}

/// `404`, used for unmatched routes.
pub fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "")
}

/// `405`, used when the path exists under other methods.
pub fn not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "")
}

pub fn bad_request(reason: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, reason)
}

/// `400` describing which fields failed validation.
pub fn bad_request_validation<I, K, V>(reason: &str, validation_errors: I) -> Response
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    ErrorEnvelope::new(StatusCode::BAD_REQUEST, reason)
        .with_validation_errors(validation_errors)
        .into_response()
}

pub fn forbidden(reason: &str) -> Response {
    error_response(StatusCode::FORBIDDEN, reason)
}

pub fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "")
}

/// Joins path parts with `/`: `location(&["/items", "42"])` is `/items/42`.
pub fn location(parts: &[&str]) -> String {
    parts.join("/")
}

// ── helpers ───────────────────────────────────────────────────────────────────

/// Encoding matches a streaming JSON encoder: compact, newline-terminated.
fn encode<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Bytes> {
    let mut buf = serde_json::to_vec(value)?;
    buf.push(b'\n');
    Ok(Bytes::from(buf))
}

fn json_response(status: StatusCode, body: Bytes) -> Response {
    let mut res = Response::builder().status(status).json(body);
    res.headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    res
}
