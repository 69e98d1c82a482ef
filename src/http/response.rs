//! Response shapes and error mapping.
//!
//! # Responsibilities
//! - JSON encoding of rows and cells
//! - Map gateway failures to status codes and bodies
//!
//! # Design Decisions
//! - Point reads return one `Row` object, range reads an array of `Row`
//! - Client errors (400, 405) keep the `application/json` content type of a
//!   normal response even though the body is a bare message
//! - Store failures (503) are plain text; status-only responses carry no body

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::http::request::AddressError;
use crate::store::{ResultRow, StoreError};

/// One cell of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// `family:qualifier`.
    pub column: String,
    pub timestamp: u64,
    pub value: String,
}

/// A row and whatever cells the store returned for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub key: String,
    #[serde(rename = "cell")]
    pub cells: Vec<Cell>,
}

impl From<ResultRow> for Row {
    fn from(row: ResultRow) -> Self {
        let cells = row
            .columns
            .into_iter()
            .map(|(column, v)| Cell {
                column,
                timestamp: v.timestamp,
                value: String::from_utf8_lossy(&v.value).into_owned(),
            })
            .collect();

        Row {
            key: String::from_utf8_lossy(&row.row).into_owned(),
            cells,
        }
    }
}

/// Serialize `body` as a JSON response with the given status.
pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Response, serde_json::Error> {
    let bytes = serde_json::to_vec(body)?;
    Ok((
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        bytes,
    )
        .into_response())
}

/// Everything that can end a request early.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("cell not found")]
    NotFound,

    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("request body unreadable: {0}")]
    BodyUnreadable(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("store did not apply the {0}")]
    NotApplied(&'static str),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Address(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BodyUnreadable(_) => StatusCode::URI_TOO_LONG,
            ApiError::Store(_) | ApiError::NotApplied(_) | ApiError::Serialization(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let json = HeaderValue::from_static("application/json");
        match &self {
            ApiError::NotFound | ApiError::BodyUnreadable(_) => status.into_response(),
            ApiError::Address(_) => {
                (status, [(header::CONTENT_TYPE, json)], self.to_string()).into_response()
            }
            ApiError::MethodNotAllowed(_) => (
                status,
                [
                    (header::ALLOW, HeaderValue::from_static("GET, PUT, DELETE")),
                    (header::CONTENT_TYPE, json),
                ],
                self.to_string(),
            )
                .into_response(),
            _ => (status, self.to_string()).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::store::ColumnValue;

    #[test]
    fn row_serializes_with_cell_field() {
        let row = Row::from(ResultRow {
            row: b"/alice".to_vec(),
            columns: HashMap::from([(
                "cf:name".to_string(),
                ColumnValue { timestamp: 42, value: b"Alice".to_vec() },
            )]),
        });

        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "key": "/alice",
                "cell": [{ "column": "cf:name", "timestamp": 42, "value": "Alice" }]
            })
        );
    }

    #[test]
    fn empty_scan_is_an_array() {
        let rows: Vec<Row> = Vec::new();
        assert_eq!(serde_json::to_string(&rows).unwrap(), "[]");
    }

    #[test]
    fn error_statuses() {
        assert_eq!(ApiError::from(AddressError::MalformedPath).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(AddressError::MalformedColumn).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::BodyUnreadable("x".into()).status(), StatusCode::URI_TOO_LONG);
        assert_eq!(
            ApiError::from(StoreError::Unavailable("down".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn method_not_allowed_lists_supported_methods() {
        let response = ApiError::MethodNotAllowed(Method::POST).into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, PUT, DELETE");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn error_content_types() {
        let response = ApiError::from(AddressError::MalformedColumn).into_response();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let response = ApiError::from(StoreError::Unavailable("down".into())).into_response();
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}
