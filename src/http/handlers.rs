//! Operation dispatch.
//!
//! Turns a parsed [`CellAddress`] plus the HTTP method into one of the four
//! store operations and encodes the result.
//!
//! Writes and deletes probe the cell first so the response can say whether
//! it already existed (204) or not (201 for PUT, 404 for DELETE).

use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::request::{CellAddress, ListParams, Operation};
use crate::http::response::{self, ApiError, Row};
use crate::http::server::AppState;
use crate::store::{self, Put, ScanRequest, StoreError};

/// Outcome of the read performed before a mutation.
#[derive(Debug)]
pub enum Existence {
    Present,
    Absent,
    /// The probe itself failed; status decisions treat this as absent.
    Unknown(StoreError),
}

impl Existence {
    pub fn existed(&self) -> bool {
        matches!(self, Existence::Present)
    }
}

/// Entry point for every request path.
pub async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (address, operation) = match route(&state, &request) {
        Ok(routed) => routed,
        Err(e) => return e.into_response(),
    };

    let label = operation.as_str();
    let result = match operation {
        Operation::GetCell => get_cell(&state, &address).await,
        Operation::ListRange(params) => list_range(&state, &address, params).await,
        Operation::PutCell => put_cell(&state, &address, request.into_body()).await,
        Operation::DeleteCell => delete_cell(&state, &address).await,
    };

    let mut response = result.unwrap_or_else(|e| e.into_response());
    response.extensions_mut().insert(OperationLabel(label));
    response
}

/// Operation name attached to responses for the access log and metrics.
#[derive(Debug, Clone, Copy)]
pub struct OperationLabel(pub &'static str);

fn route(state: &AppState, request: &Request<Body>) -> Result<(CellAddress, Operation), ApiError> {
    let address = CellAddress::from_uri_path(request.uri().path())?;
    let operation = Operation::resolve(
        request.method(),
        request.uri().query(),
        state.settings.default_batch,
    )
    .ok_or_else(|| ApiError::MethodNotAllowed(request.method().clone()))?;
    Ok((address, operation))
}

async fn get_cell(state: &AppState, address: &CellAddress) -> Result<Response, ApiError> {
    let row = state
        .store
        .get(
            &address.table,
            address.row.as_bytes(),
            Some((address.family.as_str(), address.qualifier.as_str())),
        )
        .await
        .map_err(|e| {
            tracing::error!(table = %address.table, row = %address.row, error = %e, "Get failed");
            ApiError::Store(e)
        })?
        .ok_or(ApiError::NotFound)?;

    Ok(response::json(StatusCode::OK, &Row::from(row))?)
}

async fn list_range(
    state: &AppState,
    address: &CellAddress,
    params: ListParams,
) -> Result<Response, ApiError> {
    let request = ScanRequest::new(address.table.as_str(), address.row.as_bytes())
        .with_stop_row(params.end.into_bytes())
        .with_batch(params.batch);

    let rows = store::collect_rows(state.store.as_ref(), &request)
        .await
        .map_err(|e| {
            tracing::error!(table = %address.table, start = %address.row, error = %e, "Scan failed");
            ApiError::Store(e)
        })?;

    let rows: Vec<Row> = rows.into_iter().map(Row::from).collect();
    match response::json(StatusCode::OK, &rows) {
        Ok(response) => Ok(response),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode scan result");
            Ok(StatusCode::SERVICE_UNAVAILABLE.into_response())
        }
    }
}

async fn put_cell(state: &AppState, address: &CellAddress, body: Body) -> Result<Response, ApiError> {
    let value = axum::body::to_bytes(body, state.settings.max_body_bytes)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Read body failed");
            ApiError::BodyUnreadable(e.to_string())
        })?;

    let existence = probe(state, address).await;
    let status = if existence.existed() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::CREATED
    };

    let put = Put {
        row: address.row.as_bytes().to_vec(),
        family: address.family.clone(),
        qualifier: address.qualifier.clone(),
        timestamp: unix_seconds(),
        value: value.to_vec(),
    };

    match state.store.put(&address.table, put).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::error!(table = %address.table, row = %address.row, "Put not applied");
            if state.settings.strict_write_ack {
                return Err(ApiError::NotApplied("put"));
            }
        }
        Err(e) => {
            tracing::error!(table = %address.table, row = %address.row, error = %e, "Put failed");
            if state.settings.strict_write_ack {
                return Err(ApiError::Store(e));
            }
        }
    }

    Ok(status.into_response())
}

async fn delete_cell(state: &AppState, address: &CellAddress) -> Result<Response, ApiError> {
    let existence = probe(state, address).await;

    match state
        .store
        .delete(&address.table, address.row.as_bytes(), &address.family, &address.qualifier)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::error!(table = %address.table, row = %address.row, "Delete not applied");
            if state.settings.strict_write_ack {
                return Err(ApiError::NotApplied("delete"));
            }
        }
        Err(e) => {
            tracing::error!(table = %address.table, row = %address.row, error = %e, "Delete failed");
            if state.settings.strict_write_ack {
                return Err(ApiError::Store(e));
            }
            // Lenient mode keeps the historical behavior: no status decided.
            return Ok(StatusCode::OK.into_response());
        }
    }

    if existence.existed() {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(StatusCode::NOT_FOUND.into_response())
    }
}

/// Read the addressed cell to learn whether it exists.
pub async fn probe(state: &AppState, address: &CellAddress) -> Existence {
    let result = state
        .store
        .get(
            &address.table,
            address.row.as_bytes(),
            Some((address.family.as_str(), address.qualifier.as_str())),
        )
        .await;

    match result {
        Ok(Some(_)) => Existence::Present,
        Ok(None) => Existence::Absent,
        Err(e) => {
            tracing::warn!(
                table = %address.table,
                row = %address.row,
                error = %e,
                "Existence probe failed, treating cell as absent"
            );
            Existence::Unknown(e)
        }
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::{header, HeaderMap, Method};
    use axum::Router;
    use tower::ServiceExt;

    use super::*;
    use crate::config::HttpConfig;
    use crate::http::server::{build_router, SERVER_HEADER};
    use crate::store::{CellStore, MemoryStore, ResultRow, Scanner};

    /// Memory store with switchable failures.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_get: AtomicBool,
        fail_put: AtomicBool,
        reject_put: AtomicBool,
        fail_delete: AtomicBool,
    }

    fn outage() -> StoreError {
        StoreError::Unavailable("region server unreachable".into())
    }

    #[async_trait]
    impl CellStore for FlakyStore {
        async fn get(
            &self,
            table: &str,
            row: &[u8],
            column: Option<(&str, &str)>,
        ) -> Result<Option<ResultRow>, StoreError> {
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(outage());
            }
            self.inner.get(table, row, column).await
        }

        async fn put(&self, table: &str, put: Put) -> Result<bool, StoreError> {
            if self.fail_put.load(Ordering::SeqCst) {
                return Err(outage());
            }
            if self.reject_put.load(Ordering::SeqCst) {
                return Ok(false);
            }
            self.inner.put(table, put).await
        }

        async fn delete(
            &self,
            table: &str,
            row: &[u8],
            family: &str,
            qualifier: &str,
        ) -> Result<bool, StoreError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(outage());
            }
            self.inner.delete(table, row, family, qualifier).await
        }

        async fn scan(&self, request: &ScanRequest) -> Result<Box<dyn Scanner>, StoreError> {
            self.inner.scan(request).await
        }

        async fn create_table(&self, table: &str, families: &[String]) -> Result<(), StoreError> {
            self.inner.create_table(table, families).await
        }

        async fn drop_table(&self, table: &str) -> Result<(), StoreError> {
            self.inner.drop_table(table).await
        }

        async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
            self.inner.table_exists(table).await
        }
    }

    async fn app_with(settings: HttpConfig) -> (Router, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::default());
        store.create_table("t", &["cf".to_string()]).await.unwrap();
        (build_router(store.clone(), settings), store)
    }

    async fn app() -> (Router, Arc<FlakyStore>) {
        app_with(HttpConfig::default()).await
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: impl Into<Body>,
    ) -> (StatusCode, HeaderMap, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body.into())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, headers, body)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_value() {
        let (app, _) = app().await;
        let value = "caf\u{e9} {\"raw\": true}\n";

        let (status, _, body) = send(&app, Method::PUT, "/t/cf:q/user/42", value).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.is_empty());

        let (status, headers, body) = send(&app, Method::GET, "/t/cf:q/user/42", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::SERVER], SERVER_HEADER);

        let row: Row = serde_json::from_slice(&body).unwrap();
        assert_eq!(row.key, "/user/42");
        assert_eq!(row.cells.len(), 1);
        assert_eq!(row.cells[0].column, "cf:q");
        assert_eq!(row.cells[0].value, value);
        assert!(row.cells[0].timestamp > 0);
    }

    #[tokio::test]
    async fn second_put_reports_existing_cell() {
        let (app, _) = app().await;
        assert_eq!(send(&app, Method::PUT, "/t/cf:q/r", "a").await.0, StatusCode::CREATED);
        assert_eq!(send(&app, Method::PUT, "/t/cf:q/r", "b").await.0, StatusCode::NO_CONTENT);

        let (_, _, body) = send(&app, Method::GET, "/t/cf:q/r", Body::empty()).await;
        let row: Row = serde_json::from_slice(&body).unwrap();
        assert_eq!(row.cells[0].value, "b");
    }

    #[tokio::test]
    async fn get_missing_cell_is_404_without_body() {
        let (app, _) = app().await;
        let (status, headers, body) = send(&app, Method::GET, "/t/cf:q/nobody", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
        assert_eq!(headers[header::SERVER], SERVER_HEADER);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn delete_reports_prior_existence() {
        let (app, _) = app().await;
        send(&app, Method::PUT, "/t/cf:q/r", "v").await;

        assert_eq!(send(&app, Method::DELETE, "/t/cf:q/r", Body::empty()).await.0, StatusCode::NO_CONTENT);
        assert_eq!(send(&app, Method::DELETE, "/t/cf:q/r", Body::empty()).await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(&app, Method::GET, "/t/cf:q/r", Body::empty()).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_addresses_are_400() {
        let (app, _) = app().await;

        let (status, _, body) = send(&app, Method::GET, "/t/cf:q", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Wrong URL");

        let (status, _, body) = send(&app, Method::GET, "/", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Wrong URL");

        let (status, headers, body) = send(&app, Method::PUT, "/t/cfq/r", "v").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Wrong Column");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn escaped_paths_address_the_decoded_cell() {
        let (app, store) = app().await;

        assert_eq!(send(&app, Method::PUT, "/t/cf:q/a%20b", "v").await.0, StatusCode::CREATED);
        assert!(store.get("t", b"/a b", Some(("cf", "q"))).await.unwrap().is_some());
        assert!(store.get("t", b"/a%20b", Some(("cf", "q"))).await.unwrap().is_none());

        let (status, _, body) = send(&app, Method::GET, "/t/cf%3Aq/a%20b", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        let row: Row = serde_json::from_slice(&body).unwrap();
        assert_eq!(row.key, "/a b");

        assert_eq!(send(&app, Method::PUT, "/t/cf:q/x%2Fy", "w").await.0, StatusCode::CREATED);
        assert_eq!(send(&app, Method::GET, "/t/cf:q/x/y", Body::empty()).await.0, StatusCode::OK);
        assert_eq!(send(&app, Method::DELETE, "/t/cf%3aq/x%2Fy", Body::empty()).await.0, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn unsupported_method_is_405() {
        let (app, _) = app().await;
        let (status, headers, _) = send(&app, Method::POST, "/t/cf:q/r", "v").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers[header::ALLOW], "GET, PUT, DELETE");
        assert_eq!(headers[header::SERVER], SERVER_HEADER);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn list_respects_batch_and_stop_key() {
        let (app, _) = app().await;
        for i in 0..5 {
            send(&app, Method::PUT, &format!("/t/cf:q/row{}", i), "v").await;
        }

        let (status, _, body) = send(&app, Method::GET, "/t/cf:q/row0?list=true&batch=2", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        let rows: Vec<Row> = serde_json::from_slice(&body).unwrap();
        assert_eq!(rows.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(), ["/row0", "/row1"]);

        let (_, _, body) = send(&app, Method::GET, "/t/cf:q/row1?list=true&end=/row3", Body::empty()).await;
        let rows: Vec<Row> = serde_json::from_slice(&body).unwrap();
        assert_eq!(rows.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(), ["/row1", "/row2"]);

        let (_, _, body) = send(&app, Method::GET, "/t/cf:q/zzz?list=true&batch=nope", Body::empty()).await;
        assert_eq!(body, b"[]");
    }

    #[tokio::test]
    async fn read_failure_is_503_with_text() {
        let (app, store) = app().await;
        store.fail_get.store(true, Ordering::SeqCst);

        let (status, _, body) = send(&app, Method::GET, "/t/cf:q/r", Body::empty()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(String::from_utf8(body).unwrap().contains("region server unreachable"));
    }

    #[tokio::test]
    async fn unknown_table_read_is_503() {
        let (app, _) = app().await;
        let (status, _, _) = send(&app, Method::GET, "/missing/cf:q/r", Body::empty()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn failed_probe_counts_as_absent() {
        let (app, store) = app().await;
        send(&app, Method::PUT, "/t/cf:q/r", "v").await;

        store.fail_get.store(true, Ordering::SeqCst);
        assert_eq!(send(&app, Method::PUT, "/t/cf:q/r", "w").await.0, StatusCode::CREATED);
        assert_eq!(send(&app, Method::DELETE, "/t/cf:q/r", Body::empty()).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lenient_writes_ignore_store_failures() {
        let (app, store) = app().await;

        store.fail_put.store(true, Ordering::SeqCst);
        assert_eq!(send(&app, Method::PUT, "/t/cf:q/r", "v").await.0, StatusCode::CREATED);

        store.fail_put.store(false, Ordering::SeqCst);
        store.reject_put.store(true, Ordering::SeqCst);
        assert_eq!(send(&app, Method::PUT, "/t/cf:q/r", "v").await.0, StatusCode::CREATED);

        store.fail_delete.store(true, Ordering::SeqCst);
        let (status, _, body) = send(&app, Method::DELETE, "/t/cf:q/r", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn strict_writes_surface_store_failures() {
        let settings = HttpConfig {
            strict_write_ack: true,
            ..HttpConfig::default()
        };
        let (app, store) = app_with(settings).await;

        store.fail_put.store(true, Ordering::SeqCst);
        assert_eq!(send(&app, Method::PUT, "/t/cf:q/r", "v").await.0, StatusCode::SERVICE_UNAVAILABLE);

        store.fail_put.store(false, Ordering::SeqCst);
        store.reject_put.store(true, Ordering::SeqCst);
        assert_eq!(send(&app, Method::PUT, "/t/cf:q/r", "v").await.0, StatusCode::SERVICE_UNAVAILABLE);

        store.fail_delete.store(true, Ordering::SeqCst);
        assert_eq!(send(&app, Method::DELETE, "/t/cf:q/r", Body::empty()).await.0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn oversized_body_is_414() {
        let settings = HttpConfig {
            max_body_bytes: 8,
            ..HttpConfig::default()
        };
        let (app, _) = app_with(settings).await;
        let (status, _, body) = send(&app, Method::PUT, "/t/cf:q/r", "0123456789").await;
        assert_eq!(status, StatusCode::URI_TOO_LONG);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let (app, _) = app().await;
        let (_, headers, _) = send(&app, Method::GET, "/t/cf:q/r", Body::empty()).await;
        assert!(headers.contains_key("x-request-id"));
    }
}
