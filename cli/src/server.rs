use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tower_http::limit::RequestBodyLimitLayer;

use savor_core::docstore::{Document, DocumentStore};

use crate::commands::mask;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<DocumentStore>>,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                tracing::error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

fn require_object(body: Value) -> Result<Map<String, Value>, ApiError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::BadRequest(
            "Document body must be a JSON object".to_string(),
        )),
    }
}

fn not_found(collection: &str, id: &str) -> ApiError {
    ApiError::NotFound(format!("Document '{id}' not found in '{collection}'"))
}

async fn list_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let store = state.store.lock().unwrap_or_else(PoisonError::into_inner);
    let docs = store.list(&collection).context("failed to list documents")?;
    Ok(Json(docs))
}

async fn get_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Document>, ApiError> {
    let store = state.store.lock().unwrap_or_else(PoisonError::into_inner);
    store
        .get(&collection, &id)
        .context("failed to read document")?
        .map(Json)
        .ok_or_else(|| not_found(&collection, &id))
}

async fn put_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Document>, ApiError> {
    let fields = require_object(body)?;
    let store = state.store.lock().unwrap_or_else(PoisonError::into_inner);
    let doc = store
        .set(&collection, &id, &fields)
        .context("failed to write document")?;
    tracing::debug!(collection = %collection, id = %id, "document written");
    Ok(Json(doc))
}

async fn patch_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Document>, ApiError> {
    let fields = require_object(body)?;
    let store = state.store.lock().unwrap_or_else(PoisonError::into_inner);
    store
        .merge(&collection, &id, &fields)
        .context("failed to merge document")?
        .map(Json)
        .ok_or_else(|| not_found(&collection, &id))
}

async fn delete_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let store = state.store.lock().unwrap_or_else(PoisonError::into_inner);
    if store
        .delete(&collection, &id)
        .context("failed to delete document")?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&collection, &id))
    }
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/collections/{collection}/documents",
            get(list_documents),
        )
        .route(
            "/api/collections/{collection}/documents/{id}",
            get(get_document)
                .put(put_document)
                .patch(patch_document)
                .delete(delete_document),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

/// Router over `store`, for serving in-process.
pub(crate) fn document_router(store: DocumentStore, api_key: Option<String>) -> Router {
    build_router(AppState {
        store: Arc::new(Mutex::new(store)),
        api_key,
    })
}

// --- Server startup ---

/// Startup line naming the key without revealing it. The key file is user
/// editable, so it may be short or non-ASCII.
fn api_key_notice(key: &str) -> String {
    format!(
        "API key: {} (see api_key file in data directory)",
        mask(key)
    )
}

pub async fn start_server(
    store: DocumentStore,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let app = document_router(store, api_key.clone());

    if let Some(ref key) = api_key {
        eprintln!("{}", api_key_notice(key));
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    tracing::info!(bind, port, "document server started");
    axum::serve(listener, app).await?;

    Ok(())
}
