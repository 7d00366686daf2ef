//! # Dimdir HTTP API Module
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Unit, relation, mapping and pending counts
//! - `POST /documents` / `GET /documents` / `GET /documents/{id}`
//! - `GET /sentences` / `GET /sentences/{id}`
//! - `POST /search` - Sentence or token lookup
//! - `POST /addresses` / `POST /addresses/resolve`
//! - `POST /relations` / `POST /relations/unlink` / `POST /relations/related`
//! - `POST /formula` - Evaluate a formula
//! - `POST /embeddings` / `GET /embeddings/{id}`
//! - `GET /mappings` / `POST /mappings` / `DELETE /mappings/{long_id}`
//! - `GET /pending/{kind}` / `POST /pending/{kind}/repair`
//!
//! Security layers are described by [`SecurityConfig`].

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::ApiKey;
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    ApiError, EmbeddingRequest, EmbeddingResponse, ErrorResponse, FormulaRequest,
    FormulaResponse, HealthResponse, IngestRequest, LinkRequest, MappingRequest, PendingResponse,
    RegisterAddressRequest, RelatedRequest, RelatedResponse, ResolveRequest, SearchRequest,
    SearchResponse, UnlinkResponse, status_for,
};

use crate::config::SecurityConfig;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use dimdir_core::DocumentIndex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request body limit, above the largest accepted document plus JSON framing.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state. The index is internally synchronized.
#[derive(Clone, Debug)]
pub struct AppState {
    pub index: DocumentIndex,
    /// Largest document accepted by `POST /documents`.
    pub max_text_bytes: usize,
}

impl AppState {
    #[must_use]
    pub fn new(index: DocumentIndex, max_text_bytes: usize) -> Self {
        Self {
            index,
            max_text_bytes,
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// CORS from `DIMDIR_CORS_ORIGINS`: `*` allows all, a comma-separated list
/// allows those, unset or unparsable falls back to localhost.
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (DIMDIR_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(list) => {
            let allowed: Vec<HeaderValue> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => {
                        tracing::info!("CORS: Allowing origin: {}", origin);
                        Some(value)
                    }
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();
            if allowed.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                restricted_cors(localhost_origins())
            } else {
                restricted_cors(allowed)
            }
        }
        None => restricted_cors(localhost_origins()),
    }
}

fn localhost_origins() -> Vec<HeaderValue> {
    [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .map(HeaderValue::from_static)
    .collect()
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Build the router.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit, rate
/// limiting (if enabled), authentication (if configured).
pub fn create_router(state: AppState, security: &SecurityConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route(
            "/documents",
            get(handlers::list_documents_handler).post(handlers::ingest_handler),
        )
        .route("/documents/{id}", get(handlers::document_handler))
        .route("/sentences", get(handlers::list_sentences_handler))
        .route("/sentences/{id}", get(handlers::sentence_handler))
        .route("/search", post(handlers::search_handler))
        .route("/addresses", post(handlers::register_address_handler))
        .route("/addresses/resolve", post(handlers::resolve_handler))
        .route("/relations", post(handlers::link_handler))
        .route("/relations/unlink", post(handlers::unlink_handler))
        .route("/relations/related", post(handlers::related_handler))
        .route("/formula", post(handlers::formula_handler))
        .route("/embeddings", post(handlers::add_embedding_handler))
        .route("/embeddings/{id}", get(handlers::embedding_handler))
        .route(
            "/mappings",
            get(handlers::list_mappings_handler).post(handlers::register_mapping_handler),
        )
        .route(
            "/mappings/{long_id}",
            axum::routing::delete(handlers::remove_mapping_handler),
        )
        .route("/pending/{kind}", get(handlers::pending_handler))
        .route("/pending/{kind}/repair", post(handlers::repair_handler));

    if let Some(key) = &security.api_key {
        tracing::info!("API key authentication enabled");
        router = router.layer(axum_middleware::from_fn_with_state(
            ApiKey::new(key),
            auth::api_key_auth_middleware,
        ));
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set DIMDIR_API_KEY to enable authentication."
        );
    }

    if let Some(limiter) = create_rate_limiter(security.rate_limit) {
        tracing::info!("Rate limiting enabled: {} requests/second", security.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(security.cors_origins.as_deref()))
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve until Ctrl+C.
pub async fn run_server(
    addr: &str,
    state: AppState,
    security: &SecurityConfig,
) -> Result<(), std::io::Error> {
    let router = create_router(state, security);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Dimdir HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
        })
        .await
}
