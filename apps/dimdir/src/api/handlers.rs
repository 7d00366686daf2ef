//! # API Endpoint Handlers
//!
//! Index calls are synchronous and may touch disk, so each handler moves its
//! work onto tokio's blocking pool through [`with_index`].

use super::{
    AppState,
    types::{
        ApiError, EmbeddingRequest, EmbeddingResponse, FormulaRequest, FormulaResponse,
        HealthResponse, IngestRequest, LinkRequest, MappingRequest, PendingResponse,
        RegisterAddressRequest, RelatedRequest, RelatedResponse, ResolveRequest, SearchRequest,
        SearchResponse, UnlinkResponse,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use dimdir_core::{DimdirError, DocumentIndex, EntityKind, UnitId};

/// Run `f` against the index on the blocking pool.
async fn with_index<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&DocumentIndex) -> Result<T, DimdirError> + Send + 'static,
{
    let index = state.index.clone();
    tokio::task::spawn_blocking(move || f(&index))
        .await
        .map_err(|e| ApiError::internal(format!("index task failed: {e}")))?
        .map_err(ApiError::from)
}

fn created_or_ok(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

fn parse_id(raw: &str) -> Result<UnitId, ApiError> {
    raw.parse::<UnitId>().map_err(ApiError::from)
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

pub async fn status_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let status = with_index(&state, DocumentIndex::status).await?;
    Ok(Json(status))
}

// =============================================================================
// DOCUMENTS AND SENTENCES
// =============================================================================

/// Ingest a document. `201` when the content was new.
pub async fn ingest_handler(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let document = request.to_document(state.max_text_bytes)?;
    let report = with_index(&state, move |index| index.ingest_document(document)).await?;
    tracing::info!(
        event = "document_ingested",
        document = %report.document_id,
        sentences = report.sentences.len(),
        "Document ingested"
    );
    Ok((created_or_ok(report.is_new), Json(report)))
}

pub async fn list_documents_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(with_index(&state, DocumentIndex::documents).await?))
}

pub async fn document_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(with_index(&state, move |index| index.document(id)).await?))
}

pub async fn list_sentences_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(with_index(&state, DocumentIndex::sentences).await?))
}

pub async fn sentence_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(with_index(&state, move |index| index.sentence(id)).await?))
}

pub async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = with_index(&state, move |index| {
        Ok(match request {
            SearchRequest::Sentence { text } => SearchResponse {
                documents: index.find_documents_with_sentence(&text)?,
                hits: Vec::new(),
            },
            SearchRequest::Token { token } => SearchResponse {
                documents: Vec::new(),
                hits: index.search_by_token(&token)?,
            },
        })
    })
    .await?;
    Ok(Json(response))
}

// =============================================================================
// ADDRESSES
// =============================================================================

pub async fn register_address_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterAddressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = with_index(&state, move |index| {
        index.register_address(
            &request.levels,
            &request.attributes,
            request.target,
            request.kind,
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn resolve_handler(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resolution = with_index(&state, move |index| {
        index.resolve(&request.address, request.relative_to.as_deref())
    })
    .await?;
    Ok(Json(resolution))
}

// =============================================================================
// RELATIONS
// =============================================================================

/// Create a relation. `201` when the edge is new.
pub async fn link_handler(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = with_index(&state, move |index| {
        index.link(&request.source, &request.target, &request.relation_type)
    })
    .await?;
    Ok((created_or_ok(outcome.created), Json(outcome)))
}

pub async fn unlink_handler(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = with_index(&state, move |index| {
        index.unlink(&request.source, &request.target, &request.relation_type)
    })
    .await?;
    Ok(Json(UnlinkResponse { removed }))
}

pub async fn related_handler(
    State(state): State<AppState>,
    Json(request): Json<RelatedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = with_index(&state, move |index| {
        let source = index.endpoint(&request.source)?;
        let items = index.related(source, request.relation_type.as_deref())?;
        Ok(RelatedResponse {
            source,
            count: items.len(),
            items,
        })
    })
    .await?;
    Ok(Json(response))
}

// =============================================================================
// FORMULAS
// =============================================================================

pub async fn formula_handler(
    State(state): State<AppState>,
    Json(request): Json<FormulaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cells = request.resolver()?;
    let context = request.context_cell()?;
    let response = with_index(&state, move |index| {
        let value = index.evaluate(&request.formula, cells.as_ref(), context)?;
        Ok(FormulaResponse {
            formula: request.formula,
            value,
        })
    })
    .await?;
    Ok(Json(response))
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

pub async fn add_embedding_handler(
    State(state): State<AppState>,
    Json(request): Json<EmbeddingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    with_index(&state, move |index| {
        index.add_embedding(request.id, &request.vector)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn embedding_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let vector = with_index(&state, move |index| index.embedding(id)).await?;
    Ok(Json(EmbeddingResponse { id, vector }))
}

// =============================================================================
// MAPPINGS
// =============================================================================

pub async fn list_mappings_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(with_index(&state, DocumentIndex::mappings).await?))
}

/// Register a mapping. An existing long id is returned unchanged with `200`.
pub async fn register_mapping_handler(
    State(state): State<AppState>,
    Json(request): Json<MappingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = with_index(&state, move |index| {
        index.register_mapping(
            &request.long_id,
            request.short_id.as_deref(),
            request.description.as_deref(),
        )
    })
    .await?;
    Ok((created_or_ok(outcome.created), Json(outcome)))
}

pub async fn remove_mapping_handler(
    State(state): State<AppState>,
    Path(long_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = with_index(&state, move |index| {
        index
            .remove_mapping(&long_id)?
            .ok_or(DimdirError::UnknownIdentifier(long_id))
    })
    .await?;
    Ok(Json(removed))
}

// =============================================================================
// MAINTENANCE
// =============================================================================

pub async fn pending_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: EntityKind = kind.parse()?;
    let ids = with_index(&state, move |index| index.list_pending(kind)).await?;
    Ok(Json(PendingResponse { kind, ids }))
}

pub async fn repair_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: EntityKind = kind.parse()?;
    let report = with_index(&state, move |index| index.repair_pending(kind)).await?;
    tracing::info!(
        event = "pending_repaired",
        kind = %kind,
        repaired = report.repaired.len(),
        remaining = report.remaining.len(),
        "Pending units repaired"
    );
    Ok(Json(report))
}
