//! # API Request/Response Types
//!
//! JSON structures for the HTTP API and the mapping from index errors to
//! status codes.

use axum::{Json, http::StatusCode, response::IntoResponse};
use dimdir_core::{
    CellMap, CellPosition, CellResolver, DimdirError, DocumentPosition, EntityKind, FormulaValue,
    NewDocument, RelatedItem, SheetLayout, TokenHit, UnitId, formula::parse_cell,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// ERRORS
// =============================================================================

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable kind, e.g. `address_not_found`.
    pub kind: String,
    pub error: String,
}

/// A failed request: status code plus [`ErrorResponse`] body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse {
                kind: "internal".to_string(),
                error: message.into(),
            },
        }
    }
}

/// Status code for an index error.
#[must_use]
pub fn status_for(error: &DimdirError) -> StatusCode {
    match error {
        DimdirError::InvalidContent(_)
        | DimdirError::MalformedFormula { .. }
        | DimdirError::UnknownFunction(_) => StatusCode::BAD_REQUEST,
        DimdirError::AddressNotFound(_)
        | DimdirError::UnresolvedEndpoint(_)
        | DimdirError::UnknownIdentifier(_) => StatusCode::NOT_FOUND,
        DimdirError::DuplicateMapping(_) => StatusCode::CONFLICT,
        DimdirError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<DimdirError> for ApiError {
    fn from(error: DimdirError) -> Self {
        Self {
            status: status_for(&error),
            body: ErrorResponse {
                kind: error.kind().to_string(),
                error: error.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

// =============================================================================
// HEALTH
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Document submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub content: String,
    pub long_id: String,
    #[serde(default)]
    pub short_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl IngestRequest {
    /// Convert to a [`NewDocument`], enforcing the configured size limit.
    pub fn to_document(&self, max_text_bytes: usize) -> Result<NewDocument, DimdirError> {
        if self.content.trim().is_empty() {
            return Err(DimdirError::InvalidContent("content is empty".into()));
        }
        if self.content.len() > max_text_bytes {
            return Err(DimdirError::InvalidContent(format!(
                "content length {} exceeds maximum {max_text_bytes} bytes",
                self.content.len()
            )));
        }
        Ok(NewDocument {
            content: self.content.clone(),
            long_id: self.long_id.clone(),
            short_id: self.short_id.clone(),
            title: self.title.clone(),
            source: self.source.clone(),
        })
    }
}

// =============================================================================
// SEARCH
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchRequest {
    /// Documents containing this exact sentence.
    Sentence { text: String },
    /// Every occurrence of a token.
    Token { token: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub documents: Vec<DocumentPosition>,
    #[serde(default)]
    pub hits: Vec<TokenHit>,
}

// =============================================================================
// ADDRESSES
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAddressRequest {
    pub levels: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub target: Option<UnitId>,
    #[serde(default)]
    pub kind: Option<EntityKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub address: String,
    #[serde(default)]
    pub relative_to: Option<String>,
}

// =============================================================================
// RELATIONS
// =============================================================================

/// Body of `POST /relations` and `POST /relations/unlink`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRequest {
    pub source: String,
    pub target: String,
    pub relation_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlinkResponse {
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedRequest {
    /// Address of the source unit.
    pub source: String,
    #[serde(default)]
    pub relation_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedResponse {
    pub source: UnitId,
    pub count: usize,
    pub items: Vec<RelatedItem>,
}

// =============================================================================
// FORMULAS
// =============================================================================

/// Formula evaluation request.
///
/// Cells resolve through `sheet` when it is non-empty (column letter to
/// document id, row `n` to sentence position `n - 1`), otherwise through
/// the explicit `cells` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormulaRequest {
    pub formula: String,
    #[serde(default)]
    pub cells: BTreeMap<String, String>,
    #[serde(default)]
    pub sheet: BTreeMap<String, UnitId>,
    /// Cell holding the formula, e.g. `"B3"`.
    #[serde(default)]
    pub context: Option<String>,
}

impl FormulaRequest {
    /// Build the cell resolver this request describes.
    pub fn resolver(&self) -> Result<Box<dyn CellResolver>, DimdirError> {
        if self.sheet.is_empty() {
            let mut map = CellMap::new();
            for (cell, address) in &self.cells {
                map.insert(cell, address.clone())?;
            }
            return Ok(Box::new(map));
        }
        let mut layout = SheetLayout::new();
        for (column, document) in &self.sheet {
            let (index, _) = parse_cell(&format!("{column}1")).ok_or_else(|| {
                DimdirError::InvalidContent(format!("invalid sheet column '{column}'"))
            })?;
            layout = layout.with_column(index, *document);
        }
        Ok(Box::new(layout))
    }

    pub fn context_cell(&self) -> Result<Option<CellPosition>, DimdirError> {
        self.context
            .as_deref()
            .map(|cell| {
                parse_cell(cell)
                    .map(|(column, row)| CellPosition { column, row })
                    .ok_or_else(|| {
                        DimdirError::InvalidContent(format!("invalid context cell '{cell}'"))
                    })
            })
            .transpose()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FormulaResponse {
    pub formula: String,
    pub value: FormulaValue,
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub id: UnitId,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub id: UnitId,
    pub vector: Option<Vec<f32>>,
}

// =============================================================================
// MAPPINGS AND MAINTENANCE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRequest {
    pub long_id: String,
    #[serde(default)]
    pub short_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingResponse {
    pub kind: EntityKind,
    pub ids: Vec<UnitId>,
}

// =============================================================================
// TESTS
// =============================================================================
