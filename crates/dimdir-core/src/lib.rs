//! # dimdir-core
//!
//! The engine of the Dimensional Directory: a content-addressable document
//! index.
//!
//! Documents are split into sentences and sentences into tokens. Every piece
//! of text is stored once, keyed by a hash of its normalized form, and given
//! a stable identifier. Occurrences are recorded as positioned members of
//! their container, and every occurrence is reachable through a hierarchical
//! address such as `doc:<id>-3` or `<sentence-id>-0`.
//!
//! ## Layers
//!
//! - `store`: the relational store (authoritative) and the blob store
//!   (text, vectors, alias tables)
//! - `coordinator`: writes relational first, mirrors into blobs, repairs
//! - `content`: deduplicating intern
//! - `address`: registry, parsing, resolution
//! - `relation`: typed directed edges between units
//! - `mapping`: long id / short id collection aliases
//! - `formula`: `=rel(A1, "translation")` style expressions
//! - `index`: the facade driving ingestion and queries
//!
//! ## Constraints
//!
//! - No async, no network dependencies
//! - Closed entity kinds: Document, Sentence, Token
//! - Dedup is exact: same kind and same normalized text

// =============================================================================
// MODULES
// =============================================================================

pub mod address;
pub mod content;
pub mod coordinator;
pub mod embed;
pub mod formula;
pub mod index;
pub mod mapping;
pub mod primitives;
pub mod relation;
pub mod segment;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    AddressRecord, ContentHash, ContentUnit, DimdirError, DocumentMeta, EntityKind, Mapping,
    Occurrence, Relation, UnitId, normalize_text,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use address::{
    AddressRegistry, MemberRef, ParsedAddress, RelativeInfo, Resolution, document_address,
    parse_address,
};
pub use content::{ContentStore, Interned};
pub use coordinator::{Coordinator, RepairReport};
pub use embed::{EmbeddingError, EmbeddingProvider, NoEmbeddings};
pub use formula::{
    BUILTINS, CellMap, CellPosition, CellResolver, FormulaEngine, FormulaValue, NoCells,
    SheetLayout, parse_formula,
};
pub use index::{
    DocumentIndex, DocumentPosition, DocumentSummary, DocumentView, IndexOptions, IndexStatus,
    IngestReport, NewDocument, SentenceReport, SentenceView, TokenHit,
};
pub use mapping::{AliasTable, MappingOutcome, MappingRegistry};
pub use relation::{LinkOutcome, RelatedItem, RelationGraph};
pub use segment::{DefaultSegmenter, Granularity, SegmentationPolicy};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use store::{
    BlobStore, FsBlobStore, MemoryBlobStore, MemoryStore, Payload, RedbStore, RelationalStore,
};
