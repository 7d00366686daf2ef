//! # Fixed Limits and Layout Constants
//!
//! Compile-time constants shared by the index components. They bound input
//! sizes, name the blob layout and fix the alias table format.

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum size of a submitted document in bytes (4 MiB).
pub const MAX_DOCUMENT_BYTES: usize = 4 * 1024 * 1024;

/// Maximum length of a single address string.
pub const MAX_ADDRESS_LENGTH: usize = 1024;

/// Maximum length of a long or short mapping identifier.
pub const MAX_MAPPING_ID_LENGTH: usize = 128;

/// Maximum length of a relation type name.
pub const MAX_RELATION_TYPE_LENGTH: usize = 128;

/// Maximum nesting of calls inside one formula.
pub const MAX_FORMULA_DEPTH: usize = 16;

// =============================================================================
// MAPPING REGISTRY
// =============================================================================

/// Length of a generated short id (hex characters).
pub const SHORT_ID_LENGTH: usize = 8;

/// Regeneration attempts before a short id collision is reported.
pub const MAX_SHORT_ID_ATTEMPTS: usize = 8;

// =============================================================================
// BLOB LAYOUT
// =============================================================================

/// Namespace holding per-collection alias files.
pub const COLLECTIONS_NAMESPACE: &str = "collections";

/// Key of the alias file inside a collection namespace.
pub const COLLECTION_ALIAS_KEY: &str = ".LStable";

/// Key of the aggregate alias file inside [`COLLECTIONS_NAMESPACE`].
pub const GLOBAL_ALIAS_KEY: &str = ".GlobalLStable";

/// Blob key for raw document content.
pub const CONTENT_KEY: &str = "content";

/// Blob key for sentence and token text.
pub const TEXT_KEY: &str = "text";

/// Blob key for embedding vectors.
pub const VECTOR_KEY: &str = "vector";

// =============================================================================
// ADDRESSING
// =============================================================================

/// Prefix of document addresses.
pub const DOCUMENT_ADDRESS_PREFIX: &str = "doc:";

/// Separator between address segments (flat form).
pub const SEGMENT_SEPARATOR: char = '-';

/// Separator between address segments (attribute-style form).
pub const DOTTED_SEPARATOR: char = '.';

/// Separator introducing attribute tokens at the end of an address.
pub const ATTRIBUTE_SEPARATOR: char = '_';
