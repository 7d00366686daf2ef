//! # Core Type Definitions
//!
//! This module contains all core types for the Dimensional Directory index:
//! - Identifiers and digests (`UnitId`, `ContentHash`)
//! - The closed entity kind (`EntityKind`)
//! - Persisted records (`ContentUnit`, `Occurrence`, `AddressRecord`,
//!   `Relation`, `Mapping`, `DocumentMeta`)
//! - Error types (`DimdirError`)
//!
//! ## Identity Guarantees
//!
//! - A `UnitId` is minted once and never reassigned.
//! - A `ContentHash` is scoped by kind: identical text under different kinds
//!   never collides.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Globally unique, content-independent identifier of a content unit.
///
/// The text form is the 32-character lowercase hex ("simple") rendering of a
/// v4 UUID. It never contains `-` or `.`, so it can be embedded in addresses
/// where those characters separate segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(Uuid);

impl UnitId {
    /// Mint a fresh random identifier.
    #[must_use]
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// Rebuild an identifier from its 128-bit storage key.
    #[must_use]
    pub const fn from_u128(raw: u128) -> Self {
        Self(Uuid::from_u128(raw))
    }

    /// The 128-bit storage key.
    #[must_use]
    pub const fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    /// Check whether a string is the canonical text form of an identifier.
    #[must_use]
    pub fn is_canonical(s: &str) -> bool {
        s.len() == 32 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for UnitId {
    type Err = DimdirError;

    /// Accepts both the simple and the hyphenated UUID forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s.trim())
            .map(Self)
            .map_err(|_| DimdirError::UnknownIdentifier(s.to_string()))
    }
}

impl Serialize for UnitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UnitId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// ENTITY KIND
// =============================================================================

/// The closed set of content unit kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Document,
    Sentence,
    Token,
}

impl EntityKind {
    /// All kinds in container-before-member order.
    pub const ALL: [Self; 3] = [Self::Document, Self::Sentence, Self::Token];

    /// Single-byte tag used in storage keys and hash scoping.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Document => 1,
            Self::Sentence => 2,
            Self::Token => 3,
        }
    }

    /// Inverse of [`EntityKind::tag`].
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Document),
            2 => Some(Self::Sentence),
            3 => Some(Self::Token),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Sentence => "sentence",
            Self::Token => "token",
        }
    }

    /// Top-level blob namespace holding payloads of this kind.
    #[must_use]
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::Document => "documents",
            Self::Sentence => "sentences",
            Self::Token => "tokens",
        }
    }

    /// The kind of unit that occurs inside this kind, if any.
    #[must_use]
    pub const fn member_kind(self) -> Option<Self> {
        match self {
            Self::Document => Some(Self::Sentence),
            Self::Sentence => Some(Self::Token),
            Self::Token => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = DimdirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" | "documents" | "doc" => Ok(Self::Document),
            "sentence" | "sentences" => Ok(Self::Sentence),
            "token" | "tokens" => Ok(Self::Token),
            other => Err(DimdirError::InvalidContent(format!(
                "unknown entity kind '{other}'"
            ))),
        }
    }
}

// =============================================================================
// CONTENT HASH
// =============================================================================

/// BLAKE3 digest of normalized text, scoped by entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash already-normalized text under the given kind.
    #[must_use]
    pub fn compute(kind: EntityKind, normalized: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(normalized.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }

    /// Parse the 64-character hex form.
    pub fn from_hex(hex: &str) -> Option<Self> {
        blake3::Hash::from_hex(hex)
            .ok()
            .map(|hash| Self(*hash.as_bytes()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).ok_or_else(|| serde::de::Error::custom("invalid content hash"))
    }
}

/// Normalize text before hashing: trim and collapse whitespace runs.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// RECORDS
// =============================================================================

/// A deduplicated piece of content.
///
/// `text` is present for sentences and tokens. Document content lives in the
/// blob store only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub id: UnitId,
    pub kind: EntityKind,
    pub text: Option<String>,
    pub hash: ContentHash,
}

/// A positioned appearance of a member unit inside a container unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub container: UnitId,
    pub member: UnitId,
    pub position: u32,
}

impl Occurrence {
    #[must_use]
    pub const fn new(container: UnitId, member: UnitId, position: u32) -> Self {
        Self {
            container,
            member,
            position,
        }
    }
}

/// A row of the address registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub addr: String,
    pub target: Option<UnitId>,
    pub kind: Option<EntityKind>,
    pub parent: Option<String>,
}

/// A directed, typed edge between two units.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub source: UnitId,
    pub target: UnitId,
    pub relation_type: String,
}

impl Relation {
    #[must_use]
    pub fn new(source: UnitId, target: UnitId, relation_type: impl Into<String>) -> Self {
        Self {
            source,
            target,
            relation_type: relation_type.into(),
        }
    }
}

/// Operator-facing alias pair for a document collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub long_id: String,
    pub short_id: String,
    pub description: Option<String>,
}

/// Descriptive metadata kept next to a document unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: Option<String>,
    pub source: Option<String>,
    /// Long ids of the collections this document was submitted under.
    pub collections: BTreeSet<String>,
}

impl DocumentMeta {
    /// Fold another submission into this one. Existing fields win.
    pub fn merge(&mut self, other: Self) {
        if self.title.is_none() {
            self.title = other.title;
        }
        if self.source.is_none() {
            self.source = other.source;
        }
        self.collections.extend(other.collections);
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors surfaced by the index.
///
/// Every variant carries the offending input so callers can diagnose a
/// failure without inspecting internals. Dedup races and lagging blob writes
/// are never reported through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DimdirError {
    /// Empty or degenerate input, rejected before any store write.
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    /// The relational or blob store could not complete an operation.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The address is neither registered nor structurally resolvable.
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    /// A relation endpoint does not resolve to a content unit.
    #[error("Unresolved relation endpoint: {0}")]
    UnresolvedEndpoint(String),

    /// The formula names a function that is not registered.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// The formula could not be parsed or its arguments are unusable.
    #[error("Malformed formula '{formula}': {reason}")]
    MalformedFormula { formula: String, reason: String },

    /// A short id collision persisted after regeneration.
    #[error("Duplicate mapping: {0}")]
    DuplicateMapping(String),

    /// The identifier is malformed or unknown to the relational store.
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),
}

impl DimdirError {
    /// Stable machine-readable name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidContent(_) => "invalid_content",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::AddressNotFound(_) => "address_not_found",
            Self::UnresolvedEndpoint(_) => "unresolved_endpoint",
            Self::UnknownFunction(_) => "unknown_function",
            Self::MalformedFormula { .. } => "malformed_formula",
            Self::DuplicateMapping(_) => "duplicate_mapping",
            Self::UnknownIdentifier(_) => "unknown_identifier",
        }
    }

    pub(crate) fn malformed(formula: &str, reason: impl Into<String>) -> Self {
        Self::MalformedFormula {
            formula: formula.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convert any store-layer failure into `StorageUnavailable`.
pub(crate) fn storage<E: fmt::Display>(err: E) -> DimdirError {
    DimdirError::StorageUnavailable(err.to_string())
}

// =============================================================================
// TESTS
// =============================================================================
