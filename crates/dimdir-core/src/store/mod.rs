//! # Store Contracts
//!
//! The two backing stores the index runs on:
//! - [`RelationalStore`]: structured records, uniqueness constraints, indexed
//!   lookup, one transaction per operation. Authoritative.
//! - [`BlobStore`]: named payloads under hierarchical namespaces.
//!
//! Both come with an in-memory implementation for tests and ephemeral use
//! and a persistent one (`RedbStore`, `FsBlobStore`).

mod blob;
#[cfg(test)]
pub(crate) mod faulty;
mod memory;
mod redb_store;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore, Payload};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::types::{
    AddressRecord, ContentHash, ContentUnit, DimdirError, DocumentMeta, EntityKind, Mapping,
    Occurrence, Relation, UnitId,
};
use std::collections::BTreeMap;

/// Outcome of [`RelationalStore::insert_mapping_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingInsert {
    /// The pair was stored.
    Inserted,
    /// The long id is already mapped; the existing row is returned.
    LongExists(Mapping),
    /// The short id belongs to another long id.
    ShortTaken,
}

/// Relational store contract.
///
/// Every method runs in its own transaction. Methods named `*_if_absent`
/// enforce the table's uniqueness constraint inside that transaction, so two
/// callers racing on the same key always observe a single winner.
pub trait RelationalStore: Send + Sync + std::fmt::Debug {
    // -------------------------------------------------------------------------
    // Content units
    // -------------------------------------------------------------------------

    /// Insert a unit unless one with the same `(kind, hash)` exists.
    ///
    /// Returns the stored unit and whether this call inserted it.
    fn insert_unit_if_absent(&self, unit: ContentUnit)
    -> Result<(ContentUnit, bool), DimdirError>;

    fn unit(&self, id: UnitId) -> Result<Option<ContentUnit>, DimdirError>;

    fn unit_by_hash(
        &self,
        kind: EntityKind,
        hash: &ContentHash,
    ) -> Result<Option<ContentUnit>, DimdirError>;

    /// All units of a kind, in id order.
    fn units_of_kind(&self, kind: EntityKind) -> Result<Vec<ContentUnit>, DimdirError>;

    /// Store the inline fallback vector of a unit. Last write wins.
    fn set_inline_vector(&self, id: UnitId, vector: &[f32]) -> Result<(), DimdirError>;

    fn inline_vector(&self, id: UnitId) -> Result<Option<Vec<f32>>, DimdirError>;

    // -------------------------------------------------------------------------
    // Occurrences
    // -------------------------------------------------------------------------

    /// Insert occurrences in one transaction, ignoring exact duplicates.
    ///
    /// Returns the number of rows actually added.
    fn insert_occurrences(&self, occurrences: &[Occurrence]) -> Result<usize, DimdirError>;

    /// Occurrences inside a container, ordered by position.
    fn occurrences_in(&self, container: UnitId) -> Result<Vec<Occurrence>, DimdirError>;

    fn occurrence_at(
        &self,
        container: UnitId,
        position: u32,
    ) -> Result<Option<Occurrence>, DimdirError>;

    /// Every occurrence of a member, ordered by container then position.
    fn occurrences_of(&self, member: UnitId) -> Result<Vec<Occurrence>, DimdirError>;

    // -------------------------------------------------------------------------
    // Address registry
    // -------------------------------------------------------------------------

    fn address(&self, addr: &str) -> Result<Option<AddressRecord>, DimdirError>;

    /// Insert or merge an address row with COALESCE semantics: non-null
    /// fields of `record` overwrite, null fields never blank existing values.
    ///
    /// Returns the row as stored.
    fn upsert_address(&self, record: AddressRecord) -> Result<AddressRecord, DimdirError>;

    /// Registered addresses whose target is `target`, sorted.
    fn addresses_for(&self, target: UnitId) -> Result<Vec<String>, DimdirError>;

    /// Upsert one attribute on `(addr, key)`. Last write wins.
    fn set_attribute(&self, addr: &str, key: &str, value: &str) -> Result<(), DimdirError>;

    fn attributes(&self, addr: &str) -> Result<BTreeMap<String, String>, DimdirError>;

    // -------------------------------------------------------------------------
    // Relations
    // -------------------------------------------------------------------------

    /// Insert a relation triple. Returns `false` if it already existed.
    fn upsert_relation(&self, relation: &Relation) -> Result<bool, DimdirError>;

    /// Remove a relation triple. Returns `false` if it was absent.
    fn delete_relation(&self, relation: &Relation) -> Result<bool, DimdirError>;

    /// Outgoing relations of `source`, optionally restricted to one type.
    fn relations_from(
        &self,
        source: UnitId,
        relation_type: Option<&str>,
    ) -> Result<Vec<Relation>, DimdirError>;

    /// Total number of relation triples.
    fn relation_count(&self) -> Result<usize, DimdirError>;

    // -------------------------------------------------------------------------
    // Mappings
    // -------------------------------------------------------------------------

    fn insert_mapping_if_absent(&self, mapping: &Mapping) -> Result<MappingInsert, DimdirError>;

    fn mapping_by_long(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError>;

    fn mapping_by_short(&self, short_id: &str) -> Result<Option<Mapping>, DimdirError>;

    /// All mappings, ordered by long id.
    fn mappings(&self) -> Result<Vec<Mapping>, DimdirError>;

    /// Remove a mapping by long id, returning the removed row.
    fn delete_mapping(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError>;

    // -------------------------------------------------------------------------
    // Document metadata
    // -------------------------------------------------------------------------

    /// Merge `meta` into the document's metadata row and return the result.
    fn upsert_document(&self, id: UnitId, meta: DocumentMeta)
    -> Result<DocumentMeta, DimdirError>;

    fn document(&self, id: UnitId) -> Result<Option<DocumentMeta>, DimdirError>;
}

/// Merge an incoming address row into an existing one (COALESCE).
pub(crate) fn coalesce_address(existing: Option<AddressRecord>, incoming: AddressRecord) -> AddressRecord {
    match existing {
        None => incoming,
        Some(current) => AddressRecord {
            addr: current.addr,
            target: incoming.target.or(current.target),
            kind: incoming.kind.or(current.kind),
            parent: incoming.parent.or(current.parent),
        },
    }
}

/// Storage key for the `(kind, hash)` uniqueness index.
pub(crate) fn hash_key(kind: EntityKind, hash: &ContentHash) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[0] = kind.tag();
    key[1..].copy_from_slice(hash.as_bytes());
    key
}
