//! Fault-injecting relational store for unit tests.
//!
//! Wraps a [`MemoryStore`] and can be switched to fail token inserts or to
//! miss every hash lookup, the way a concurrent writer would make it look.

use super::{MappingInsert, MemoryStore, RelationalStore};
use crate::types::{
    AddressRecord, ContentHash, ContentUnit, DimdirError, DocumentMeta, EntityKind, Mapping,
    Occurrence, Relation, UnitId,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub(crate) struct FaultyStore {
    pub(crate) inner: MemoryStore,
    /// Reject token inserts with `StorageUnavailable`.
    fail_tokens: AtomicBool,
    /// Make `unit_by_hash` report a miss.
    blind_lookups: AtomicBool,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_fail_tokens(&self, on: bool) {
        self.fail_tokens.store(on, Ordering::SeqCst);
    }

    pub(crate) fn set_blind_lookups(&self, on: bool) {
        self.blind_lookups.store(on, Ordering::SeqCst);
    }
}

impl RelationalStore for FaultyStore {
    fn insert_unit_if_absent(
        &self,
        unit: ContentUnit,
    ) -> Result<(ContentUnit, bool), DimdirError> {
        if unit.kind == EntityKind::Token && self.fail_tokens.load(Ordering::SeqCst) {
            return Err(DimdirError::StorageUnavailable("token table offline".into()));
        }
        self.inner.insert_unit_if_absent(unit)
    }

    fn unit(&self, id: UnitId) -> Result<Option<ContentUnit>, DimdirError> {
        self.inner.unit(id)
    }

    fn unit_by_hash(
        &self,
        kind: EntityKind,
        hash: &ContentHash,
    ) -> Result<Option<ContentUnit>, DimdirError> {
        if self.blind_lookups.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.unit_by_hash(kind, hash)
    }

    fn units_of_kind(&self, kind: EntityKind) -> Result<Vec<ContentUnit>, DimdirError> {
        self.inner.units_of_kind(kind)
    }

    fn set_inline_vector(&self, id: UnitId, vector: &[f32]) -> Result<(), DimdirError> {
        self.inner.set_inline_vector(id, vector)
    }

    fn inline_vector(&self, id: UnitId) -> Result<Option<Vec<f32>>, DimdirError> {
        self.inner.inline_vector(id)
    }

    fn insert_occurrences(&self, occurrences: &[Occurrence]) -> Result<usize, DimdirError> {
        self.inner.insert_occurrences(occurrences)
    }

    fn occurrences_in(&self, container: UnitId) -> Result<Vec<Occurrence>, DimdirError> {
        self.inner.occurrences_in(container)
    }

    fn occurrence_at(
        &self,
        container: UnitId,
        position: u32,
    ) -> Result<Option<Occurrence>, DimdirError> {
        self.inner.occurrence_at(container, position)
    }

    fn occurrences_of(&self, member: UnitId) -> Result<Vec<Occurrence>, DimdirError> {
        self.inner.occurrences_of(member)
    }

    fn address(&self, addr: &str) -> Result<Option<AddressRecord>, DimdirError> {
        self.inner.address(addr)
    }

    fn upsert_address(&self, record: AddressRecord) -> Result<AddressRecord, DimdirError> {
        self.inner.upsert_address(record)
    }

    fn addresses_for(&self, target: UnitId) -> Result<Vec<String>, DimdirError> {
        self.inner.addresses_for(target)
    }

    fn set_attribute(&self, addr: &str, key: &str, value: &str) -> Result<(), DimdirError> {
        self.inner.set_attribute(addr, key, value)
    }

    fn attributes(&self, addr: &str) -> Result<BTreeMap<String, String>, DimdirError> {
        self.inner.attributes(addr)
    }

    fn upsert_relation(&self, relation: &Relation) -> Result<bool, DimdirError> {
        self.inner.upsert_relation(relation)
    }

    fn delete_relation(&self, relation: &Relation) -> Result<bool, DimdirError> {
        self.inner.delete_relation(relation)
    }

    fn relations_from(
        &self,
        source: UnitId,
        relation_type: Option<&str>,
    ) -> Result<Vec<Relation>, DimdirError> {
        self.inner.relations_from(source, relation_type)
    }

    fn relation_count(&self) -> Result<usize, DimdirError> {
        self.inner.relation_count()
    }

    fn insert_mapping_if_absent(&self, mapping: &Mapping) -> Result<MappingInsert, DimdirError> {
        self.inner.insert_mapping_if_absent(mapping)
    }

    fn mapping_by_long(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError> {
        self.inner.mapping_by_long(long_id)
    }

    fn mapping_by_short(&self, short_id: &str) -> Result<Option<Mapping>, DimdirError> {
        self.inner.mapping_by_short(short_id)
    }

    fn mappings(&self) -> Result<Vec<Mapping>, DimdirError> {
        self.inner.mappings()
    }

    fn delete_mapping(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError> {
        self.inner.delete_mapping(long_id)
    }

    fn upsert_document(
        &self,
        id: UnitId,
        meta: DocumentMeta,
    ) -> Result<DocumentMeta, DimdirError> {
        self.inner.upsert_document(id, meta)
    }

    fn document(&self, id: UnitId) -> Result<Option<DocumentMeta>, DimdirError> {
        self.inner.document(id)
    }
}
