//! # In-Memory Relational Store
//!
//! BTreeMap tables behind a single `RwLock`. Each trait method takes the lock
//! once, which gives it the same per-operation atomicity as a redb
//! transaction. Used by tests and by ephemeral indexes.

use super::{MappingInsert, RelationalStore, coalesce_address};
use crate::types::{
    AddressRecord, ContentHash, ContentUnit, DimdirError, DocumentMeta, EntityKind, Mapping,
    Occurrence, Relation, UnitId,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct Tables {
    units: BTreeMap<UnitId, ContentUnit>,
    unit_hashes: BTreeMap<(EntityKind, ContentHash), UnitId>,
    vectors: BTreeMap<UnitId, Vec<f32>>,
    /// (container, position) -> member
    occurrences: BTreeMap<(UnitId, u32), UnitId>,
    /// (member, container, position)
    member_index: BTreeSet<(UnitId, UnitId, u32)>,
    addresses: BTreeMap<String, AddressRecord>,
    target_index: BTreeSet<(UnitId, String)>,
    attributes: BTreeMap<String, BTreeMap<String, String>>,
    relations: BTreeSet<(UnitId, String, UnitId)>,
    mappings: BTreeMap<String, Mapping>,
    short_index: BTreeMap<String, String>,
    documents: BTreeMap<UnitId, DocumentMeta>,
}

/// Relational store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelationalStore for MemoryStore {
    fn insert_unit_if_absent(
        &self,
        unit: ContentUnit,
    ) -> Result<(ContentUnit, bool), DimdirError> {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.unit_hashes.get(&(unit.kind, unit.hash)).copied() {
            if let Some(winner) = tables.units.get(&existing) {
                return Ok((winner.clone(), false));
            }
        }
        tables.unit_hashes.insert((unit.kind, unit.hash), unit.id);
        tables.units.insert(unit.id, unit.clone());
        Ok((unit, true))
    }

    fn unit(&self, id: UnitId) -> Result<Option<ContentUnit>, DimdirError> {
        Ok(self.tables.read().units.get(&id).cloned())
    }

    fn unit_by_hash(
        &self,
        kind: EntityKind,
        hash: &ContentHash,
    ) -> Result<Option<ContentUnit>, DimdirError> {
        let tables = self.tables.read();
        Ok(tables
            .unit_hashes
            .get(&(kind, *hash))
            .and_then(|id| tables.units.get(id))
            .cloned())
    }

    fn units_of_kind(&self, kind: EntityKind) -> Result<Vec<ContentUnit>, DimdirError> {
        Ok(self
            .tables
            .read()
            .units
            .values()
            .filter(|u| u.kind == kind)
            .cloned()
            .collect())
    }

    fn set_inline_vector(&self, id: UnitId, vector: &[f32]) -> Result<(), DimdirError> {
        let mut tables = self.tables.write();
        if !tables.units.contains_key(&id) {
            return Err(DimdirError::UnknownIdentifier(id.to_string()));
        }
        tables.vectors.insert(id, vector.to_vec());
        Ok(())
    }

    fn inline_vector(&self, id: UnitId) -> Result<Option<Vec<f32>>, DimdirError> {
        Ok(self.tables.read().vectors.get(&id).cloned())
    }

    fn insert_occurrences(&self, occurrences: &[Occurrence]) -> Result<usize, DimdirError> {
        let mut tables = self.tables.write();
        let mut added = 0;
        for occ in occurrences {
            if tables.occurrences.contains_key(&(occ.container, occ.position)) {
                continue;
            }
            tables
                .occurrences
                .insert((occ.container, occ.position), occ.member);
            tables
                .member_index
                .insert((occ.member, occ.container, occ.position));
            added += 1;
        }
        Ok(added)
    }

    fn occurrences_in(&self, container: UnitId) -> Result<Vec<Occurrence>, DimdirError> {
        Ok(self
            .tables
            .read()
            .occurrences
            .range((container, 0)..=(container, u32::MAX))
            .map(|(&(c, p), &m)| Occurrence::new(c, m, p))
            .collect())
    }

    fn occurrence_at(
        &self,
        container: UnitId,
        position: u32,
    ) -> Result<Option<Occurrence>, DimdirError> {
        Ok(self
            .tables
            .read()
            .occurrences
            .get(&(container, position))
            .map(|&m| Occurrence::new(container, m, position)))
    }

    fn occurrences_of(&self, member: UnitId) -> Result<Vec<Occurrence>, DimdirError> {
        let lo = (member, UnitId::from_u128(0), 0);
        let hi = (member, UnitId::from_u128(u128::MAX), u32::MAX);
        Ok(self
            .tables
            .read()
            .member_index
            .range(lo..=hi)
            .map(|&(m, c, p)| Occurrence::new(c, m, p))
            .collect())
    }

    fn address(&self, addr: &str) -> Result<Option<AddressRecord>, DimdirError> {
        Ok(self.tables.read().addresses.get(addr).cloned())
    }

    fn upsert_address(&self, record: AddressRecord) -> Result<AddressRecord, DimdirError> {
        let mut tables = self.tables.write();
        let existing = tables.addresses.get(&record.addr).cloned();
        let previous_target = existing.as_ref().and_then(|r| r.target);
        let merged = coalesce_address(existing, record);
        if let Some(old) = previous_target.filter(|old| Some(*old) != merged.target) {
            tables.target_index.remove(&(old, merged.addr.clone()));
        }
        if let Some(target) = merged.target {
            tables.target_index.insert((target, merged.addr.clone()));
        }
        tables.addresses.insert(merged.addr.clone(), merged.clone());
        Ok(merged)
    }

    fn addresses_for(&self, target: UnitId) -> Result<Vec<String>, DimdirError> {
        Ok(self
            .tables
            .read()
            .target_index
            .iter()
            .filter(|(t, _)| *t == target)
            .map(|(_, addr)| addr.clone())
            .collect())
    }

    fn set_attribute(&self, addr: &str, key: &str, value: &str) -> Result<(), DimdirError> {
        self.tables
            .write()
            .attributes
            .entry(addr.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn attributes(&self, addr: &str) -> Result<BTreeMap<String, String>, DimdirError> {
        Ok(self
            .tables
            .read()
            .attributes
            .get(addr)
            .cloned()
            .unwrap_or_default())
    }

    fn upsert_relation(&self, relation: &Relation) -> Result<bool, DimdirError> {
        Ok(self.tables.write().relations.insert((
            relation.source,
            relation.relation_type.clone(),
            relation.target,
        )))
    }

    fn delete_relation(&self, relation: &Relation) -> Result<bool, DimdirError> {
        Ok(self.tables.write().relations.remove(&(
            relation.source,
            relation.relation_type.clone(),
            relation.target,
        )))
    }

    fn relations_from(
        &self,
        source: UnitId,
        relation_type: Option<&str>,
    ) -> Result<Vec<Relation>, DimdirError> {
        Ok(self
            .tables
            .read()
            .relations
            .iter()
            .filter(|(s, t, _)| *s == source && relation_type.is_none_or(|want| want == t))
            .map(|(s, t, target)| Relation::new(*s, *target, t.clone()))
            .collect())
    }

    fn relation_count(&self) -> Result<usize, DimdirError> {
        Ok(self.tables.read().relations.len())
    }

    fn insert_mapping_if_absent(&self, mapping: &Mapping) -> Result<MappingInsert, DimdirError> {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.mappings.get(&mapping.long_id) {
            return Ok(MappingInsert::LongExists(existing.clone()));
        }
        if tables.short_index.contains_key(&mapping.short_id) {
            return Ok(MappingInsert::ShortTaken);
        }
        tables
            .short_index
            .insert(mapping.short_id.clone(), mapping.long_id.clone());
        tables
            .mappings
            .insert(mapping.long_id.clone(), mapping.clone());
        Ok(MappingInsert::Inserted)
    }

    fn mapping_by_long(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError> {
        Ok(self.tables.read().mappings.get(long_id).cloned())
    }

    fn mapping_by_short(&self, short_id: &str) -> Result<Option<Mapping>, DimdirError> {
        let tables = self.tables.read();
        Ok(tables
            .short_index
            .get(short_id)
            .and_then(|long| tables.mappings.get(long))
            .cloned())
    }

    fn mappings(&self) -> Result<Vec<Mapping>, DimdirError> {
        Ok(self.tables.read().mappings.values().cloned().collect())
    }

    fn delete_mapping(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError> {
        let mut tables = self.tables.write();
        let removed = tables.mappings.remove(long_id);
        if let Some(mapping) = &removed {
            tables.short_index.remove(&mapping.short_id);
        }
        Ok(removed)
    }

    fn upsert_document(
        &self,
        id: UnitId,
        meta: DocumentMeta,
    ) -> Result<DocumentMeta, DimdirError> {
        let mut tables = self.tables.write();
        let row = tables.documents.entry(id).or_default();
        row.merge(meta);
        Ok(row.clone())
    }

    fn document(&self, id: UnitId) -> Result<Option<DocumentMeta>, DimdirError> {
        Ok(self.tables.read().documents.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::normalize_text;

    fn unit(kind: EntityKind, text: &str) -> ContentUnit {
        let normalized = normalize_text(text);
        ContentUnit {
            id: UnitId::mint(),
            kind,
            hash: ContentHash::compute(kind, &normalized),
            text: Some(normalized),
        }
    }

    #[test]
    fn second_insert_returns_winner() {
        let store = MemoryStore::new();
        let first = unit(EntityKind::Sentence, "Cats are mammals.");
        let second = unit(EntityKind::Sentence, "Cats are mammals.");

        let (a, inserted_a) = store.insert_unit_if_absent(first.clone()).expect("insert");
        let (b, inserted_b) = store.insert_unit_if_absent(second).expect("insert");

        assert!(inserted_a);
        assert!(!inserted_b);
        assert_eq!(a.id, first.id);
        assert_eq!(b.id, first.id);
    }

    #[test]
    fn occurrences_are_ordered_and_deduplicated() {
        let store = MemoryStore::new();
        let doc = UnitId::mint();
        let s1 = UnitId::mint();
        let s2 = UnitId::mint();
        let rows = [Occurrence::new(doc, s2, 1), Occurrence::new(doc, s1, 0)];

        assert_eq!(store.insert_occurrences(&rows).expect("insert"), 2);
        assert_eq!(store.insert_occurrences(&rows).expect("insert"), 0);

        let ordered = store.occurrences_in(doc).expect("list");
        assert_eq!(ordered.iter().map(|o| o.position).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(store.occurrences_of(s2).expect("list"), vec![rows[0]]);
    }

    #[test]
    fn target_index_follows_retarget() {
        let store = MemoryStore::new();
        let a = UnitId::mint();
        let b = UnitId::mint();
        let rec = |target| AddressRecord {
            addr: "x".into(),
            target: Some(target),
            kind: None,
            parent: None,
        };
        store.upsert_address(rec(a)).expect("upsert");
        store.upsert_address(rec(b)).expect("upsert");

        assert!(store.addresses_for(a).expect("list").is_empty());
        assert_eq!(store.addresses_for(b).expect("list"), vec!["x".to_string()]);
    }

    #[test]
    fn mapping_uniqueness_on_both_sides() {
        let store = MemoryStore::new();
        let m = |long: &str, short: &str| Mapping {
            long_id: long.into(),
            short_id: short.into(),
            description: None,
        };
        assert_eq!(
            store.insert_mapping_if_absent(&m("Report", "aa")).expect("insert"),
            MappingInsert::Inserted
        );
        assert_eq!(
            store.insert_mapping_if_absent(&m("Report", "bb")).expect("insert"),
            MappingInsert::LongExists(m("Report", "aa"))
        );
        assert_eq!(
            store.insert_mapping_if_absent(&m("Other", "aa")).expect("insert"),
            MappingInsert::ShortTaken
        );
        assert!(store.delete_mapping("Report").expect("delete").is_some());
        assert!(store.mapping_by_short("aa").expect("get").is_none());
    }
}
