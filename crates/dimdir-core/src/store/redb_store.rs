//! # redb-backed Relational Store
//!
//! A disk-backed relational store using the redb embedded database.
//!
//! Every trait method opens exactly one redb transaction. redb serializes
//! write transactions, so the "check then insert" sequences below are atomic
//! and the `(kind, hash)`, `addr` and `short_id` uniqueness constraints hold
//! across threads sharing one handle.
//!
//! ## Table layout
//!
//! Rows are postcard-encoded. Secondary indexes use composite keys so that a
//! range scan returns all entries for one owner in key order.

use super::{MappingInsert, RelationalStore, coalesce_address, hash_key};
use crate::types::{
    AddressRecord, ContentHash, ContentUnit, DimdirError, DocumentMeta, EntityKind, Mapping,
    Occurrence, Relation, UnitId, storage,
};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Units: UnitId -> postcard ContentUnit
const UNITS: TableDefinition<u128, &[u8]> = TableDefinition::new("units");

/// Dedup index: kind tag || hash -> UnitId
const UNIT_HASHES: TableDefinition<&[u8], u128> = TableDefinition::new("unit_hashes");

/// Inline fallback vectors: UnitId -> postcard Vec<f32>
const VECTORS: TableDefinition<u128, &[u8]> = TableDefinition::new("vectors");

/// Occurrences: (container, position) -> member
const OCCURRENCES: TableDefinition<(u128, u32), u128> = TableDefinition::new("occurrences");

/// Reverse occurrence index: (member, container, position) -> marker
const MEMBER_INDEX: TableDefinition<(u128, u128, u32), u8> = TableDefinition::new("member_index");

/// Address registry: addr -> postcard AddressRecord
const ADDRESSES: TableDefinition<&str, &[u8]> = TableDefinition::new("addresses");

/// Reverse address index: target UnitId -> postcard BTreeSet<addr>
const TARGET_INDEX: TableDefinition<u128, &[u8]> = TableDefinition::new("target_index");

/// Address attributes: addr -> postcard BTreeMap<key, value>
const ATTRIBUTES: TableDefinition<&str, &[u8]> = TableDefinition::new("attributes");

/// Relations: source UnitId -> postcard BTreeSet<(type, target)>
const RELATIONS: TableDefinition<u128, &[u8]> = TableDefinition::new("relations");

/// Mappings: long id -> postcard Mapping
const MAPPINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("mappings");

/// Short id uniqueness index: short id -> long id
const SHORT_INDEX: TableDefinition<&str, &str> = TableDefinition::new("short_index");

/// Document metadata: UnitId -> postcard DocumentMeta
const DOCUMENTS: TableDefinition<u128, &[u8]> = TableDefinition::new("documents");

type RelationSet = BTreeSet<(String, UnitId)>;

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, DimdirError> {
    postcard::to_allocvec(value).map_err(storage)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DimdirError> {
    postcard::from_bytes(bytes).map_err(storage)
}

/// A disk-backed relational store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DimdirError> {
        let db = Database::create(path.as_ref()).map_err(storage)?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(storage)?;
        let _ = write_txn.open_table(UNITS).map_err(storage)?;
        let _ = write_txn.open_table(UNIT_HASHES).map_err(storage)?;
        let _ = write_txn.open_table(VECTORS).map_err(storage)?;
        let _ = write_txn.open_table(OCCURRENCES).map_err(storage)?;
        let _ = write_txn.open_table(MEMBER_INDEX).map_err(storage)?;
        let _ = write_txn.open_table(ADDRESSES).map_err(storage)?;
        let _ = write_txn.open_table(TARGET_INDEX).map_err(storage)?;
        let _ = write_txn.open_table(ATTRIBUTES).map_err(storage)?;
        let _ = write_txn.open_table(RELATIONS).map_err(storage)?;
        let _ = write_txn.open_table(MAPPINGS).map_err(storage)?;
        let _ = write_txn.open_table(SHORT_INDEX).map_err(storage)?;
        let _ = write_txn.open_table(DOCUMENTS).map_err(storage)?;
        write_txn.commit().map_err(storage)?;

        Ok(Self { db })
    }

    fn read<T>(
        &self,
        op: impl FnOnce(&ReadTransaction) -> Result<T, DimdirError>,
    ) -> Result<T, DimdirError> {
        let txn = self.db.begin_read().map_err(storage)?;
        op(&txn)
    }

    /// Run `op` in a write transaction, committing only if it succeeds.
    fn write<T>(
        &self,
        op: impl FnOnce(&WriteTransaction) -> Result<T, DimdirError>,
    ) -> Result<T, DimdirError> {
        let txn = self.db.begin_write().map_err(storage)?;
        let out = op(&txn)?;
        txn.commit().map_err(storage)?;
        Ok(out)
    }

    fn read_unit(txn: &ReadTransaction, id: u128) -> Result<Option<ContentUnit>, DimdirError> {
        let table = txn.open_table(UNITS).map_err(storage)?;
        let bytes = table.get(id).map_err(storage)?.map(|g| g.value().to_vec());
        bytes.map(|b| decode(&b)).transpose()
    }
}

impl RelationalStore for RedbStore {
    fn insert_unit_if_absent(
        &self,
        unit: ContentUnit,
    ) -> Result<(ContentUnit, bool), DimdirError> {
        let key = hash_key(unit.kind, &unit.hash);
        self.write(|txn| {
            let mut hashes = txn.open_table(UNIT_HASHES).map_err(storage)?;
            let mut units = txn.open_table(UNITS).map_err(storage)?;

            let existing = hashes
                .get(key.as_slice())
                .map_err(storage)?
                .map(|g| g.value());
            if let Some(winner) = existing {
                let bytes = units.get(winner).map_err(storage)?.map(|g| g.value().to_vec());
                if let Some(bytes) = bytes {
                    return Ok((decode(&bytes)?, false));
                }
            }

            let bytes = encode(&unit)?;
            units
                .insert(unit.id.as_u128(), bytes.as_slice())
                .map_err(storage)?;
            hashes
                .insert(key.as_slice(), unit.id.as_u128())
                .map_err(storage)?;
            Ok((unit, true))
        })
    }

    fn unit(&self, id: UnitId) -> Result<Option<ContentUnit>, DimdirError> {
        self.read(|txn| Self::read_unit(txn, id.as_u128()))
    }

    fn unit_by_hash(
        &self,
        kind: EntityKind,
        hash: &ContentHash,
    ) -> Result<Option<ContentUnit>, DimdirError> {
        let key = hash_key(kind, hash);
        self.read(|txn| {
            let hashes = txn.open_table(UNIT_HASHES).map_err(storage)?;
            let id = hashes
                .get(key.as_slice())
                .map_err(storage)?
                .map(|g| g.value());
            match id {
                Some(id) => Self::read_unit(txn, id),
                None => Ok(None),
            }
        })
    }

    fn units_of_kind(&self, kind: EntityKind) -> Result<Vec<ContentUnit>, DimdirError> {
        self.read(|txn| {
            let table = txn.open_table(UNITS).map_err(storage)?;
            let mut out = Vec::new();
            for entry in table.iter().map_err(storage)? {
                let (_, value) = entry.map_err(storage)?;
                let unit: ContentUnit = decode(value.value())?;
                if unit.kind == kind {
                    out.push(unit);
                }
            }
            Ok(out)
        })
    }

    fn set_inline_vector(&self, id: UnitId, vector: &[f32]) -> Result<(), DimdirError> {
        let bytes = encode(&vector)?;
        self.write(|txn| {
            let units = txn.open_table(UNITS).map_err(storage)?;
            if units.get(id.as_u128()).map_err(storage)?.is_none() {
                return Err(DimdirError::UnknownIdentifier(id.to_string()));
            }
            let mut table = txn.open_table(VECTORS).map_err(storage)?;
            table
                .insert(id.as_u128(), bytes.as_slice())
                .map_err(storage)?;
            Ok(())
        })
    }

    fn inline_vector(&self, id: UnitId) -> Result<Option<Vec<f32>>, DimdirError> {
        self.read(|txn| {
            let table = txn.open_table(VECTORS).map_err(storage)?;
            let bytes = table
                .get(id.as_u128())
                .map_err(storage)?
                .map(|g| g.value().to_vec());
            bytes.map(|b| decode(&b)).transpose()
        })
    }

    fn insert_occurrences(&self, occurrences: &[Occurrence]) -> Result<usize, DimdirError> {
        if occurrences.is_empty() {
            return Ok(0);
        }
        self.write(|txn| {
            let mut table = txn.open_table(OCCURRENCES).map_err(storage)?;
            let mut index = txn.open_table(MEMBER_INDEX).map_err(storage)?;
            let mut added = 0;
            for occ in occurrences {
                let key = (occ.container.as_u128(), occ.position);
                if table.get(key).map_err(storage)?.is_some() {
                    continue;
                }
                table.insert(key, occ.member.as_u128()).map_err(storage)?;
                index
                    .insert(
                        (occ.member.as_u128(), occ.container.as_u128(), occ.position),
                        0u8,
                    )
                    .map_err(storage)?;
                added += 1;
            }
            Ok(added)
        })
    }

    fn occurrences_in(&self, container: UnitId) -> Result<Vec<Occurrence>, DimdirError> {
        let c = container.as_u128();
        self.read(|txn| {
            let table = txn.open_table(OCCURRENCES).map_err(storage)?;
            let mut out = Vec::new();
            for entry in table.range((c, 0u32)..=(c, u32::MAX)).map_err(storage)? {
                let (key, value) = entry.map_err(storage)?;
                let (_, position) = key.value();
                out.push(Occurrence::new(
                    container,
                    UnitId::from_u128(value.value()),
                    position,
                ));
            }
            Ok(out)
        })
    }

    fn occurrence_at(
        &self,
        container: UnitId,
        position: u32,
    ) -> Result<Option<Occurrence>, DimdirError> {
        self.read(|txn| {
            let table = txn.open_table(OCCURRENCES).map_err(storage)?;
            Ok(table
                .get((container.as_u128(), position))
                .map_err(storage)?
                .map(|g| Occurrence::new(container, UnitId::from_u128(g.value()), position)))
        })
    }

    fn occurrences_of(&self, member: UnitId) -> Result<Vec<Occurrence>, DimdirError> {
        let m = member.as_u128();
        self.read(|txn| {
            let table = txn.open_table(MEMBER_INDEX).map_err(storage)?;
            let mut out = Vec::new();
            for entry in table
                .range((m, 0u128, 0u32)..=(m, u128::MAX, u32::MAX))
                .map_err(storage)?
            {
                let (key, _) = entry.map_err(storage)?;
                let (_, container, position) = key.value();
                out.push(Occurrence::new(
                    UnitId::from_u128(container),
                    member,
                    position,
                ));
            }
            Ok(out)
        })
    }

    fn address(&self, addr: &str) -> Result<Option<AddressRecord>, DimdirError> {
        self.read(|txn| {
            let table = txn.open_table(ADDRESSES).map_err(storage)?;
            let bytes = table.get(addr).map_err(storage)?.map(|g| g.value().to_vec());
            bytes.map(|b| decode(&b)).transpose()
        })
    }

    fn upsert_address(&self, record: AddressRecord) -> Result<AddressRecord, DimdirError> {
        self.write(|txn| {
            let mut table = txn.open_table(ADDRESSES).map_err(storage)?;
            let mut index = txn.open_table(TARGET_INDEX).map_err(storage)?;

            let existing_bytes = table
                .get(record.addr.as_str())
                .map_err(storage)?
                .map(|g| g.value().to_vec());
            let existing: Option<AddressRecord> =
                existing_bytes.map(|b| decode(&b)).transpose()?;
            let previous_target = existing.as_ref().and_then(|r| r.target);
            let merged = coalesce_address(existing, record);

            let bytes = encode(&merged)?;
            table
                .insert(merged.addr.as_str(), bytes.as_slice())
                .map_err(storage)?;

            let mut reindex = |target: UnitId, add: bool| -> Result<(), DimdirError> {
                let current = index
                    .get(target.as_u128())
                    .map_err(storage)?
                    .map(|g| g.value().to_vec());
                let mut set: BTreeSet<String> =
                    current.map(|b| decode(&b)).transpose()?.unwrap_or_default();
                if add {
                    set.insert(merged.addr.clone());
                } else {
                    set.remove(&merged.addr);
                }
                let bytes = encode(&set)?;
                index
                    .insert(target.as_u128(), bytes.as_slice())
                    .map_err(storage)?;
                Ok(())
            };
            if let Some(old) = previous_target.filter(|old| Some(*old) != merged.target) {
                reindex(old, false)?;
            }
            if let Some(target) = merged.target {
                reindex(target, true)?;
            }
            Ok(merged)
        })
    }

    fn addresses_for(&self, target: UnitId) -> Result<Vec<String>, DimdirError> {
        self.read(|txn| {
            let index = txn.open_table(TARGET_INDEX).map_err(storage)?;
            let bytes = index
                .get(target.as_u128())
                .map_err(storage)?
                .map(|g| g.value().to_vec());
            let set: BTreeSet<String> = bytes.map(|b| decode(&b)).transpose()?.unwrap_or_default();
            Ok(set.into_iter().collect())
        })
    }

    fn set_attribute(&self, addr: &str, key: &str, value: &str) -> Result<(), DimdirError> {
        self.write(|txn| {
            let mut table = txn.open_table(ATTRIBUTES).map_err(storage)?;
            let current = table.get(addr).map_err(storage)?.map(|g| g.value().to_vec());
            let mut attrs: BTreeMap<String, String> =
                current.map(|b| decode(&b)).transpose()?.unwrap_or_default();
            attrs.insert(key.to_string(), value.to_string());
            let bytes = encode(&attrs)?;
            table.insert(addr, bytes.as_slice()).map_err(storage)?;
            Ok(())
        })
    }

    fn attributes(&self, addr: &str) -> Result<BTreeMap<String, String>, DimdirError> {
        self.read(|txn| {
            let table = txn.open_table(ATTRIBUTES).map_err(storage)?;
            let bytes = table.get(addr).map_err(storage)?.map(|g| g.value().to_vec());
            Ok(bytes.map(|b| decode(&b)).transpose()?.unwrap_or_default())
        })
    }

    fn upsert_relation(&self, relation: &Relation) -> Result<bool, DimdirError> {
        self.write(|txn| {
            let mut table = txn.open_table(RELATIONS).map_err(storage)?;
            let key = relation.source.as_u128();
            let current = table.get(key).map_err(storage)?.map(|g| g.value().to_vec());
            let mut set: RelationSet = current.map(|b| decode(&b)).transpose()?.unwrap_or_default();
            if !set.insert((relation.relation_type.clone(), relation.target)) {
                return Ok(false);
            }
            let bytes = encode(&set)?;
            table.insert(key, bytes.as_slice()).map_err(storage)?;
            Ok(true)
        })
    }

    fn delete_relation(&self, relation: &Relation) -> Result<bool, DimdirError> {
        self.write(|txn| {
            let mut table = txn.open_table(RELATIONS).map_err(storage)?;
            let key = relation.source.as_u128();
            let current = table.get(key).map_err(storage)?.map(|g| g.value().to_vec());
            let mut set: RelationSet = current.map(|b| decode(&b)).transpose()?.unwrap_or_default();
            if !set.remove(&(relation.relation_type.clone(), relation.target)) {
                return Ok(false);
            }
            if set.is_empty() {
                table.remove(key).map_err(storage)?;
            } else {
                let bytes = encode(&set)?;
                table.insert(key, bytes.as_slice()).map_err(storage)?;
            }
            Ok(true)
        })
    }

    fn relations_from(
        &self,
        source: UnitId,
        relation_type: Option<&str>,
    ) -> Result<Vec<Relation>, DimdirError> {
        self.read(|txn| {
            let table = txn.open_table(RELATIONS).map_err(storage)?;
            let bytes = table
                .get(source.as_u128())
                .map_err(storage)?
                .map(|g| g.value().to_vec());
            let set: RelationSet = bytes.map(|b| decode(&b)).transpose()?.unwrap_or_default();
            Ok(set
                .into_iter()
                .filter(|(t, _)| relation_type.is_none_or(|want| want == t))
                .map(|(t, target)| Relation::new(source, target, t))
                .collect())
        })
    }

    fn relation_count(&self) -> Result<usize, DimdirError> {
        self.read(|txn| {
            let table = txn.open_table(RELATIONS).map_err(storage)?;
            let mut total = 0;
            for entry in table.iter().map_err(storage)? {
                let (_, value) = entry.map_err(storage)?;
                let set: RelationSet = decode(value.value())?;
                total += set.len();
            }
            Ok(total)
        })
    }

    fn insert_mapping_if_absent(&self, mapping: &Mapping) -> Result<MappingInsert, DimdirError> {
        self.write(|txn| {
            let mut table = txn.open_table(MAPPINGS).map_err(storage)?;
            let mut shorts = txn.open_table(SHORT_INDEX).map_err(storage)?;

            let existing = table
                .get(mapping.long_id.as_str())
                .map_err(storage)?
                .map(|g| g.value().to_vec());
            if let Some(bytes) = existing {
                return Ok(MappingInsert::LongExists(decode(&bytes)?));
            }
            if shorts
                .get(mapping.short_id.as_str())
                .map_err(storage)?
                .is_some()
            {
                return Ok(MappingInsert::ShortTaken);
            }

            let bytes = encode(mapping)?;
            table
                .insert(mapping.long_id.as_str(), bytes.as_slice())
                .map_err(storage)?;
            shorts
                .insert(mapping.short_id.as_str(), mapping.long_id.as_str())
                .map_err(storage)?;
            Ok(MappingInsert::Inserted)
        })
    }

    fn mapping_by_long(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError> {
        self.read(|txn| {
            let table = txn.open_table(MAPPINGS).map_err(storage)?;
            let bytes = table.get(long_id).map_err(storage)?.map(|g| g.value().to_vec());
            bytes.map(|b| decode(&b)).transpose()
        })
    }

    fn mapping_by_short(&self, short_id: &str) -> Result<Option<Mapping>, DimdirError> {
        let long = self.read(|txn| {
            let shorts = txn.open_table(SHORT_INDEX).map_err(storage)?;
            Ok(shorts
                .get(short_id)
                .map_err(storage)?
                .map(|g| g.value().to_string()))
        })?;
        match long {
            Some(long) => self.mapping_by_long(&long),
            None => Ok(None),
        }
    }

    fn mappings(&self) -> Result<Vec<Mapping>, DimdirError> {
        self.read(|txn| {
            let table = txn.open_table(MAPPINGS).map_err(storage)?;
            let mut out = Vec::with_capacity(table.len().map_err(storage)? as usize);
            for entry in table.iter().map_err(storage)? {
                let (_, value) = entry.map_err(storage)?;
                out.push(decode(value.value())?);
            }
            Ok(out)
        })
    }

    fn delete_mapping(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError> {
        self.write(|txn| {
            let mut table = txn.open_table(MAPPINGS).map_err(storage)?;
            let mut shorts = txn.open_table(SHORT_INDEX).map_err(storage)?;
            let removed = table
                .remove(long_id)
                .map_err(storage)?
                .map(|g| g.value().to_vec());
            let Some(bytes) = removed else {
                return Ok(None);
            };
            let mapping: Mapping = decode(&bytes)?;
            shorts
                .remove(mapping.short_id.as_str())
                .map_err(storage)?;
            Ok(Some(mapping))
        })
    }

    fn upsert_document(
        &self,
        id: UnitId,
        meta: DocumentMeta,
    ) -> Result<DocumentMeta, DimdirError> {
        self.write(|txn| {
            let mut table = txn.open_table(DOCUMENTS).map_err(storage)?;
            let current = table
                .get(id.as_u128())
                .map_err(storage)?
                .map(|g| g.value().to_vec());
            let mut row: DocumentMeta = current.map(|b| decode(&b)).transpose()?.unwrap_or_default();
            row.merge(meta);
            let bytes = encode(&row)?;
            table
                .insert(id.as_u128(), bytes.as_slice())
                .map_err(storage)?;
            Ok(row)
        })
    }

    fn document(&self, id: UnitId) -> Result<Option<DocumentMeta>, DimdirError> {
        self.read(|txn| {
            let table = txn.open_table(DOCUMENTS).map_err(storage)?;
            let bytes = table
                .get(id.as_u128())
                .map_err(storage)?
                .map(|g| g.value().to_vec());
            bytes.map(|b| decode(&b)).transpose()
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
