//! # Mapping Registry
//!
//! Operator-facing aliases for document collections: a human long id mapped
//! one-to-one onto a short id.
//!
//! The relational store holds the authoritative pairs. Two alias tables are
//! mirrored into the blob store as `long_id=short_id` lines:
//! - `collections/<long_id>` key `.LStable`: the collection's own pair
//! - `collections` key `.GlobalLStable`: every pair
//!
//! Each change rewrites whole tables from the relational pairs. Rewrites are
//! serialized so concurrent changes never drop each other's entries.

use crate::coordinator::Coordinator;
use crate::primitives::{
    COLLECTION_ALIAS_KEY, COLLECTIONS_NAMESPACE, GLOBAL_ALIAS_KEY, MAX_MAPPING_ID_LENGTH,
    MAX_SHORT_ID_ATTEMPTS, SHORT_ID_LENGTH,
};
use crate::store::{MappingInsert, Payload};
use crate::types::{DimdirError, Mapping, UnitId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of [`MappingRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingOutcome {
    pub mapping: Mapping,
    /// `false` when the long id was already mapped.
    pub created: bool,
}

/// Alias table contents, keyed by long id.
pub type AliasTable = BTreeMap<String, String>;

/// Parse `long=short` lines. Later lines win.
#[must_use]
pub fn parse_alias_table(text: &str) -> AliasTable {
    text.lines()
        .filter_map(|line| line.trim().split_once('='))
        .filter(|(long, short)| !long.is_empty() && !short.is_empty())
        .map(|(long, short)| (long.to_string(), short.to_string()))
        .collect()
}

#[must_use]
pub fn render_alias_table(table: &AliasTable) -> String {
    table
        .iter()
        .map(|(long, short)| format!("{long}={short}\n"))
        .collect()
}

fn validate_id(kind: &str, id: &str) -> Result<(), DimdirError> {
    let bad = id.is_empty()
        || id.len() > MAX_MAPPING_ID_LENGTH
        || id == "."
        || id == ".."
        || (kind == "long" && id == GLOBAL_ALIAS_KEY)
        || id
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '=' | '\n' | '\r' | '\0'));
    if bad {
        return Err(DimdirError::InvalidContent(format!("invalid {kind} id '{id}'")));
    }
    Ok(())
}

fn generate_short_id() -> String {
    let mut id = UnitId::mint().to_string();
    id.truncate(SHORT_ID_LENGTH);
    id
}

#[derive(Debug, Clone)]
pub struct MappingRegistry {
    coordinator: Coordinator,
    /// Held across every alias table rewrite.
    alias_lock: Arc<Mutex<()>>,
}

impl MappingRegistry {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator,
            alias_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Map `long_id` to `short_id`, or to a generated short id.
    ///
    /// An already mapped long id is returned unchanged. A taken short id is
    /// replaced by a generated one; `DuplicateMapping` is returned once the
    /// attempts run out.
    pub fn register(
        &self,
        long_id: &str,
        short_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<MappingOutcome, DimdirError> {
        validate_id("long", long_id)?;
        if let Some(short) = short_id {
            validate_id("short", short)?;
        }
        let store = self.coordinator.relational();
        if let Some(existing) = store.mapping_by_long(long_id)? {
            return Ok(MappingOutcome {
                mapping: existing,
                created: false,
            });
        }

        let mut candidate = short_id.map_or_else(generate_short_id, str::to_string);
        for _ in 0..MAX_SHORT_ID_ATTEMPTS {
            let mapping = Mapping {
                long_id: long_id.to_string(),
                short_id: candidate.clone(),
                description: description.map(str::to_string),
            };
            match store.insert_mapping_if_absent(&mapping)? {
                MappingInsert::Inserted => {
                    self.write_aliases(long_id);
                    debug!(long_id, short_id = %mapping.short_id, "mapping registered");
                    return Ok(MappingOutcome {
                        mapping,
                        created: true,
                    });
                }
                MappingInsert::LongExists(existing) => {
                    return Ok(MappingOutcome {
                        mapping: existing,
                        created: false,
                    });
                }
                MappingInsert::ShortTaken => {
                    debug!(long_id, short_id = %candidate, "short id taken, regenerating");
                    candidate = generate_short_id();
                }
            }
        }
        Err(DimdirError::DuplicateMapping(long_id.to_string()))
    }

    pub fn get_by_long(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError> {
        self.coordinator.relational().mapping_by_long(long_id)
    }

    pub fn get_by_short(&self, short_id: &str) -> Result<Option<Mapping>, DimdirError> {
        self.coordinator.relational().mapping_by_short(short_id)
    }

    pub fn list(&self) -> Result<Vec<Mapping>, DimdirError> {
        self.coordinator.relational().mappings()
    }

    /// Remove a mapping and its alias file entries.
    pub fn remove(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError> {
        let removed = self.coordinator.relational().delete_mapping(long_id)?;
        if removed.is_some() {
            self.write_aliases(long_id);
        }
        Ok(removed)
    }

    /// Contents of the aggregate alias table.
    pub fn global_aliases(&self) -> Result<AliasTable, DimdirError> {
        self.read_table(COLLECTIONS_NAMESPACE, GLOBAL_ALIAS_KEY)
    }

    /// Contents of one collection's alias table.
    pub fn collection_aliases(&self, long_id: &str) -> Result<AliasTable, DimdirError> {
        validate_id("long", long_id)?;
        self.read_table(&collection_namespace(long_id), COLLECTION_ALIAS_KEY)
    }

    /// Rewrite both alias tables from the relational pairs.
    pub fn rebuild_aliases(&self) -> Result<usize, DimdirError> {
        let _guard = self.alias_lock.lock();
        let mappings = self.list()?;
        for mapping in &mappings {
            self.write_collection_table(&mapping.long_id, Some(mapping))?;
        }
        self.write_global_table(&mappings)?;
        Ok(mappings.len())
    }

    fn read_table(&self, namespace: &str, key: &str) -> Result<AliasTable, DimdirError> {
        Ok(self
            .coordinator
            .blobs()
            .get(namespace, key)?
            .and_then(Payload::into_text)
            .map(|text| parse_alias_table(&text))
            .unwrap_or_default())
    }

    fn write_collection_table(
        &self,
        long_id: &str,
        mapping: Option<&Mapping>,
    ) -> Result<(), DimdirError> {
        let namespace = collection_namespace(long_id);
        let blobs = self.coordinator.blobs();
        match mapping {
            Some(mapping) => {
                let table =
                    AliasTable::from([(mapping.long_id.clone(), mapping.short_id.clone())]);
                blobs.put(
                    &namespace,
                    COLLECTION_ALIAS_KEY,
                    Payload::text(&render_alias_table(&table)),
                )
            }
            None => blobs.delete(&namespace, COLLECTION_ALIAS_KEY).map(|_| ()),
        }
    }

    fn write_global_table(&self, mappings: &[Mapping]) -> Result<(), DimdirError> {
        let table: AliasTable = mappings
            .iter()
            .map(|m| (m.long_id.clone(), m.short_id.clone()))
            .collect();
        self.coordinator.blobs().put(
            COLLECTIONS_NAMESPACE,
            GLOBAL_ALIAS_KEY,
            Payload::text(&render_alias_table(&table)),
        )
    }

    /// Mirror the current state of `long_id` into both alias tables.
    /// Failures leave the tables stale and are logged; the relational pair
    /// stays authoritative.
    fn write_aliases(&self, long_id: &str) {
        let _guard = self.alias_lock.lock();
        let store = self.coordinator.relational();
        let collection = store
            .mapping_by_long(long_id)
            .and_then(|mapping| self.write_collection_table(long_id, mapping.as_ref()));
        if let Err(e) = collection {
            warn!(long_id, error = %e, "collection alias table write failed");
        }
        let global = store
            .mappings()
            .and_then(|mappings| self.write_global_table(&mappings));
        if let Err(e) = global {
            warn!(long_id, error = %e, "global alias table write failed");
        }
    }
}

fn collection_namespace(long_id: &str) -> String {
    format!("{COLLECTIONS_NAMESPACE}/{long_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BlobStore, FsBlobStore, MemoryBlobStore, MemoryStore};
    use std::thread;

    fn registry() -> MappingRegistry {
        MappingRegistry::new(Coordinator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBlobStore::new()),
        ))
    }

    #[test]
    fn existing_long_id_keeps_its_short_id() {
        let reg = registry();
        let first = reg.register("Report", None, None).expect("register");
        let second = reg.register("Report", Some("zz99"), None).expect("register");

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.mapping.short_id, first.mapping.short_id);
        assert_eq!(first.mapping.short_id.len(), SHORT_ID_LENGTH);
    }

    #[test]
    fn taken_short_id_is_regenerated() {
        let reg = registry();
        reg.register("A", Some("abc"), None).expect("register");
        let b = reg.register("B", Some("abc"), None).expect("register");
        assert!(b.created);
        assert_ne!(b.mapping.short_id, "abc");
        assert_eq!(
            reg.get_by_short(&b.mapping.short_id).expect("get").map(|m| m.long_id),
            Some("B".to_string())
        );
    }

    #[test]
    fn alias_tables_follow_register_and_remove() {
        let reg = registry();
        let a = reg.register("Report", Some("r1"), None).expect("register");
        reg.register("Notes", Some("n1"), Some("meeting notes")).expect("register");

        assert_eq!(
            reg.collection_aliases("Report").expect("read"),
            AliasTable::from([("Report".to_string(), a.mapping.short_id.clone())])
        );
        assert_eq!(reg.global_aliases().expect("read").len(), 2);

        assert!(reg.remove("Report").expect("remove").is_some());
        assert!(reg.collection_aliases("Report").expect("read").is_empty());
        assert_eq!(
            reg.global_aliases().expect("read"),
            AliasTable::from([("Notes".to_string(), "n1".to_string())])
        );
        assert!(reg.remove("Report").expect("remove").is_none());
    }

    #[test]
    fn invalid_long_ids_are_rejected() {
        let reg = registry();
        for bad in ["", "..", "a/b", "a=b", "x\ny", GLOBAL_ALIAS_KEY] {
            assert!(matches!(
                reg.register(bad, None, None),
                Err(DimdirError::InvalidContent(_))
            ));
        }
    }

    #[test]
    fn alias_table_parsing_last_write_wins() {
        let table = parse_alias_table("A=1\nB=2\n\ngarbage\nA=3\n");
        assert_eq!(table.get("A").map(String::as_str), Some("3"));
        assert_eq!(table.len(), 2);
        assert_eq!(parse_alias_table(&render_alias_table(&table)), table);
    }

    #[test]
    fn rebuild_restores_alias_tables() {
        let reg = registry();
        reg.register("Report", Some("r1"), None).expect("register");
        reg.coordinator
            .blobs()
            .delete(COLLECTIONS_NAMESPACE, GLOBAL_ALIAS_KEY)
            .expect("delete");
        assert!(reg.global_aliases().expect("read").is_empty());

        assert_eq!(reg.rebuild_aliases().expect("rebuild"), 1);
        assert_eq!(reg.global_aliases().expect("read").len(), 1);
        assert_eq!(reg.coordinator.relational().mappings().expect("list").len(), 1);
    }

    fn register_from_threads(reg: &MappingRegistry) {
        thread::scope(|scope| {
            for t in 0..8 {
                scope.spawn(move || {
                    for i in 0..25 {
                        reg.register(&format!("C{t}_{i}"), None, None).expect("register");
                    }
                    for i in 0..5 {
                        reg.remove(&format!("C{t}_{i}")).expect("remove");
                    }
                });
            }
        });
    }

    fn assert_tables_match_pairs(reg: &MappingRegistry) {
        let pairs: AliasTable = reg
            .list()
            .expect("list")
            .into_iter()
            .map(|m| (m.long_id, m.short_id))
            .collect();
        assert_eq!(pairs.len(), 8 * 20);
        assert_eq!(reg.global_aliases().expect("read"), pairs);
        assert!(reg.collection_aliases("C3_2").expect("read").is_empty());
        assert_eq!(reg.collection_aliases("C3_7").expect("read").len(), 1);
    }

    #[test]
    fn concurrent_changes_keep_every_alias() {
        let reg = registry();
        register_from_threads(&reg);
        assert_tables_match_pairs(&reg);
    }

    #[test]
    fn concurrent_changes_keep_every_alias_on_disk() {
        let temp = tempfile::tempdir().expect("temp dir");
        let blobs: Arc<dyn BlobStore> =
            Arc::new(FsBlobStore::open(temp.path()).expect("open"));
        let reg = MappingRegistry::new(Coordinator::new(Arc::new(MemoryStore::new()), blobs));
        register_from_threads(&reg);
        assert_tables_match_pairs(&reg);
    }

    #[test]
    fn global_table_name_cannot_be_a_collection() {
        let temp = tempfile::tempdir().expect("temp dir");
        let reg = MappingRegistry::new(Coordinator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FsBlobStore::open(temp.path()).expect("open")),
        ));
        assert!(matches!(
            reg.register(GLOBAL_ALIAS_KEY, None, None),
            Err(DimdirError::InvalidContent(_))
        ));
        reg.register("Report", Some("r1"), None).expect("register");
        assert_eq!(reg.global_aliases().expect("read").len(), 1);
    }
}
