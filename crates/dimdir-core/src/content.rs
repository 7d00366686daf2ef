//! # Content Store
//!
//! Deduplicates content units. The same normalized text under the same kind
//! always maps to the same [`UnitId`].

use crate::coordinator::Coordinator;
use crate::embed::{EmbeddingError, EmbeddingProvider};
use crate::types::{ContentHash, ContentUnit, DimdirError, EntityKind, UnitId, normalize_text};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of interning one piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interned {
    pub id: UnitId,
    pub is_new: bool,
    pub hash: ContentHash,
}

/// Dedup front door for documents, sentences and tokens.
#[derive(Debug, Clone)]
pub struct ContentStore {
    coordinator: Coordinator,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ContentStore {
    pub fn new(coordinator: Coordinator, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            coordinator,
            embedder,
        }
    }

    /// Hash of `text` as it would be stored under `kind`.
    #[must_use]
    pub fn hash_of(kind: EntityKind, text: &str) -> ContentHash {
        ContentHash::compute(kind, &normalize_text(text))
    }

    /// Look up existing content without writing.
    pub fn find(&self, kind: EntityKind, text: &str) -> Result<Option<ContentUnit>, DimdirError> {
        self.coordinator
            .relational()
            .unit_by_hash(kind, &Self::hash_of(kind, text))
    }

    /// Return the id for `text` under `kind`, creating the unit if needed.
    ///
    /// Documents keep their raw text in the blob store; sentences and tokens
    /// keep the normalized text in the relational record and mirror it.
    pub fn intern(&self, kind: EntityKind, text: &str) -> Result<Interned, DimdirError> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Err(DimdirError::InvalidContent(format!(
                "empty {kind} text"
            )));
        }
        let hash = ContentHash::compute(kind, &normalized);

        let relational = self.coordinator.relational();
        if let Some(existing) = relational.unit_by_hash(kind, &hash)? {
            debug!(unit = %existing.id, kind = %kind, "dedup hit");
            return Ok(Interned {
                id: existing.id,
                is_new: false,
                hash,
            });
        }

        let payload = match kind {
            EntityKind::Document => text.to_string(),
            EntityKind::Sentence | EntityKind::Token => normalized.clone(),
        };
        let unit = ContentUnit {
            id: UnitId::mint(),
            kind,
            text: (kind != EntityKind::Document).then_some(normalized),
            hash,
        };
        let vector = match kind {
            EntityKind::Document => None,
            EntityKind::Sentence | EntityKind::Token => self.embed(unit.id, &payload),
        };

        let (stored, inserted) = self.coordinator.commit_unit(unit, &payload, vector)?;
        if !inserted {
            debug!(unit = %stored.id, kind = %kind, "lost insert race, using winner");
        }
        Ok(Interned {
            id: stored.id,
            is_new: inserted,
            hash,
        })
    }

    fn embed(&self, id: UnitId, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(text) {
            Ok(vector) => Some(vector),
            Err(EmbeddingError::Disabled) => None,
            Err(e) => {
                warn!(unit = %id, error = %e, "embedding failed, unit stored without vector");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::NoEmbeddings;
    use crate::store::faulty::FaultyStore;
    use crate::store::{MemoryBlobStore, MemoryStore, Payload, RedbStore, RelationalStore};
    use std::thread;

    #[derive(Debug)]
    struct FixedEmbedder;

    impl EmbeddingProvider for FixedEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text == "fail" {
                return Err(EmbeddingError::Failed("model offline".into()));
            }
            Ok(vec![0.25, 0.5])
        }
    }

    fn store(embedder: Arc<dyn EmbeddingProvider>) -> ContentStore {
        let coord = Coordinator::new(Arc::new(MemoryStore::new()), Arc::new(MemoryBlobStore::new()));
        ContentStore::new(coord, embedder)
    }

    #[test]
    fn intern_is_idempotent() {
        let content = store(Arc::new(NoEmbeddings));
        let first = content.intern(EntityKind::Sentence, "Cats are mammals.").expect("intern");
        let second = content
            .intern(EntityKind::Sentence, "  Cats   are mammals. ")
            .expect("intern");

        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn kinds_do_not_collide() {
        let content = store(Arc::new(NoEmbeddings));
        let s = content.intern(EntityKind::Sentence, "cats").expect("intern");
        let t = content.intern(EntityKind::Token, "cats").expect("intern");
        assert_ne!(s.id, t.id);
        assert!(t.is_new);
    }

    #[test]
    fn empty_text_is_rejected_before_any_write() {
        let content = store(Arc::new(NoEmbeddings));
        for text in ["", "   ", "\n\t"] {
            assert!(matches!(
                content.intern(EntityKind::Sentence, text),
                Err(DimdirError::InvalidContent(_))
            ));
        }
        assert!(
            content
                .coordinator
                .relational()
                .units_of_kind(EntityKind::Sentence)
                .expect("list")
                .is_empty()
        );
    }

    #[test]
    fn new_units_are_mirrored_with_vector() {
        let content = store(Arc::new(FixedEmbedder));
        let interned = content.intern(EntityKind::Token, "cats").expect("intern");
        let ns = crate::coordinator::unit_namespace(EntityKind::Token, interned.id);
        let blobs = content.coordinator.blobs();

        assert_eq!(
            blobs.get(&ns, "text").expect("get").and_then(Payload::into_text),
            Some("cats".to_string())
        );
        assert_eq!(
            content.coordinator.vector(interned.id).expect("vector"),
            Some(vec![0.25, 0.5])
        );
    }

    #[test]
    fn embedding_failure_stores_unit_without_vector() {
        let content = store(Arc::new(FixedEmbedder));
        let interned = content.intern(EntityKind::Token, "fail").expect("intern");
        assert!(interned.is_new);
        assert_eq!(content.coordinator.vector(interned.id).expect("vector"), None);
    }

    fn with_relational(relational: Arc<dyn RelationalStore>) -> ContentStore {
        let coord = Coordinator::new(relational, Arc::new(MemoryBlobStore::new()));
        ContentStore::new(coord, Arc::new(NoEmbeddings))
    }

    /// Intern one text from many threads at once and return the ids seen.
    fn intern_concurrently(content: &ContentStore, text: &str) -> Vec<Interned> {
        thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| content.intern(EntityKind::Sentence, text)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread").expect("intern"))
                .collect()
        })
    }

    fn assert_single_winner(content: &ContentStore, results: &[Interned]) {
        let first = results[0].id;
        assert!(results.iter().all(|r| r.id == first));
        assert_eq!(results.iter().filter(|r| r.is_new).count(), 1);
        assert_eq!(
            content
                .coordinator
                .relational()
                .units_of_kind(EntityKind::Sentence)
                .expect("list")
                .len(),
            1
        );
    }

    #[test]
    fn lost_race_returns_the_winner() {
        let relational = Arc::new(FaultyStore::new());
        let content = with_relational(relational.clone());
        let winner = content.intern(EntityKind::Sentence, "Owls hoot.").expect("intern");

        // The lookup misses, so the insert itself has to detect the winner
        relational.set_blind_lookups(true);
        let loser = content.intern(EntityKind::Sentence, "Owls  hoot.").expect("intern");

        assert_eq!(loser.id, winner.id);
        assert!(!loser.is_new);
        assert_eq!(
            relational
                .inner
                .units_of_kind(EntityKind::Sentence)
                .expect("list")
                .len(),
            1
        );
    }

    #[test]
    fn concurrent_interns_converge_in_memory() {
        let content = with_relational(Arc::new(MemoryStore::new()));
        let results = intern_concurrently(&content, "Bees buzz.");
        assert_single_winner(&content, &results);
    }

    #[test]
    fn concurrent_interns_converge_when_lookups_miss() {
        let relational = Arc::new(FaultyStore::new());
        relational.set_blind_lookups(true);
        let content = with_relational(relational);
        let results = intern_concurrently(&content, "Bees buzz.");
        assert_single_winner(&content, &results);
    }

    #[test]
    fn concurrent_interns_converge_on_redb() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let redb = RedbStore::open(dir.path().join("race.redb")).expect("open");
        let content = with_relational(Arc::new(redb));
        let results = intern_concurrently(&content, "Bees buzz.");
        assert_single_winner(&content, &results);
    }
}
