//! # Document Index
//!
//! The facade that owns the stores and components and drives ingestion:
//!
//! 1. the document is deduplicated and addressed as `doc:<D>`
//! 2. it is segmented into ordered units (sentences by default)
//! 3. each unit is deduplicated; occurrences `(D, S, i)` are committed in
//!    one transaction, in position order
//! 4. `doc:<D>-<i>` is registered for every occurrence
//! 5. each newly created sentence is tokenized the same way (`<S>-<j>`)
//!
//! Queries run the other way, from addresses and formulas back to content.

use crate::address::{
    AddressRegistry, MemberRef, Resolution, document_address, occurrence_address,
};
use crate::content::ContentStore;
use crate::coordinator::{Coordinator, RepairReport};
use crate::embed::{EmbeddingProvider, NoEmbeddings};
use crate::formula::{CellPosition, CellResolver, FormulaEngine, FormulaValue};
use crate::mapping::{MappingOutcome, MappingRegistry};
use crate::primitives::{MAX_DOCUMENT_BYTES, SEGMENT_SEPARATOR};
use crate::relation::{LinkOutcome, RelatedItem, RelationGraph};
use crate::segment::{DefaultSegmenter, Granularity, SegmentationPolicy};
use crate::store::{BlobStore, FsBlobStore, MemoryBlobStore, MemoryStore, RedbStore, RelationalStore};
use crate::types::{
    AddressRecord, ContentHash, ContentUnit, DimdirError, DocumentMeta, EntityKind, Mapping,
    Occurrence, UnitId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// REQUEST / REPORT TYPES
// =============================================================================

/// Where an on-disk index keeps its files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    pub data_dir: PathBuf,
    /// redb file name inside `data_dir`.
    pub database: String,
    /// Blob tree directory inside `data_dir`.
    pub blobs: String,
    pub granularity: Granularity,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("dimdir-data"),
            database: "dimdir.redb".to_string(),
            blobs: "blobs".to_string(),
            granularity: Granularity::Sentence,
        }
    }
}

/// A document submission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewDocument {
    pub content: String,
    /// Collection the document belongs to.
    pub long_id: String,
    pub short_id: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
}

/// One unit of an ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceReport {
    pub id: UnitId,
    pub text: String,
    pub position: u32,
    pub is_new: bool,
}

/// Result of [`DocumentIndex::ingest_document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: UnitId,
    pub address: String,
    pub long_id: String,
    pub short_id: String,
    pub is_new: bool,
    pub sentences: Vec<SentenceReport>,
}

/// A document occurrence of some sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPosition {
    pub document: UnitId,
    pub position: u32,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: UnitId,
    pub address: String,
    pub meta: DocumentMeta,
    pub sentence_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentView {
    pub id: UnitId,
    pub address: String,
    pub meta: DocumentMeta,
    /// `None` while the content blob is pending.
    pub content: Option<String>,
    pub sentences: Vec<MemberRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceView {
    pub id: UnitId,
    pub text: Option<String>,
    pub hash: ContentHash,
    pub tokens: Vec<MemberRef>,
    pub documents: Vec<DocumentPosition>,
    pub vector: Option<Vec<f32>>,
}

/// A token occurrence found by [`DocumentIndex::search_by_token`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHit {
    pub token: UnitId,
    pub text: String,
    pub address: String,
    pub sentence: UnitId,
    pub sentence_text: Option<String>,
    pub position: u32,
    pub documents: Vec<DocumentPosition>,
}

/// Counts reported by [`DocumentIndex::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub documents: usize,
    pub sentences: usize,
    pub tokens: usize,
    pub relations: usize,
    pub mappings: usize,
    pub pending: BTreeMap<EntityKind, usize>,
}

// =============================================================================
// DOCUMENT INDEX
// =============================================================================

#[derive(Debug, Clone)]
pub struct DocumentIndex {
    coordinator: Coordinator,
    content: ContentStore,
    registry: AddressRegistry,
    relations: RelationGraph,
    mappings: MappingRegistry,
    segmenter: Arc<dyn SegmentationPolicy>,
}

impl DocumentIndex {
    /// Index over the given stores with the default policies.
    pub fn with_stores(relational: Arc<dyn RelationalStore>, blobs: Arc<dyn BlobStore>) -> Self {
        let coordinator = Coordinator::new(relational, blobs);
        let registry = AddressRegistry::new(coordinator.clone());
        Self {
            content: ContentStore::new(coordinator.clone(), Arc::new(NoEmbeddings)),
            relations: RelationGraph::new(coordinator.clone(), registry.clone()),
            mappings: MappingRegistry::new(coordinator.clone()),
            registry,
            coordinator,
            segmenter: Arc::new(DefaultSegmenter::default()),
        }
    }

    /// Volatile index for tests and one-off runs.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_stores(Arc::new(MemoryStore::new()), Arc::new(MemoryBlobStore::new()))
    }

    /// Open or create an on-disk index.
    pub fn open(options: &IndexOptions) -> Result<Self, DimdirError> {
        std::fs::create_dir_all(&options.data_dir)
            .map_err(|e| DimdirError::StorageUnavailable(format!("{}: {e}", options.data_dir.display())))?;
        let relational = RedbStore::open(options.data_dir.join(&options.database))?;
        let blobs = FsBlobStore::open(options.data_dir.join(&options.blobs))?;
        info!(data_dir = %options.data_dir.display(), granularity = ?options.granularity, "index opened");
        Ok(Self::with_stores(Arc::new(relational), Arc::new(blobs))
            .with_segmenter(Arc::new(DefaultSegmenter::new(options.granularity))))
    }

    #[must_use]
    pub fn with_segmenter(mut self, segmenter: Arc<dyn SegmentationPolicy>) -> Self {
        self.segmenter = segmenter;
        self
    }

    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.content = ContentStore::new(self.coordinator.clone(), embedder);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    #[must_use]
    pub fn relations(&self) -> &RelationGraph {
        &self.relations
    }

    // =========================================================================
    // INGESTION
    // =========================================================================

    /// Ingest a document under a collection.
    ///
    /// A document whose content is already indexed keeps its occurrences and
    /// only gains the new collection and metadata.
    pub fn ingest_document(&self, doc: NewDocument) -> Result<IngestReport, DimdirError> {
        if doc.content.trim().is_empty() {
            return Err(DimdirError::InvalidContent("empty document".to_string()));
        }
        if doc.content.len() > MAX_DOCUMENT_BYTES {
            return Err(DimdirError::InvalidContent(format!(
                "document exceeds {MAX_DOCUMENT_BYTES} bytes"
            )));
        }
        let units = self.segmenter.split_units(&doc.content);
        if units.is_empty() {
            return Err(DimdirError::InvalidContent(
                "document has no segmentable units".to_string(),
            ));
        }

        let mapping = self
            .mappings
            .register(&doc.long_id, doc.short_id.as_deref(), None)?
            .mapping;

        let interned = self.content.intern(EntityKind::Document, &doc.content)?;
        let document_id = interned.id;
        let address = document_address(document_id);
        self.registry.register(
            &address,
            Some(document_id),
            Some(EntityKind::Document),
            &BTreeMap::new(),
        )?;
        self.coordinator.relational().upsert_document(
            document_id,
            DocumentMeta {
                title: doc.title,
                source: doc.source,
                collections: BTreeSet::from([mapping.long_id.clone()]),
            },
        )?;

        let existing = self.coordinator.relational().occurrences_in(document_id)?;
        let sentences = if existing.is_empty() {
            self.ingest_units(document_id, &units)?
        } else {
            debug!(document = %document_id, "document already indexed");
            self.indexed_units(&existing)?
        };
        self.complete_units(document_id, &sentences)?;

        info!(
            document = %document_id,
            long_id = %mapping.long_id,
            is_new = interned.is_new,
            sentences = sentences.len(),
            "document ingested"
        );
        Ok(IngestReport {
            document_id,
            address,
            long_id: mapping.long_id,
            short_id: mapping.short_id,
            is_new: interned.is_new,
            sentences,
        })
    }

    /// Intern the units of a document and place them in one transaction.
    fn ingest_units(
        &self,
        document_id: UnitId,
        units: &[String],
    ) -> Result<Vec<SentenceReport>, DimdirError> {
        let mut reports = Vec::with_capacity(units.len());
        let mut occurrences = Vec::with_capacity(units.len());
        for (position, text) in units.iter().enumerate() {
            let sentence = self.content.intern(EntityKind::Sentence, text)?;
            let position = position as u32;
            occurrences.push(Occurrence::new(document_id, sentence.id, position));
            reports.push(SentenceReport {
                id: sentence.id,
                text: text.clone(),
                position,
                is_new: sentence.is_new,
            });
        }
        self.coordinator
            .relational()
            .insert_occurrences(&occurrences)?;
        Ok(reports)
    }

    /// Reports for a document whose occurrences are already committed.
    fn indexed_units(&self, existing: &[Occurrence]) -> Result<Vec<SentenceReport>, DimdirError> {
        let store = self.coordinator.relational();
        let mut out = Vec::with_capacity(existing.len());
        for occ in existing {
            let text = store
                .unit(occ.member)?
                .and_then(|u| u.text)
                .unwrap_or_default();
            out.push(SentenceReport {
                id: occ.member,
                text,
                position: occ.position,
                is_new: false,
            });
        }
        Ok(out)
    }

    /// Address every occurrence of the document and tokenize sentences that
    /// have no tokens yet. Safe to repeat after a partial failure.
    fn complete_units(
        &self,
        document_id: UnitId,
        sentences: &[SentenceReport],
    ) -> Result<(), DimdirError> {
        for report in sentences {
            let occ = Occurrence::new(document_id, report.id, report.position);
            self.ensure_address(
                &occurrence_address(EntityKind::Document, &occ),
                report.id,
                EntityKind::Sentence,
            )?;
            self.ensure_tokens(report.id, &report.text)?;
        }
        Ok(())
    }

    /// Register `addr -> target` unless it is already registered that way.
    fn ensure_address(
        &self,
        addr: &str,
        target: UnitId,
        kind: EntityKind,
    ) -> Result<(), DimdirError> {
        let registered = self
            .coordinator
            .relational()
            .address(addr)?
            .is_some_and(|record| record.target == Some(target));
        if !registered {
            self.registry
                .register(addr, Some(target), Some(kind), &BTreeMap::new())?;
        }
        Ok(())
    }

    /// Tokenize a sentence once; later calls only fill in missing addresses.
    fn ensure_tokens(&self, sentence_id: UnitId, text: &str) -> Result<(), DimdirError> {
        self.ensure_address(&sentence_id.to_string(), sentence_id, EntityKind::Sentence)?;
        let store = self.coordinator.relational();
        let mut occurrences = store.occurrences_in(sentence_id)?;
        if occurrences.is_empty() {
            for (position, token) in self.segmenter.split_tokens(text).iter().enumerate() {
                let interned = self.content.intern(EntityKind::Token, token)?;
                occurrences.push(Occurrence::new(sentence_id, interned.id, position as u32));
            }
            store.insert_occurrences(&occurrences)?;
        }
        for occ in &occurrences {
            self.ensure_address(
                &occurrence_address(EntityKind::Sentence, occ),
                occ.member,
                EntityKind::Token,
            )?;
        }
        Ok(())
    }

    // =========================================================================
    // DOCUMENTS AND SENTENCES
    // =========================================================================

    fn unit_of_kind(&self, id: UnitId, kind: EntityKind) -> Result<ContentUnit, DimdirError> {
        self.coordinator
            .relational()
            .unit(id)?
            .filter(|u| u.kind == kind)
            .ok_or_else(|| DimdirError::UnknownIdentifier(id.to_string()))
    }

    fn members(&self, container: UnitId) -> Result<Vec<MemberRef>, DimdirError> {
        let store = self.coordinator.relational();
        let mut out = Vec::new();
        for occ in store.occurrences_in(container)? {
            out.push(MemberRef {
                id: occ.member,
                position: occ.position,
                text: store.unit(occ.member)?.and_then(|u| u.text),
            });
        }
        Ok(out)
    }

    fn document_positions(&self, sentence: UnitId) -> Result<Vec<DocumentPosition>, DimdirError> {
        Ok(self
            .coordinator
            .relational()
            .occurrences_of(sentence)?
            .into_iter()
            .map(|occ| DocumentPosition {
                document: occ.container,
                position: occ.position,
                address: occurrence_address(EntityKind::Document, &occ),
            })
            .collect())
    }

    /// A document with its ordered sentences and content.
    pub fn document(&self, id: UnitId) -> Result<DocumentView, DimdirError> {
        self.unit_of_kind(id, EntityKind::Document)?;
        Ok(DocumentView {
            id,
            address: document_address(id),
            meta: self
                .coordinator
                .relational()
                .document(id)?
                .unwrap_or_default(),
            content: self.coordinator.document_content(id)?,
            sentences: self.members(id)?,
        })
    }

    pub fn documents(&self) -> Result<Vec<DocumentSummary>, DimdirError> {
        let store = self.coordinator.relational();
        let mut out = Vec::new();
        for unit in store.units_of_kind(EntityKind::Document)? {
            out.push(DocumentSummary {
                id: unit.id,
                address: document_address(unit.id),
                meta: store.document(unit.id)?.unwrap_or_default(),
                sentence_count: store.occurrences_in(unit.id)?.len(),
            });
        }
        Ok(out)
    }

    pub fn sentences(&self) -> Result<Vec<ContentUnit>, DimdirError> {
        self.coordinator
            .relational()
            .units_of_kind(EntityKind::Sentence)
    }

    /// A sentence with its tokens, containing documents and vector.
    pub fn sentence(&self, id: UnitId) -> Result<SentenceView, DimdirError> {
        let unit = self.unit_of_kind(id, EntityKind::Sentence)?;
        Ok(SentenceView {
            id,
            text: unit.text,
            hash: unit.hash,
            tokens: self.members(id)?,
            documents: self.document_positions(id)?,
            vector: self.coordinator.vector(id)?,
        })
    }

    /// Documents and positions containing `text` as a sentence.
    pub fn find_documents_with_sentence(
        &self,
        text: &str,
    ) -> Result<Vec<DocumentPosition>, DimdirError> {
        match self.content.find(EntityKind::Sentence, text)? {
            Some(unit) => self.document_positions(unit.id),
            None => Ok(Vec::new()),
        }
    }

    /// Every occurrence of a token, with sentence and document context.
    pub fn search_by_token(&self, token: &str) -> Result<Vec<TokenHit>, DimdirError> {
        let needle = token.trim().to_lowercase();
        if needle.is_empty() {
            return Err(DimdirError::InvalidContent("empty token".to_string()));
        }
        let Some(unit) = self.content.find(EntityKind::Token, &needle)? else {
            return Ok(Vec::new());
        };
        let store = self.coordinator.relational();
        let mut hits = Vec::new();
        for occ in store.occurrences_of(unit.id)? {
            hits.push(TokenHit {
                token: unit.id,
                text: needle.clone(),
                address: occurrence_address(EntityKind::Sentence, &occ),
                sentence: occ.container,
                sentence_text: store.unit(occ.container)?.and_then(|s| s.text),
                position: occ.position,
                documents: self.document_positions(occ.container)?,
            });
        }
        Ok(hits)
    }

    // =========================================================================
    // EMBEDDINGS
    // =========================================================================

    pub fn add_embedding(&self, id: UnitId, vector: &[f32]) -> Result<(), DimdirError> {
        if vector.is_empty() {
            return Err(DimdirError::InvalidContent("empty vector".to_string()));
        }
        self.coordinator.store_vector(id, vector).map(|_| ())
    }

    pub fn embedding(&self, id: UnitId) -> Result<Option<Vec<f32>>, DimdirError> {
        if self.coordinator.relational().unit(id)?.is_none() {
            return Err(DimdirError::UnknownIdentifier(id.to_string()));
        }
        self.coordinator.vector(id)
    }

    // =========================================================================
    // ADDRESSES AND RELATIONS
    // =========================================================================

    /// Register `levels` joined with `-`, plus attributes.
    pub fn register_address(
        &self,
        levels: &[String],
        attributes: &BTreeMap<String, String>,
        target: Option<UnitId>,
        kind: Option<EntityKind>,
    ) -> Result<AddressRecord, DimdirError> {
        if levels.is_empty() {
            return Err(DimdirError::InvalidContent("address has no levels".to_string()));
        }
        let mut kind = kind;
        if let Some(id) = target {
            let unit = self
                .coordinator
                .relational()
                .unit(id)?
                .ok_or_else(|| DimdirError::UnknownIdentifier(id.to_string()))?;
            kind = kind.or(Some(unit.kind));
        }
        let addr = levels.join(&SEGMENT_SEPARATOR.to_string());
        self.registry.register(&addr, target, kind, attributes)
    }

    pub fn resolve(&self, addr: &str, relative_to: Option<&str>) -> Result<Resolution, DimdirError> {
        self.registry.resolve(addr, relative_to)
    }

    pub fn set_attribute(&self, addr: &str, key: &str, value: &str) -> Result<(), DimdirError> {
        self.registry.set_attribute(addr, key, value)
    }

    /// Unit id behind an address, as a relation endpoint.
    pub fn endpoint(&self, addr: &str) -> Result<UnitId, DimdirError> {
        self.relations.endpoint(addr)
    }

    pub fn link(
        &self,
        source_addr: &str,
        target_addr: &str,
        relation_type: &str,
    ) -> Result<LinkOutcome, DimdirError> {
        self.relations.link(source_addr, target_addr, relation_type)
    }

    pub fn unlink(
        &self,
        source_addr: &str,
        target_addr: &str,
        relation_type: &str,
    ) -> Result<bool, DimdirError> {
        self.relations.unlink(source_addr, target_addr, relation_type)
    }

    pub fn related(
        &self,
        source: UnitId,
        relation_type: Option<&str>,
    ) -> Result<Vec<RelatedItem>, DimdirError> {
        self.relations.related(source, relation_type)
    }

    pub fn related_count(
        &self,
        source: UnitId,
        relation_type: Option<&str>,
    ) -> Result<usize, DimdirError> {
        self.relations.related_count(source, relation_type)
    }

    /// Evaluate a formula with the given cell mapping.
    pub fn evaluate(
        &self,
        formula: &str,
        cells: &dyn CellResolver,
        context: Option<CellPosition>,
    ) -> Result<FormulaValue, DimdirError> {
        FormulaEngine::new(&self.registry, &self.relations, cells).evaluate(formula, context)
    }

    // =========================================================================
    // MAPPINGS
    // =========================================================================

    pub fn register_mapping(
        &self,
        long_id: &str,
        short_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<MappingOutcome, DimdirError> {
        self.mappings.register(long_id, short_id, description)
    }

    pub fn mapping_by_long(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError> {
        self.mappings.get_by_long(long_id)
    }

    pub fn mapping_by_short(&self, short_id: &str) -> Result<Option<Mapping>, DimdirError> {
        self.mappings.get_by_short(short_id)
    }

    pub fn mappings(&self) -> Result<Vec<Mapping>, DimdirError> {
        self.mappings.list()
    }

    pub fn remove_mapping(&self, long_id: &str) -> Result<Option<Mapping>, DimdirError> {
        self.mappings.remove(long_id)
    }

    #[must_use]
    pub fn mapping_registry(&self) -> &MappingRegistry {
        &self.mappings
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    pub fn list_pending(&self, kind: EntityKind) -> Result<Vec<UnitId>, DimdirError> {
        self.coordinator.list_pending(kind)
    }

    pub fn repair_pending(&self, kind: EntityKind) -> Result<RepairReport, DimdirError> {
        self.coordinator.repair_pending(kind)
    }

    pub fn sweep_orphans(&self, kind: EntityKind) -> Result<Vec<String>, DimdirError> {
        self.coordinator.sweep_orphans(kind)
    }

    pub fn status(&self) -> Result<IndexStatus, DimdirError> {
        let store = self.coordinator.relational();
        let mut pending = BTreeMap::new();
        for kind in EntityKind::ALL {
            pending.insert(kind, self.coordinator.list_pending(kind)?.len());
        }
        Ok(IndexStatus {
            documents: store.units_of_kind(EntityKind::Document)?.len(),
            sentences: store.units_of_kind(EntityKind::Sentence)?.len(),
            tokens: store.units_of_kind(EntityKind::Token)?.len(),
            relations: store.relation_count()?,
            mappings: store.mappings()?.len(),
            pending,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn submit(index: &DocumentIndex, content: &str, long_id: &str) -> IngestReport {
        index
            .ingest_document(NewDocument {
                content: content.to_string(),
                long_id: long_id.to_string(),
                ..NewDocument::default()
            })
            .expect("ingest")
    }

    #[test]
    fn ingest_assigns_contiguous_positions() {
        let index = DocumentIndex::in_memory();
        let report = submit(&index, "One. Two. Three.", "C");
        let positions: Vec<u32> = report.sentences.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);

        let view = index.document(report.document_id).expect("document");
        assert_eq!(view.sentences.len(), 3);
        assert_eq!(view.content.as_deref(), Some("One. Two. Three."));
        assert_eq!(view.meta.collections, BTreeSet::from(["C".to_string()]));
    }

    #[test]
    fn failed_tokenization_is_completed_on_resubmit() {
        let store = Arc::new(crate::store::faulty::FaultyStore::new());
        let index = DocumentIndex::with_stores(store.clone(), Arc::new(MemoryBlobStore::new()));
        let doc = NewDocument {
            content: "Rivers flow north.".to_string(),
            long_id: "Geo".to_string(),
            ..NewDocument::default()
        };

        store.set_fail_tokens(true);
        assert!(matches!(
            index.ingest_document(doc.clone()),
            Err(DimdirError::StorageUnavailable(_))
        ));

        store.set_fail_tokens(false);
        let report = index.ingest_document(doc).expect("ingest");
        let sentence = report.sentences[0].id;
        assert!(!report.sentences[0].is_new);

        let view = index.sentence(sentence).expect("sentence");
        let tokens: Vec<_> = view.tokens.iter().map(|t| t.text.as_deref()).collect();
        assert_eq!(tokens, vec![Some("rivers"), Some("flow"), Some("north")]);
        assert_eq!(
            index
                .resolve(&format!("{}-0", report.address), None)
                .expect("resolve")
                .target,
            Some(sentence)
        );
        assert!(index.resolve(&format!("{sentence}-2"), None).expect("resolve").registered);
    }

    #[test]
    fn shared_sentence_is_tokenized_by_later_document() {
        let store = Arc::new(crate::store::faulty::FaultyStore::new());
        let index = DocumentIndex::with_stores(store.clone(), Arc::new(MemoryBlobStore::new()));

        store.set_fail_tokens(true);
        assert!(
            index
                .ingest_document(NewDocument {
                    content: "Snow falls.".to_string(),
                    long_id: "A".to_string(),
                    ..NewDocument::default()
                })
                .is_err()
        );
        store.set_fail_tokens(false);

        let report = submit(&index, "Rain falls. Snow falls.", "B");
        let snow = report.sentences[1].id;
        assert_eq!(index.sentence(snow).expect("sentence").tokens.len(), 2);
    }

    #[test]
    fn parallel_mapping_registration_keeps_global_aliases() {
        let index = DocumentIndex::in_memory();
        std::thread::scope(|scope| {
            for t in 0..16 {
                let index = index.clone();
                scope.spawn(move || {
                    for i in 0..50 {
                        index
                            .register_mapping(&format!("C{t}_{i}"), None, None)
                            .expect("register");
                    }
                });
            }
        });
        assert_eq!(index.mappings().expect("list").len(), 800);
        assert_eq!(
            index.mapping_registry().global_aliases().expect("read").len(),
            800
        );
    }

    #[test]
    fn resubmitted_document_gains_collection() {
        let index = DocumentIndex::in_memory();
        let first = submit(&index, "Cats purr.", "A");
        let second = submit(&index, "Cats purr.", "B");

        assert_eq!(first.document_id, second.document_id);
        assert!(!second.is_new);
        assert!(second.sentences.iter().all(|s| !s.is_new));
        let meta = index.document(first.document_id).expect("document").meta;
        assert_eq!(meta.collections.len(), 2);
        assert_eq!(index.documents().expect("list").len(), 1);
    }

    #[test]
    fn tokens_are_addressed_under_their_sentence() {
        let index = DocumentIndex::in_memory();
        let report = submit(&index, "Cats purr loudly.", "A");
        let sentence = report.sentences[0].id;

        let view = index.sentence(sentence).expect("sentence");
        let tokens: Vec<_> = view.tokens.iter().filter_map(|t| t.text.clone()).collect();
        assert_eq!(tokens, vec!["cats", "purr", "loudly"]);

        let res = index.resolve(&format!("{sentence}-1"), None).expect("resolve");
        assert!(res.registered);
        assert_eq!(res.content.as_deref(), Some("purr"));
    }

    #[test]
    fn search_by_token_reports_context() {
        let index = DocumentIndex::in_memory();
        let report = submit(&index, "Cats purr. Dogs bark at cats.", "A");
        let hits = index.search_by_token("CATS").expect("search");

        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.documents[0].document == report.document_id));
        assert!(index.search_by_token("birds").expect("search").is_empty());
    }

    #[test]
    fn embeddings_round_trip_and_unknown_ids() {
        let index = DocumentIndex::in_memory();
        let report = submit(&index, "Cats purr.", "A");
        let sentence = report.sentences[0].id;

        index.add_embedding(sentence, &[0.5, 0.25]).expect("embed");
        assert_eq!(index.embedding(sentence).expect("get"), Some(vec![0.5, 0.25]));
        assert!(matches!(
            index.add_embedding(UnitId::mint(), &[1.0]),
            Err(DimdirError::UnknownIdentifier(_))
        ));
        assert!(matches!(
            index.add_embedding(sentence, &[]),
            Err(DimdirError::InvalidContent(_))
        ));
    }

    #[test]
    fn register_address_joins_levels() {
        let index = DocumentIndex::in_memory();
        let report = submit(&index, "Cats purr.", "A");
        let record = index
            .register_address(
                &["shelf".to_string(), "3".to_string()],
                &BTreeMap::from([("lang".to_string(), "en".to_string())]),
                Some(report.document_id),
                None,
            )
            .expect("register");
        assert_eq!(record.addr, "shelf-3");
        assert_eq!(record.kind, Some(EntityKind::Document));

        let res = index.resolve("shelf-3", None).expect("resolve");
        assert_eq!(res.ancestry, vec!["shelf".to_string()]);
        assert_eq!(res.attributes.get("lang").map(String::as_str), Some("en"));
    }

    #[test]
    fn empty_documents_are_rejected() {
        let index = DocumentIndex::in_memory();
        let err = index
            .ingest_document(NewDocument {
                content: "   ".into(),
                long_id: "A".into(),
                ..NewDocument::default()
            })
            .expect_err("empty");
        assert!(matches!(err, DimdirError::InvalidContent(_)));
        assert_eq!(index.status().expect("status").mappings, 0);
    }

    #[test]
    fn status_counts() {
        let index = DocumentIndex::in_memory();
        submit(&index, "Cats purr. Dogs bark.", "A");
        let status = index.status().expect("status");
        assert_eq!(status.documents, 1);
        assert_eq!(status.sentences, 2);
        assert_eq!(status.tokens, 4);
        assert_eq!(status.mappings, 1);
        assert!(status.pending.values().all(|&n| n == 0));
    }
}
