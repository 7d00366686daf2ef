//! # Dual-Store Coordinator
//!
//! Sequences writes and reads across the relational store and the blob store.
//!
//! ## Consistency rules
//!
//! - Relational metadata commits before the blob payload. The relational
//!   store is authoritative.
//! - A blob write that fails after the relational commit leaves the unit
//!   "content pending". The operation still succeeds and the relational
//!   commit is kept.
//! - Blobs without a relational owner are orphans. They are never returned
//!   by reads and can be removed with [`Coordinator::sweep_orphans`].

use crate::primitives::{CONTENT_KEY, TEXT_KEY, VECTOR_KEY};
use crate::store::{BlobStore, Payload, RelationalStore};
use crate::types::{ContentUnit, DimdirError, EntityKind, UnitId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a repair pass over pending units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Units whose payload was re-mirrored.
    pub repaired: Vec<UnitId>,
    /// Units still pending (document content cannot be rebuilt).
    pub remaining: Vec<UnitId>,
}

/// Owner of both store handles.
#[derive(Debug, Clone)]
pub struct Coordinator {
    relational: Arc<dyn RelationalStore>,
    blobs: Arc<dyn BlobStore>,
}

/// Blob namespace of a unit, e.g. `sentences/<id>`.
pub(crate) fn unit_namespace(kind: EntityKind, id: UnitId) -> String {
    format!("{}/{}", kind.namespace(), id)
}

/// Blob key under which a unit's primary payload lives.
const fn payload_key(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Document => CONTENT_KEY,
        EntityKind::Sentence | EntityKind::Token => TEXT_KEY,
    }
}

impl Coordinator {
    pub fn new(relational: Arc<dyn RelationalStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { relational, blobs }
    }

    #[must_use]
    pub fn relational(&self) -> &dyn RelationalStore {
        self.relational.as_ref()
    }

    #[must_use]
    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    // =========================================================================
    // WRITE PATH
    // =========================================================================

    /// Commit a unit and mirror its payload.
    ///
    /// `payload` is the raw text for the blob store (document content, or
    /// sentence/token text). The mirror only runs when this call created the
    /// unit. Returns the stored unit and whether it was inserted.
    pub fn commit_unit(
        &self,
        unit: ContentUnit,
        payload: &str,
        vector: Option<Vec<f32>>,
    ) -> Result<(ContentUnit, bool), DimdirError> {
        let (stored, inserted) = self.relational.insert_unit_if_absent(unit)?;
        if !inserted {
            return Ok((stored, false));
        }

        self.mirror_payload(&stored, payload);
        if let Some(vector) = vector {
            self.mirror_vector(stored.id, stored.kind, vector)?;
        }
        Ok((stored, true))
    }

    /// Write the primary payload blob. Failures are logged, not returned.
    fn mirror_payload(&self, unit: &ContentUnit, payload: &str) -> bool {
        let ns = unit_namespace(unit.kind, unit.id);
        match self
            .blobs
            .put(&ns, payload_key(unit.kind), Payload::text(payload))
        {
            Ok(()) => true,
            Err(e) => {
                warn!(unit = %unit.id, kind = %unit.kind, error = %e, "blob write failed, unit left content pending");
                false
            }
        }
    }

    /// Write a vector blob, keeping the inline column as fallback when the
    /// blob store rejects it.
    fn mirror_vector(
        &self,
        id: UnitId,
        kind: EntityKind,
        vector: Vec<f32>,
    ) -> Result<(), DimdirError> {
        let ns = unit_namespace(kind, id);
        if let Err(e) = self.blobs.put(&ns, VECTOR_KEY, Payload::Vector(vector.clone())) {
            warn!(unit = %id, error = %e, "vector blob write failed, using inline column");
            self.relational.set_inline_vector(id, &vector)?;
        }
        Ok(())
    }

    /// Attach a vector to an existing unit: inline column first, then blob.
    pub fn store_vector(&self, id: UnitId, vector: &[f32]) -> Result<ContentUnit, DimdirError> {
        let unit = self
            .relational
            .unit(id)?
            .ok_or_else(|| DimdirError::UnknownIdentifier(id.to_string()))?;
        self.relational.set_inline_vector(id, vector)?;
        let ns = unit_namespace(unit.kind, id);
        if let Err(e) = self.blobs.put(&ns, VECTOR_KEY, Payload::Vector(vector.to_vec())) {
            warn!(unit = %id, error = %e, "vector blob write failed, inline column kept");
        }
        Ok(unit)
    }

    // =========================================================================
    // READ PATH
    // =========================================================================

    /// Text of a unit: the relational column for sentences and tokens, the
    /// content blob for documents.
    pub fn text_of(&self, unit: &ContentUnit) -> Result<Option<String>, DimdirError> {
        if let Some(text) = &unit.text {
            return Ok(Some(text.clone()));
        }
        let ns = unit_namespace(unit.kind, unit.id);
        Ok(self
            .blobs
            .get(&ns, payload_key(unit.kind))?
            .and_then(Payload::into_text))
    }

    /// Document content, only for documents the relational store knows.
    pub fn document_content(&self, id: UnitId) -> Result<Option<String>, DimdirError> {
        match self.relational.unit(id)? {
            Some(unit) if unit.kind == EntityKind::Document => self.text_of(&unit),
            _ => Ok(None),
        }
    }

    /// Vector of a unit: blob first, then the inline column.
    pub fn vector(&self, id: UnitId) -> Result<Option<Vec<f32>>, DimdirError> {
        let Some(unit) = self.relational.unit(id)? else {
            return Ok(None);
        };
        let ns = unit_namespace(unit.kind, id);
        match self.blobs.get(&ns, VECTOR_KEY) {
            Ok(Some(payload)) => {
                if let Some(vector) = payload.into_vector() {
                    return Ok(Some(vector));
                }
            }
            Ok(None) => {}
            Err(e) => debug!(unit = %id, error = %e, "vector blob read failed, trying inline column"),
        }
        self.relational.inline_vector(id)
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    fn is_pending(&self, unit: &ContentUnit) -> Result<bool, DimdirError> {
        let ns = unit_namespace(unit.kind, unit.id);
        Ok(self.blobs.get(&ns, payload_key(unit.kind))?.is_none())
    }

    /// Units of `kind` whose payload blob is missing.
    pub fn list_pending(&self, kind: EntityKind) -> Result<Vec<UnitId>, DimdirError> {
        let mut pending = Vec::new();
        for unit in self.relational.units_of_kind(kind)? {
            if self.is_pending(&unit)? {
                pending.push(unit.id);
            }
        }
        Ok(pending)
    }

    /// Re-mirror pending sentence and token text from the relational record.
    pub fn repair_pending(&self, kind: EntityKind) -> Result<RepairReport, DimdirError> {
        let mut report = RepairReport::default();
        for unit in self.relational.units_of_kind(kind)? {
            if !self.is_pending(&unit)? {
                continue;
            }
            let repaired = match &unit.text {
                Some(text) => self.mirror_payload(&unit, text),
                None => false,
            };
            if repaired {
                report.repaired.push(unit.id);
            } else {
                report.remaining.push(unit.id);
            }
        }
        debug!(kind = %kind, repaired = report.repaired.len(), remaining = report.remaining.len(), "repair pass finished");
        Ok(report)
    }

    /// Delete blob namespaces of `kind` that have no relational owner.
    ///
    /// Returns the removed namespaces.
    pub fn sweep_orphans(&self, kind: EntityKind) -> Result<Vec<String>, DimdirError> {
        let mut removed = Vec::new();
        for name in self.blobs.children(kind.namespace())? {
            let owned = match name.parse::<UnitId>() {
                Ok(id) if UnitId::is_canonical(&name) => self
                    .relational
                    .unit(id)?
                    .is_some_and(|unit| unit.kind == kind),
                _ => false,
            };
            if owned {
                continue;
            }
            let ns = format!("{}/{}", kind.namespace(), name);
            for key in self.blobs.keys(&ns)? {
                self.blobs.delete(&ns, &key)?;
            }
            debug!(namespace = %ns, "orphan blob namespace removed");
            removed.push(ns);
        }
        Ok(removed)
    }
}

// =============================================================================
// TESTS
// =============================================================================
