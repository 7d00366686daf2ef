//! # Relation Graph
//!
//! Typed directed edges between content units. Edges are created from
//! addresses and queried by id, one hop at a time.

use crate::address::AddressRegistry;
use crate::coordinator::Coordinator;
use crate::primitives::MAX_RELATION_TYPE_LENGTH;
use crate::types::{DimdirError, EntityKind, Relation, UnitId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A relation target together with its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedItem {
    pub id: UnitId,
    pub relation_type: String,
    pub kind: Option<EntityKind>,
    pub content: Option<String>,
}

/// Result of [`RelationGraph::link`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOutcome {
    pub relation: Relation,
    /// `false` when the triple already existed.
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct RelationGraph {
    coordinator: Coordinator,
    registry: AddressRegistry,
}

fn validate_type(relation_type: &str) -> Result<&str, DimdirError> {
    let trimmed = relation_type.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_RELATION_TYPE_LENGTH {
        return Err(DimdirError::InvalidContent(format!(
            "invalid relation type '{relation_type}'"
        )));
    }
    Ok(trimmed)
}

impl RelationGraph {
    pub fn new(coordinator: Coordinator, registry: AddressRegistry) -> Self {
        Self {
            coordinator,
            registry,
        }
    }

    /// Resolve a relation endpoint to a unit id.
    pub fn endpoint(&self, addr: &str) -> Result<UnitId, DimdirError> {
        match self.registry.resolve_target(addr) {
            Ok(Some(id)) => Ok(id),
            Ok(None) | Err(DimdirError::InvalidContent(_) | DimdirError::AddressNotFound(_)) => {
                Err(DimdirError::UnresolvedEndpoint(addr.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Create `source -[type]-> target`. Re-linking is a no-op.
    pub fn link(
        &self,
        source_addr: &str,
        target_addr: &str,
        relation_type: &str,
    ) -> Result<LinkOutcome, DimdirError> {
        let relation_type = validate_type(relation_type)?;
        let source = self.endpoint(source_addr)?;
        let target = self.endpoint(target_addr)?;
        let relation = Relation::new(source, target, relation_type);
        let created = self.coordinator.relational().upsert_relation(&relation)?;
        debug!(source = %source, target = %target, relation_type, created, "link");
        Ok(LinkOutcome { relation, created })
    }

    /// Remove `source -[type]-> target`. Returns `false` if it did not exist.
    pub fn unlink(
        &self,
        source_addr: &str,
        target_addr: &str,
        relation_type: &str,
    ) -> Result<bool, DimdirError> {
        let relation_type = validate_type(relation_type)?;
        let relation = Relation::new(
            self.endpoint(source_addr)?,
            self.endpoint(target_addr)?,
            relation_type,
        );
        self.coordinator.relational().delete_relation(&relation)
    }

    /// Targets of `source`'s outgoing edges with their content.
    pub fn related(
        &self,
        source: UnitId,
        relation_type: Option<&str>,
    ) -> Result<Vec<RelatedItem>, DimdirError> {
        let relation_type = relation_type.map(validate_type).transpose()?;
        let store = self.coordinator.relational();
        let mut out = Vec::new();
        for relation in store.relations_from(source, relation_type)? {
            let unit = store.unit(relation.target)?;
            let content = match &unit {
                Some(unit) => self.coordinator.text_of(unit)?,
                None => None,
            };
            out.push(RelatedItem {
                id: relation.target,
                relation_type: relation.relation_type,
                kind: unit.map(|u| u.kind),
                content,
            });
        }
        Ok(out)
    }

    /// Number of outgoing edges of `source`.
    pub fn related_count(
        &self,
        source: UnitId,
        relation_type: Option<&str>,
    ) -> Result<usize, DimdirError> {
        let relation_type = relation_type.map(validate_type).transpose()?;
        Ok(self
            .coordinator
            .relational()
            .relations_from(source, relation_type)?
            .len())
    }
}
