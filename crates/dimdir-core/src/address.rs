//! # Address Registry
//!
//! Hierarchical address strings mapped to content units and back.
//!
//! ## Address grammar
//!
//! ```text
//! address    := base ( "_" attribute )*
//! base       := segment ( ("-" | ".") segment )*
//! attribute  := key "=" value | flag
//! ```
//!
//! The parent of an address is its base with the last segment removed; an
//! address without a separator is a root. Ingestion registers:
//!
//! | address            | target    | kind     |
//! |--------------------|-----------|----------|
//! | `doc:<D>`          | document  | Document |
//! | `doc:<D>-<p>`      | sentence  | Sentence |
//! | `<S>`              | sentence  | Sentence |
//! | `<S>-<p>`          | token     | Token    |
//!
//! `<S>.<p>` and `doc:<D>-<p>.<q>` are accepted by [`AddressRegistry::resolve`]
//! as the attribute-style spelling of a token occurrence.

use crate::coordinator::Coordinator;
use crate::primitives::{
    ATTRIBUTE_SEPARATOR, DOCUMENT_ADDRESS_PREFIX, DOTTED_SEPARATOR, MAX_ADDRESS_LENGTH,
    SEGMENT_SEPARATOR,
};
use crate::types::{AddressRecord, DimdirError, EntityKind, Occurrence, UnitId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

// =============================================================================
// PARSING
// =============================================================================

/// An address split into its canonical base and attribute suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub canonical: String,
    pub attributes: BTreeMap<String, String>,
}

fn is_separator(c: char) -> bool {
    c == SEGMENT_SEPARATOR || c == DOTTED_SEPARATOR
}

/// Split `raw` into canonical address and attributes, validating both.
pub fn parse_address(raw: &str) -> Result<ParsedAddress, DimdirError> {
    let raw = raw.trim();
    let invalid = |reason: &str| DimdirError::InvalidContent(format!("address '{raw}': {reason}"));

    if raw.is_empty() {
        return Err(invalid("empty"));
    }
    if raw.len() > MAX_ADDRESS_LENGTH {
        return Err(invalid("too long"));
    }
    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("contains whitespace"));
    }

    let mut parts = raw.split(ATTRIBUTE_SEPARATOR);
    let canonical = parts.next().unwrap_or_default().to_string();
    if canonical.split(is_separator).any(str::is_empty) {
        return Err(invalid("empty segment"));
    }

    let mut attributes = BTreeMap::new();
    for token in parts {
        match token.split_once('=') {
            Some(("", _)) => return Err(invalid("attribute without key")),
            Some((key, value)) => {
                attributes.insert(key.to_string(), value.to_string());
            }
            None if token.is_empty() => return Err(invalid("empty attribute")),
            None => {
                attributes.insert(token.to_string(), "true".to_string());
            }
        }
    }
    Ok(ParsedAddress {
        canonical,
        attributes,
    })
}

/// Parent of a canonical address, `None` for a root.
#[must_use]
pub fn parent_of(addr: &str) -> Option<&str> {
    addr.rfind(is_separator).map(|i| &addr[..i])
}

/// Ancestors of a canonical address, root first.
#[must_use]
pub fn ancestry_of(addr: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = parent_of(addr);
    while let Some(parent) = current {
        chain.push(parent.to_string());
        current = parent_of(parent);
    }
    chain.reverse();
    chain
}

/// Split `container<sep>position` at the last separator.
fn split_position(addr: &str) -> Option<(&str, u32)> {
    let i = addr.rfind(is_separator)?;
    let position = addr[i + 1..].parse().ok()?;
    Some((&addr[..i], position))
}

/// Address of a document.
#[must_use]
pub fn document_address(id: UnitId) -> String {
    format!("{DOCUMENT_ADDRESS_PREFIX}{id}")
}

/// Address of a positioned occurrence.
#[must_use]
pub fn occurrence_address(container_kind: EntityKind, occ: &Occurrence) -> String {
    match container_kind {
        EntityKind::Document => format!(
            "{DOCUMENT_ADDRESS_PREFIX}{}{SEGMENT_SEPARATOR}{}",
            occ.container, occ.position
        ),
        EntityKind::Sentence | EntityKind::Token => {
            format!("{}{SEGMENT_SEPARATOR}{}", occ.container, occ.position)
        }
    }
}

// =============================================================================
// RESOLUTION RESULT
// =============================================================================

/// A member of a container, with its text when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub id: UnitId,
    pub position: u32,
    pub text: Option<String>,
}

/// Relation edges between a resolved address and a reference address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeInfo {
    pub addr: String,
    pub target: Option<UnitId>,
    /// Relation types from the resolved id to the reference id.
    pub forward_relations: Vec<String>,
    /// Relation types from the reference id to the resolved id.
    pub backward_relations: Vec<String>,
}

/// Everything known about one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub addr: String,
    /// Whether the address is in the registry or was derived structurally.
    pub registered: bool,
    pub target: Option<UnitId>,
    pub kind: Option<EntityKind>,
    pub ancestry: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    /// Text of a sentence or token target.
    pub content: Option<String>,
    /// Container of the occurrence this address names, if any.
    pub container: Option<UnitId>,
    pub position: Option<u32>,
    /// Every occurrence of a sentence or token target.
    pub occurrences: Vec<Occurrence>,
    /// Tokens of a sentence target, in order.
    pub tokens: Vec<MemberRef>,
    pub relative: Option<RelativeInfo>,
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Address registry over the relational store.
#[derive(Debug, Clone)]
pub struct AddressRegistry {
    coordinator: Coordinator,
}

impl AddressRegistry {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    /// Register an address, creating missing ancestors first.
    ///
    /// An existing row keeps its target and kind unless new non-null values
    /// are given. Attributes from the address suffix and from `attributes`
    /// are upserted; explicit ones win on key clashes.
    pub fn register(
        &self,
        addr: &str,
        target: Option<UnitId>,
        kind: Option<EntityKind>,
        attributes: &BTreeMap<String, String>,
    ) -> Result<AddressRecord, DimdirError> {
        let parsed = parse_address(addr)?;
        let store = self.coordinator.relational();

        self.ensure_ancestors(&parsed.canonical)?;
        let record = store.upsert_address(AddressRecord {
            parent: parent_of(&parsed.canonical).map(str::to_string),
            addr: parsed.canonical,
            target,
            kind,
        })?;

        let mut merged = parsed.attributes;
        merged.extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (key, value) in &merged {
            store.set_attribute(&record.addr, key, value)?;
        }
        Ok(record)
    }

    /// Register every missing ancestor of `canonical`, root first.
    fn ensure_ancestors(&self, canonical: &str) -> Result<(), DimdirError> {
        let store = self.coordinator.relational();
        let mut missing = Vec::new();
        let mut current = parent_of(canonical);
        while let Some(parent) = current {
            if store.address(parent)?.is_some() {
                break;
            }
            missing.push(parent);
            current = parent_of(parent);
        }
        for addr in missing.into_iter().rev() {
            debug!(addr, "auto-creating parent address");
            store.upsert_address(AddressRecord {
                addr: addr.to_string(),
                target: None,
                kind: None,
                parent: parent_of(addr).map(str::to_string),
            })?;
        }
        Ok(())
    }

    /// Set one attribute on an address, registering the address if needed.
    pub fn set_attribute(&self, addr: &str, key: &str, value: &str) -> Result<(), DimdirError> {
        if key.is_empty() || key.contains([ATTRIBUTE_SEPARATOR, '=']) {
            return Err(DimdirError::InvalidContent(format!(
                "invalid attribute key '{key}'"
            )));
        }
        let attrs = BTreeMap::from([(key.to_string(), value.to_string())]);
        self.register(addr, None, None, &attrs).map(|_| ())
    }

    /// Addresses naming `id`: one per occurrence, or the registered ones for
    /// a unit that occurs nowhere (documents).
    pub fn addresses_of(&self, id: UnitId) -> Result<Vec<String>, DimdirError> {
        let store = self.coordinator.relational();
        let occurrences = store.occurrences_of(id)?;
        if occurrences.is_empty() {
            return store.addresses_for(id);
        }
        let mut out = Vec::with_capacity(occurrences.len());
        for occ in &occurrences {
            let container_kind = store
                .unit(occ.container)?
                .map_or(EntityKind::Document, |u| u.kind);
            out.push(occurrence_address(container_kind, occ));
        }
        Ok(out)
    }

    /// Resolve an address to its target id only.
    pub fn resolve_target(&self, addr: &str) -> Result<Option<UnitId>, DimdirError> {
        let parsed = parse_address(addr)?;
        Ok(self.locate(&parsed.canonical)?.and_then(|l| l.target))
    }

    /// Resolve an address, optionally reporting relations to `relative_to`.
    pub fn resolve(
        &self,
        addr: &str,
        relative_to: Option<&str>,
    ) -> Result<Resolution, DimdirError> {
        let parsed = parse_address(addr)?;
        let located = self
            .locate(&parsed.canonical)?
            .ok_or_else(|| DimdirError::AddressNotFound(addr.to_string()))?;
        let store = self.coordinator.relational();

        let unit = match located.target {
            Some(id) => store.unit(id)?,
            None => None,
        };
        let kind = unit.as_ref().map(|u| u.kind).or(located.kind);

        let mut resolution = Resolution {
            ancestry: ancestry_of(&located.addr),
            attributes: store.attributes(&located.addr)?,
            addr: located.addr,
            registered: located.registered,
            target: located.target,
            kind,
            content: None,
            container: located.occurrence.map(|o| o.container),
            position: located.occurrence.map(|o| o.position),
            occurrences: Vec::new(),
            tokens: Vec::new(),
            relative: None,
        };

        if let Some(unit) = unit.filter(|u| u.kind != EntityKind::Document) {
            resolution.content = unit.text.clone();
            resolution.occurrences = store.occurrences_of(unit.id)?;
            if unit.kind == EntityKind::Sentence {
                for occ in store.occurrences_in(unit.id)? {
                    let text = store.unit(occ.member)?.and_then(|t| t.text);
                    resolution.tokens.push(MemberRef {
                        id: occ.member,
                        position: occ.position,
                        text,
                    });
                }
            }
        }

        if let Some(other) = relative_to {
            let other_target = self
                .resolve_target(other)
                .and_then(|t| t.ok_or_else(|| DimdirError::AddressNotFound(other.to_string())))
                .map_err(|e| match e {
                    DimdirError::InvalidContent(_) => DimdirError::AddressNotFound(other.to_string()),
                    e => e,
                })?;
            let (forward, backward) = match resolution.target {
                Some(this) => (
                    self.relation_types(this, other_target)?,
                    self.relation_types(other_target, this)?,
                ),
                None => (Vec::new(), Vec::new()),
            };
            resolution.relative = Some(RelativeInfo {
                addr: other.to_string(),
                target: Some(other_target),
                forward_relations: forward,
                backward_relations: backward,
            });
        }
        Ok(resolution)
    }

    fn relation_types(&self, from: UnitId, to: UnitId) -> Result<Vec<String>, DimdirError> {
        Ok(self
            .coordinator
            .relational()
            .relations_from(from, None)?
            .into_iter()
            .filter(|r| r.target == to)
            .map(|r| r.relation_type)
            .collect())
    }

    /// Find what a canonical address names.
    ///
    /// Order: registry row, dotted spelling as flat, then structural
    /// `container-position` lookup, then a bare id.
    fn locate(&self, canonical: &str) -> Result<Option<Located>, DimdirError> {
        let store = self.coordinator.relational();

        if let Some(record) = store.address(canonical)? {
            let occurrence = self.structural_occurrence(canonical)?;
            return Ok(Some(Located {
                addr: record.addr,
                registered: true,
                target: record.target,
                kind: record.kind,
                occurrence: occurrence.filter(|o| Some(o.member) == record.target),
            }));
        }

        if let Some(dot) = canonical.rfind(DOTTED_SEPARATOR) {
            let flat = format!("{}{SEGMENT_SEPARATOR}{}", &canonical[..dot], &canonical[dot + 1..]);
            if let Some(record) = store.address(&flat)? {
                let occurrence = self.structural_occurrence(&flat)?;
                return Ok(Some(Located {
                    addr: record.addr,
                    registered: true,
                    target: record.target,
                    kind: record.kind,
                    occurrence: occurrence.filter(|o| Some(o.member) == record.target),
                }));
            }
        }

        if let Some(occ) = self.structural_occurrence(canonical)? {
            let kind = store.unit(occ.member)?.map(|u| u.kind);
            return Ok(Some(Located {
                addr: canonical.to_string(),
                registered: false,
                target: Some(occ.member),
                kind,
                occurrence: Some(occ),
            }));
        }

        if let Some(id) = self.id_literal(canonical)? {
            let kind = store.unit(id)?.map(|u| u.kind);
            return Ok(Some(Located {
                addr: canonical.to_string(),
                registered: false,
                target: Some(id),
                kind,
                occurrence: None,
            }));
        }
        Ok(None)
    }

    /// `container<sep>position` where the container resolves to a unit.
    fn structural_occurrence(&self, canonical: &str) -> Result<Option<Occurrence>, DimdirError> {
        let Some((prefix, position)) = split_position(canonical) else {
            return Ok(None);
        };
        let container = match self.locate(prefix)? {
            Some(located) => located.target,
            None => None,
        };
        match container {
            Some(container) => self
                .coordinator
                .relational()
                .occurrence_at(container, position),
            None => Ok(None),
        }
    }

    /// `doc:<id>` or a bare `<id>` naming a stored unit.
    fn id_literal(&self, canonical: &str) -> Result<Option<UnitId>, DimdirError> {
        let raw = canonical
            .strip_prefix(DOCUMENT_ADDRESS_PREFIX)
            .unwrap_or(canonical);
        if !UnitId::is_canonical(raw) {
            return Ok(None);
        }
        let Ok(id) = raw.parse::<UnitId>() else {
            return Ok(None);
        };
        Ok(self.coordinator.relational().unit(id)?.map(|u| u.id))
    }
}

/// Intermediate result of [`AddressRegistry::locate`].
#[derive(Debug, Clone)]
struct Located {
    addr: String,
    registered: bool,
    target: Option<UnitId>,
    kind: Option<EntityKind>,
    occurrence: Option<Occurrence>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBlobStore, MemoryStore, RelationalStore};
    use crate::types::{ContentHash, ContentUnit, Relation};
    use std::sync::Arc;

    fn registry() -> AddressRegistry {
        AddressRegistry::new(Coordinator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBlobStore::new()),
        ))
    }

    fn add_unit(reg: &AddressRegistry, kind: EntityKind, text: &str) -> UnitId {
        let unit = ContentUnit {
            id: UnitId::mint(),
            kind,
            hash: ContentHash::compute(kind, text),
            text: (kind != EntityKind::Document).then(|| text.to_string()),
        };
        let (stored, _) = reg
            .coordinator
            .relational()
            .insert_unit_if_absent(unit)
            .expect("insert");
        stored.id
    }

    #[test]
    fn attribute_suffix_is_stripped() {
        let parsed = parse_address("A-1_lang=en_draft").expect("parse");
        assert_eq!(parsed.canonical, "A-1");
        assert_eq!(parsed.attributes.get("lang").map(String::as_str), Some("en"));
        assert_eq!(parsed.attributes.get("draft").map(String::as_str), Some("true"));
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        for bad in ["", "a--b", "a-", "a b", "a_=x", "a__b"] {
            assert!(parse_address(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn parent_and_ancestry() {
        assert_eq!(parent_of("doc:x-3"), Some("doc:x"));
        assert_eq!(parent_of("doc:x"), None);
        assert_eq!(ancestry_of("a-b.c"), vec!["a".to_string(), "a-b".to_string()]);
    }

    #[test]
    fn register_auto_creates_parents() {
        let reg = registry();
        reg.register("a-b-c", None, None, &BTreeMap::new())
            .expect("register");
        let store = reg.coordinator.relational();
        let parent = store.address("a-b").expect("read").expect("parent exists");
        assert_eq!(parent.parent.as_deref(), Some("a"));
        assert!(store.address("a").expect("read").is_some());
    }

    #[test]
    fn register_coalesces() {
        let reg = registry();
        let id = add_unit(&reg, EntityKind::Document, "doc");
        reg.register("x", Some(id), Some(EntityKind::Document), &BTreeMap::new())
            .expect("register");
        let again = reg
            .register("x", None, None, &BTreeMap::new())
            .expect("register");
        assert_eq!(again.target, Some(id));
        assert_eq!(again.kind, Some(EntityKind::Document));
    }

    #[test]
    fn dotted_and_flat_token_addresses_agree() {
        let reg = registry();
        let doc = add_unit(&reg, EntityKind::Document, "d");
        let sentence = add_unit(&reg, EntityKind::Sentence, "Cats purr.");
        let token = add_unit(&reg, EntityKind::Token, "purr");
        let store = reg.coordinator.relational();
        store
            .insert_occurrences(&[Occurrence::new(doc, sentence, 0)])
            .expect("occ");
        store
            .insert_occurrences(&[Occurrence::new(sentence, token, 1)])
            .expect("occ");
        reg.register(&document_address(doc), Some(doc), Some(EntityKind::Document), &BTreeMap::new())
            .expect("register");
        reg.register(&format!("doc:{doc}-0"), Some(sentence), Some(EntityKind::Sentence), &BTreeMap::new())
            .expect("register");

        let flat = reg.resolve(&format!("{sentence}-1"), None).expect("flat");
        let dotted = reg.resolve(&format!("{sentence}.1"), None).expect("dotted");
        let nested = reg.resolve(&format!("doc:{doc}-0.1"), None).expect("nested");

        for r in [&flat, &dotted, &nested] {
            assert_eq!(r.target, Some(token));
            assert_eq!(r.kind, Some(EntityKind::Token));
            assert_eq!(r.content.as_deref(), Some("purr"));
            assert_eq!(r.position, Some(1));
        }
        assert!(!flat.registered);
    }

    #[test]
    fn unknown_address_is_not_found() {
        let reg = registry();
        assert!(matches!(
            reg.resolve("doc:nothing-4", None),
            Err(DimdirError::AddressNotFound(_))
        ));
    }

    #[test]
    fn relative_reports_both_directions() {
        let reg = registry();
        let a = add_unit(&reg, EntityKind::Sentence, "Hello.");
        let b = add_unit(&reg, EntityKind::Sentence, "Hallo.");
        reg.register("en", Some(a), None, &BTreeMap::new()).expect("register");
        reg.register("de", Some(b), None, &BTreeMap::new()).expect("register");
        let store = reg.coordinator.relational();
        store
            .upsert_relation(&Relation::new(a, b, "translation"))
            .expect("rel");
        store
            .upsert_relation(&Relation::new(b, a, "source"))
            .expect("rel");

        let res = reg.resolve("en", Some("de")).expect("resolve");
        let rel = res.relative.expect("relative info");
        assert_eq!(rel.forward_relations, vec!["translation".to_string()]);
        assert_eq!(rel.backward_relations, vec!["source".to_string()]);

        assert!(matches!(
            reg.resolve("en", Some("missing")),
            Err(DimdirError::AddressNotFound(_))
        ));
    }

    #[test]
    fn set_attribute_last_write_wins() {
        let reg = registry();
        reg.set_attribute("doc:x", "lang", "en").expect("set");
        reg.set_attribute("doc:x", "lang", "fr").expect("set");
        let res = reg.resolve("doc:x", None).expect("resolve");
        assert_eq!(res.attributes.get("lang").map(String::as_str), Some("fr"));
        assert!(reg.set_attribute("doc:x", "bad_key", "v").is_err());
    }
}
