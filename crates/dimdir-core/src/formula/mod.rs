//! # Formula Engine
//!
//! A flat function-call language over addresses and relations:
//!
//! ```text
//! =rel(A1, "translation")        first related content, or null
//! =rel.all(doc:<id>-0, "cites")  every related content
//! =rel.count(A1)                 number of outgoing relations
//! =addr(<id>)                    addresses naming an id
//! =uuid(doc:<id>-0)              id behind an address
//! ```
//!
//! Arguments may be nested calls. Cell references such as `A1` are mapped to
//! addresses by a [`CellResolver`].

mod eval;
mod parser;

pub use eval::{BUILTINS, FormulaEngine};
pub use parser::{Arg, Call, parse_cell, parse_formula};

use crate::address::document_address;
use crate::types::{DimdirError, UnitId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value produced by a formula.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FormulaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FormulaValue>),
}

/// Zero-based position of the cell holding the formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellPosition {
    pub column: u32,
    pub row: u32,
}

/// Maps spreadsheet cell references to addresses.
pub trait CellResolver: Send + Sync + std::fmt::Debug {
    /// Address for the cell at zero-based `(column, row)`, or `None` if the
    /// cell is not mapped. `context` is the formula's own cell.
    fn resolve_cell(
        &self,
        column: u32,
        row: u32,
        context: Option<CellPosition>,
    ) -> Result<Option<String>, DimdirError>;
}

/// Resolver with no cells mapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCells;

impl CellResolver for NoCells {
    fn resolve_cell(
        &self,
        _column: u32,
        _row: u32,
        _context: Option<CellPosition>,
    ) -> Result<Option<String>, DimdirError> {
        Ok(None)
    }
}

/// Explicit cell-to-address table, keyed by references like `"B3"`.
#[derive(Debug, Clone, Default)]
pub struct CellMap {
    cells: BTreeMap<(u32, u32), String>,
}

impl CellMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a cell reference to an address.
    pub fn insert(&mut self, cell: &str, address: impl Into<String>) -> Result<(), DimdirError> {
        let key = parse_cell(cell).ok_or_else(|| {
            DimdirError::InvalidContent(format!("invalid cell reference '{cell}'"))
        })?;
        self.cells.insert(key, address.into());
        Ok(())
    }

    /// Build from `(cell, address)` pairs.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, DimdirError> {
        let mut map = Self::new();
        for (cell, address) in pairs {
            map.insert(cell, address)?;
        }
        Ok(map)
    }
}

impl CellResolver for CellMap {
    fn resolve_cell(
        &self,
        column: u32,
        row: u32,
        _context: Option<CellPosition>,
    ) -> Result<Option<String>, DimdirError> {
        Ok(self.cells.get(&(column, row)).cloned())
    }
}

/// Sheet layout: each column shows one document, row `n` its sentence at
/// position `n - 1`.
///
/// A cell in an unmapped column falls back to the document of the
/// formula's own column, when that one is mapped.
#[derive(Debug, Clone, Default)]
pub struct SheetLayout {
    columns: BTreeMap<u32, UnitId>,
}

impl SheetLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `document` in zero-based `column`.
    #[must_use]
    pub fn with_column(mut self, column: u32, document: UnitId) -> Self {
        self.columns.insert(column, document);
        self
    }
}

impl CellResolver for SheetLayout {
    fn resolve_cell(
        &self,
        column: u32,
        row: u32,
        context: Option<CellPosition>,
    ) -> Result<Option<String>, DimdirError> {
        let document = self
            .columns
            .get(&column)
            .or_else(|| context.and_then(|ctx| self.columns.get(&ctx.column)));
        Ok(document.map(|doc| format!("{}-{row}", document_address(*doc))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_map_lookup() {
        let map = CellMap::from_pairs([("A1", "doc:x-0"), ("b2", "doc:x-1")]).expect("map");
        assert_eq!(
            map.resolve_cell(1, 1, None).expect("resolve").as_deref(),
            Some("doc:x-1")
        );
        assert_eq!(map.resolve_cell(2, 0, None).expect("resolve"), None);
        assert!(CellMap::new().insert("11", "x").is_err());
    }

    #[test]
    fn sheet_layout_rows_are_positions() {
        let doc = UnitId::mint();
        let layout = SheetLayout::new().with_column(0, doc);
        assert_eq!(
            layout.resolve_cell(0, 2, None).expect("resolve"),
            Some(format!("doc:{doc}-2"))
        );
        assert_eq!(layout.resolve_cell(1, 0, None).expect("resolve"), None);
        let ctx = CellPosition { column: 0, row: 5 };
        assert_eq!(
            layout.resolve_cell(1, 0, Some(ctx)).expect("resolve"),
            Some(format!("doc:{doc}-0"))
        );
    }
}
