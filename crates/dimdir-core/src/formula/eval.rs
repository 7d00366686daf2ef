//! Formula evaluation against the address registry and relation graph.

use super::parser::{Arg, Call, parse_formula};
use super::{CellPosition, CellResolver, FormulaValue};
use crate::address::AddressRegistry;
use crate::relation::RelationGraph;
use crate::types::{DimdirError, UnitId};
use tracing::debug;

/// Names of the registered functions.
pub const BUILTINS: [&str; 5] = ["rel", "rel.all", "rel.count", "addr", "uuid"];

/// Evaluates formulas. Borrowed per request; holds no state of its own.
#[derive(Debug, Clone, Copy)]
pub struct FormulaEngine<'a> {
    registry: &'a AddressRegistry,
    relations: &'a RelationGraph,
    cells: &'a dyn CellResolver,
}

impl<'a> FormulaEngine<'a> {
    pub fn new(
        registry: &'a AddressRegistry,
        relations: &'a RelationGraph,
        cells: &'a dyn CellResolver,
    ) -> Self {
        Self {
            registry,
            relations,
            cells,
        }
    }

    /// Parse and evaluate `formula`. `context` is the formula's own cell.
    pub fn evaluate(
        &self,
        formula: &str,
        context: Option<CellPosition>,
    ) -> Result<FormulaValue, DimdirError> {
        let call = parse_formula(formula)?;
        let value = self.call(formula, &call, context)?;
        debug!(formula, "formula evaluated");
        Ok(value)
    }

    fn call(
        &self,
        source: &str,
        call: &Call,
        context: Option<CellPosition>,
    ) -> Result<FormulaValue, DimdirError> {
        if !BUILTINS.contains(&call.name.as_str()) {
            return Err(DimdirError::UnknownFunction(call.name.clone()));
        }
        let args = call
            .args
            .iter()
            .map(|arg| self.value(source, arg, context))
            .collect::<Result<Vec<_>, _>>()?;
        let name = call.name.as_str();

        match (name, args.as_slice()) {
            ("rel", [addr, ty]) => {
                let source_id = self.source_id(text(source, name, addr)?)?;
                let related = self
                    .relations
                    .related(source_id, Some(text(source, name, ty)?))?;
                Ok(related
                    .into_iter()
                    .next()
                    .and_then(|item| item.content)
                    .map_or(FormulaValue::Null, FormulaValue::Text))
            }
            ("rel.all", [addr, ty]) => {
                let source_id = self.source_id(text(source, name, addr)?)?;
                let related = self
                    .relations
                    .related(source_id, Some(text(source, name, ty)?))?;
                Ok(FormulaValue::List(
                    related
                        .into_iter()
                        .map(|item| item.content.map_or(FormulaValue::Null, FormulaValue::Text))
                        .collect(),
                ))
            }
            ("rel.count", [addr]) => {
                let source_id = self.source_id(text(source, name, addr)?)?;
                let count = self.relations.related_count(source_id, None)?;
                Ok(FormulaValue::Int(count as i64))
            }
            ("rel.count", [addr, ty]) => {
                let source_id = self.source_id(text(source, name, addr)?)?;
                let count = self
                    .relations
                    .related_count(source_id, Some(text(source, name, ty)?))?;
                Ok(FormulaValue::Int(count as i64))
            }
            ("addr", [id]) => {
                let raw = text(source, name, id)?;
                let id: UnitId = raw.parse().map_err(|_| {
                    DimdirError::malformed(source, format!("addr: invalid id '{raw}'"))
                })?;
                Ok(FormulaValue::List(
                    self.registry
                        .addresses_of(id)?
                        .into_iter()
                        .map(FormulaValue::Text)
                        .collect(),
                ))
            }
            ("uuid", [addr]) => {
                let id = self.source_id(text(source, name, addr)?)?;
                Ok(FormulaValue::Text(id.to_string()))
            }
            _ => Err(DimdirError::malformed(
                source,
                format!("{name}: wrong number of arguments ({})", args.len()),
            )),
        }
    }

    fn value(
        &self,
        source: &str,
        arg: &Arg,
        context: Option<CellPosition>,
    ) -> Result<FormulaValue, DimdirError> {
        Ok(match arg {
            Arg::Str(s) | Arg::Address(s) | Arg::Bare(s) => FormulaValue::Text(s.clone()),
            Arg::Cell { raw, column, row } => {
                let addr = self
                    .cells
                    .resolve_cell(*column, *row, context)?
                    .ok_or_else(|| DimdirError::AddressNotFound(raw.clone()))?;
                FormulaValue::Text(addr)
            }
            Arg::Int(i) => FormulaValue::Int(*i),
            Arg::Float(f) => FormulaValue::Float(*f),
            Arg::Bool(b) => FormulaValue::Bool(*b),
            Arg::Call(call) => self.call(source, call, context)?,
        })
    }

    /// Id behind an address argument.
    fn source_id(&self, addr: &str) -> Result<UnitId, DimdirError> {
        match self.registry.resolve_target(addr) {
            Ok(Some(id)) => Ok(id),
            Ok(None) | Err(DimdirError::InvalidContent(_)) => {
                Err(DimdirError::AddressNotFound(addr.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

fn text<'v>(source: &str, function: &str, value: &'v FormulaValue) -> Result<&'v str, DimdirError> {
    match value {
        FormulaValue::Text(s) => Ok(s),
        other => Err(DimdirError::malformed(
            source,
            format!("{function}: expected text argument, got {other:?}"),
        )),
    }
}
