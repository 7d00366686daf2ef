//! Formula parsing: `[=]name(arg, ...)` with dotted names and nested calls.

use crate::primitives::MAX_FORMULA_DEPTH;
use crate::types::{DimdirError, UnitId};

/// A parsed function call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
}

/// A classified argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// `"quoted"`, quotes removed.
    Str(String),
    /// Spreadsheet cell such as `B12`; column and row are zero-based.
    Cell { raw: String, column: u32, row: u32 },
    /// Address literal such as `doc:<id>-0` or `<id>.3`.
    Address(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Call(Box<Call>),
    /// Anything else, passed through as text.
    Bare(String),
}

/// Parse a formula string.
pub fn parse_formula(formula: &str) -> Result<Call, DimdirError> {
    parse_call(formula, formula, 0)
}

fn parse_call(source: &str, text: &str, depth: usize) -> Result<Call, DimdirError> {
    if depth > MAX_FORMULA_DEPTH {
        return Err(DimdirError::malformed(source, "calls nested too deeply"));
    }
    let text = text.trim();
    let text = text.strip_prefix('=').map_or(text, str::trim_start);

    let open = text
        .find('(')
        .ok_or_else(|| DimdirError::malformed(source, "expected '('"))?;
    if !text.ends_with(')') {
        return Err(DimdirError::malformed(source, "expected ')' at end"));
    }
    let name = text[..open].trim();
    if !is_function_name(name) {
        return Err(DimdirError::malformed(
            source,
            format!("invalid function name '{name}'"),
        ));
    }
    let body = &text[open + 1..text.len() - 1];

    let mut args = Vec::new();
    for raw in split_args(source, body)? {
        args.push(classify(source, &raw, depth)?);
    }
    Ok(Call {
        name: name.to_string(),
        args,
    })
}

/// `word(.word)*` where a word is `[A-Za-z0-9_]+`.
fn is_function_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Split an argument list on top-level commas.
///
/// One pass over the characters tracks whether we are inside a string and
/// how deep in parentheses; only a comma outside both ends an argument.
fn split_args(source: &str, body: &str) -> Result<Vec<String>, DimdirError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut depth: usize = 0;

    for c in body.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '(' if !in_quotes => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_quotes => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| DimdirError::malformed(source, "unbalanced ')'"))?;
                current.push(c);
            }
            ',' if !in_quotes && depth == 0 => {
                args.push(finish_arg(source, &current)?);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if in_quotes {
        return Err(DimdirError::malformed(source, "unterminated string"));
    }
    if depth != 0 {
        return Err(DimdirError::malformed(source, "unbalanced '('"));
    }
    args.push(finish_arg(source, &current)?);
    Ok(args)
}

fn finish_arg(source: &str, raw: &str) -> Result<String, DimdirError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DimdirError::malformed(source, "empty argument"));
    }
    Ok(trimmed.to_string())
}

/// Classify in order: string, cell, address, number, boolean, call, bare.
fn classify(source: &str, raw: &str, depth: usize) -> Result<Arg, DimdirError> {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Ok(Arg::Str(raw[1..raw.len() - 1].to_string()));
    }
    if let Some((column, row)) = parse_cell(raw) {
        return Ok(Arg::Cell {
            raw: raw.to_string(),
            column,
            row,
        });
    }
    if is_address_literal(raw) {
        return Ok(Arg::Address(raw.to_string()));
    }
    if let Some(number) = parse_number(source, raw)? {
        return Ok(number);
    }
    if raw.eq_ignore_ascii_case("true") {
        return Ok(Arg::Bool(true));
    }
    if raw.eq_ignore_ascii_case("false") {
        return Ok(Arg::Bool(false));
    }
    if raw.contains('(') && raw.contains(')') {
        return parse_call(source, raw, depth + 1).map(|call| Arg::Call(Box::new(call)));
    }
    Ok(Arg::Bare(raw.to_string()))
}

/// `[A-Za-z]+[0-9]+` into zero-based (column, row). `A1` is (0, 0).
pub fn parse_cell(raw: &str) -> Option<(u32, u32)> {
    if UnitId::is_canonical(raw) {
        return None;
    }
    let split = raw.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = raw.split_at(split);
    if letters.is_empty()
        || !letters.chars().all(|c| c.is_ascii_alphabetic())
        || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let mut column: u32 = 0;
    for c in letters.chars() {
        let value = u32::from(c.to_ascii_uppercase()) - u32::from('A') + 1;
        column = column.checked_mul(26)?.checked_add(value)?;
    }
    let row: u32 = digits.parse().ok()?;
    Some((column - 1, row.checked_sub(1)?))
}

/// Contains `:` (e.g. `doc:<id>-0`) or is an id with `-`/`.` position
/// suffixes.
fn is_address_literal(raw: &str) -> bool {
    if raw.contains(':') {
        return !raw.contains(['"', '(', ')', ' ']);
    }
    let mut parts = raw.split(['-', '.']);
    parts.next().is_some_and(UnitId::is_canonical)
        && parts.all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// `-?[0-9]+(\.[0-9]+)?`; a `.` makes it a float.
fn parse_number(source: &str, raw: &str) -> Result<Option<Arg>, DimdirError> {
    let unsigned = raw.strip_prefix('-').unwrap_or(raw);
    let (whole, frac) = match unsigned.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (unsigned, None),
    };
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !digits(whole) || frac.is_some_and(|f| !digits(f)) {
        return Ok(None);
    }
    let invalid = |_| DimdirError::malformed(source, format!("number out of range '{raw}'"));
    if frac.is_some() {
        raw.parse().map(|f| Some(Arg::Float(f))).map_err(invalid)
    } else {
        raw.parse::<i64>()
            .map(|i| Some(Arg::Int(i)))
            .map_err(|_| DimdirError::malformed(source, format!("number out of range '{raw}'")))
    }
}
