//! # CLI Command Implementations

use super::{CliError, MappingAction};
use crate::api::{self, AppState, FormulaRequest};
use crate::config::{DimdirConfig, SecurityConfig};
use dimdir_core::{DocumentIndex, EntityKind, NewDocument, UnitId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// HELPERS
// =============================================================================

fn open(config: &DimdirConfig) -> Result<DocumentIndex, CliError> {
    Ok(config.open_index()?)
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, CliError> {
    let canonical = path.canonicalize().map_err(|e| {
        CliError::Usage(format!("Invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(CliError::Usage(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Reject files above `max_bytes` before reading them.
fn validate_file_size(path: &Path, max_bytes: usize) -> Result<(), CliError> {
    let len = std::fs::metadata(path)?.len();
    if len > max_bytes as u64 {
        return Err(CliError::Usage(format!(
            "File size {len} bytes exceeds maximum allowed {max_bytes} bytes"
        )));
    }
    Ok(())
}

/// Split `KEY=value` arguments.
fn parse_pairs(raw: &[String], what: &str) -> Result<BTreeMap<String, String>, CliError> {
    raw.iter()
        .map(|pair| {
            pair.split_once('=')
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| CliError::Usage(format!("Invalid {what} '{pair}', expected KEY=VALUE")))
        })
        .collect()
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

pub async fn cmd_server(config: &DimdirConfig, host: &str, port: u16) -> Result<(), CliError> {
    let index = open(config)?;
    let security = SecurityConfig::from_env();

    println!("Dimdir Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:        {}", host);
    println!("  Port:        {}", port);
    println!("  Data dir:    {}", config.data_dir.display());
    println!("  Granularity: {:?}", config.granularity);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    let state = AppState::new(index, config.max_text_bytes);
    api::run_server(&addr, state, &security).await?;
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

pub fn cmd_status(config: &DimdirConfig, json: bool) -> Result<(), CliError> {
    let status = open(config)?.status()?;
    if json {
        print_json(&status);
        return Ok(());
    }

    println!("Dimdir Index Status");
    println!("===================");
    println!("Data dir:  {}", config.data_dir.display());
    println!();
    println!("Documents: {}", status.documents);
    println!("Sentences: {}", status.sentences);
    println!("Tokens:    {}", status.tokens);
    println!("Relations: {}", status.relations);
    println!("Mappings:  {}", status.mappings);
    for (kind, count) in &status.pending {
        if *count > 0 {
            println!("Pending {kind}: {count}");
        }
    }
    Ok(())
}

// =============================================================================
// INGEST / SEARCH
// =============================================================================

pub fn cmd_ingest(
    config: &DimdirConfig,
    json: bool,
    file: &Path,
    long_id: String,
    short_id: Option<String>,
    title: Option<String>,
) -> Result<(), CliError> {
    let path = validate_file_path(file)?;
    validate_file_size(&path, config.max_text_bytes)?;
    let content = std::fs::read_to_string(&path)?;
    tracing::info!("Ingesting {:?} into '{}'", path, long_id);

    let report = open(config)?.ingest_document(NewDocument {
        content,
        long_id,
        short_id,
        title,
        source: Some(path.display().to_string()),
    })?;

    if json {
        print_json(&report);
        return Ok(());
    }
    let new_sentences = report.sentences.iter().filter(|s| s.is_new).count();
    println!("Document:  {}", report.address);
    println!("Mapping:   {} -> {}", report.long_id, report.short_id);
    println!(
        "Sentences: {} ({} new){}",
        report.sentences.len(),
        new_sentences,
        if report.is_new { "" } else { ", document already indexed" }
    );
    Ok(())
}

pub fn cmd_search(
    config: &DimdirConfig,
    json: bool,
    sentence: Option<&str>,
    token: Option<&str>,
) -> Result<(), CliError> {
    let index = open(config)?;
    match (sentence, token) {
        (Some(text), _) => {
            let found = index.find_documents_with_sentence(text)?;
            if json {
                print_json(&found);
            } else if found.is_empty() {
                println!("Sentence not indexed");
            } else {
                for place in found {
                    println!("{}", place.address);
                }
            }
        }
        (None, Some(token)) => {
            let hits = index.search_by_token(token)?;
            if json {
                print_json(&hits);
            } else {
                for hit in hits {
                    println!(
                        "{}  {}",
                        hit.address,
                        hit.sentence_text.unwrap_or_default()
                    );
                }
            }
        }
        (None, None) => {
            return Err(CliError::Usage("Give --sentence or --token".into()));
        }
    }
    Ok(())
}

// =============================================================================
// ADDRESSES / RELATIONS / FORMULAS
// =============================================================================

pub fn cmd_resolve(
    config: &DimdirConfig,
    json: bool,
    address: &str,
    relative_to: Option<&str>,
) -> Result<(), CliError> {
    let res = open(config)?.resolve(address, relative_to)?;
    if json {
        print_json(&res);
        return Ok(());
    }

    println!("Address:    {}", res.addr);
    println!("Registered: {}", res.registered);
    if let Some(target) = res.target {
        println!("Target:     {}", target);
    }
    if let Some(kind) = res.kind {
        println!("Kind:       {}", kind);
    }
    if !res.ancestry.is_empty() {
        println!("Ancestry:   {}", res.ancestry.join(" > "));
    }
    for (key, value) in &res.attributes {
        println!("  {key} = {value}");
    }
    if let Some(content) = &res.content {
        println!();
        println!("{content}");
    }
    Ok(())
}

pub fn cmd_link(
    config: &DimdirConfig,
    json: bool,
    source: &str,
    target: &str,
    relation_type: &str,
    remove: bool,
) -> Result<(), CliError> {
    let index = open(config)?;
    if remove {
        let removed = index.unlink(source, target, relation_type)?;
        if json {
            print_json(&serde_json::json!({ "removed": removed }));
        } else {
            println!("{}", if removed { "Relation removed" } else { "No such relation" });
        }
        return Ok(());
    }

    let outcome = index.link(source, target, relation_type)?;
    if json {
        print_json(&outcome);
    } else {
        println!(
            "{} -[{}]-> {}{}",
            outcome.relation.source,
            outcome.relation.relation_type,
            outcome.relation.target,
            if outcome.created { "" } else { " (exists)" }
        );
    }
    Ok(())
}

pub fn cmd_eval(
    config: &DimdirConfig,
    json: bool,
    formula: String,
    cells: &[String],
    columns: &[String],
    context: Option<String>,
) -> Result<(), CliError> {
    let mut sheet = BTreeMap::new();
    for (column, id) in parse_pairs(columns, "column")? {
        sheet.insert(column, id.parse::<UnitId>()?);
    }
    let request = FormulaRequest {
        formula,
        cells: parse_pairs(cells, "cell")?,
        sheet,
        context,
    };
    let resolver = request.resolver()?;
    let value = open(config)?.evaluate(&request.formula, resolver.as_ref(), request.context_cell()?)?;

    if json {
        print_json(&value);
    } else {
        println!("{}", serde_json::to_string(&value).unwrap_or_default());
    }
    Ok(())
}

// =============================================================================
// MAPPINGS
// =============================================================================

pub fn cmd_mappings(
    config: &DimdirConfig,
    json: bool,
    action: MappingAction,
) -> Result<(), CliError> {
    let index = open(config)?;
    match action {
        MappingAction::List => {
            let mappings = index.mappings()?;
            if json {
                print_json(&mappings);
            } else {
                for m in mappings {
                    println!(
                        "{} = {}{}",
                        m.long_id,
                        m.short_id,
                        m.description.map(|d| format!("  ({d})")).unwrap_or_default()
                    );
                }
            }
        }
        MappingAction::Add {
            long_id,
            short_id,
            description,
        } => {
            let outcome =
                index.register_mapping(&long_id, short_id.as_deref(), description.as_deref())?;
            if json {
                print_json(&outcome);
            } else if outcome.created {
                println!("{} = {}", outcome.mapping.long_id, outcome.mapping.short_id);
            } else {
                println!(
                    "{} already mapped to {}",
                    outcome.mapping.long_id, outcome.mapping.short_id
                );
            }
        }
        MappingAction::Remove { long_id } => {
            let removed = index.remove_mapping(&long_id)?;
            if json {
                print_json(&removed);
            } else if removed.is_some() {
                println!("Removed mapping '{long_id}'");
            } else {
                println!("No mapping for '{long_id}'");
            }
        }
    }
    Ok(())
}

// =============================================================================
// MAINTENANCE
// =============================================================================

pub fn cmd_pending(config: &DimdirConfig, json: bool, kind: EntityKind) -> Result<(), CliError> {
    let ids = open(config)?.list_pending(kind)?;
    if json {
        print_json(&ids);
    } else {
        println!("{} pending {kind} unit(s)", ids.len());
        for id in ids {
            println!("  {id}");
        }
    }
    Ok(())
}

pub fn cmd_repair(config: &DimdirConfig, json: bool, kind: EntityKind) -> Result<(), CliError> {
    let report = open(config)?.repair_pending(kind)?;
    if json {
        print_json(&report);
    } else {
        println!(
            "Repaired {} {kind} unit(s), {} still pending",
            report.repaired.len(),
            report.remaining.len()
        );
    }
    Ok(())
}

pub fn cmd_sweep(config: &DimdirConfig, json: bool, kind: EntityKind) -> Result<(), CliError> {
    let removed = open(config)?.sweep_orphans(kind)?;
    if json {
        print_json(&removed);
    } else {
        println!("Removed {} orphaned {kind} payload(s)", removed.len());
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
