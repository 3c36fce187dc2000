use crate::output::{print_json, print_table, short_id};
use anyhow::{bail, Context};
use serde::Serialize;
use shortcut_core::document::Document;
use shortcut_core::outline::{self, ActionOutline};
use shortcut_core::validate;
use shortcut_core::value::format_uuid;
use std::path::Path;

#[derive(Serialize)]
struct OutlineRow {
    index: usize,
    identifier: String,
    uuid: Option<String>,
    group: Option<String>,
    mode: Option<String>,
    reads: Vec<String>,
    writes: Option<String>,
}

impl OutlineRow {
    fn new(index: usize, o: &ActionOutline) -> Self {
        Self {
            index,
            identifier: o.identifier.clone(),
            uuid: o.uuid.as_ref().map(format_uuid),
            group: o.group.as_ref().map(format_uuid),
            mode: o.mode.map(|m| m.to_string()),
            reads: o.reads.iter().map(|r| r.to_string()).collect(),
            writes: o.writes.clone(),
        }
    }
}

#[derive(Serialize)]
struct InspectOutput<'a> {
    file: &'a Path,
    actions: Vec<OutlineRow>,
    violations: Vec<String>,
}

pub fn run(file: &Path, json: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;
    let plist = Document::read_binary(&bytes)
        .with_context(|| format!("{} is not a shortcut document", file.display()))?;
    let outlines = outline::from_plist(&plist).context("failed to outline actions")?;
    let violations: Vec<String> = validate::check(&outlines)
        .iter()
        .map(|v| v.to_string())
        .collect();
    let rows: Vec<OutlineRow> = outlines
        .iter()
        .enumerate()
        .map(|(i, o)| OutlineRow::new(i, o))
        .collect();

    if json {
        print_json(&InspectOutput {
            file,
            actions: rows,
            violations: violations.clone(),
        })?;
    } else {
        let table: Vec<Vec<String>> = rows
            .iter()
            .map(|r| {
                vec![
                    r.index.to_string(),
                    r.identifier
                        .strip_prefix("is.workflow.actions.")
                        .unwrap_or(&r.identifier)
                        .to_string(),
                    r.uuid.as_deref().map(short_id).unwrap_or_default(),
                    r.group.as_deref().map(short_id).unwrap_or_default(),
                    r.mode.clone().unwrap_or_default(),
                    r.writes.clone().unwrap_or_default(),
                    r.reads.join(", "),
                ]
            })
            .collect();
        print_table(
            &["#", "ACTION", "UUID", "GROUP", "MODE", "WRITES", "READS"],
            &table,
        );
        println!();
        if violations.is_empty() {
            println!("{} actions, no violations", rows.len());
        } else {
            for v in &violations {
                println!("violation {v}");
            }
        }
    }

    if !violations.is_empty() {
        bail!("{} violation(s) in {}", violations.len(), file.display());
    }
    Ok(())
}
