//! Structural projection of an action sequence.
//!
//! An outline keeps only what well-formedness depends on: identifier, step
//! UUID, group/mode, the references an action reads and the variable it
//! writes. It can be taken from the in-memory model or recovered from a parsed
//! binary document, so both sides of a round trip are checked the same way.

use crate::action::{
    self, Action, ActionKind, ControlFlowMode, CONTROL_FLOW_MODE, GROUPING_IDENTIFIER, UUID_KEY,
};
use crate::document::WORKFLOW_ACTIONS;
use crate::error::{Result, ShortcutError};
use crate::value::Reference;
use plist::{Dictionary, Value};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutline {
    pub identifier: String,
    pub kind: Option<ActionKind>,
    pub uuid: Option<Uuid>,
    pub group: Option<Uuid>,
    pub mode: Option<ControlFlowMode>,
    pub reads: Vec<Reference>,
    pub writes: Option<String>,
}

impl Action {
    pub fn outline(&self) -> ActionOutline {
        ActionOutline {
            identifier: self.kind.identifier(),
            kind: Some(self.kind),
            uuid: self.uuid,
            group: self.control.map(|cf| cf.group),
            mode: self.control.map(|cf| cf.mode),
            reads: self.references().into_iter().cloned().collect(),
            writes: self.writes_variable().map(str::to_string),
        }
    }
}

/// Outline every action of a parsed document.
pub fn from_plist(document: &Value) -> Result<Vec<ActionOutline>> {
    let actions = document
        .as_dictionary()
        .and_then(|d| d.get(WORKFLOW_ACTIONS))
        .and_then(Value::as_array)
        .ok_or_else(|| ShortcutError::Decode(format!("missing {WORKFLOW_ACTIONS}")))?;
    actions
        .iter()
        .enumerate()
        .map(|(i, a)| outline_action(i, a))
        .collect()
}

fn outline_action(index: usize, value: &Value) -> Result<ActionOutline> {
    let d = value
        .as_dictionary()
        .ok_or_else(|| ShortcutError::Decode(format!("action {index} is not a dictionary")))?;
    let identifier = d
        .get("WFWorkflowActionIdentifier")
        .and_then(Value::as_string)
        .ok_or_else(|| ShortcutError::Decode(format!("action {index} has no identifier")))?
        .to_string();
    let empty = Dictionary::new();
    let params = d
        .get("WFWorkflowActionParameters")
        .and_then(Value::as_dictionary)
        .unwrap_or(&empty);

    let uuid = parse_uuid(params, UUID_KEY, index)?;
    let group = parse_uuid(params, GROUPING_IDENTIFIER, index)?;
    let mode = match params.get(CONTROL_FLOW_MODE) {
        None => None,
        Some(v) => {
            let code = v.as_signed_integer().ok_or_else(|| {
                ShortcutError::Decode(format!("action {index}: control flow mode is not an integer"))
            })?;
            Some(ControlFlowMode::from_code(code).ok_or_else(|| {
                ShortcutError::Decode(format!("action {index}: unknown control flow mode {code}"))
            })?)
        }
    };

    let kind = identifier.parse::<ActionKind>().ok();
    let writes = if kind == Some(ActionKind::SetVariable) {
        params
            .get(action::VARIABLE_NAME)
            .and_then(Value::as_string)
            .map(str::to_string)
    } else {
        None
    };

    let mut reads = Vec::new();
    for (key, v) in params.iter() {
        if key == UUID_KEY || key == GROUPING_IDENTIFIER || key == CONTROL_FLOW_MODE {
            continue;
        }
        collect_references(v, &mut reads);
    }

    Ok(ActionOutline {
        identifier,
        kind,
        uuid,
        group,
        mode,
        reads,
        writes,
    })
}

fn parse_uuid(params: &Dictionary, key: &str, index: usize) -> Result<Option<Uuid>> {
    match params.get(key).and_then(Value::as_string) {
        None => Ok(None),
        Some(s) => Uuid::parse_str(s)
            .map(Some)
            .map_err(|e| ShortcutError::Decode(format!("action {index}: bad {key} '{s}': {e}"))),
    }
}

fn collect_references(value: &Value, out: &mut Vec<Reference>) {
    match value {
        Value::Dictionary(d) => {
            let serialization = d.get("WFSerializationType").and_then(Value::as_string);
            if serialization == Some("WFTextTokenAttachment") {
                if let Some(r) = d
                    .get("Value")
                    .and_then(Value::as_dictionary)
                    .and_then(Reference::from_attachment)
                {
                    out.push(r);
                }
                return;
            }
            if let Some(ranges) = d.get("attachmentsByRange").and_then(Value::as_dictionary) {
                out.extend(
                    ranges
                        .values()
                        .filter_map(Value::as_dictionary)
                        .filter_map(Reference::from_attachment),
                );
                return;
            }
            for v in d.values() {
                collect_references(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_references(v, out);
            }
        }
        _ => {}
    }
}
