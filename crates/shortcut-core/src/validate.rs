//! Well-formedness checks over action outlines.
//!
//! Groups: every begin is matched by exactly one end of the same group and
//! kind, with at most one else in between (branches only), and no group
//! identifier is opened twice. References: output references point at a step
//! UUID assigned exactly once by an earlier action, using an output label that
//! action actually produces; variables are written before they are read; the
//! repeat item is only read inside a loop.

use crate::action::{ActionKind, ControlFlowMode};
use crate::error::{Result, ShortcutError};
use crate::outline::ActionOutline;
use crate::value::{format_uuid, Reference};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    UnknownAction { index: usize, identifier: String },
    MissingGroup { index: usize },
    ReusedGroup { index: usize, group: Uuid },
    UnexpectedMarker { index: usize, group: Uuid, mode: ControlFlowMode },
    DuplicateElse { index: usize, group: Uuid },
    ElseInLoop { index: usize, group: Uuid },
    UnclosedGroup { index: usize, group: Uuid },
    DuplicateStepId { index: usize, step: Uuid },
    DanglingReference { index: usize, step: Uuid },
    UnknownOutput { index: usize, step: Uuid, label: String },
    UndefinedVariable { index: usize, name: String },
    RepeatItemOutsideLoop { index: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::UnknownAction { index, identifier } => {
                write!(f, "#{index}: unknown action '{identifier}'")
            }
            Violation::MissingGroup { index } => {
                write!(f, "#{index}: control flow action without group or mode")
            }
            Violation::ReusedGroup { index, group } => {
                write!(f, "#{index}: group {} opened more than once", format_uuid(group))
            }
            Violation::UnexpectedMarker { index, group, mode } => write!(
                f,
                "#{index}: {mode} of group {} does not match the innermost open group",
                format_uuid(group)
            ),
            Violation::DuplicateElse { index, group } => {
                write!(f, "#{index}: second else in group {}", format_uuid(group))
            }
            Violation::ElseInLoop { index, group } => {
                write!(f, "#{index}: else inside repeat group {}", format_uuid(group))
            }
            Violation::UnclosedGroup { index, group } => write!(
                f,
                "#{index}: group {} is never closed",
                format_uuid(group)
            ),
            Violation::DuplicateStepId { index, step } => {
                write!(f, "#{index}: step id {} assigned twice", format_uuid(step))
            }
            Violation::DanglingReference { index, step } => write!(
                f,
                "#{index}: reference to step {} which no earlier action carries",
                format_uuid(step)
            ),
            Violation::UnknownOutput { index, step, label } => write!(
                f,
                "#{index}: step {} has no output named '{label}'",
                format_uuid(step)
            ),
            Violation::UndefinedVariable { index, name } => {
                write!(f, "#{index}: variable '{name}' read before it is set")
            }
            Violation::RepeatItemOutsideLoop { index } => {
                write!(f, "#{index}: repeat item read outside a repeat")
            }
        }
    }
}

/// Run every check.
pub fn check(outlines: &[ActionOutline]) -> Vec<Violation> {
    let mut violations: Vec<Violation> = outlines
        .iter()
        .enumerate()
        .filter(|(_, o)| o.kind.is_none())
        .map(|(index, o)| Violation::UnknownAction {
            index,
            identifier: o.identifier.clone(),
        })
        .collect();
    violations.extend(check_groups(outlines));
    violations.extend(check_references(outlines));
    violations
}

pub fn ensure_valid(outlines: &[ActionOutline]) -> Result<()> {
    let violations = check(outlines);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ShortcutError::Invalid(violations))
    }
}

struct Open {
    group: Uuid,
    kind: ActionKind,
    has_else: bool,
    opened_at: usize,
}

pub fn check_groups(outlines: &[ActionOutline]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    let mut seen: HashSet<Uuid> = HashSet::new();

    for (index, o) in outlines.iter().enumerate() {
        let Some(kind) = o.kind.filter(|k| k.is_control_flow()) else {
            continue;
        };
        let (Some(group), Some(mode)) = (o.group, o.mode) else {
            violations.push(Violation::MissingGroup { index });
            continue;
        };
        match mode {
            ControlFlowMode::Begin => {
                if !seen.insert(group) {
                    violations.push(Violation::ReusedGroup { index, group });
                }
                stack.push(Open {
                    group,
                    kind,
                    has_else: false,
                    opened_at: index,
                });
            }
            ControlFlowMode::Else => match stack.last_mut() {
                Some(top) if top.group == group && top.kind == kind => {
                    if kind == ActionKind::RepeatEach {
                        violations.push(Violation::ElseInLoop { index, group });
                    } else if top.has_else {
                        violations.push(Violation::DuplicateElse { index, group });
                    } else {
                        top.has_else = true;
                    }
                }
                _ => violations.push(Violation::UnexpectedMarker { index, group, mode }),
            },
            ControlFlowMode::End => match stack.last() {
                Some(top) if top.group == group && top.kind == kind => {
                    stack.pop();
                }
                _ => violations.push(Violation::UnexpectedMarker { index, group, mode }),
            },
        }
    }

    violations.extend(stack.into_iter().map(|open| Violation::UnclosedGroup {
        index: open.opened_at,
        group: open.group,
    }));
    violations
}

pub fn check_references(outlines: &[ActionOutline]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut assigned: HashMap<Uuid, Option<ActionKind>> = HashMap::new();
    let mut written: HashSet<&str> = HashSet::new();
    let mut loop_depth = 0usize;

    for (index, o) in outlines.iter().enumerate() {
        for r in &o.reads {
            match r {
                Reference::Output { step, label } => match assigned.get(step) {
                    None => violations.push(Violation::DanglingReference { index, step: *step }),
                    Some(Some(kind)) if !kind.outputs().contains(&label.as_str()) => {
                        violations.push(Violation::UnknownOutput {
                            index,
                            step: *step,
                            label: label.clone(),
                        })
                    }
                    Some(_) => {}
                },
                Reference::Variable(name) => {
                    if !written.contains(name.as_str()) {
                        violations.push(Violation::UndefinedVariable {
                            index,
                            name: name.clone(),
                        });
                    }
                }
                Reference::RepeatItem => {
                    if loop_depth == 0 {
                        violations.push(Violation::RepeatItemOutsideLoop { index });
                    }
                }
                Reference::ShortcutInput | Reference::Clipboard => {}
            }
        }

        if let Some(step) = o.uuid {
            if assigned.insert(step, o.kind).is_some() {
                violations.push(Violation::DuplicateStepId { index, step });
            }
        }
        if let Some(name) = &o.writes {
            written.insert(name);
        }
        if o.kind == Some(ActionKind::RepeatEach) {
            match o.mode {
                Some(ControlFlowMode::Begin) => loop_depth += 1,
                Some(ControlFlowMode::End) => loop_depth = loop_depth.saturating_sub(1),
                _ => {}
            }
        }
    }
    violations
}
