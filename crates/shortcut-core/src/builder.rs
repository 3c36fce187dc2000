//! Incremental construction of a well-formed action sequence.
//!
//! `FlowBuilder` owns everything one construction run needs: the growing
//! action list, the stack of open branch/loop groups, the identifiers it has
//! minted and a symbol table of named variables. Each step declares its input
//! as an [`Input`]; `Input::Previous` is resolved when the step is pushed,
//! either into an explicit output reference or (in implicit mode) into an
//! absent `WFInput`.

use crate::action::{self, Action, ActionKind, Condition, ControlFlowMode, Param};
use crate::error::{Result, ShortcutError};
use crate::outline::ActionOutline;
use crate::validate;
use crate::value::{self, KeyedMapping, Reference, TypedValue};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifier sources
// ---------------------------------------------------------------------------

pub trait IdSource {
    fn mint(&mut self) -> Uuid;
}

/// Fresh v4 UUIDs; what generation uses.
#[derive(Debug, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn mint(&mut self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic identifiers counting up from a seed.
#[derive(Debug)]
pub struct SequentialIds {
    next: u128,
}

impl SequentialIds {
    pub fn starting_at(seed: u128) -> Self {
        Self { next: seed }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdSource for SequentialIds {
    fn mint(&mut self) -> Uuid {
        let id = Uuid::from_u128(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}

// ---------------------------------------------------------------------------
// DataFlow / Input / StepRef
// ---------------------------------------------------------------------------

/// How "use the previous step's output" is written into the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFlow {
    /// Every input cites its source step by UUID.
    #[default]
    Explicit,
    /// `WFInput` is left out and the runtime chains the previous output.
    Implicit,
}

/// Handle to an action already pushed into the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRef(usize);

impl StepRef {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Previous,
    Variable(String),
    Step(StepRef),
    ShortcutInput,
    Clipboard,
    RepeatItem,
    Value(TypedValue),
}

impl Input {
    pub fn var(name: &str) -> Self {
        Input::Variable(name.to_string())
    }
}

// ---------------------------------------------------------------------------
// Symbol table
// ---------------------------------------------------------------------------

/// Named variables written so far, with the step that last wrote each.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    last_writer: HashMap<String, usize>,
}

impl SymbolTable {
    fn record(&mut self, name: &str, step: usize) {
        self.last_writer.insert(name.to_string(), step);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.last_writer.contains_key(name)
    }

    pub fn last_writer(&self, name: &str) -> Option<StepRef> {
        self.last_writer.get(name).copied().map(StepRef)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.last_writer.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ---------------------------------------------------------------------------
// FlowBuilder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Branch,
    Loop,
}

#[derive(Debug)]
struct OpenGroup {
    id: Uuid,
    kind: GroupKind,
    has_else: bool,
}

pub struct FlowBuilder<I: IdSource> {
    ids: I,
    data_flow: DataFlow,
    actions: Vec<Action>,
    open: Vec<OpenGroup>,
    minted: HashSet<Uuid>,
    symbols: SymbolTable,
}

impl<I: IdSource> FlowBuilder<I> {
    pub fn new(ids: I, data_flow: DataFlow) -> Self {
        Self {
            ids,
            data_flow,
            actions: Vec::new(),
            open: Vec::new(),
            minted: HashSet::new(),
            symbols: SymbolTable::default(),
        }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    fn mint(&mut self) -> Uuid {
        loop {
            let id = self.ids.mint();
            if self.minted.insert(id) {
                return id;
            }
        }
    }

    /// UUID of `step`, assigned on first request.
    pub fn step_id(&mut self, step: StepRef) -> Uuid {
        if let Some(id) = self.actions[step.0].uuid {
            return id;
        }
        let id = self.mint();
        self.actions[step.0].uuid = Some(id);
        id
    }

    /// Direct reference to the primary output of `step`.
    pub fn output_ref(&mut self, step: StepRef) -> Result<TypedValue> {
        let kind = self.actions[step.0].kind;
        let label = kind
            .primary_output()
            .ok_or_else(|| ShortcutError::NoPreviousOutput(kind.identifier()))?;
        let id = self.step_id(step);
        Ok(value::direct_output_ref(id, label))
    }

    /// Direct reference to a variable some earlier step has written.
    pub fn var(&self, name: &str) -> Result<TypedValue> {
        self.require_variable(name)?;
        value::direct_variable_ref(name)
    }

    /// Text interpolating a variable some earlier step has written.
    pub fn text_var(&self, name: &str) -> Result<TypedValue> {
        self.require_variable(name)?;
        value::text_with_variable(name)
    }

    fn require_variable(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ShortcutError::EmptyVariableName);
        }
        if !self.symbols.contains(name) {
            return Err(ShortcutError::UndefinedVariable(name.to_string()));
        }
        Ok(())
    }

    /// Resolve `input` for an action of `consumer` kind. `None` means the
    /// parameter is omitted and the runtime supplies the previous output.
    fn resolve(&mut self, input: Input, consumer: ActionKind) -> Result<Option<TypedValue>> {
        match input {
            Input::Previous => {
                let producer = self
                    .actions
                    .last()
                    .filter(|a| a.control.is_none() && a.kind.primary_output().is_some());
                if producer.is_none() {
                    return Err(ShortcutError::NoPreviousOutput(consumer.identifier()));
                }
                match self.data_flow {
                    DataFlow::Implicit => Ok(None),
                    DataFlow::Explicit => {
                        let step = StepRef(self.actions.len() - 1);
                        self.output_ref(step).map(Some)
                    }
                }
            }
            Input::Variable(name) => self.var(&name).map(Some),
            Input::Step(step) => self.output_ref(step).map(Some),
            Input::ShortcutInput => Ok(Some(value::direct(Reference::ShortcutInput))),
            Input::Clipboard => Ok(Some(value::direct(Reference::Clipboard))),
            Input::RepeatItem => {
                if !self.open.iter().any(|g| g.kind == GroupKind::Loop) {
                    return Err(ShortcutError::ControlFlow(
                        "repeat item used outside a repeat".into(),
                    ));
                }
                Ok(Some(value::direct(Reference::RepeatItem)))
            }
            Input::Value(v) => Ok(Some(v)),
        }
    }

    fn push(&mut self, action: Action) -> StepRef {
        let step = self.actions.len();
        if let Some(name) = action.writes_variable() {
            self.symbols.record(name, step);
        }
        self.actions.push(action);
        StepRef(step)
    }

    fn with_input(action: Action, input: Option<TypedValue>) -> Action {
        match input {
            Some(v) => action.with(action::INPUT, v),
            None => action,
        }
    }

    // -----------------------------------------------------------------------
    // Plain steps
    // -----------------------------------------------------------------------

    pub fn set_variable(&mut self, name: &str, input: Input) -> Result<StepRef> {
        if name.is_empty() {
            return Err(ShortcutError::EmptyVariableName);
        }
        let input = self.resolve(input, ActionKind::SetVariable)?;
        let action = Action::new(ActionKind::SetVariable).with(action::VARIABLE_NAME, name);
        Ok(self.push(Self::with_input(action, input)))
    }

    pub fn get_clipboard(&mut self) -> StepRef {
        self.push(Action::new(ActionKind::GetClipboard))
    }

    pub fn set_clipboard(&mut self, input: Input) -> Result<StepRef> {
        let input = self.resolve(input, ActionKind::SetClipboard)?;
        Ok(self.push(Self::with_input(Action::new(ActionKind::SetClipboard), input)))
    }

    pub fn get_dictionary_value(&mut self, key: &str, input: Input) -> Result<StepRef> {
        let input = self.resolve(input, ActionKind::GetDictionaryValue)?;
        let action = Action::new(ActionKind::GetDictionaryValue).with(action::DICTIONARY_KEY, key);
        Ok(self.push(Self::with_input(action, input)))
    }

    /// Plain GET of `url`.
    pub fn download(&mut self, url: TypedValue) -> StepRef {
        self.push(Action::new(ActionKind::DownloadUrl).with(action::URL, url))
    }

    pub fn post_json(
        &mut self,
        url: TypedValue,
        headers: KeyedMapping,
        body: KeyedMapping,
    ) -> StepRef {
        self.push(
            Action::new(ActionKind::DownloadUrl)
                .with(action::URL, url)
                .with(action::HTTP_METHOD, "POST")
                .with(action::HTTP_HEADERS, headers)
                .with(action::HTTP_BODY_TYPE, "JSON")
                .with(action::JSON_VALUES, body),
        )
    }

    pub fn save_to_camera_roll(&mut self, input: Input) -> Result<StepRef> {
        let input = self.resolve(input, ActionKind::SaveToCameraRoll)?;
        Ok(self.push(Self::with_input(Action::new(ActionKind::SaveToCameraRoll), input)))
    }

    pub fn preview(&mut self, input: Input) -> Result<StepRef> {
        let input = self.resolve(input, ActionKind::PreviewDocument)?;
        Ok(self.push(Self::with_input(Action::new(ActionKind::PreviewDocument), input)))
    }

    pub fn alert(&mut self, title: &str, message: TypedValue, cancel_button: bool) -> StepRef {
        self.push(
            Action::new(ActionKind::Alert)
                .with(action::ALERT_TITLE, title)
                .with(action::ALERT_MESSAGE, message)
                .with(action::ALERT_CANCEL_SHOWN, cancel_button),
        )
    }

    pub fn notify(&mut self, title: &str, body: &str) -> StepRef {
        self.push(
            Action::new(ActionKind::Notification)
                .with(action::NOTIFICATION_TITLE, title)
                .with(action::NOTIFICATION_BODY, body),
        )
    }

    // -----------------------------------------------------------------------
    // Control flow
    // -----------------------------------------------------------------------

    pub fn begin_if(&mut self, input: Input, condition: Condition) -> Result<Uuid> {
        let input = self.resolve(input, ActionKind::Conditional)?;
        let group = self.mint();
        let mut action = Action::marker(ActionKind::Conditional, group, ControlFlowMode::Begin)
            .with(action::CONDITION, condition.code());
        if let Some(operand) = condition.operand() {
            action = action.with(action::CONDITION_STRING, operand);
        }
        if let Some(reference) = input.as_ref().and_then(TypedValue::reference) {
            action = action.with(action::INPUT, Param::ConditionInput(reference.clone()));
        }
        self.push(action);
        self.open.push(OpenGroup {
            id: group,
            kind: GroupKind::Branch,
            has_else: false,
        });
        Ok(group)
    }

    pub fn otherwise(&mut self) -> Result<()> {
        let group = match self.open.last_mut() {
            Some(g) if g.kind == GroupKind::Branch && !g.has_else => {
                g.has_else = true;
                g.id
            }
            Some(g) if g.kind == GroupKind::Branch => {
                return Err(ShortcutError::ControlFlow(
                    "branch already has an otherwise".into(),
                ))
            }
            _ => {
                return Err(ShortcutError::ControlFlow(
                    "otherwise without an open branch".into(),
                ))
            }
        };
        self.push(Action::marker(
            ActionKind::Conditional,
            group,
            ControlFlowMode::Else,
        ));
        Ok(())
    }

    pub fn end_if(&mut self) -> Result<()> {
        self.close(GroupKind::Branch, ActionKind::Conditional)
    }

    pub fn begin_repeat_each(&mut self, input: Input) -> Result<Uuid> {
        let input = self.resolve(input, ActionKind::RepeatEach)?;
        let group = self.mint();
        let action = Action::marker(ActionKind::RepeatEach, group, ControlFlowMode::Begin);
        self.push(Self::with_input(action, input));
        self.open.push(OpenGroup {
            id: group,
            kind: GroupKind::Loop,
            has_else: false,
        });
        Ok(group)
    }

    pub fn end_repeat(&mut self) -> Result<()> {
        self.close(GroupKind::Loop, ActionKind::RepeatEach)
    }

    fn close(&mut self, kind: GroupKind, marker: ActionKind) -> Result<()> {
        let group = match self.open.last() {
            Some(g) if g.kind == kind => g.id,
            Some(_) => {
                return Err(ShortcutError::ControlFlow(format!(
                    "cannot end {} while an inner group is open",
                    marker.as_str()
                )))
            }
            None => {
                return Err(ShortcutError::ControlFlow(format!(
                    "end of {} without a matching begin",
                    marker.as_str()
                )))
            }
        };
        self.open.pop();
        self.push(Action::marker(marker, group, ControlFlowMode::End));
        Ok(())
    }

    /// Close construction: every group must be ended and the sequence must
    /// pass validation.
    pub fn finish(self) -> Result<Vec<Action>> {
        if let Some(g) = self.open.last() {
            return Err(ShortcutError::ControlFlow(format!(
                "group {} was never closed",
                value::format_uuid(&g.id)
            )));
        }
        let outlines: Vec<ActionOutline> = self.actions.iter().map(Action::outline).collect();
        validate::ensure_valid(&outlines)?;
        Ok(self.actions)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::literal;

    fn builder() -> FlowBuilder<SequentialIds> {
        FlowBuilder::new(SequentialIds::default(), DataFlow::Explicit)
    }

    #[test]
    fn previous_resolves_to_explicit_output_reference() {
        let mut b = builder();
        let fetch = b.download(literal("https://example.com"));
        b.set_variable("body", Input::Previous).unwrap();
        let actions = b.finish().unwrap();

        let id = actions[fetch.index()].uuid.expect("producer gets a uuid");
        let refs = actions[1].references();
        assert_eq!(
            refs,
            vec![&Reference::Output {
                step: id,
                label: "Contents of URL".into()
            }]
        );
    }

    #[test]
    fn implicit_mode_omits_input() {
        let mut b = FlowBuilder::new(SequentialIds::default(), DataFlow::Implicit);
        b.download(literal("https://example.com"));
        b.set_variable("body", Input::Previous).unwrap();
        let actions = b.finish().unwrap();
        assert!(actions[0].uuid.is_none());
        assert!(actions[1].param(action::INPUT).is_none());
    }

    #[test]
    fn previous_after_marker_is_rejected() {
        let mut b = builder();
        b.set_variable("x", Input::ShortcutInput).unwrap();
        b.begin_if(Input::var("x"), Condition::HasAnyValue).unwrap();
        let err = b.set_variable("y", Input::Previous).unwrap_err();
        assert!(matches!(err, ShortcutError::NoPreviousOutput(_)));
    }

    #[test]
    fn previous_without_output_is_rejected() {
        let mut b = builder();
        b.notify("t", "b");
        assert!(b.save_to_camera_roll(Input::Previous).is_err());
    }

    #[test]
    fn reading_unwritten_variable_fails() {
        let mut b = builder();
        let err = b.get_dictionary_value("status", Input::var("apiResponse")).unwrap_err();
        assert!(matches!(err, ShortcutError::UndefinedVariable(name) if name == "apiResponse"));
        assert!(b.text_var("nope").is_err());
    }

    #[test]
    fn symbol_table_tracks_last_writer() {
        let mut b = builder();
        let first = b.set_variable("videoURL", Input::ShortcutInput).unwrap();
        assert_eq!(b.symbols().last_writer("videoURL"), Some(first));
        b.get_clipboard();
        let second = b.set_variable("videoURL", Input::Previous).unwrap();
        assert_eq!(b.symbols().last_writer("videoURL"), Some(second));
        assert_eq!(b.symbols().names(), vec!["videoURL"]);
    }

    #[test]
    fn branch_triple_shares_group() {
        let mut b = builder();
        b.set_variable("s", Input::ShortcutInput).unwrap();
        let group = b
            .begin_if(Input::var("s"), Condition::Contains("error".into()))
            .unwrap();
        b.notify("a", "b");
        b.otherwise().unwrap();
        b.notify("c", "d");
        b.end_if().unwrap();
        let actions = b.finish().unwrap();

        let modes: Vec<_> = actions
            .iter()
            .filter_map(|a| a.control)
            .map(|cf| (cf.group, cf.mode))
            .collect();
        assert_eq!(
            modes,
            vec![
                (group, ControlFlowMode::Begin),
                (group, ControlFlowMode::Else),
                (group, ControlFlowMode::End)
            ]
        );
    }

    #[test]
    fn misuse_of_control_flow_is_an_error() {
        let mut b = builder();
        assert!(b.otherwise().is_err());
        assert!(b.end_if().is_err());
        assert!(b.end_repeat().is_err());

        b.set_variable("s", Input::ShortcutInput).unwrap();
        b.begin_if(Input::var("s"), Condition::HasAnyValue).unwrap();
        b.otherwise().unwrap();
        assert!(b.otherwise().is_err());
        assert!(b.end_repeat().is_err());
    }

    #[test]
    fn unclosed_group_fails_finish() {
        let mut b = builder();
        b.set_variable("s", Input::ShortcutInput).unwrap();
        b.begin_if(Input::var("s"), Condition::HasAnyValue).unwrap();
        assert!(matches!(b.finish(), Err(ShortcutError::ControlFlow(_))));
    }

    #[test]
    fn repeat_item_requires_open_loop() {
        let mut b = builder();
        assert!(b.get_dictionary_value("url", Input::RepeatItem).is_err());

        b.set_variable("list", Input::ShortcutInput).unwrap();
        b.begin_repeat_each(Input::var("list")).unwrap();
        b.get_dictionary_value("url", Input::RepeatItem).unwrap();
        b.end_repeat().unwrap();
        b.finish().unwrap();
    }

    #[test]
    fn step_id_is_stable() {
        let mut b = builder();
        let s = b.get_clipboard();
        let a = b.step_id(s);
        let again = b.step_id(s);
        assert_eq!(a, again);
    }

    #[test]
    fn sequential_ids_count_up() {
        let mut ids = SequentialIds::starting_at(7);
        assert_eq!(ids.mint(), Uuid::from_u128(7));
        assert_eq!(ids.mint(), Uuid::from_u128(8));
    }
}
