//! The fixed action catalog and the action record.
//!
//! An `Action` is one step of the document: a catalog identifier, an ordered
//! parameter list, an optional step UUID (only when something later refers to
//! its output) and, for branch and loop markers, the group/mode pair.

use crate::error::ShortcutError;
use crate::value::{format_uuid, KeyedMapping, Reference, TypedValue};
use plist::{Dictionary, Value};
use std::fmt;
use uuid::Uuid;

const IDENTIFIER_PREFIX: &str = "is.workflow.actions.";

// Parameter keys shared by several actions.
pub const INPUT: &str = "WFInput";
pub const VARIABLE_NAME: &str = "WFVariableName";
pub const DICTIONARY_KEY: &str = "WFDictionaryKey";
pub const URL: &str = "WFURL";
pub const HTTP_METHOD: &str = "WFHTTPMethod";
pub const HTTP_HEADERS: &str = "WFHTTPHeaders";
pub const HTTP_BODY_TYPE: &str = "WFHTTPBodyType";
pub const JSON_VALUES: &str = "WFJSONValues";
pub const CONDITION: &str = "WFCondition";
pub const CONDITION_STRING: &str = "WFConditionalActionString";
pub const ALERT_TITLE: &str = "WFAlertActionTitle";
pub const ALERT_MESSAGE: &str = "WFAlertActionMessage";
pub const ALERT_CANCEL_SHOWN: &str = "WFAlertActionCancelButtonShown";
pub const NOTIFICATION_TITLE: &str = "WFNotificationActionTitle";
pub const NOTIFICATION_BODY: &str = "WFNotificationActionBody";

pub const GROUPING_IDENTIFIER: &str = "GroupingIdentifier";
pub const CONTROL_FLOW_MODE: &str = "WFControlFlowMode";
pub const UUID_KEY: &str = "UUID";

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    SetVariable,
    GetClipboard,
    SetClipboard,
    DownloadUrl,
    GetDictionaryValue,
    Conditional,
    RepeatEach,
    SaveToCameraRoll,
    Alert,
    Notification,
    PreviewDocument,
}

impl ActionKind {
    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::SetVariable,
            ActionKind::GetClipboard,
            ActionKind::SetClipboard,
            ActionKind::DownloadUrl,
            ActionKind::GetDictionaryValue,
            ActionKind::Conditional,
            ActionKind::RepeatEach,
            ActionKind::SaveToCameraRoll,
            ActionKind::Alert,
            ActionKind::Notification,
            ActionKind::PreviewDocument,
        ]
    }

    /// Catalog name without the reverse-DNS prefix.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::SetVariable => "setvariable",
            ActionKind::GetClipboard => "getclipboard",
            ActionKind::SetClipboard => "setclipboard",
            ActionKind::DownloadUrl => "downloadurl",
            ActionKind::GetDictionaryValue => "getvalueforkey",
            ActionKind::Conditional => "conditional",
            ActionKind::RepeatEach => "repeat.each",
            ActionKind::SaveToCameraRoll => "savetocameraroll",
            ActionKind::Alert => "alert",
            ActionKind::Notification => "notification",
            ActionKind::PreviewDocument => "previewdocument",
        }
    }

    pub fn identifier(self) -> String {
        format!("{IDENTIFIER_PREFIX}{}", self.as_str())
    }

    /// Named outputs the runtime exposes for this action. Branch and loop
    /// outputs belong to their end marker.
    pub fn outputs(self) -> &'static [&'static str] {
        match self {
            ActionKind::GetClipboard => &["Clipboard"],
            ActionKind::DownloadUrl => &["Contents of URL"],
            ActionKind::GetDictionaryValue => &["Dictionary Value"],
            ActionKind::Conditional => &["If Result"],
            ActionKind::RepeatEach => &["Repeat Results"],
            ActionKind::SaveToCameraRoll => &["Saved Photo Media"],
            ActionKind::SetVariable
            | ActionKind::SetClipboard
            | ActionKind::Alert
            | ActionKind::Notification
            | ActionKind::PreviewDocument => &[],
        }
    }

    pub fn primary_output(self) -> Option<&'static str> {
        self.outputs().first().copied()
    }

    pub fn is_control_flow(self) -> bool {
        matches!(self, ActionKind::Conditional | ActionKind::RepeatEach)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{IDENTIFIER_PREFIX}{}", self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = ShortcutError;

    /// Accepts either the full identifier or the bare catalog name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix(IDENTIFIER_PREFIX).unwrap_or(s);
        ActionKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| ShortcutError::Decode(format!("unknown action identifier '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// ControlFlowMode / ControlFlow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlFlowMode {
    Begin,
    Else,
    End,
}

impl ControlFlowMode {
    pub fn code(self) -> i64 {
        match self {
            ControlFlowMode::Begin => 0,
            ControlFlowMode::Else => 1,
            ControlFlowMode::End => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ControlFlowMode::Begin),
            1 => Some(ControlFlowMode::Else),
            2 => Some(ControlFlowMode::End),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlFlowMode::Begin => "begin",
            ControlFlowMode::Else => "else",
            ControlFlowMode::End => "end",
        }
    }
}

impl fmt::Display for ControlFlowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFlow {
    pub group: Uuid,
    pub mode: ControlFlowMode,
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Branch tests used by this flow, with the runtime's numeric codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Contains(String),
    HasAnyValue,
    DoesNotHaveAnyValue,
}

impl Condition {
    pub fn code(&self) -> i64 {
        match self {
            Condition::Contains(_) => 99,
            Condition::HasAnyValue => 100,
            Condition::DoesNotHaveAnyValue => 101,
        }
    }

    pub fn from_code(code: i64, operand: Option<&str>) -> Option<Self> {
        match code {
            99 => operand.map(|s| Condition::Contains(s.to_string())),
            100 => Some(Condition::HasAnyValue),
            101 => Some(Condition::DoesNotHaveAnyValue),
            _ => None,
        }
    }

    pub fn operand(&self) -> Option<&str> {
        match self {
            Condition::Contains(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Param
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(TypedValue),
    Mapping(KeyedMapping),
    /// The nested reference form only conditionals accept as `WFInput`.
    ConditionInput(Reference),
    String(String),
    Integer(i64),
    Bool(bool),
}

impl Param {
    pub fn to_plist(&self) -> Value {
        match self {
            Param::Value(v) => v.to_plist(),
            Param::Mapping(m) => m.to_plist(),
            Param::ConditionInput(r) => r.condition_input(),
            Param::String(s) => Value::String(s.clone()),
            Param::Integer(n) => Value::Integer((*n).into()),
            Param::Bool(b) => Value::Boolean(*b),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Param::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Param::Value(v) => v.reference().into_iter().collect(),
            Param::Mapping(m) => m.references().collect(),
            Param::ConditionInput(r) => vec![r],
            Param::String(_) | Param::Integer(_) | Param::Bool(_) => Vec::new(),
        }
    }
}

impl From<TypedValue> for Param {
    fn from(v: TypedValue) -> Self {
        Param::Value(v)
    }
}

impl From<KeyedMapping> for Param {
    fn from(m: KeyedMapping) -> Self {
        Param::Mapping(m)
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::String(s.to_string())
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::String(s)
    }
}

impl From<i64> for Param {
    fn from(n: i64) -> Self {
        Param::Integer(n)
    }
}

impl From<bool> for Param {
    fn from(b: bool) -> Self {
        Param::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub uuid: Option<Uuid>,
    pub control: Option<ControlFlow>,
    pub params: Vec<(String, Param)>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            uuid: None,
            control: None,
            params: Vec::new(),
        }
    }

    pub fn marker(kind: ActionKind, group: Uuid, mode: ControlFlowMode) -> Self {
        Self {
            control: Some(ControlFlow { group, mode }),
            ..Self::new(kind)
        }
    }

    pub fn with(mut self, key: &str, param: impl Into<Param>) -> Self {
        self.params.push((key.to_string(), param.into()));
        self
    }

    pub fn param(&self, key: &str) -> Option<&Param> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, p)| p)
    }

    /// Every reference this action reads, in parameter order.
    pub fn references(&self) -> Vec<&Reference> {
        self.params.iter().flat_map(|(_, p)| p.references()).collect()
    }

    /// Name of the variable a set-variable action writes.
    pub fn writes_variable(&self) -> Option<&str> {
        if self.kind != ActionKind::SetVariable {
            return None;
        }
        self.param(VARIABLE_NAME).and_then(Param::as_str)
    }

    pub fn to_plist(&self) -> Value {
        let mut params = Dictionary::new();
        if let Some(cf) = &self.control {
            params.insert(GROUPING_IDENTIFIER.into(), format_uuid(&cf.group).into());
            params.insert(CONTROL_FLOW_MODE.into(), Value::Integer(cf.mode.code().into()));
        }
        for (key, param) in &self.params {
            params.insert(key.clone(), param.to_plist());
        }
        if let Some(id) = &self.uuid {
            params.insert(UUID_KEY.into(), format_uuid(id).into());
        }

        let mut d = Dictionary::new();
        d.insert("WFWorkflowActionIdentifier".into(), self.kind.identifier().into());
        d.insert("WFWorkflowActionParameters".into(), Value::Dictionary(params));
        Value::Dictionary(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{literal, text_with_variable};

    #[test]
    fn identifiers_round_trip() {
        for kind in ActionKind::all() {
            let parsed: ActionKind = kind.identifier().parse().unwrap();
            assert_eq!(parsed, *kind);
        }
        assert_eq!(
            ActionKind::RepeatEach.identifier(),
            "is.workflow.actions.repeat.each"
        );
        assert!("is.workflow.actions.runjavascript".parse::<ActionKind>().is_err());
    }

    #[test]
    fn download_output_label_is_known() {
        assert_eq!(ActionKind::DownloadUrl.primary_output(), Some("Contents of URL"));
        assert_eq!(ActionKind::SetVariable.primary_output(), None);
    }

    #[test]
    fn marker_serializes_group_and_mode() {
        let group = Uuid::new_v4();
        let a = Action::marker(ActionKind::Conditional, group, ControlFlowMode::Else);
        let v = a.to_plist();
        let d = v.as_dictionary().unwrap();
        assert_eq!(
            d.get("WFWorkflowActionIdentifier").and_then(Value::as_string),
            Some("is.workflow.actions.conditional")
        );
        let params = d
            .get("WFWorkflowActionParameters")
            .and_then(Value::as_dictionary)
            .unwrap();
        assert_eq!(
            params.get(CONTROL_FLOW_MODE).and_then(Value::as_signed_integer),
            Some(1)
        );
        assert_eq!(
            params.get(GROUPING_IDENTIFIER).and_then(Value::as_string),
            Some(format_uuid(&group).as_str())
        );
        assert!(params.get(UUID_KEY).is_none());
    }

    fn params_of(a: &Action) -> Dictionary {
        a.to_plist()
            .into_dictionary()
            .and_then(|mut d| d.remove("WFWorkflowActionParameters"))
            .and_then(Value::into_dictionary)
            .unwrap()
    }

    #[test]
    fn uuid_is_emitted_only_when_assigned() {
        let mut a = Action::new(ActionKind::DownloadUrl).with(URL, literal("https://x"));
        assert!(params_of(&a).get(UUID_KEY).is_none());
        a.uuid = Some(Uuid::new_v4());
        assert!(params_of(&a).get(UUID_KEY).is_some());
    }

    #[test]
    fn writes_variable_only_for_set_variable() {
        let set = Action::new(ActionKind::SetVariable).with(VARIABLE_NAME, "status");
        assert_eq!(set.writes_variable(), Some("status"));
        let alert = Action::new(ActionKind::Alert)
            .with(ALERT_MESSAGE, text_with_variable("errorMsg").unwrap());
        assert_eq!(alert.writes_variable(), None);
        assert_eq!(alert.references().len(), 1);
    }

    #[test]
    fn condition_codes() {
        assert_eq!(Condition::Contains("error".into()).code(), 99);
        assert_eq!(Condition::DoesNotHaveAnyValue.code(), 101);
        assert_eq!(
            Condition::from_code(99, Some("picker")),
            Some(Condition::Contains("picker".into()))
        );
        assert_eq!(Condition::from_code(4, None), None);
    }
}
