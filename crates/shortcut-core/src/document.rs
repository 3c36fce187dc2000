//! The outer document record and its binary property-list encoding.

use crate::action::Action;
use crate::error::{Result, ShortcutError};
use crate::value::ContentType;
use plist::{Dictionary, Value};
use std::io::Cursor;

pub const WORKFLOW_ACTIONS: &str = "WFWorkflowActions";
/// Leading bytes of every binary property list.
pub const BINARY_MAGIC: &[u8] = b"bplist00";

pub const DEFAULT_CLIENT_VERSION: &str = "2612.0.15";
pub const DEFAULT_GLYPH: i64 = 59511;
pub const DEFAULT_COLOR: i64 = 463140863;
pub const DEFAULT_MINIMUM_CLIENT_VERSION: i64 = 900;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icon {
    pub glyph: i64,
    pub start_color: i64,
}

impl Default for Icon {
    fn default() -> Self {
        Self {
            glyph: DEFAULT_GLYPH,
            start_color: DEFAULT_COLOR,
        }
    }
}

/// What the runtime does when the shortcut is run without share input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoInputBehavior {
    GetClipboard,
    AskForInput,
}

impl NoInputBehavior {
    pub fn as_str(self) -> &'static str {
        match self {
            NoInputBehavior::GetClipboard => "WFWorkflowNoInputBehaviorGetClipboard",
            NoInputBehavior::AskForInput => "WFWorkflowNoInputBehaviorAskForInput",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowType {
    ActionExtension,
    NotificationWidget,
    Watch,
}

impl WorkflowType {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowType::ActionExtension => "ActionExtension",
            WorkflowType::NotificationWidget => "NCWidget",
            WorkflowType::Watch => "WatchKit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMetadata {
    pub client_version: String,
    pub icon: Icon,
    pub input_classes: Vec<ContentType>,
    pub minimum_client_version: i64,
    pub has_output_fallback: bool,
    pub has_shortcut_input: bool,
    pub no_input_behavior: Option<NoInputBehavior>,
    pub workflow_types: Vec<WorkflowType>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            icon: Icon::default(),
            input_classes: vec![ContentType::Url, ContentType::Text],
            minimum_client_version: DEFAULT_MINIMUM_CLIENT_VERSION,
            has_output_fallback: false,
            has_shortcut_input: true,
            no_input_behavior: None,
            workflow_types: vec![
                WorkflowType::ActionExtension,
                WorkflowType::NotificationWidget,
                WorkflowType::Watch,
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub actions: Vec<Action>,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(actions: Vec<Action>, metadata: DocumentMetadata) -> Self {
        Self { actions, metadata }
    }

    pub fn to_plist(&self) -> Value {
        let m = &self.metadata;
        let mut d = Dictionary::new();
        d.insert(
            WORKFLOW_ACTIONS.into(),
            Value::Array(self.actions.iter().map(Action::to_plist).collect()),
        );
        d.insert("WFWorkflowClientVersion".into(), m.client_version.as_str().into());
        d.insert(
            "WFWorkflowHasOutputFallback".into(),
            Value::Boolean(m.has_output_fallback),
        );
        d.insert(
            "WFWorkflowHasShortcutInputVariables".into(),
            Value::Boolean(m.has_shortcut_input),
        );

        let mut icon = Dictionary::new();
        icon.insert(
            "WFWorkflowIconGlyphNumber".into(),
            Value::Integer(m.icon.glyph.into()),
        );
        icon.insert(
            "WFWorkflowIconStartColor".into(),
            Value::Integer(m.icon.start_color.into()),
        );
        d.insert("WFWorkflowIcon".into(), Value::Dictionary(icon));

        d.insert("WFWorkflowImportQuestions".into(), Value::Array(Vec::new()));
        d.insert(
            "WFWorkflowInputContentItemClasses".into(),
            Value::Array(
                m.input_classes
                    .iter()
                    .map(|c| Value::from(c.item_class()))
                    .collect(),
            ),
        );
        d.insert(
            "WFWorkflowMinimumClientVersion".into(),
            Value::Integer(m.minimum_client_version.into()),
        );
        d.insert(
            "WFWorkflowMinimumClientVersionString".into(),
            m.minimum_client_version.to_string().into(),
        );
        if let Some(behavior) = m.no_input_behavior {
            let mut nib = Dictionary::new();
            nib.insert("Name".into(), behavior.as_str().into());
            nib.insert("Parameters".into(), Value::Dictionary(Dictionary::new()));
            d.insert("WFWorkflowNoInputBehavior".into(), Value::Dictionary(nib));
        }
        d.insert(
            "WFWorkflowOutputContentItemClasses".into(),
            Value::Array(Vec::new()),
        );
        d.insert(
            "WFWorkflowTypes".into(),
            Value::Array(
                m.workflow_types
                    .iter()
                    .map(|t| Value::from(t.as_str()))
                    .collect(),
            ),
        );
        Value::Dictionary(d)
    }

    pub fn to_binary(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        plist::to_writer_binary(&mut buf, &self.to_plist())?;
        Ok(buf)
    }

    /// Parse a binary (or XML) property list and check it has the document
    /// shape. The result is the raw plist; see `outline::from_plist`.
    pub fn read_binary(bytes: &[u8]) -> Result<Value> {
        let value = Value::from_reader(Cursor::new(bytes))?;
        let has_actions = value
            .as_dictionary()
            .and_then(|d| d.get(WORKFLOW_ACTIONS))
            .and_then(Value::as_array)
            .is_some();
        if !has_actions {
            return Err(ShortcutError::Decode(format!(
                "not a shortcut document: no {WORKFLOW_ACTIONS} array"
            )));
        }
        Ok(value)
    }
}
